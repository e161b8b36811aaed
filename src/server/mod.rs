//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function, one task per connection. Connections are persistent (keep-alive)
//! and a request whose client goes away mid-flight is cancelled by dropping its
//! handler future.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// How long a rejected connection is drained before it is closed.
const LINGER: Duration = Duration::from_secs(1);

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use geocache::server::Server;
/// use geocache::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req| async { Response::new(StatusCode::Ok) }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, future::pending()).await
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// The handler is shared across all connection tasks behind an [`Arc`].
    /// Once `shutdown` fires the server stops accepting; connections that are
    /// already open are left to finish on their own tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);
        info!(address = %self.local_addr, "geocache listening");

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// How a dispatched request ended.
enum Dispatch {
    Done(Response),
    ClientGone,
    Oversized,
}

/// Handles a single TCP connection over its lifetime.
///
/// Loops one request per iteration until the peer closes the connection or a
/// request asks for `Connection: close`. Bytes that arrive while a handler is
/// running are kept for the next iteration, up to [`MAX_REQUEST_SIZE`].
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let (mut reader, mut writer) = stream.split();
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut need_read = true;

    loop {
        if need_read && reader.read_buf(&mut buf).await? == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }
        need_read = true;

        if buf.len() > MAX_REQUEST_SIZE {
            return reject_oversized(&mut reader, &mut writer, peer_addr).await;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest).keep_alive(false);
                writer.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        let total_needed = body_offset.saturating_add(request.content_length().unwrap_or(0));
        if total_needed > MAX_REQUEST_SIZE {
            return reject_oversized(&mut reader, &mut writer, peer_addr).await;
        }
        if buf.len() < total_needed {
            continue;
        }
        let _ = buf.split_to(total_needed);

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let outcome = {
            let in_flight = handler(request);
            tokio::pin!(in_flight);

            loop {
                tokio::select! {
                    response = &mut in_flight => break Dispatch::Done(response),
                    read = reader.read_buf(&mut buf) => match read? {
                        0 => break Dispatch::ClientGone,
                        _ if buf.len() > MAX_REQUEST_SIZE => break Dispatch::Oversized,
                        _ => continue,
                    },
                }
            }
        };

        let response = match outcome {
            Dispatch::Done(response) => response,
            Dispatch::ClientGone => {
                debug!(peer = %peer_addr, "client went away, request cancelled");
                break;
            }
            Dispatch::Oversized => {
                return reject_oversized(&mut reader, &mut writer, peer_addr).await;
            }
        };

        writer
            .write_all(&response.keep_alive(keep_alive).into_bytes())
            .await?;
        writer.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }

        need_read = buf.is_empty();
    }

    Ok(())
}

/// Sends `413` with `Connection: close`, then discards whatever the client is
/// still sending for at most [`LINGER`] so the reply is not lost to a reset.
async fn reject_oversized<R, W>(
    reader: &mut R,
    writer: &mut W,
    peer_addr: SocketAddr,
) -> Result<(), std::io::Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    warn!(peer = %peer_addr, limit = MAX_REQUEST_SIZE, "request too large, sending 413");
    let response = Response::new(StatusCode::PayloadTooLarge).keep_alive(false);
    writer.write_all(&response.into_bytes()).await?;
    writer.flush().await?;
    writer.shutdown().await?;

    let mut sink = [0u8; 8192];
    let _ = tokio::time::timeout(LINGER, async {
        while let Ok(n) = reader.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
    Ok(())
}
