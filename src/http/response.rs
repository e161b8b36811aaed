//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder API for constructing HTTP responses and
//! serializing them to a byte buffer for transmission over TCP.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use geocache::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Ok, &serde_json::json!({"cache": false}))
///     .unwrap();
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// assert!(text.ends_with("{\"cache\":false}"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// Serializes `value` as the body and sets `Content-Type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(
        status: StatusCode,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status)
            .header("Content-Type", "application/json")
            .body_bytes(body))
    }

    /// Appends a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// `Content-Length` is written by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes as set so far.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` when the body is non-empty
    /// and no content type was set, plus `Connection` and `Content-Length`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.insert("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_slice());
        }

        buf
    }
}
