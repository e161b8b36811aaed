//! Middleware pipeline: composable logic wrapped around route handlers.
//!
//! - [`Middleware`] is the trait every layer implements.
//! - [`Next`] is the cursor into the rest of the chain; the route handler
//!   itself is the final link.
//! - [`LoggerMiddleware`] logs one line per request.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::{Response, StatusCode, context::Context};

/// A type-erased, reference-counted middleware function.
///
/// The [`Arc`] makes links cheap to clone while [`Next`] walks the chain.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// Consumed by [`run`](Self::run), so each layer can forward at most once.
pub struct Next {
    chain: Arc<[MiddlewareHandler]>,
    index: usize,
}

impl Next {
    /// Creates a cursor positioned at the start of `chain`.
    pub fn new(chain: Arc<[MiddlewareHandler]>) -> Self {
        Self { chain, index: 0 }
    }

    /// Invokes the next link and returns its response.
    ///
    /// An exhausted chain yields an empty `500`; the router always terminates
    /// its chains with the route handler, so this only happens on misuse.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.chain.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::InternalServerError),
        }
    }
}

/// The trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] directly, or decorate the downstream response.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Logs method, path, status and duration once the downstream handler completes.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request served"
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;

    fn ctx() -> Context {
        let (req, _) = Request::parse(b"GET /api HTTP/1.1\r\n\r\n").unwrap();
        Context::new(req)
    }

    fn terminal(status: StatusCode) -> MiddlewareHandler {
        Arc::new(move |_ctx: Context, _next: Next| {
            Box::pin(async move { Response::new(status) })
                as Pin<Box<dyn Future<Output = Response> + Send>>
        })
    }

    #[tokio::test]
    async fn exhausted_chain_is_500() {
        let next = Next::new(Arc::from(Vec::new()));
        let res = next.run(ctx()).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let chain: Vec<MiddlewareHandler> = vec![
            from_middleware(Arc::new(LoggerMiddleware)),
            terminal(StatusCode::NotFound),
        ];
        let res = Next::new(Arc::from(chain)).run(ctx()).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn handle(
            &self,
            _ctx: Context,
            _next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::BadRequest) })
        }
    }

    #[tokio::test]
    async fn layer_can_short_circuit() {
        let chain: Vec<MiddlewareHandler> = vec![
            from_middleware(Arc::new(ShortCircuit)),
            terminal(StatusCode::Ok),
        ];
        let res = Next::new(Arc::from(chain)).run(ctx()).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
    }
}
