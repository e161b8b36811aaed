//! Request routing: map exact paths and HTTP methods to handler functions.
//!
//! Routes are matched in registration order. A trailing slash is ignored on
//! both the registered path and the incoming one, so `/api/` and `/api` are
//! the same route. Every dispatch, including the `404`/`405` fallbacks, runs
//! through the middleware layers added with [`Router::layer`].

use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async route handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements it through the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust,no_run
/// use geocache::{Response, Router, StatusCode};
/// use geocache::context::Context;
/// use geocache::middleware::LoggerMiddleware;
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::Ok) });
/// router.layer(LoggerMiddleware);
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    layers: Vec<MiddlewareHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `GET` requests to `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        self.routes.push(Route {
            method: Method::Get,
            path: normalize(path).to_owned(),
            handler,
        });
    }

    /// Appends a middleware layer. Layers run in the order they were added,
    /// outermost first.
    pub fn layer<M: Middleware + 'static>(&mut self, middleware: M) {
        self.layers.push(from_middleware(Arc::new(middleware)));
    }

    /// Dispatches `request` through the layers to the first matching route.
    ///
    /// A path that is registered only under other methods gets `405` with an
    /// `Allow` header; an unknown path gets `404`.
    pub async fn route(&self, request: Request) -> Response {
        let endpoint = self.resolve(request.method(), request.path());

        let mut chain = Vec::with_capacity(self.layers.len() + 1);
        chain.extend(self.layers.iter().cloned());
        chain.push(endpoint);

        Next::new(Arc::from(chain)).run(Context::new(request)).await
    }

    fn resolve(&self, method: &Method, path: &str) -> MiddlewareHandler {
        let path = normalize(path);
        let mut allowed: Vec<&str> = Vec::new();

        for route in self.routes.iter().filter(|r| r.path == path) {
            if &route.method == method {
                let handler = Arc::clone(&route.handler);
                return Arc::new(move |ctx: Context, _next: Next| handler(ctx));
            }
            allowed.push(route.method.as_str());
        }

        let allow = (!allowed.is_empty()).then(|| allowed.join(", "));

        Arc::new(move |_ctx: Context, _next: Next| {
            let response = match &allow {
                Some(allow) => {
                    Response::new(StatusCode::MethodNotAllowed).header("Allow", allow.clone())
                }
                None => Response::new(StatusCode::NotFound),
            };
            Box::pin(async move { response }) as Pin<Box<dyn Future<Output = Response> + Send>>
        })
    }
}

fn normalize(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_request(method: &str, target: &str) -> Request {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new();
        let res = router.route(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn get_matches_with_query_and_trailing_slash() {
        let mut router = Router::new();
        router.get("/api", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert_eq!(
            router.route(make_request("GET", "/api?q=x")).await.status(),
            StatusCode::Ok
        );
        assert_eq!(
            router.route(make_request("GET", "/api/")).await.status(),
            StatusCode::Ok
        );
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let mut router = Router::new();
        router.get("/api", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("POST", "/api")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("GET"));
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let mut router = Router::new();
        router.get("/api", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("GET", "/apis")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn handler_sees_query() {
        let mut router = Router::new();
        router.get("/api", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.query_or_empty("q").to_owned())
        });
        let res = router.route(make_request("GET", "/api?q=Peru")).await;
        assert_eq!(res.body_ref(), b"Peru");
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/api", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/api", |_ctx: Context| async {
            Response::new(StatusCode::InternalServerError)
        });
        let res = router.route(make_request("GET", "/api")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    struct Counting(Arc<AtomicUsize>);

    impl Middleware for Counting {
        fn handle(
            &self,
            ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(next.run(ctx))
        }
    }

    #[tokio::test]
    async fn layers_wrap_routes_and_fallbacks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        router.get("/api", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.layer(Counting(Arc::clone(&hits)));

        router.route(make_request("GET", "/api")).await;
        router.route(make_request("GET", "/missing")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
