//! The `/api` endpoint.
//!
//! `GET /api?q=<query>` answers `{"cache": <bool>, "resp": [<place>, ...]}`.
//! Any failure behind it becomes an empty `500`; the cause is only logged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::context::Context;
use crate::geocode::PlaceRecord;
use crate::middleware::LoggerMiddleware;
use crate::resolver::Resolver;
use crate::{Response, Router, StatusCode};

/// Path the geocoding endpoint is mounted on.
pub const API_PATH: &str = "/api";

/// Response envelope for the geocoding endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// `true` when `resp` came from the cache rather than upstream.
    pub cache: bool,
    pub resp: Vec<PlaceRecord>,
}

/// Builds the application router: `GET /api` behind request logging.
pub fn router(resolver: Arc<Resolver>) -> Router {
    let mut router = Router::new();
    router.get(API_PATH, move |ctx: Context| {
        let resolver = Arc::clone(&resolver);
        async move { geocode(ctx, &resolver).await }
    });
    router.layer(LoggerMiddleware);
    router
}

/// Handles one geocoding request.
///
/// A missing `q` parameter is treated as the empty query.
pub async fn geocode(ctx: Context, resolver: &Resolver) -> Response {
    let query = ctx.query_or_empty("q");
    info!(query, "geocode request");

    let resolution = match resolver.resolve(query).await {
        Ok(resolution) => resolution,
        Err(e) => {
            error!(query, error = %e, "failed to resolve query");
            return Response::new(StatusCode::InternalServerError);
        }
    };

    let body = ApiResponse {
        cache: resolution.cache_hit,
        resp: resolution.places,
    };

    match Response::json(StatusCode::Ok, &body) {
        Ok(response) => response,
        Err(e) => {
            error!(query, error = %e, "failed to encode response");
            Response::new(StatusCode::InternalServerError)
        }
    }
}
