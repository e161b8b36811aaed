//! # geocache
//!
//! A small HTTP service that answers geocoding queries from the public
//! Nominatim API, keeping each answer in Redis for fifteen seconds so repeat
//! queries skip the upstream call.
//!
//! ```text
//! GET /api?q=Germany  ->  {"cache": false, "resp": [ ...places... ]}
//! GET /api?q=Germany  ->  {"cache": true,  "resp": [ ...places... ]}   (within 15s)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use geocache::cache::MemoryStore;
//! use geocache::geocode::{DEFAULT_BASE_URL, NominatimClient};
//! use geocache::resolver::Resolver;
//! use geocache::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let geocoder = NominatimClient::new(DEFAULT_BASE_URL, Duration::from_secs(10))?;
//!     let resolver = Arc::new(Resolver::new(Arc::new(MemoryStore::new()), Arc::new(geocoder)));
//!     let router = Arc::new(geocache::api::router(resolver));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server
//!         .run(move |req| {
//!             let router = Arc::clone(&router);
//!             async move { router.route(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── Service ───────────────────────────────────────────────────────────────────
pub mod api;
pub mod cache;
pub mod config;
pub mod geocode;
pub mod resolver;
pub mod telemetry;

// ── HTTP transport ────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
