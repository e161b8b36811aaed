//! Upstream geocoding: the place record model and the clients that fetch it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod nominatim;

pub use nominatim::{DEFAULT_BASE_URL, NominatimClient, path_escape};

/// One geocoding result as returned by the upstream service.
///
/// Stored and returned verbatim, with no validation. Fields the upstream omits
/// decode to their zero value and every field is always emitted on encode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceRecord {
    pub place_id: i64,
    pub licence: String,
    pub osm_type: String,
    pub osm_id: i64,
    /// `[south, north, west, east]` as decimal strings.
    pub boundingbox: Vec<String>,
    pub lat: String,
    pub lon: String,
    pub display_name: String,
    pub class: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub importance: f64,
    pub icon: String,
}

/// Serializes records into the cache entry format, a JSON array.
pub fn encode_places(places: &[PlaceRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string(places)
}

/// Parses a JSON array of records. An empty body or `null` yields no records.
pub fn decode_places(raw: &[u8]) -> Result<Vec<PlaceRecord>, serde_json::Error> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let places: Option<Vec<PlaceRecord>> = serde_json::from_slice(raw)?;
    Ok(places.unwrap_or_default())
}

/// Errors from the upstream geocoding service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport failure, timeout, or a non-2xx status.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A source of place records for a free-form query.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<PlaceRecord>, UpstreamError>;
}
