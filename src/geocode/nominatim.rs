use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

use super::{Geocoder, PlaceRecord, UpstreamError, decode_places};

/// Public OpenStreetMap Nominatim instance.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

// Nominatim's usage policy rejects requests without an identifying agent.
const USER_AGENT: &str = concat!("geocache/", env!("CARGO_PKG_VERSION"));

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes left untouched when escaping a single path segment: unreserved
/// characters plus the sub-delimiters `$ & + : = @`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Percent-escapes `s` for use as a single URL path segment.
///
/// # Examples
///
/// ```
/// use geocache::geocode::path_escape;
///
/// assert_eq!(path_escape("United Kingdom"), "United%20Kingdom");
/// assert_eq!(path_escape("a/b"), "a%2Fb");
/// ```
pub fn path_escape(s: &str) -> String {
    utf8_percent_encode(s, PATH_SEGMENT).to_string()
}

/// [`Geocoder`] that queries a Nominatim `/search` endpoint by country.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    http: reqwest::Client,
    base_url: String,
}

impl NominatimClient {
    /// Builds a client for `base_url` whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Request`] if the TLS backend cannot be
    /// initialized.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    /// The URL requested for `query`.
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?country={}&format=json",
            self.base_url,
            path_escape(query)
        )
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn search(&self, query: &str) -> Result<Vec<PlaceRecord>, UpstreamError> {
        let url = self.search_url(query);
        debug!(url = %url, "querying upstream");

        let body = self
            .http
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(decode_places(&body)?)
    }
}
