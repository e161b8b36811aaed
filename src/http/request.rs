//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.1 request.
///
/// Query parameters are percent-decoded once at parse time; when a key
/// repeats, the first occurrence wins.
///
/// # Examples
///
/// ```
/// use geocache::http::request::Request;
///
/// let raw = b"GET /api?q=New+York&q=ignored HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/api");
/// assert_eq!(request.query_param("q"), Some("New York"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parses a raw HTTP/1.1 request from `buf`.
    ///
    /// Returns the request and the byte offset at which its body begins. The
    /// body itself is not retained; callers skip past it using
    /// [`content_length`](Self::content_length).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] if the header block is not complete yet.
    /// - [`RequestError::Parse`] if the data is malformed.
    /// - [`RequestError::MissingField`] if method, path or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req.method {
            Some(m) => m.parse::<Method>().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let params = query.as_deref().map(parse_query_string).unwrap_or_default();

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                params,
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the decoded value of query parameter `key`.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive, HTTP/1.0 to close.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) if conn.eq_ignore_ascii_case("close") => false,
            Some(conn) if conn.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == 1,
        }
    }

    /// Returns the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

/// Parses `key=value&key2=value2` into a map of decoded pairs.
///
/// `+` decodes to a space and `%XX` sequences are percent-decoded (invalid
/// UTF-8 is replaced). Empty segments are skipped and the first occurrence of a
/// key is kept.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(decode_component(key))
            .or_insert_with(|| decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
