//! HTTP/1.1 protocol types and parsing.
//!
//! Only the subset of HTTP the proxy speaks lives here:
//! [`Method`], [`StatusCode`], [`Headers`], [`Request`], and [`Response`].

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// An HTTP response status code.
///
/// Limited to the statuses the service can actually produce.
///
/// # Examples
///
/// ```
/// use geocache::http::StatusCode;
///
/// let status = StatusCode::InternalServerError;
/// assert_eq!(status.as_u16(), 500);
/// assert!(!status.is_success());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    MethodNotAllowed = 405,
    PayloadTooLarge = 413,
    InternalServerError = 500,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the canonical reason phrase for this status code.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::InternalServerError => "Internal Server Error",
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

/// An HTTP request method.
///
/// The service only routes `GET`; any other method is kept verbatim in
/// `Other` so the router can answer `405`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Other(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            other => Self::Other(other.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(
            StatusCode::InternalServerError.to_string(),
            "500 Internal Server Error"
        );
    }

    #[test]
    fn non_get_methods_are_kept_verbatim() {
        let get: Method = "GET".parse().unwrap();
        assert_eq!(get, Method::Get);

        let post: Method = "POST".parse().unwrap();
        assert_eq!(post, Method::Other("POST".into()));
        assert_eq!(post.to_string(), "POST");
    }
}
