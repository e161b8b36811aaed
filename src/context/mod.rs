//! Per-request context handed to routes and middleware.

use crate::Request;

/// Wraps the parsed [`Request`] for the duration of one dispatch.
#[derive(Debug)]
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the decoded query parameter `key`, or `""` when absent.
    pub fn query_or_empty(&self, key: &str) -> &str {
        self.request.query_param(key).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(target: &str) -> Context {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    #[test]
    fn absent_param_is_empty() {
        assert_eq!(ctx("/api").query_or_empty("q"), "");
        assert_eq!(ctx("/api?x=1").query_or_empty("q"), "");
    }

    #[test]
    fn present_param() {
        assert_eq!(ctx("/api?q=Germany").query_or_empty("q"), "Germany");
    }
}
