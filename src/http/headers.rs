//! HTTP header map with case-insensitive name lookup.

/// A case-insensitive, insertion-ordered HTTP header list.
///
/// Multiple entries with the same name are allowed, matching HTTP/1.1
/// field semantics.
///
/// # Examples
///
/// ```
/// use geocache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "application/json");
///
/// assert_eq!(headers.get("content-type"), Some("application/json"));
/// assert!(headers.contains("CONTENT-TYPE"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one entry is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Total number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
