//! Cache-aside resolution of geocoding queries.
//!
//! [`Resolver::resolve`] checks the [`Store`] first. On a miss it asks the
//! [`Geocoder`], writes the re-encoded result back with a fixed TTL and
//! returns it; on a hit it decodes the stored entry and skips upstream
//! entirely. Concurrent misses for one query are not coalesced: each goes
//! upstream and the last write wins.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{Store, StoreError};
use crate::geocode::{Geocoder, PlaceRecord, UpstreamError, decode_places, encode_places};

/// Lifetime of a cache entry, fixed at write time.
pub const CACHE_TTL: Duration = Duration::from_secs(15);

/// Default bound on each individual store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything that can make a resolution fail.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cache store: {0}")]
    Store(#[from] StoreError),

    #[error("cache store did not answer within {0:?}")]
    StoreTimeout(Duration),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("cached entry is not valid JSON: {0}")]
    CorruptEntry(#[source] serde_json::Error),

    #[error("failed to encode places for caching: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The outcome of a successful [`Resolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub places: Vec<PlaceRecord>,
    pub cache_hit: bool,
}

/// Cache-aside front for a [`Geocoder`].
///
/// Holds its collaborators behind [`Arc`]s; share one resolver across all
/// request tasks.
pub struct Resolver {
    store: Arc<dyn Store>,
    geocoder: Arc<dyn Geocoder>,
    ttl: Duration,
    store_timeout: Duration,
}

impl Resolver {
    pub fn new(store: Arc<dyn Store>, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            store,
            geocoder,
            ttl: CACHE_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Overrides the per-call store timeout.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Resolves `query` to its place records.
    ///
    /// A failed cache write after a successful upstream call is logged and
    /// the fresh records are still returned, uncached.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Store`] / [`ResolveError::StoreTimeout`] if the cache
    ///   read fails.
    /// - [`ResolveError::Upstream`] on a miss whose upstream call fails.
    /// - [`ResolveError::CorruptEntry`] if a cached value cannot be decoded.
    pub async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        let cached = tokio::time::timeout(self.store_timeout, self.store.get(query))
            .await
            .map_err(|_| ResolveError::StoreTimeout(self.store_timeout))??;

        if let Some(entry) = cached {
            let places = decode_places(entry.as_bytes()).map_err(ResolveError::CorruptEntry)?;
            debug!(query, places = places.len(), "cache hit");
            return Ok(Resolution {
                places,
                cache_hit: true,
            });
        }

        debug!(query, "cache miss, querying upstream");
        let places = self.geocoder.search(query).await?;
        let entry = encode_places(&places).map_err(ResolveError::Encode)?;

        match tokio::time::timeout(self.store_timeout, self.store.set(query, entry, self.ttl)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(query, error = %e, "failed to cache upstream result"),
            Err(_) => warn!(
                query,
                timeout = ?self.store_timeout,
                "timed out caching upstream result"
            ),
        }

        Ok(Resolution {
            places,
            cache_hit: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn place(id: i64, name: &str) -> PlaceRecord {
        PlaceRecord {
            place_id: id,
            osm_type: "relation".into(),
            display_name: name.into(),
            boundingbox: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            importance: 0.5,
            ..PlaceRecord::default()
        }
    }

    #[derive(Default)]
    struct FakeGeocoder {
        calls: AtomicUsize,
        queries: Mutex<Vec<String>>,
        places: Vec<PlaceRecord>,
    }

    impl FakeGeocoder {
        fn returning(places: Vec<PlaceRecord>) -> Arc<Self> {
            Arc::new(Self {
                places,
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn search(&self, query: &str) -> Result<Vec<PlaceRecord>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_owned());
            Ok(self.places.clone())
        }
    }

    struct BrokenGeocoder;

    #[async_trait]
    impl Geocoder for BrokenGeocoder {
        async fn search(&self, _query: &str) -> Result<Vec<PlaceRecord>, UpstreamError> {
            Err(decode_places(b"not json").unwrap_err().into())
        }
    }

    /// Reads succeed as misses or fail, writes always fail.
    struct FlakyStore {
        fail_reads: bool,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            if self.fail_reads {
                Err(StoreError::Unavailable("connection refused".into()))
            } else {
                Ok(None)
            }
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only replica".into()))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl Store for HangingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let store = Arc::new(MemoryStore::new());
        let geocoder = FakeGeocoder::returning(vec![place(1, "Germany")]);
        let resolver = Resolver::new(store.clone(), geocoder.clone());

        let first = resolver.resolve("Germany").await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.places, vec![place(1, "Germany")]);
        assert_eq!(geocoder.calls(), 1);
        assert_eq!(*geocoder.queries.lock().unwrap(), vec!["Germany".to_owned()]);

        let second = resolver.resolve("Germany").await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.places, first.places);
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn queries_are_cached_independently() {
        let geocoder = FakeGeocoder::returning(vec![place(1, "x")]);
        let resolver = Resolver::new(Arc::new(MemoryStore::new()), geocoder.clone());

        resolver.resolve("Spain").await.unwrap();
        let other = resolver.resolve("spain").await.unwrap();
        assert!(!other.cache_hit);
        assert_eq!(geocoder.calls(), 2);
    }

    #[tokio::test]
    async fn empty_query_uses_empty_key() {
        let store = Arc::new(MemoryStore::new());
        let geocoder = FakeGeocoder::returning(Vec::new());
        let resolver = Resolver::new(store.clone(), geocoder.clone());

        let first = resolver.resolve("").await.unwrap();
        assert!(!first.cache_hit);
        assert!(first.places.is_empty());
        assert_eq!(store.get("").await.unwrap().as_deref(), Some("[]"));

        let second = resolver.resolve("").await.unwrap();
        assert!(second.cache_hit);
        assert!(second.places.is_empty());
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_goes_upstream_again() {
        let geocoder = FakeGeocoder::returning(vec![place(1, "France")]);
        let resolver = Resolver::new(Arc::new(MemoryStore::new()), geocoder.clone());

        resolver.resolve("France").await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(resolver.resolve("France").await.unwrap().cache_hit);

        tokio::time::advance(CACHE_TTL).await;
        let after = resolver.resolve("France").await.unwrap();
        assert!(!after.cache_hit);
        assert_eq!(geocoder.calls(), 2);
    }

    #[tokio::test]
    async fn store_read_failure_is_an_error() {
        let geocoder = FakeGeocoder::returning(vec![place(1, "x")]);
        let resolver = Resolver::new(Arc::new(FlakyStore { fail_reads: true }), geocoder.clone());

        let err = resolver.resolve("Italy").await.unwrap_err();
        assert!(matches!(err, ResolveError::Store(StoreError::Unavailable(_))));
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn store_write_failure_still_returns_fresh_data() {
        let geocoder = FakeGeocoder::returning(vec![place(3, "Italy")]);
        let resolver = Resolver::new(Arc::new(FlakyStore { fail_reads: false }), geocoder);

        let resolution = resolver.resolve("Italy").await.unwrap();
        assert!(!resolution.cache_hit);
        assert_eq!(resolution.places, vec![place(3, "Italy")]);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_store_times_out() {
        let geocoder = FakeGeocoder::returning(Vec::new());
        let resolver = Resolver::new(Arc::new(HangingStore), geocoder)
            .with_store_timeout(Duration::from_millis(100));

        let err = resolver.resolve("Peru").await.unwrap_err();
        assert!(matches!(err, ResolveError::StoreTimeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn upstream_failure_is_an_error_and_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Resolver::new(store.clone(), Arc::new(BrokenGeocoder));

        let err = resolver.resolve("Chile").await.unwrap_err();
        assert!(matches!(err, ResolveError::Upstream(UpstreamError::Decode(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn corrupt_entry_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("Chad", "{not json".into(), CACHE_TTL)
            .await
            .unwrap();
        let geocoder = FakeGeocoder::returning(Vec::new());
        let resolver = Resolver::new(store, geocoder.clone());

        let err = resolver.resolve("Chad").await.unwrap_err();
        assert!(matches!(err, ResolveError::CorruptEntry(_)));
        assert_eq!(geocoder.calls(), 0);
    }
}
