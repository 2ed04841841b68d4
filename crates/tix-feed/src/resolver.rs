//! Memoizing metadata resolver using moka
//!
//! Wraps a [`ContentStore`] so that each content identifier is fetched at most
//! once per process lifetime. Concurrent requests for the same identifier
//! share one fetch. Failed fetches are not cached and are retried on the next
//! request.

use crate::client::ContentStore;
use crate::error::ContentError;
use moka::future::Cache;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tix_types::ContentId;
use tracing::debug;

/// Default number of documents kept in memory
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Statistics for resolver monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Number of cached documents (approximate)
    pub entry_count: u64,
    /// Number of fetches issued to the content store
    pub fetches: u64,
}

/// Content-addressed metadata cache in front of a content store
#[derive(Clone)]
pub struct MetadataResolver {
    store: Arc<dyn ContentStore>,
    cache: Cache<ContentId, Arc<serde_json::Value>>,
    fetches: Arc<AtomicU64>,
}

impl MetadataResolver {
    /// Create a resolver holding up to `max_capacity` documents
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>, max_capacity: u64) -> Self {
        Self {
            store,
            cache: Cache::new(max_capacity),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Resolve a content identifier, fetching only on a cache miss
    ///
    /// # Errors
    /// Returns `ContentError::NotAvailable` if the store cannot supply the document
    pub async fn resolve(&self, cid: &ContentId) -> Result<Arc<serde_json::Value>, ContentError> {
        let store = Arc::clone(&self.store);
        let fetches = Arc::clone(&self.fetches);
        let key = cid.clone();

        self.cache
            .try_get_with(cid.clone(), async move {
                fetches.fetch_add(1, Ordering::Relaxed);
                debug!(cid = %key, "fetching metadata");
                store.resolve(&key).await.map(Arc::new)
            })
            .await
            .map_err(|err| (*err).clone())
    }

    /// Drop a cached document so the next request fetches it again
    pub async fn invalidate(&self, cid: &ContentId) {
        self.cache.invalidate(cid).await;
    }

    /// Drop every cached document
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Check if a document is cached
    pub async fn contains(&self, cid: &ContentId) -> bool {
        self.cache.get(cid).await.is_some()
    }

    /// Get resolver statistics
    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            entry_count: self.cache.entry_count(),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
