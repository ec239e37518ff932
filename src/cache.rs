//! TTL cache for query-expansion results.
//!
//! The cache is the only process-wide mutable state in the engine. It is
//! injected rather than held in a module singleton so hosts own its
//! lifecycle and tests can supply a fake. Semantics are last-write-wins;
//! two concurrent misses for the same query may both call the LLM, which
//! is bounded duplication, not a correctness problem.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::types::ExpandedQuery;

/// Maximum number of cached expansion sets.
const MAX_CACHE_ENTRIES: u64 = 1000;

/// Cache of expansion results keyed by normalized query text.
#[async_trait]
pub trait ExpansionCache: Send + Sync {
    /// Look up cached expansions. `Some` on hit, `None` on miss/expiry.
    async fn get(&self, key: &str) -> Option<Vec<ExpandedQuery>>;

    /// Insert an expansion set. Overwrites any existing entry for the key.
    async fn insert(&self, key: String, value: Vec<ExpandedQuery>);
}

/// Moka-backed expansion cache with TTL eviction.
pub struct MokaExpansionCache {
    cache: Cache<String, Vec<ExpandedQuery>>,
}

impl MokaExpansionCache {
    /// Create a cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl ExpansionCache for MokaExpansionCache {
    async fn get(&self, key: &str) -> Option<Vec<ExpandedQuery>> {
        self.cache.get(key).await
    }

    async fn insert(&self, key: String, value: Vec<ExpandedQuery>) {
        self.cache.insert(key, value).await;
    }
}
