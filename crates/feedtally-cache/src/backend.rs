use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// The primitives the engagement pipeline needs from a shared key-value cache.
///
/// Hash fields hold staging records, sorted sets hold the activity index and
/// plain keys with a TTL act as locks. Nothing else is required.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Value of `field` in the hash at `key`, if any.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    /// Atomically writes `value` into `field` only if the field currently
    /// holds `expected` (`None` = field absent), then sets the key's TTL.
    ///
    /// Returns `false`, without writing, when the current value differs.
    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Inserts `member` or replaces its score.
    async fn sorted_upsert(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError>;

    /// Members ranked `[offset, offset + count)` by descending score.
    async fn sorted_range_desc(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError>;

    /// Creates `key` with `ttl` if it does not exist. Returns whether it was created.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Refreshes the TTL of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
