use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use feedtally_core::lock_ttl;

use crate::backend::CacheBackend;
use crate::error::CacheError;
use crate::keys::KeySpace;

/// Day-scoped single-flight lock for the flush.
///
/// The key exists from the first successful acquisition until the next local
/// midnight plus `grace`. Existence means the day's flush already ran or is
/// running; nobody releases it early.
#[derive(Clone)]
pub struct DayLock {
    cache: Arc<dyn CacheBackend>,
    keys: KeySpace,
    grace: Duration,
}

impl DayLock {
    pub fn new(cache: Arc<dyn CacheBackend>, keys: KeySpace, grace: Duration) -> Self {
        Self { cache, keys, grace }
    }

    /// Returns `true` only for the caller that created the lock for `day`.
    pub async fn try_acquire(
        &self,
        day: NaiveDate,
        now: DateTime<FixedOffset>,
    ) -> Result<bool, CacheError> {
        let ttl = lock_ttl(now, self.grace);
        self.cache
            .set_if_absent(&self.keys.flush_lock(day), ttl)
            .await
    }

    /// Holds the lock for `day` whether or not someone else created it,
    /// restarting its expiry from `now`.
    ///
    /// Used to re-run a day whose earlier attempt lost records.
    pub async fn take_over(
        &self,
        day: NaiveDate,
        now: DateTime<FixedOffset>,
    ) -> Result<(), CacheError> {
        let key = self.keys.flush_lock(day);
        let ttl = lock_ttl(now, self.grace);
        if !self.cache.set_if_absent(&key, ttl).await? {
            self.cache.expire(&key, ttl).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;

    #[tokio::test]
    async fn test_only_first_acquire_wins() {
        let cache = Arc::new(MemoryCache::new());
        let keys = KeySpace::default();
        let lock = DayLock::new(cache.clone(), keys.clone(), Duration::from_secs(3600));
        let now = DateTime::parse_from_rfc3339("2024-03-02T10:00:00+00:00").unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert!(lock.try_acquire(day, now).await.unwrap());
        assert!(!lock.try_acquire(day, now).await.unwrap());

        // Other days are independent.
        let other = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert!(lock.try_acquire(other, now).await.unwrap());

        let ttl = cache.ttl(&keys.flush_lock(day)).unwrap();
        assert!(ttl > Duration::from_secs(14 * 3600));
        assert!(ttl <= Duration::from_secs(15 * 3600));
    }

    #[tokio::test]
    async fn test_take_over_refreshes_held_lock() {
        let cache = Arc::new(MemoryCache::new());
        let keys = KeySpace::default();
        let lock = DayLock::new(cache.clone(), keys.clone(), Duration::from_secs(3600));
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let first = DateTime::parse_from_rfc3339("2024-03-02T10:00:00+00:00").unwrap();
        assert!(lock.try_acquire(day, first).await.unwrap());

        // Later in the same day the expiry is shorter, so the refresh is visible.
        let later = DateTime::parse_from_rfc3339("2024-03-02T20:00:00+00:00").unwrap();
        lock.take_over(day, later).await.unwrap();
        let ttl = cache.ttl(&keys.flush_lock(day)).unwrap();
        assert!(ttl <= Duration::from_secs(5 * 3600));
        assert!(ttl > Duration::from_secs(4 * 3600));

        // Still held for everyone else.
        assert!(!lock.try_acquire(day, later).await.unwrap());

        // With no prior holder it simply creates the lock.
        let other = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        lock.take_over(other, later).await.unwrap();
        assert!(!lock.try_acquire(other, later).await.unwrap());
    }
}
