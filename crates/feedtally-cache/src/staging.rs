//! Staging store accessor.
//!
//! Merges are optimistic: read the current value, merge the delta in memory,
//! then write back with a compare-and-set against the value that was read. A
//! lost race re-reads and tries again, so concurrent deltas for the same
//! (user, day) are all applied.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use feedtally_core::{EngagementDelta, StagingRecord};
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::error::CacheError;
use crate::keys::KeySpace;

#[derive(Clone)]
pub struct StagingStore {
    cache: Arc<dyn CacheBackend>,
    keys: KeySpace,
    ttl: Duration,
    max_attempts: u32,
}

impl StagingStore {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        keys: KeySpace,
        ttl: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            cache,
            keys,
            ttl,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Folds `delta` into the staging record for its user on `day` and returns
    /// the merged record. The key's TTL is reset on every successful write.
    pub async fn merge_delta(
        &self,
        day: NaiveDate,
        delta: &EngagementDelta,
    ) -> Result<StagingRecord, CacheError> {
        let key = self.keys.staging(&delta.user_id, day);
        let field = delta.user_id.as_str();

        for attempt in 1..=self.max_attempts {
            let current = self.cache.hash_get(&key, field).await?;

            let mut record = current
                .as_deref()
                .and_then(|value| decode_logged(&key, value))
                .unwrap_or_default();
            record.apply(delta);

            let written = self
                .cache
                .hash_compare_and_set(&key, field, current.as_deref(), &record.encode(), self.ttl)
                .await?;
            if written {
                return Ok(record);
            }
            debug!(key = %key, attempt, "Staging value changed underneath merge, retrying");
        }

        Err(CacheError::Contention {
            key,
            attempts: self.max_attempts,
        })
    }

    /// Reads the staging record for `user_id` on `day` without removing it.
    ///
    /// Staging keys are never deleted here; they age out with their TTL, which
    /// leaves a window for a later flush attempt to pick them up again.
    pub async fn drain(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<StagingRecord>, CacheError> {
        let key = self.keys.staging(user_id, day);
        let value = self.cache.hash_get(&key, user_id).await?;
        Ok(value.and_then(|value| decode_logged(&key, &value)))
    }
}

// Malformed values are treated as absent, but never silently.
fn decode_logged(key: &str, value: &str) -> Option<StagingRecord> {
    match StagingRecord::parse(value) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(key = %key, reason = %err, "Discarding malformed staging value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;

    const TTL: Duration = Duration::from_secs(172_800);

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
    }

    fn delta(user: &str) -> EngagementDelta {
        EngagementDelta {
            user_id: user.into(),
            source: 1,
            video_id: "v1".into(),
            ..Default::default()
        }
    }

    fn store(cache: &Arc<MemoryCache>) -> StagingStore {
        StagingStore::new(cache.clone(), KeySpace::default(), TTL, 8)
    }

    #[tokio::test]
    async fn test_sequential_merges_accumulate() {
        let cache = Arc::new(MemoryCache::new());
        let staging = store(&cache);

        let shown = EngagementDelta {
            show_count: 1,
            ..delta("u1")
        };
        let tapped = EngagementDelta {
            tap_count: 1,
            ..delta("u1")
        };
        staging.merge_delta(day(), &shown).await.unwrap();
        staging.merge_delta(day(), &tapped).await.unwrap();

        let record = staging.drain("u1", day()).await.unwrap().unwrap();
        assert_eq!(
            (record.show_count, record.tap_count, record.watch_count),
            (1, 1, 0)
        );

        // Drain leaves the value in place.
        assert!(staging.drain("u1", day()).await.unwrap().is_some());
        assert!(cache.ttl(&KeySpace::default().staging("u1", day())).is_some());
    }

    #[tokio::test]
    async fn test_wait_time_resolves_to_maximum() {
        let cache = Arc::new(MemoryCache::new());
        let staging = store(&cache);

        for sample in [3, 7, 2] {
            staging
                .merge_delta(
                    day(),
                    &EngagementDelta {
                        video_wait_time: sample,
                        ..delta("u1")
                    },
                )
                .await
                .unwrap();
        }

        let record = staging.drain("u1", day()).await.unwrap().unwrap();
        assert_eq!(record.video_wait_time, 7);
    }

    #[tokio::test]
    async fn test_malformed_value_starts_fresh() {
        let cache = Arc::new(MemoryCache::new());
        let staging = store(&cache);
        let key = KeySpace::default().staging("u1", day());
        cache.put_raw(&key, "u1", "u1#@#1#@#v1#@#5");

        assert!(staging.drain("u1", day()).await.unwrap().is_none());

        let shared = EngagementDelta {
            share_count: 2,
            ..delta("u1")
        };
        let record = staging.merge_delta(day(), &shared).await.unwrap();
        assert_eq!(record.share_count, 2);
        assert_eq!(record.show_count, 0);
    }

    #[tokio::test]
    async fn test_legacy_sample_list_is_readable() {
        let cache = Arc::new(MemoryCache::new());
        let staging = store(&cache);
        let key = KeySpace::default().staging("u1", day());
        cache.put_raw(
            &key,
            "u1",
            &["u1", "1", "v1", "2", "0", "0", "0", "3-7-2", "0", "0", "0", "0"].join("#@#"),
        );

        let next = EngagementDelta {
            video_wait_time: 5,
            show_count: 1,
            ..delta("u1")
        };
        let record = staging.merge_delta(day(), &next).await.unwrap();
        assert_eq!(record.video_wait_time, 7);
        assert_eq!(record.show_count, 3);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let cache = Arc::new(MemoryCache::new());
        let staging = store(&cache);

        cache.force_conflicts(3);
        let shown = EngagementDelta {
            show_count: 1,
            ..delta("u1")
        };
        let record = staging.merge_delta(day(), &shown).await.unwrap();
        assert_eq!(record.show_count, 1);
    }

    #[tokio::test]
    async fn test_persistent_conflict_is_contention() {
        let cache = Arc::new(MemoryCache::new());
        let staging = StagingStore::new(cache.clone(), KeySpace::default(), TTL, 2);

        cache.force_conflicts(2);
        let err = staging.merge_delta(day(), &delta("u1")).await.unwrap_err();
        assert!(matches!(err, CacheError::Contention { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_unavailable_cache_fails_merge() {
        let cache = Arc::new(MemoryCache::new());
        let staging = store(&cache);

        cache.set_unavailable(true);
        let err = staging.merge_delta(day(), &delta("u1")).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_merges_are_not_lost() {
        let cache = Arc::new(MemoryCache::new());
        let staging = StagingStore::new(cache.clone(), KeySpace::default(), TTL, 1_000);

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let staging = staging.clone();
                tokio::spawn(async move {
                    staging
                        .merge_delta(
                            day(),
                            &EngagementDelta {
                                show_count: 1,
                                watch_count: 2,
                                video_wait_time: i,
                                ..delta("u1")
                            },
                        )
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = staging.drain("u1", day()).await.unwrap().unwrap();
        assert_eq!(record.show_count, 64);
        assert_eq!(record.watch_count, 128);
        assert_eq!(record.video_wait_time, 63);
    }
}
