//! Per-day index of users with unflushed activity.
//!
//! Score is `now (unix seconds) + watch_count delta`, so repeated touches push
//! a user up and heavier watchers sort a little higher. It is an ordering aid
//! for the flush, not a timestamp.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::backend::CacheBackend;
use crate::error::CacheError;
use crate::keys::KeySpace;

#[derive(Clone)]
pub struct ActivityIndex {
    cache: Arc<dyn CacheBackend>,
    keys: KeySpace,
    ttl: Duration,
}

impl ActivityIndex {
    pub fn new(cache: Arc<dyn CacheBackend>, keys: KeySpace, ttl: Duration) -> Self {
        Self { cache, keys, ttl }
    }

    /// Upserts `user_id` for `day` and refreshes the index TTL.
    pub async fn touch(
        &self,
        user_id: &str,
        day: NaiveDate,
        watch_count: u32,
        now: DateTime<FixedOffset>,
    ) -> Result<(), CacheError> {
        let key = self.keys.activity(day);
        let score = now.timestamp() as f64 + f64::from(watch_count);

        self.cache.sorted_upsert(&key, user_id, score).await?;
        self.cache.expire(&key, self.ttl).await
    }

    /// User ids ranked `[start, start + count)`, highest score first.
    pub async fn page(
        &self,
        day: NaiveDate,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError> {
        self.cache
            .sorted_range_desc(&self.keys.activity(day), start, count)
            .await
    }
}
