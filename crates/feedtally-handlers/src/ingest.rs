use std::sync::Arc;

use feedtally_cache::{ActivityIndex, StagingStore};
use feedtally_core::{Clock, EngagementDelta, StagingRecord};
use feedtally_flush::TrafficTrigger;
use metrics::counter;
use tracing::debug;

use crate::error::IngestError;

/// Ingest boundary: one call, one delta.
#[derive(Clone)]
pub struct IngestService {
    staging: StagingStore,
    index: ActivityIndex,
    clock: Arc<dyn Clock>,
    /// Set when the flush is driven by traffic rather than a ticker.
    trigger: Option<TrafficTrigger>,
    max_payload_bytes: usize,
}

impl IngestService {
    pub fn new(
        staging: StagingStore,
        index: ActivityIndex,
        clock: Arc<dyn Clock>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            staging,
            index,
            clock,
            trigger: None,
            max_payload_bytes,
        }
    }

    pub fn with_traffic_trigger(mut self, trigger: TrafficTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Parses and validates a JSON request body.
    pub fn decode(&self, body: &[u8]) -> Result<EngagementDelta, IngestError> {
        if body.len() > self.max_payload_bytes {
            return Err(IngestError::PayloadTooLarge {
                size: body.len(),
                limit: self.max_payload_bytes,
            });
        }

        let delta: EngagementDelta = serde_json::from_slice(body)
            .map_err(|e| IngestError::invalid(format!("Malformed engagement payload: {e}")))?;
        delta.validate()?;
        Ok(delta)
    }

    /// Merges `delta` into today's staging record and activity index.
    ///
    /// In traffic mode a successful call also launches one detached flush
    /// attempt for the previous day; the caller never waits for it.
    pub async fn record(&self, delta: &EngagementDelta) -> Result<StagingRecord, IngestError> {
        delta.validate()?;

        let now = self.clock.now();
        let day = now.date_naive();

        let merged = self.staging.merge_delta(day, delta).await?;
        self.index
            .touch(&delta.user_id, day, delta.watch_count, now)
            .await?;
        counter!("feedtally.ingest.deltas", 1);

        if let Some(trigger) = &self.trigger {
            drop(trigger.fire());
        }

        debug!(user_id = %delta.user_id, day = %day, "Recorded engagement delta");
        Ok(merged)
    }

    /// `decode` followed by `record`.
    pub async fn handle(&self, body: &[u8]) -> Result<StagingRecord, IngestError> {
        let delta = self.decode(body).inspect_err(|_| {
            counter!("feedtally.ingest.rejected", 1);
        })?;
        self.record(&delta).await
    }
}
