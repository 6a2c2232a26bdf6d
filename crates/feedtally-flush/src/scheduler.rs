use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::coordinator::FlushCoordinator;
use crate::report::FlushReport;

/// Attempts the previous day's flush on a fixed interval.
///
/// The first tick fires immediately. Shutdown is only observed between
/// attempts; an attempt that has started runs to completion.
pub struct FlushScheduler {
    coordinator: Arc<FlushCoordinator>,
    period: Duration,
}

impl FlushScheduler {
    pub fn new(coordinator: Arc<FlushCoordinator>, period: Duration) -> Self {
        Self {
            coordinator,
            period: period.max(Duration::from_secs(1)),
        }
    }

    /// Spawns the ticker. It stops once `shutdown` turns `true` or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Flush scheduler started (interval={}s)",
                self.period.as_secs()
            );
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.coordinator.run_previous_day().await;
                        debug!(day = %report.day, outcome = ?report.outcome, "Scheduled flush attempt finished");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Flush scheduler stopped");
        })
    }
}

/// Launches one detached flush attempt per call.
///
/// Meant to be fired after every successful ingest; the day lock turns all
/// but the first attempt of a day into a single cache round-trip.
#[derive(Clone)]
pub struct TrafficTrigger {
    coordinator: Arc<FlushCoordinator>,
}

impl TrafficTrigger {
    pub fn new(coordinator: Arc<FlushCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn fire(&self) -> JoinHandle<FlushReport> {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move { coordinator.run_previous_day().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::FlushSettings;
    use crate::report::FlushOutcome;
    use feedtally_cache::{ActivityIndex, DayLock, KeySpace, MemoryCache, StagingStore};
    use feedtally_core::{Clock, EngagementDelta, FixedClock};
    use feedtally_sink::MemorySink;

    const TTL: Duration = Duration::from_secs(172_800);

    async fn coordinator_with_one_user() -> (Arc<FlushCoordinator>, Arc<MemorySink>) {
        let cache = Arc::new(MemoryCache::new());
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(FixedClock::at("2024-03-02T10:00:00+00:00").unwrap());
        let keys = KeySpace::default();

        let staging = StagingStore::new(cache.clone(), keys.clone(), TTL, 8);
        let index = ActivityIndex::new(cache.clone(), keys.clone(), TTL);
        let lock = DayLock::new(cache.clone(), keys, Duration::from_secs(3600));

        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let delta = EngagementDelta {
            user_id: "u1".into(),
            source: 1,
            video_id: "v1".into(),
            tap_count: 2,
            ..Default::default()
        };
        staging.merge_delta(day, &delta).await.unwrap();
        index.touch("u1", day, 0, clock.now()).await.unwrap();

        let coordinator = FlushCoordinator::new(
            staging,
            index,
            lock,
            sink.clone(),
            clock,
            FlushSettings {
                page_size: 50,
                drain_interval: Duration::ZERO,
            },
        );
        (Arc::new(coordinator), sink)
    }

    #[tokio::test]
    async fn test_traffic_trigger_runs_detached_attempt() {
        let (coordinator, sink) = coordinator_with_one_user().await;
        let trigger = TrafficTrigger::new(coordinator);

        let first = trigger.fire().await.unwrap();
        let second = trigger.fire().await.unwrap();

        assert_eq!(first.outcome, FlushOutcome::Completed);
        assert!(second.is_skipped());
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].tap_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_flush_once() {
        let (coordinator, sink) = coordinator_with_one_user().await;
        let trigger = TrafficTrigger::new(coordinator);

        let handles: Vec<_> = (0..16).map(|_| trigger.fire()).collect();
        let mut completed = 0;
        let mut skipped = 0;
        for handle in handles {
            let report = handle.await.unwrap();
            match report.outcome {
                FlushOutcome::Completed => completed += 1,
                FlushOutcome::Skipped => skipped += 1,
                FlushOutcome::Aborted { reason } => panic!("attempt aborted: {reason}"),
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(skipped, 15);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_flushes_then_stops_on_shutdown() {
        let (coordinator, sink) = coordinator_with_one_user().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = FlushScheduler::new(coordinator, Duration::from_secs(1)).spawn(shutdown_rx);

        // First tick is immediate.
        for _ in 0..100 {
            if !sink.records().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(sink.records().len(), 1);
    }
}
