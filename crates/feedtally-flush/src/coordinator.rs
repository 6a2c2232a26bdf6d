use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use feedtally_cache::{ActivityIndex, CacheError, DayLock, StagingStore};
use feedtally_core::{day_key, flush_target_day, Clock, DurableRecord};
use feedtally_sink::DurableSink;
use metrics::counter;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::report::{FlushOutcome, FlushReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSettings {
    pub page_size: usize,
    /// Pause before each user's drain, to cap load on the sink.
    pub drain_interval: Duration,
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            drain_interval: Duration::from_millis(500),
        }
    }
}

/// Where a flush attempt is.
///
/// ```text
/// Idle -> LockAttempt -> Skipped
///                     -> Running -> Paging -> Draining -> Paging -> ... -> Done
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    LockAttempt,
    Skipped,
    Running,
    Paging { start: usize },
    Draining { start: usize, users: Vec<String> },
    Done,
}

impl FlushState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Done)
    }
}

/// Single-flight, once-per-day rollup of staging records into the sink.
pub struct FlushCoordinator {
    staging: StagingStore,
    index: ActivityIndex,
    lock: DayLock,
    sink: Arc<dyn DurableSink>,
    clock: Arc<dyn Clock>,
    settings: FlushSettings,
}

impl FlushCoordinator {
    pub fn new(
        staging: StagingStore,
        index: ActivityIndex,
        lock: DayLock,
        sink: Arc<dyn DurableSink>,
        clock: Arc<dyn Clock>,
        settings: FlushSettings,
    ) -> Self {
        Self {
            staging,
            index,
            lock,
            sink,
            clock,
            settings: FlushSettings {
                page_size: settings.page_size.max(1),
                ..settings
            },
        }
    }

    /// Flushes the calendar day before the clock's current day.
    pub async fn run_previous_day(&self) -> FlushReport {
        let day = flush_target_day(self.clock.now());
        self.run(day).await
    }

    /// Runs one lock-guarded attempt for `day`.
    ///
    /// Never fails: lock and paging errors end the attempt early and are
    /// reported as [`FlushOutcome::Aborted`].
    pub async fn run(&self, day: NaiveDate) -> FlushReport {
        let span = info_span!("flush", day = %day_key(day));
        self.drive(day, false).instrument(span).await
    }

    /// Re-runs `day` even if its lock is already held, e.g. after a sink
    /// outage left records unsent.
    ///
    /// The lock is taken over with a fresh expiry and every staged user is
    /// drained again, so rows that were already written are written twice.
    pub async fn run_forced(&self, day: NaiveDate) -> FlushReport {
        let span = info_span!("flush", day = %day_key(day), forced = true);
        self.drive(day, true).instrument(span).await
    }

    async fn drive(&self, day: NaiveDate, force: bool) -> FlushReport {
        // One timestamp for every row this attempt produces.
        let started = self.clock.now();
        let mut report = FlushReport::new(day);
        let mut state = FlushState::Idle;

        while !state.is_terminal() {
            state = match self.step(state, day, force, started, &mut report).await {
                Ok(next) => next,
                Err(err) => {
                    error!(error = %err, "Flush attempt aborted");
                    counter!("feedtally.flush.aborted", 1);
                    report.outcome = FlushOutcome::Aborted {
                        reason: err.to_string(),
                    };
                    return report;
                }
            };
        }

        if state == FlushState::Skipped {
            debug!("Day lock already held, skipping flush");
            counter!("feedtally.flush.skipped", 1);
            report.outcome = FlushOutcome::Skipped;
        } else {
            info!(
                pages = report.pages_drained,
                users = report.users_seen,
                written = report.records_written,
                skipped = report.records_skipped,
                read_failures = report.read_failures,
                failed_batches = report.failed_batches,
                "Flush completed"
            );
            counter!("feedtally.flush.completed", 1);
            report.outcome = FlushOutcome::Completed;
        }
        report
    }

    async fn step(
        &self,
        state: FlushState,
        day: NaiveDate,
        force: bool,
        started: DateTime<FixedOffset>,
        report: &mut FlushReport,
    ) -> Result<FlushState, CacheError> {
        let next = match state {
            FlushState::Idle => FlushState::LockAttempt,
            FlushState::LockAttempt if force => {
                warn!("Taking over the day lock for a forced re-run");
                self.lock.take_over(day, started).await?;
                FlushState::Running
            }
            FlushState::LockAttempt => {
                if self.lock.try_acquire(day, started).await? {
                    FlushState::Running
                } else {
                    FlushState::Skipped
                }
            }
            FlushState::Running => FlushState::Paging { start: 0 },
            FlushState::Paging { start } => {
                let users = self.index.page(day, start, self.settings.page_size).await?;
                // Only an empty page ends paging; a short page still moves on.
                if users.is_empty() {
                    FlushState::Done
                } else {
                    FlushState::Draining { start, users }
                }
            }
            FlushState::Draining { start, users } => {
                self.drain_page(day, started.timestamp(), start, &users, report)
                    .await;
                FlushState::Paging {
                    start: start + self.settings.page_size,
                }
            }
            terminal @ (FlushState::Skipped | FlushState::Done) => terminal,
        };
        Ok(next)
    }

    async fn drain_page(
        &self,
        day: NaiveDate,
        created_at: i64,
        start: usize,
        users: &[String],
        report: &mut FlushReport,
    ) {
        let mut batch: Vec<DurableRecord> = Vec::with_capacity(users.len());

        for user_id in users {
            if !self.settings.drain_interval.is_zero() {
                tokio::time::sleep(self.settings.drain_interval).await;
            }
            report.users_seen += 1;

            match self.staging.drain(user_id, day).await {
                Ok(Some(record)) if record.is_flushable() => {
                    batch.push(record.finalize(day, created_at));
                }
                Ok(Some(_)) => {
                    debug!(user_id = %user_id, "Staging record lacks identifiers, skipping");
                    report.records_skipped += 1;
                }
                Ok(None) => {
                    report.records_skipped += 1;
                }
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "Failed to read staging record, skipping user");
                    report.read_failures += 1;
                }
            }
        }

        report.pages_drained += 1;
        if batch.is_empty() {
            return;
        }

        // At most once: a rejected batch is not retried in this attempt.
        match self.sink.insert_batch(&batch).await {
            Ok(written) => {
                report.records_written += written;
                counter!("feedtally.flush.records", written);
            }
            Err(err) => {
                error!(
                    error = %err,
                    page_start = start,
                    records = batch.len(),
                    "Durable sink rejected batch"
                );
                counter!("feedtally.flush.failed_batches", 1);
                report.failed_batches += 1;
                report.records_unsent += batch.len();
            }
        }
    }
}
