use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// The day lock was already taken; nothing was read.
    Skipped,
    /// Paging reached an empty page.
    Completed,
    /// The lock attempt or a page read failed; the run stopped there.
    Aborted { reason: String },
}

/// What one flush attempt did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub day: NaiveDate,
    pub outcome: FlushOutcome,
    /// Non-empty pages that went through a draining step.
    pub pages_drained: usize,
    pub users_seen: usize,
    pub records_written: u64,
    /// Users with no staging value, a malformed one, or missing identifiers.
    pub records_skipped: usize,
    /// Users whose staging value could not be read.
    pub read_failures: usize,
    pub failed_batches: usize,
    /// Records in batches the sink rejected.
    pub records_unsent: usize,
}

impl FlushReport {
    pub(crate) fn new(day: NaiveDate) -> Self {
        Self {
            day,
            outcome: FlushOutcome::Completed,
            pages_drained: 0,
            users_seen: 0,
            records_written: 0,
            records_skipped: 0,
            read_failures: 0,
            failed_batches: 0,
            records_unsent: 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == FlushOutcome::Skipped
    }
}
