use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use feedtally_core::DurableRecord;
use parking_lot::Mutex;

use crate::error::SinkError;
use crate::DurableSink;

/// Sink that keeps every accepted batch in memory.
///
/// Used for local runs without a database and as a test fixture; the next
/// `n` batches can be made to fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<DurableRecord>>>,
    failing_batches: AtomicUsize,
    unreachable: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` non-empty batches fail with a write error.
    pub fn fail_next_batches(&self, count: usize) {
        self.failing_batches.store(count, Ordering::SeqCst);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Accepted batches, in submission order.
    pub fn batches(&self) -> Vec<Vec<DurableRecord>> {
        self.batches.lock().clone()
    }

    /// Every accepted record, flattened.
    pub fn records(&self) -> Vec<DurableRecord> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl DurableSink for MemorySink {
    async fn insert_batch(&self, records: &[DurableRecord]) -> Result<u64, SinkError> {
        if records.is_empty() {
            return Ok(0);
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SinkError::unreachable("memory sink switched off"));
        }
        let failing = self
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SinkError::write_failure(records.len(), "injected failure"));
        }

        self.batches.lock().push(records.to_vec());
        Ok(records.len() as u64)
    }

    async fn ping(&self) -> Result<(), SinkError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SinkError::unreachable("memory sink switched off"));
        }
        Ok(())
    }
}
