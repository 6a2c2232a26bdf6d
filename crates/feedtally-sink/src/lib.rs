// feedtally-sink - Long-term storage for finalized engagement records
//
// The flush coordinator hands over one batch of DurableRecords per activity
// page. The sink only ever inserts; there is no read path.

pub mod error;
pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use feedtally_core::DurableRecord;

pub use error::{ErrorCode, SinkError};
pub use memory::MemorySink;
pub use mysql::MySqlSink;

#[async_trait]
pub trait DurableSink: Send + Sync {
    /// Inserts every record in `records` and returns the number of rows written.
    /// An empty batch is a no-op.
    async fn insert_batch(&self, records: &[DurableRecord]) -> Result<u64, SinkError>;

    async fn ping(&self) -> Result<(), SinkError>;
}
