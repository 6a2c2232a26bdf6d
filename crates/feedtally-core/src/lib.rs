// feedtally-core - Engagement domain types
//
// Pure data and codec logic shared by every other crate in the workspace.
// No I/O, no async, no runtime dependencies.
//
// - EngagementDelta: one client call worth of counters
// - StagingRecord: cumulative per-user, per-day counters living in the cache
// - DurableRecord: the finalized row handed to the durable sink

pub mod clock;
pub mod codec;
pub mod day;
pub mod delta;
pub mod record;

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{resolve_max, CodecError, FIELD_COUNT, FIELD_DELIMITER, SAMPLE_DELIMITER};
pub use day::{day_key, flush_target_day, lock_ttl, parse_day};
pub use delta::{EngagementDelta, ValidationError};
pub use record::{DurableRecord, StagingRecord};
