// feedtally-flush - Daily rollup of staged engagement into durable storage
//
// The coordinator walks one day's activity index page by page, drains each
// user's staging record and hands the finalized rows to the durable sink.
// A create-if-absent day lock makes every attempt after the first a cheap
// no-op, so attempts can be launched freely:
//
// - FlushScheduler: fixed-interval ticker (default)
// - TrafficTrigger: one detached attempt per successful ingest

mod coordinator;
mod report;
mod scheduler;

pub use coordinator::{FlushCoordinator, FlushSettings, FlushState};
pub use report::{FlushOutcome, FlushReport};
pub use scheduler::{FlushScheduler, TrafficTrigger};
