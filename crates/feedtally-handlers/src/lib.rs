//! Engagement ingest handling shared by every transport
//!
//! This crate turns one raw request body into a validated delta, merges it
//! into the day's staging record and activity index, and maps every failure
//! onto the service's numeric error-code taxonomy.

pub mod envelope;
pub mod error;
pub mod ingest;

pub use envelope::ResponseEnvelope;
pub use error::{ErrorCode, IngestError};
pub use ingest::IngestService;
