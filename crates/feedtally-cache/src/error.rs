//! Error types for the cache boundary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache could not be reached at all (connection refused, dropped, timed out).
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The cache answered but the command failed.
    #[error("cache command failed: {0}")]
    Command(String),

    /// Optimistic merge kept losing to concurrent writers.
    #[error("gave up merging into '{key}' after {attempts} conflicting attempts")]
    Contention { key: String, attempts: u32 },
}

impl CacheError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
