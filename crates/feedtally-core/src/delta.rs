use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::codec::FIELD_DELIMITER;

/// One client call worth of engagement counters for a single user.
///
/// Every count is a delta contributed by this call, not a running total.
/// Only `user_id`, `source` and `video_id` are required; counters default to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementDelta {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub source: u32,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub show_count: u32,
    #[serde(default)]
    pub tap_count: u32,
    #[serde(default)]
    pub watch_count: u32,
    /// Accepts `true`/`false` as well as the legacy `1`/`0` encoding.
    #[serde(default, deserialize_with = "flag")]
    pub is_complete_show: bool,
    /// A single observed wait-time sample, in seconds.
    #[serde(default)]
    pub video_wait_time: u32,
    #[serde(default)]
    pub send_whatsapp_count: u32,
    #[serde(default)]
    pub share_count: u32,
    #[serde(default)]
    pub download_count: u32,
    #[serde(default)]
    pub return_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("user_id is required")]
    MissingUserId,

    #[error("video_id is required")]
    MissingVideoId,

    #[error("source must be a positive code")]
    InvalidSource,

    #[error("{field} contains a reserved delimiter")]
    ReservedDelimiter { field: &'static str },
}

impl EngagementDelta {
    /// Checks the required fields before any state is touched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::MissingUserId);
        }
        if self.video_id.trim().is_empty() {
            return Err(ValidationError::MissingVideoId);
        }
        if self.source == 0 {
            return Err(ValidationError::InvalidSource);
        }

        // Identifiers are stored inside the delimited staging value.
        if self.user_id.contains(FIELD_DELIMITER) {
            return Err(ValidationError::ReservedDelimiter { field: "user_id" });
        }
        if self.video_id.contains(FIELD_DELIMITER) {
            return Err(ValidationError::ReservedDelimiter { field: "video_id" });
        }

        Ok(())
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
    })
}
