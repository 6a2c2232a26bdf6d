//! Staging record codec.
//!
//! A staging record is stored in the cache as one string of exactly
//! [`FIELD_COUNT`] fields joined by [`FIELD_DELIMITER`], in this order:
//!
//! | # | field |
//! |---|---|
//! | 0 | user_id |
//! | 1 | source |
//! | 2 | video_id |
//! | 3 | show_count |
//! | 4 | tap_count |
//! | 5 | watch_count |
//! | 6 | is_complete_show (`0`/`1`) |
//! | 7 | video_wait_time |
//! | 8 | send_whatsapp_count |
//! | 9 | share_count |
//! | 10 | download_count |
//! | 11 | return_count |
//!
//! Older writers stored every wait-time sample in field 7 as a
//! [`SAMPLE_DELIMITER`]-joined list; current writers store the running maximum
//! only. Both shapes decode.

use std::str::FromStr;

use thiserror::Error;

use crate::record::StagingRecord;

pub const FIELD_DELIMITER: &str = "#@#";
pub const SAMPLE_DELIMITER: char = '-';
pub const FIELD_COUNT: usize = 12;

/// Why a cached value could not be read back as a staging record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("expected {FIELD_COUNT} fields, found {found}")]
    FieldCount { found: usize },

    #[error("field '{field}' is not a valid number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

impl StagingRecord {
    pub fn encode(&self) -> String {
        let fields: [String; FIELD_COUNT] = [
            self.user_id.clone(),
            self.source.to_string(),
            self.video_id.clone(),
            self.show_count.to_string(),
            self.tap_count.to_string(),
            self.watch_count.to_string(),
            u8::from(self.is_complete_show).to_string(),
            self.video_wait_time.to_string(),
            self.send_whatsapp_count.to_string(),
            self.share_count.to_string(),
            self.download_count.to_string(),
            self.return_count.to_string(),
        ];
        fields.join(FIELD_DELIMITER)
    }

    /// Tolerant decode: anything that is not a well-formed record is absent.
    pub fn decode(value: &str) -> Option<Self> {
        Self::parse(value).ok()
    }

    /// Strict decode, reporting why a value was rejected.
    pub fn parse(value: &str) -> Result<Self, CodecError> {
        let fields: Vec<&str> = value.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(CodecError::FieldCount {
                found: fields.len(),
            });
        }

        Ok(Self {
            user_id: fields[0].to_string(),
            source: number("source", fields[1])?,
            video_id: fields[2].to_string(),
            show_count: number("show_count", fields[3])?,
            tap_count: number("tap_count", fields[4])?,
            watch_count: number("watch_count", fields[5])?,
            is_complete_show: number::<u8>("is_complete_show", fields[6])? != 0,
            video_wait_time: resolve_max(fields[7])?,
            send_whatsapp_count: number("send_whatsapp_count", fields[8])?,
            share_count: number("share_count", fields[9])?,
            download_count: number("download_count", fields[10])?,
            return_count: number("return_count", fields[11])?,
        })
    }
}

/// Largest sample in a wait-time field.
///
/// Accepts a single value (`"7"`) or a legacy sample list (`"3-7-2"`).
/// Empty fields and empty list slots count as zero.
pub fn resolve_max(samples: &str) -> Result<u32, CodecError> {
    samples
        .split(SAMPLE_DELIMITER)
        .filter(|sample| !sample.is_empty())
        .try_fold(0u32, |max, sample| {
            number::<u32>("video_wait_time", sample).map(|value| max.max(value))
        })
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, CodecError> {
    value.parse().map_err(|_| CodecError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
