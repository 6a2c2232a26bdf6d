//! Calendar-day helpers.
//!
//! Staging data, the activity index and the flush lock are all partitioned by
//! local calendar day, rendered as `YYYY-MM-DD` in cache keys and sink rows.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Renders a day the way it appears in cache keys and durable rows.
pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

pub fn parse_day(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value, DAY_FORMAT)
}

/// The day a flush attempt started at `now` works on: the previous calendar day.
pub fn flush_target_day(now: DateTime<FixedOffset>) -> NaiveDate {
    let today = now.date_naive();
    today.pred_opt().unwrap_or(today)
}

/// Time-to-live for a day lock acquired at `now`.
///
/// The lock lives until the next local midnight plus `grace`, so with the
/// default one-hour grace it expires at 01:00 the following day.
pub fn lock_ttl(now: DateTime<FixedOffset>, grace: Duration) -> Duration {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0));

    let until_midnight = match next_midnight {
        Some(midnight) => (midnight - now.naive_local())
            .to_std()
            .unwrap_or(Duration::ZERO),
        None => Duration::from_secs(24 * 60 * 60),
    };

    until_midnight + grace
}
