//! Cache key layout.
//!
//! ```text
//! {prefix}:staging:{day}:{user_id}   hash, field = user_id, value = encoded StagingRecord
//! {prefix}:active:{day}              sorted set of user ids
//! {prefix}:flush-lock:{day}          plain key, existence = flush taken
//! ```

use chrono::NaiveDate;
use feedtally_core::day_key;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn staging(&self, user_id: &str, day: NaiveDate) -> String {
        format!("{}:staging:{}:{}", self.prefix, day_key(day), user_id)
    }

    pub fn activity(&self, day: NaiveDate) -> String {
        format!("{}:active:{}", self.prefix, day_key(day))
    }

    pub fn flush_lock(&self, day: NaiveDate) -> String {
        format!("{}:flush-lock:{}", self.prefix, day_key(day))
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("feedtally")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_day_scoped() {
        let keys = KeySpace::new("ft");
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert_eq!(keys.staging("u1", day), "ft:staging:2024-03-01:u1");
        assert_eq!(keys.activity(day), "ft:active:2024-03-01");
        assert_eq!(keys.flush_lock(day), "ft:flush-lock:2024-03-01");
    }
}
