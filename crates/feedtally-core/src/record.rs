use chrono::NaiveDate;

use crate::delta::EngagementDelta;

/// Cumulative engagement for one user on one calendar day.
///
/// Counters are running sums over every merged delta. `user_id`, `source`,
/// `video_id` and `is_complete_show` follow the most recent delta.
/// `video_wait_time` is the running maximum of all observed samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingRecord {
    pub user_id: String,
    pub source: u32,
    pub video_id: String,
    pub show_count: u64,
    pub tap_count: u64,
    pub watch_count: u64,
    pub is_complete_show: bool,
    pub video_wait_time: u32,
    pub send_whatsapp_count: u64,
    pub share_count: u64,
    pub download_count: u64,
    pub return_count: u64,
}

impl StagingRecord {
    /// Starts a fresh record from a single delta.
    pub fn from_delta(delta: &EngagementDelta) -> Self {
        let mut record = Self::default();
        record.apply(delta);
        record
    }

    /// Merges one delta into the running totals.
    pub fn apply(&mut self, delta: &EngagementDelta) {
        self.user_id.clone_from(&delta.user_id);
        self.source = delta.source;
        self.video_id.clone_from(&delta.video_id);
        self.is_complete_show = delta.is_complete_show;

        self.show_count = self.show_count.saturating_add(delta.show_count.into());
        self.tap_count = self.tap_count.saturating_add(delta.tap_count.into());
        self.watch_count = self.watch_count.saturating_add(delta.watch_count.into());
        self.send_whatsapp_count = self
            .send_whatsapp_count
            .saturating_add(delta.send_whatsapp_count.into());
        self.share_count = self.share_count.saturating_add(delta.share_count.into());
        self.download_count = self
            .download_count
            .saturating_add(delta.download_count.into());
        self.return_count = self.return_count.saturating_add(delta.return_count.into());

        self.video_wait_time = self.video_wait_time.max(delta.video_wait_time);
    }

    /// Records without both identifiers never reach the sink.
    pub fn is_flushable(&self) -> bool {
        !self.user_id.is_empty() && !self.video_id.is_empty()
    }

    /// Produces the immutable historical row for `day`.
    pub fn finalize(self, day: NaiveDate, created_at: i64) -> DurableRecord {
        DurableRecord {
            user_id: self.user_id,
            source: self.source,
            video_id: self.video_id,
            show_count: self.show_count,
            tap_count: self.tap_count,
            watch_count: self.watch_count,
            is_complete_show: self.is_complete_show,
            video_wait_time: self.video_wait_time,
            send_whatsapp_count: self.send_whatsapp_count,
            share_count: self.share_count,
            download_count: self.download_count,
            return_count: self.return_count,
            day,
            created_at,
        }
    }
}

/// Finalized engagement row, written once per (user, day) and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableRecord {
    pub user_id: String,
    pub source: u32,
    pub video_id: String,
    pub show_count: u64,
    pub tap_count: u64,
    pub watch_count: u64,
    pub is_complete_show: bool,
    /// Maximum observed wait time, in seconds.
    pub video_wait_time: u32,
    pub send_whatsapp_count: u64,
    pub share_count: u64,
    pub download_count: u64,
    pub return_count: u64,
    pub day: NaiveDate,
    /// Unix seconds at which the flush run produced this row.
    pub created_at: i64,
}
