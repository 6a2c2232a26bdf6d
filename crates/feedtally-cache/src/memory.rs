//! In-process cache backend.
//!
//! Single-node stand-in for Redis: local development, the `flush` CLI against
//! throwaway state, and every test in the workspace. All operations run under
//! one mutex, so compare-and-set is trivially atomic.
//!
//! Failure injection switches let tests drive the unavailable and contention
//! paths without a real server.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::CacheBackend;
use crate::error::CacheError;

#[derive(Debug)]
enum Value {
    Hash(HashMap<String, String>),
    Sorted(HashMap<String, f64>),
    Flag,
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
    forced_conflicts: AtomicU32,
    failing_reads: Mutex<HashSet<String>>,
    range_calls: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent operation fails with [`CacheError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The next `count` compare-and-set calls report a conflict without writing,
    /// as if another writer got there first.
    pub fn force_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Hash reads on `key` fail with a command error.
    pub fn fail_reads_for(&self, key: impl Into<String>) {
        self.failing_reads.lock().insert(key.into());
    }

    /// Number of `sorted_range_desc` calls served so far.
    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    /// Writes a hash field unconditionally, bypassing any codec.
    pub fn put_raw(&self, key: &str, field: &str, value: &str) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        if let Value::Hash(fields) = &mut entry.value {
            fields.insert(field.to_string(), value.to_string());
        }
    }

    /// Remaining TTL of `key`, `None` if it is missing or never expires.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Score of `member` in the sorted set at `key`.
    pub fn score(&self, key: &str, member: &str) -> Option<f64> {
        let now = Instant::now();
        match self.entries.lock().get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Sorted(members) => members.get(member).copied(),
                _ => None,
            },
            _ => None,
        }
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache switched off".into()));
        }
        Ok(())
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Command(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

// Drops the entry if it has expired, mirroring Redis lazy expiry.
fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.check_available()?;
        if self.failing_reads.lock().contains(key) {
            return Err(CacheError::Command(format!("injected read failure on '{key}'")));
        }

        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, Instant::now());
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.check_available()?;
        if self.take_forced_conflict() {
            return Ok(false);
        }

        let now = Instant::now();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        let Value::Hash(fields) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        if fields.get(field).map(String::as_str) != expected {
            return Ok(false);
        }
        fields.insert(field.to_string(), value.to_string());
        entry.expires_at = Some(now + ttl);
        Ok(true)
    }

    async fn sorted_upsert(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        self.check_available()?;

        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, Instant::now());

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Sorted(HashMap::new()),
            expires_at: None,
        });
        let Value::Sorted(members) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        members.insert(member.to_string(), score);
        Ok(())
    }

    async fn sorted_range_desc(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError> {
        self.check_available()?;
        self.range_calls.fetch_add(1, Ordering::SeqCst);

        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, Instant::now());

        let members = match entries.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry {
                value: Value::Sorted(members),
                ..
            }) => members,
            Some(_) => return Err(wrong_type(key)),
        };

        // Same ordering as ZREVRANGE: score descending, ties by member descending.
        let mut ranked: Vec<(&String, f64)> = members.iter().map(|(m, s)| (m, *s)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(a.0)));

        Ok(ranked
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|(member, _)| member.clone())
            .collect())
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.check_available()?;

        let now = Instant::now();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Flag,
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check_available()?;

        let now = Instant::now();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key, now);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check_available()
    }
}
