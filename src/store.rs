//! Recorded attendance, keyed by (subject, schedule session, date).
//!
//! The store is the single source of truth once a batch is committed. Writes
//! are last-write-wins per key; voiding hides a record from aggregation but
//! keeps it readable for audit.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::entry::{RecordKey, ValidEntry};
use crate::error::StoreError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    #[serde(flatten)]
    pub entry: ValidEntry,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

impl AttendanceRecord {
    pub fn is_active(&self) -> bool {
        self.voided_at.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordFilter {
    pub subject_ids: Option<Vec<String>>,
    pub schedule_session_id: Option<String>,
    pub class_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub include_voided: bool,
}

impl RecordFilter {
    pub fn for_session(schedule_session_id: &str, date: NaiveDate) -> Self {
        Self {
            schedule_session_id: Some(schedule_session_id.to_string()),
            from: Some(date),
            to: Some(date),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        let e = &record.entry;
        if !self.include_voided && !record.is_active() {
            return false;
        }
        if let Some(ids) = &self.subject_ids {
            if !ids.iter().any(|id| *id == e.subject_id) {
                return false;
            }
        }
        if let Some(s) = &self.schedule_session_id {
            if *s != e.schedule_session_id {
                return false;
            }
        }
        if let Some(c) = &self.class_id {
            if e.class_id.as_deref() != Some(c.as_str()) {
                return false;
            }
        }
        if self.from.is_some_and(|from| e.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| e.date > to) {
            return false;
        }
        true
    }
}

/// Result of one `query` call. Finite; querying again re-reads the store.
#[derive(Debug, Clone, Default)]
pub struct Records {
    inner: std::vec::IntoIter<AttendanceRecord>,
}

impl Records {
    pub(crate) fn new(mut records: Vec<AttendanceRecord>) -> Self {
        records.sort_by(|a, b| {
            (a.entry.date, &a.entry.schedule_session_id, &a.entry.subject_id).cmp(&(
                b.entry.date,
                &b.entry.schedule_session_id,
                &b.entry.subject_id,
            ))
        });
        Self {
            inner: records.into_iter(),
        }
    }
}

impl Iterator for Records {
    type Item = AttendanceRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Records {}

/// Every operation takes a caller-supplied timeout and fails with
/// [`StoreError::Timeout`] instead of blocking past it.
pub trait AttendanceStore {
    fn upsert(&self, entry: &ValidEntry, timeout: Duration) -> Result<AttendanceRecord, StoreError>;

    /// All entries persist or none do.
    fn commit_batch(
        &self,
        entries: &[ValidEntry],
        timeout: Duration,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    fn void(
        &self,
        record_id: &str,
        reason: Option<&str>,
        timeout: Duration,
    ) -> Result<AttendanceRecord, StoreError>;

    fn get(&self, record_id: &str, timeout: Duration) -> Result<AttendanceRecord, StoreError>;

    fn query(&self, filter: &RecordFilter, timeout: Duration) -> Result<Records, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    by_key: BTreeMap<RecordKey, AttendanceRecord>,
    key_by_id: HashMap<String, RecordKey>,
}

impl MemoryState {
    fn apply(&mut self, entry: &ValidEntry) -> AttendanceRecord {
        let key = entry.key();
        let id = self
            .by_key
            .get(&key)
            .map(|r| r.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = AttendanceRecord {
            id: id.clone(),
            entry: entry.clone(),
            voided_at: None,
            void_reason: None,
        };
        self.key_by_id.insert(id, key.clone());
        self.by_key.insert(key, record.clone());
        record
    }
}

/// In-process store. Thread safe; lock waits are bounded by the call timeout.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, op: &'static str, timeout: Duration) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(StoreError::Unavailable("memory store lock poisoned".to_string()))
                }
                Err(TryLockError::WouldBlock) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(StoreError::Timeout { op, timeout });
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

impl AttendanceStore for MemoryStore {
    fn upsert(&self, entry: &ValidEntry, timeout: Duration) -> Result<AttendanceRecord, StoreError> {
        let mut state = self.lock("upsert", timeout)?;
        let record = state.apply(entry);
        tracing::debug!(record_id = %record.id, subject = %entry.subject_id, "upserted attendance record");
        Ok(record)
    }

    fn commit_batch(
        &self,
        entries: &[ValidEntry],
        timeout: Duration,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        // A single guard covers the whole batch, so readers never see part of it.
        let mut state = self.lock("commit", timeout)?;
        Ok(entries.iter().map(|e| state.apply(e)).collect())
    }

    fn void(
        &self,
        record_id: &str,
        reason: Option<&str>,
        timeout: Duration,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut state = self.lock("void", timeout)?;
        let key = state
            .key_by_id
            .get(record_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))?;
        let record = state
            .by_key
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))?;
        if record.voided_at.is_none() {
            record.voided_at = Some(Utc::now());
            record.void_reason = reason.map(str::to_string);
        }
        Ok(record.clone())
    }

    fn get(&self, record_id: &str, timeout: Duration) -> Result<AttendanceRecord, StoreError> {
        let state = self.lock("get", timeout)?;
        state
            .key_by_id
            .get(record_id)
            .and_then(|k| state.by_key.get(k))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))
    }

    fn query(&self, filter: &RecordFilter, timeout: Duration) -> Result<Records, StoreError> {
        let state = self.lock("query", timeout)?;
        let found: Vec<AttendanceRecord> = state
            .by_key
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(Records::new(found))
    }
}
