use crate::entry::{validate, EntryInput, ValidEntry};
use crate::error::BatchError;
use crate::policy::AttendancePolicy;
use crate::status::AttendanceStatus;
use crate::store::{AttendanceRecord, AttendanceStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// One scheduled lesson period on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub schedule_session_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchState {
    Draft,
    Complete,
    Committed,
}

/// An in-progress roster submission for one class session.
///
/// Nothing touches the store until [`SessionBatch::commit`]; dropping a
/// batch before that has no side effects.
#[derive(Debug, Clone)]
pub struct SessionBatch {
    session: SessionKey,
    roster: Vec<String>,
    entries: HashMap<String, ValidEntry>,
    committed: Option<Vec<AttendanceRecord>>,
}

impl SessionBatch {
    pub fn open<I, S>(session: SessionKey, roster: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let roster = roster
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        let session = SessionKey {
            schedule_session_id: session.schedule_session_id.trim().to_string(),
            ..session
        };
        Self {
            session,
            roster,
            entries: HashMap::new(),
            committed: None,
        }
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn state(&self) -> BatchState {
        if self.committed.is_some() {
            BatchState::Committed
        } else if self.is_complete() {
            BatchState::Complete
        } else {
            BatchState::Draft
        }
    }

    pub fn is_complete(&self) -> bool {
        self.roster.iter().all(|s| self.entries.contains_key(s))
    }

    /// Roster members still without an entry, in roster order.
    pub fn missing(&self) -> Vec<String> {
        self.roster
            .iter()
            .filter(|s| !self.entries.contains_key(*s))
            .cloned()
            .collect()
    }

    /// Entries in roster order.
    pub fn entries(&self) -> Vec<&ValidEntry> {
        self.roster
            .iter()
            .filter_map(|s| self.entries.get(s))
            .collect()
    }

    pub fn entry(&self, subject_id: &str) -> Option<&ValidEntry> {
        self.entries.get(subject_id)
    }

    /// Records written by a successful commit.
    pub fn committed_records(&self) -> Option<&[AttendanceRecord]> {
        self.committed.as_deref()
    }

    fn ensure_open(&self) -> Result<(), BatchError> {
        if self.committed.is_some() {
            return Err(BatchError::AlreadyCommitted);
        }
        Ok(())
    }

    fn admit(&self, mut entry: ValidEntry) -> Result<ValidEntry, BatchError> {
        if entry.schedule_session_id != self.session.schedule_session_id
            || entry.date != self.session.date
        {
            return Err(BatchError::SessionMismatch {
                expected_session: self.session.schedule_session_id.clone(),
                expected_date: self.session.date,
                found_session: entry.schedule_session_id,
                found_date: entry.date,
            });
        }
        if !self.roster.iter().any(|s| *s == entry.subject_id) {
            return Err(BatchError::NotOnRoster(entry.subject_id));
        }
        if entry.class_id.is_none() {
            entry.class_id = self.session.class_id.clone();
        }
        Ok(entry)
    }

    /// Insert or replace the entry for `input.subject_id`. The input is always
    /// revalidated; on any error the batch is left unchanged.
    pub fn add_or_replace(&mut self, input: &EntryInput, policy: &AttendancePolicy) -> Result<&ValidEntry, BatchError> {
        self.ensure_open()?;
        let entry = self.admit(validate(input, policy)?)?;
        let subject = entry.subject_id.clone();
        self.entries.insert(subject.clone(), entry);
        Ok(&self.entries[&subject])
    }

    /// Give every roster member without an entry the same status. Fails
    /// without changes if the status needs per-entry data (a reason, say).
    pub fn stamp_remaining(&mut self, status: AttendanceStatus, policy: &AttendancePolicy) -> Result<usize, BatchError> {
        self.ensure_open()?;
        let mut staged = Vec::new();
        for subject in self.missing() {
            let input = EntryInput {
                subject_id: subject,
                schedule_session_id: self.session.schedule_session_id.clone(),
                class_id: self.session.class_id.clone(),
                date: self.session.date.format("%Y-%m-%d").to_string(),
                status: status.as_str().to_string(),
                ..EntryInput::default()
            };
            staged.push(self.admit(validate(&input, policy)?)?);
        }
        let stamped = staged.len();
        for entry in staged {
            self.entries.insert(entry.subject_id.clone(), entry);
        }
        Ok(stamped)
    }

    pub fn remove(&mut self, subject_id: &str) -> Result<Option<ValidEntry>, BatchError> {
        self.ensure_open()?;
        Ok(self.entries.remove(subject_id))
    }

    /// Persist the whole roster in one store transaction.
    ///
    /// An incomplete batch is refused before the store is touched, as is one
    /// holding an entry that `policy` no longer accepts. If the store fails
    /// the batch stays uncommitted and may be retried.
    pub fn commit(
        &mut self,
        store: &dyn AttendanceStore,
        policy: &AttendancePolicy,
        timeout: Duration,
    ) -> Result<&[AttendanceRecord], BatchError> {
        self.ensure_open()?;
        let missing = self.missing();
        if !missing.is_empty() {
            tracing::info!(
                session = %self.session.schedule_session_id,
                date = %self.session.date,
                missing = missing.len(),
                "refusing to commit incomplete batch"
            );
            return Err(BatchError::Incomplete { missing });
        }
        for entry in self.entries() {
            if let Err(e) = entry.revalidate(policy) {
                tracing::info!(
                    session = %self.session.schedule_session_id,
                    subject = %entry.subject_id,
                    error = %e,
                    "refusing to commit entry the current policy rejects"
                );
                return Err(e.into());
            }
        }
        let entries: Vec<ValidEntry> = self.entries().into_iter().cloned().collect();
        let records = store.commit_batch(&entries, timeout)?;
        tracing::info!(
            session = %self.session.schedule_session_id,
            date = %self.session.date,
            count = records.len(),
            "committed attendance batch"
        );
        Ok(self.committed.insert(records).as_slice())
    }
}
