//! Error taxonomy for the attendance core.
//!
//! Every error exposes a stable snake_case `code()` that the IPC layer puts on
//! the wire. Only [`StoreError::Timeout`] is transient.

use crate::status::EntryField;
use std::time::Duration;

/// Caller-correctable problems with a single entry. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown attendance status: {0}")]
    UnknownStatus(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(EntryField),

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid check-in time {0:?}, expected HH:MM or HH:MM:SS")]
    InvalidTimeFormat(String),

    #[error("attendance policy requires an attachment for status {0}")]
    MissingAttachment(crate::status::AttendanceStatus),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnknownStatus(_) => "unknown_status",
            ValidationError::MissingRequiredField(_) => "missing_required_field",
            ValidationError::InvalidDate(_) => "invalid_date",
            ValidationError::InvalidTimeFormat(_) => "invalid_time_format",
            ValidationError::MissingAttachment(_) => "missing_attachment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The operation did not finish within the caller's budget. Safe to retry.
    #[error("store {op} timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    #[error("attendance record not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Timeout { .. } => "store_timeout",
            StoreError::NotFound(_) => "not_found",
            StoreError::Unavailable(_) => "store_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("batch is incomplete: {} roster member(s) without an entry", missing.len())]
    Incomplete { missing: Vec<String> },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("entry belongs to session {found_session} on {found_date}, batch is {expected_session} on {expected_date}")]
    SessionMismatch {
        expected_session: String,
        expected_date: chrono::NaiveDate,
        found_session: String,
        found_date: chrono::NaiveDate,
    },

    #[error("subject {0} is not on the roster")]
    NotOnRoster(String),

    #[error("batch already committed")]
    AlreadyCommitted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BatchError {
    pub fn code(&self) -> &'static str {
        match self {
            BatchError::Incomplete { .. } => "incomplete_batch",
            BatchError::Invalid(e) => e.code(),
            BatchError::SessionMismatch { .. } => "session_mismatch",
            BatchError::NotOnRoster(_) => "not_on_roster",
            BatchError::AlreadyCommitted => "batch_committed",
            BatchError::Store(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("date range end {end} is before start {start}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// The store could not be read; no partial rows are returned.
    #[error("aggregation unavailable: {0}")]
    Unavailable(#[source] StoreError),
}

impl AggregationError {
    pub fn code(&self) -> &'static str {
        match self {
            AggregationError::InvalidRange { .. } => "invalid_range",
            AggregationError::Unavailable(_) => "aggregation_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AggregationError::Unavailable(e) => e.is_retryable(),
            AggregationError::InvalidRange { .. } => false,
        }
    }
}
