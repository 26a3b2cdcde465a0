//! Rekap: attendance totals per subject and per class over a date range.
//!
//! Rows are always recomputed from the store. Every status keeps its own
//! bucket; `late` is never folded into `present` here.

use crate::error::AggregationError;
use crate::status::AttendanceStatus;
use crate::store::{AttendanceStore, RecordFilter};
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AggregationError> {
        if end < start {
            return Err(AggregationError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Count per status. Every bucket is present, zero or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTotals {
    counts: BTreeMap<AttendanceStatus, u32>,
}

impl Default for StatusTotals {
    fn default() -> Self {
        Self {
            counts: AttendanceStatus::ALL.iter().map(|s| (*s, 0)).collect(),
        }
    }
}

impl StatusTotals {
    pub fn get(&self, status: AttendanceStatus) -> u32 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    fn bump(&mut self, status: AttendanceStatus) {
        *self.counts.entry(status).or_insert(0) += 1;
    }

    fn absorb(&mut self, other: &StatusTotals) {
        for (status, n) in &other.counts {
            *self.counts.entry(*status).or_insert(0) += n;
        }
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Present plus late, for reports that want an "effectively present" figure.
    pub fn attended(&self) -> u32 {
        self.get(AttendanceStatus::Present) + self.get(AttendanceStatus::Late)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttendanceStatus, u32)> + '_ {
        self.counts.iter().map(|(s, n)| (*s, *n))
    }
}

impl Serialize for StatusTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (status, n) in &self.counts {
            map.serialize_entry(status.as_str(), n)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRow {
    pub subject_id: String,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub totals: StatusTotals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecap {
    pub class_id: String,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub rows: Vec<AggregationRow>,
    pub totals: StatusTotals,
}

fn dedup_in_order(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn count_by_subject(
    store: &dyn AttendanceStore,
    filter: &RecordFilter,
    timeout: Duration,
) -> Result<HashMap<String, StatusTotals>, AggregationError> {
    let records = store
        .query(filter, timeout)
        .map_err(AggregationError::Unavailable)?;
    let mut by_subject: HashMap<String, StatusTotals> = HashMap::new();
    for r in records {
        // Each session counts on its own, even when several fall on one date.
        by_subject
            .entry(r.entry.subject_id)
            .or_default()
            .bump(r.entry.status);
    }
    Ok(by_subject)
}

fn rows_for(ids: &[String], range: DateRange, mut counts: HashMap<String, StatusTotals>) -> Vec<AggregationRow> {
    ids.iter()
        .map(|id| AggregationRow {
            subject_id: id.clone(),
            range_start: range.start,
            range_end: range.end,
            totals: counts.remove(id).unwrap_or_default(),
        })
        .collect()
}

/// One row per requested subject, in request order. Subjects with no active
/// records in range get all-zero totals.
pub fn summarize(
    store: &dyn AttendanceStore,
    subject_ids: &[String],
    range: DateRange,
    timeout: Duration,
) -> Result<Vec<AggregationRow>, AggregationError> {
    let ids = dedup_in_order(subject_ids);
    let filter = RecordFilter {
        subject_ids: Some(ids.clone()),
        from: Some(range.start),
        to: Some(range.end),
        ..RecordFilter::default()
    };
    let counts = count_by_subject(store, &filter, timeout).inspect_err(|e| {
        tracing::warn!(error = %e, subjects = ids.len(), "attendance recap failed");
    })?;
    Ok(rows_for(&ids, range, counts))
}

/// Rekap for one class: a row per roster member (only records tagged with
/// this class) and the class-wide totals of those rows.
pub fn summarize_class(
    store: &dyn AttendanceStore,
    class_id: &str,
    roster: &[String],
    range: DateRange,
    timeout: Duration,
) -> Result<ClassRecap, AggregationError> {
    let ids = dedup_in_order(roster);
    let filter = RecordFilter {
        subject_ids: Some(ids.clone()),
        class_id: Some(class_id.to_string()),
        from: Some(range.start),
        to: Some(range.end),
        ..RecordFilter::default()
    };
    let counts = count_by_subject(store, &filter, timeout).inspect_err(|e| {
        tracing::warn!(error = %e, class = class_id, "class recap failed");
    })?;
    let rows = rows_for(&ids, range, counts);
    let mut totals = StatusTotals::default();
    for row in &rows {
        totals.absorb(&row.totals);
    }
    Ok(ClassRecap {
        class_id: class_id.to_string(),
        range_start: range.start,
        range_end: range.end,
        rows,
        totals,
    })
}
