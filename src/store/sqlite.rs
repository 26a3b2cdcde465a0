use super::{AttendanceRecord, AttendanceStore, RecordFilter, Records};
use crate::entry::ValidEntry;
use crate::error::StoreError;
use crate::policy::MAX_STORE_TIMEOUT_MS;
use crate::status::AttendanceStatus;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::time::Duration;
use uuid::Uuid;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

const SELECT_COLUMNS: &str = "SELECT id, subject_id, schedule_session_id, class_id, date, status,
        reason, check_in_time, leave_period, attachment_ref, voided_at, void_reason
     FROM attendance_records";

/// Store backed by the workspace database (`attendance_records` table).
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn arm(&self, op: &'static str, timeout: Duration) -> Result<(), StoreError> {
        // busy_timeout panics past i32::MAX milliseconds.
        let busy = timeout.min(Duration::from_millis(MAX_STORE_TIMEOUT_MS));
        self.conn
            .busy_timeout(busy)
            .map_err(|e| map_err(op, timeout, e))
    }
}

fn map_err(op: &'static str, timeout: Duration, e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Timeout { op, timeout }
        }
        _ => StoreError::Unavailable(format!("{op}: {e}")),
    }
}

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let date_raw: String = r.get(4)?;
    let date = NaiveDate::parse_from_str(&date_raw, DATE_FMT)
        .map_err(|e| conversion_err(4, format!("date {date_raw:?}: {e}")))?;
    let status_raw: String = r.get(5)?;
    let check_in_time = r
        .get::<_, Option<String>>(7)?
        .map(|t| {
            NaiveTime::parse_from_str(&t, TIME_FMT)
                .map_err(|e| conversion_err(7, format!("check_in_time {t:?}: {e}")))
        })
        .transpose()?;
    let voided_at = r
        .get::<_, Option<String>>(10)?
        .map(|t| {
            DateTime::parse_from_rfc3339(&t)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| conversion_err(10, format!("voided_at {t:?}: {e}")))
        })
        .transpose()?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        entry: ValidEntry {
            subject_id: r.get(1)?,
            schedule_session_id: r.get(2)?,
            class_id: r.get(3)?,
            date,
            // Rows may come from older dialects; fold them like any other token.
            status: AttendanceStatus::normalize(&status_raw),
            reason: r.get(6)?,
            check_in_time,
            leave_period: r.get(8)?,
            attachment_ref: r.get(9)?,
        },
        voided_at,
        void_reason: r.get(11)?,
    })
}

fn get_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<AttendanceRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?"),
        [id],
        record_from_row,
    )
    .optional()
}

fn upsert_in(conn: &Connection, e: &ValidEntry) -> rusqlite::Result<AttendanceRecord> {
    let date = e.date.format(DATE_FMT).to_string();
    conn.execute(
        "INSERT INTO attendance_records(
            id, subject_id, schedule_session_id, class_id, date, status,
            reason, check_in_time, leave_period, attachment_ref, voided_at, void_reason
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)
         ON CONFLICT(subject_id, schedule_session_id, date) DO UPDATE SET
           class_id = excluded.class_id,
           status = excluded.status,
           reason = excluded.reason,
           check_in_time = excluded.check_in_time,
           leave_period = excluded.leave_period,
           attachment_ref = excluded.attachment_ref,
           voided_at = NULL,
           void_reason = NULL",
        params![
            Uuid::new_v4().to_string(),
            e.subject_id,
            e.schedule_session_id,
            e.class_id,
            date,
            e.status.as_str(),
            e.reason,
            e.check_in_time.map(|t| t.format(TIME_FMT).to_string()),
            e.leave_period,
            e.attachment_ref,
        ],
    )?;
    conn.query_row(
        &format!(
            "{SELECT_COLUMNS} WHERE subject_id = ? AND schedule_session_id = ? AND date = ?"
        ),
        (&e.subject_id, &e.schedule_session_id, &date),
        record_from_row,
    )
}

impl AttendanceStore for SqliteStore<'_> {
    fn upsert(&self, entry: &ValidEntry, timeout: Duration) -> Result<AttendanceRecord, StoreError> {
        self.arm("upsert", timeout)?;
        let record = upsert_in(self.conn, entry).map_err(|e| map_err("upsert", timeout, e))?;
        tracing::debug!(record_id = %record.id, subject = %entry.subject_id, "upserted attendance record");
        Ok(record)
    }

    fn commit_batch(
        &self,
        entries: &[ValidEntry],
        timeout: Duration,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.arm("commit", timeout)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| map_err("commit", timeout, e))?;
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            // Dropping `tx` on error rolls the whole batch back.
            out.push(upsert_in(&tx, e).map_err(|err| map_err("commit", timeout, err))?);
        }
        tx.commit().map_err(|e| map_err("commit", timeout, e))?;
        Ok(out)
    }

    fn void(
        &self,
        record_id: &str,
        reason: Option<&str>,
        timeout: Duration,
    ) -> Result<AttendanceRecord, StoreError> {
        self.arm("void", timeout)?;
        self.conn
            .execute(
                "UPDATE attendance_records SET voided_at = ?, void_reason = ?
                 WHERE id = ? AND voided_at IS NULL",
                (Utc::now().to_rfc3339(), reason, record_id),
            )
            .map_err(|e| map_err("void", timeout, e))?;
        get_by_id(self.conn, record_id)
            .map_err(|e| map_err("void", timeout, e))?
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))
    }

    fn get(&self, record_id: &str, timeout: Duration) -> Result<AttendanceRecord, StoreError> {
        self.arm("get", timeout)?;
        get_by_id(self.conn, record_id)
            .map_err(|e| map_err("get", timeout, e))?
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))
    }

    fn query(&self, filter: &RecordFilter, timeout: Duration) -> Result<Records, StoreError> {
        self.arm("query", timeout)?;
        let mut clauses: Vec<String> = Vec::new();
        let mut binds: Vec<Value> = Vec::new();
        if !filter.include_voided {
            clauses.push("voided_at IS NULL".to_string());
        }
        if let Some(ids) = &filter.subject_ids {
            if ids.is_empty() {
                return Ok(Records::default());
            }
            let marks = vec!["?"; ids.len()].join(", ");
            clauses.push(format!("subject_id IN ({marks})"));
            binds.extend(ids.iter().cloned().map(Value::Text));
        }
        if let Some(s) = &filter.schedule_session_id {
            clauses.push("schedule_session_id = ?".to_string());
            binds.push(Value::Text(s.clone()));
        }
        if let Some(c) = &filter.class_id {
            clauses.push("class_id = ?".to_string());
            binds.push(Value::Text(c.clone()));
        }
        if let Some(from) = filter.from {
            clauses.push("date >= ?".to_string());
            binds.push(Value::Text(from.format(DATE_FMT).to_string()));
        }
        if let Some(to) = filter.to {
            clauses.push("date <= ?".to_string());
            binds.push(Value::Text(to.format(DATE_FMT).to_string()));
        }
        let mut sql = SELECT_COLUMNS.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| map_err("query", timeout, e))?;
        let rows = stmt
            .query_map(params_from_iter(binds), record_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| map_err("query", timeout, e))?;
        tracing::debug!(count = rows.len(), "queried attendance records");
        Ok(Records::new(rows))
    }
}
