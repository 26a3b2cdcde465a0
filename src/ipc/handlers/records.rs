use super::require_db;
use crate::entry::{validate, EntryInput};
use crate::ipc::error::{get_optional_str, get_required, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{AttendanceRecord, AttendanceStore, RecordFilter, SqliteStore};
use serde_json::json;

/// Single-entry correction outside a batch (homeroom / vice-principal edits).
fn records_upsert(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let input: EntryInput = get_required(params, "entry")?;
    let entry = validate(&input, &state.policy)?;
    let conn = require_db(state)?;
    let record = SqliteStore::new(conn).upsert(&entry, state.policy.store_timeout())?;
    Ok(json!({ "record": record }))
}

fn records_void(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let reason = get_optional_str(params, "reason");
    let conn = require_db(state)?;
    let record = SqliteStore::new(conn).void(&record_id, reason.as_deref(), state.policy.store_timeout())?;
    tracing::info!(record_id = %record.id, subject = %record.entry.subject_id, "attendance record voided");
    Ok(json!({ "record": record }))
}

fn records_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let conn = require_db(state)?;
    let record = SqliteStore::new(conn).get(&record_id, state.policy.store_timeout())?;
    Ok(json!({ "record": record }))
}

fn records_query(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let filter: RecordFilter = match params.get("filter") {
        None | Some(serde_json::Value::Null) => RecordFilter::default(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid filter: {}", e)))?,
    };
    let conn = require_db(state)?;
    let records: Vec<AttendanceRecord> = SqliteStore::new(conn)
        .query(&filter, state.policy.store_timeout())?
        .collect();
    Ok(json!({ "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "records.upsert" => records_upsert(state, &req.params),
        "records.void" => records_void(state, &req.params),
        "records.get" => records_get(state, &req.params),
        "records.query" => records_query(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
