use super::require_db;
use crate::entry::parse_date;
use crate::ipc::error::{get_required, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::recap::{summarize, summarize_class, DateRange};
use crate::store::SqliteStore;
use serde_json::json;

fn range_param(params: &serde_json::Value) -> Result<DateRange, HandlerErr> {
    let from = parse_date(&get_required_str(params, "from")?)?;
    let to = parse_date(&get_required_str(params, "to")?)?;
    Ok(DateRange::new(from, to)?)
}

fn recap_students(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subject_ids: Vec<String> = get_required(params, "subjectIds")?;
    let range = range_param(params)?;
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let rows = summarize(&store, &subject_ids, range, state.policy.store_timeout())?;
    Ok(json!({ "rows": rows }))
}

fn recap_class(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let roster: Vec<String> = get_required(params, "roster")?;
    let range = range_param(params)?;
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let recap = summarize_class(&store, &class_id, &roster, range, state.policy.store_timeout())?;
    Ok(json!(recap))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "recap.students" => recap_students(state, &req.params),
        "recap.class" => recap_class(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
