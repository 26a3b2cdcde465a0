use super::require_db;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::policy::POLICY_SETTINGS_KEY;
use serde_json::json;

fn policy_set(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let patch = params
        .get("policy")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("policy must be an object"))?;
    let conn = require_db(state)?;
    let next = state
        .policy
        .merged(patch)
        .map_err(|e| HandlerErr::bad_params(format!("invalid policy: {}", e)))?;
    let value = serde_json::to_value(&next).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    db::settings_set_json(conn, POLICY_SETTINGS_KEY, &value).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "settings" })),
    })?;
    tracing::info!(policy = %value, "attendance policy updated");
    state.policy = next;
    Ok(json!({ "policy": value }))
}

fn handle_policy_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "policy": state.policy }))
}

fn handle_policy_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    match policy_set(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "policy.get" => Some(handle_policy_get(state, req)),
        "policy.set" => Some(handle_policy_set(state, req)),
        _ => None,
    }
}
