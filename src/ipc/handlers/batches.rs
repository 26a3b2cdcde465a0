use crate::batch::{SessionBatch, SessionKey};
use crate::entry::{parse_date, resolve_status, EntryInput};
use crate::ipc::error::{get_optional_str, get_required, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;
use uuid::Uuid;

fn batch_view(id: &str, batch: &SessionBatch) -> serde_json::Value {
    json!({
        "batchId": id,
        "session": batch.session(),
        "state": batch.state(),
        "roster": batch.roster(),
        "missing": batch.missing(),
        "entries": batch.entries(),
    })
}

fn batch_mut<'a>(state: &'a mut AppState, params: &serde_json::Value) -> Result<(String, &'a mut SessionBatch), HandlerErr> {
    let id = get_required_str(params, "batchId")?;
    match state.batches.get_mut(&id) {
        Some(batch) => Ok((id, batch)),
        None => Err(HandlerErr::new("not_found", "batch not found")),
    }
}

fn batch_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let schedule_session_id = get_required_str(params, "scheduleSessionId")?;
    if schedule_session_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("scheduleSessionId must not be empty"));
    }
    let date = parse_date(&get_required_str(params, "date")?)?;
    let roster: Vec<String> = get_required(params, "roster")?;
    let session = SessionKey {
        schedule_session_id: schedule_session_id.trim().to_string(),
        date,
        class_id: get_optional_str(params, "classId"),
    };
    let id = Uuid::new_v4().to_string();
    let batch = SessionBatch::open(session, roster);
    let view = batch_view(&id, &batch);
    state.batches.insert(id, batch);
    Ok(view)
}

fn batch_set(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let policy = state.policy.clone();
    let input: EntryInput = get_required(params, "entry")?;
    let (id, batch) = batch_mut(state, params)?;
    batch.add_or_replace(&input, &policy)?;
    Ok(batch_view(&id, batch))
}

fn batch_stamp_remaining(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let policy = state.policy.clone();
    let status = resolve_status(&get_required_str(params, "status")?, &policy)?;
    let (id, batch) = batch_mut(state, params)?;
    let stamped = batch.stamp_remaining(status, &policy)?;
    let mut view = batch_view(&id, batch);
    view["stamped"] = json!(stamped);
    Ok(view)
}

fn batch_remove(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let (id, batch) = batch_mut(state, params)?;
    let removed = batch.remove(&subject_id)?;
    let mut view = batch_view(&id, batch);
    view["removed"] = json!(removed.is_some());
    Ok(view)
}

fn batch_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (id, batch) = batch_mut(state, params)?;
    Ok(batch_view(&id, batch))
}

fn batch_discard(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "batchId")?;
    let discarded = state.batches.remove(&id).is_some();
    Ok(json!({ "discarded": discarded }))
}

fn batch_commit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "batchId")?;
    let timeout = state.policy.store_timeout();
    let AppState {
        db,
        batches,
        policy,
        ..
    } = state;
    let conn = db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let batch = batches
        .get_mut(&id)
        .ok_or_else(|| HandlerErr::new("not_found", "batch not found"))?;
    let store = SqliteStore::new(conn);
    let records = batch.commit(&store, policy, timeout)?.to_vec();
    batches.remove(&id);
    Ok(json!({ "batchId": id, "state": "committed", "records": records }))
}

fn dispatch(state: &mut AppState, req: &Request) -> Option<Result<serde_json::Value, HandlerErr>> {
    let params = &req.params;
    Some(match req.method.as_str() {
        "batch.open" => batch_open(state, params),
        "batch.set" => batch_set(state, params),
        "batch.stampRemaining" => batch_stamp_remaining(state, params),
        "batch.remove" => batch_remove(state, params),
        "batch.get" => batch_get(state, params),
        "batch.discard" => batch_discard(state, params),
        "batch.commit" => batch_commit(state, params),
        _ => return None,
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = dispatch(state, req)?;
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

