use crate::ipc::error::{get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::status::{AttendanceStatus, Locale};
use serde_json::json;

fn status_list(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let locale: Locale = match params.get("locale") {
        None | Some(serde_json::Value::Null) => Locale::default(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| HandlerErr::bad_params("locale must be \"id\" or \"en\""))?,
    };
    let statuses: Vec<serde_json::Value> = AttendanceStatus::ALL
        .iter()
        .map(|s| {
            json!({
                "status": s,
                "code": s.code().to_string(),
                "label": s.display_label(locale),
                "color": s.display_color(),
                "requiredFields": s.required_fields(),
            })
        })
        .collect();
    Ok(json!({ "statuses": statuses }))
}

fn status_normalize(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = get_required_str(params, "token")?;
    let recognized = AttendanceStatus::parse(&token).is_some();
    let status = AttendanceStatus::normalize(&token);
    Ok(json!({ "status": status, "recognized": recognized }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "status.list" => status_list(&req.params),
        "status.normalize" => status_normalize(&req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
