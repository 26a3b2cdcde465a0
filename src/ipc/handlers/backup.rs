use super::core::open_workspace;
use crate::{backup, db};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_workspace_backup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(out) = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };
    match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => err(&req.id, "backup_failed", format!("{e:?}"), None),
    }
}

fn handle_workspace_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(src) = req
        .params
        .get("inPath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };

    // Release the live connection before the database file is replaced.
    state.db = None;
    match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(summary) => match open_workspace(state, &workspace_path) {
            Ok(()) => ok(
                &req.id,
                json!({
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "dbSha256": summary.db_sha256,
                }),
            ),
            Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
        },
        Err(e) => {
            // The database file was not touched; open batches stay usable.
            match db::open_db(&workspace_path) {
                Ok(conn) => state.db = Some(conn),
                Err(reopen) => tracing::warn!(error = %reopen, "could not reattach workspace after failed restore"),
            }
            err(&req.id, "restore_failed", format!("{e:?}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workspace.backup" => Some(handle_workspace_backup(state, req)),
        "workspace.restore" => Some(handle_workspace_restore(state, req)),
        _ => None,
    }
}
