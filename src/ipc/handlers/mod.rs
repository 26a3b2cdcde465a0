pub mod backup;
pub mod batches;
pub mod core;
pub mod policy;
pub mod recap;
pub mod records;
pub mod taxonomy;

use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use rusqlite::Connection;

pub(crate) fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}
