use crate::batch::SessionBatch;
use crate::policy::AttendancePolicy;
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub policy: AttendancePolicy,
    /// Open (uncommitted) batches by batch id.
    pub batches: HashMap<String, SessionBatch>,
}
