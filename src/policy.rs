use crate::status::AttendanceStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const POLICY_SETTINGS_KEY: &str = "attendance.policy";

/// Largest store timeout SQLite's busy handler accepts.
pub const MAX_STORE_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Which statuses must carry an uploaded proof reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentPolicy {
    pub excused: bool,
    pub sick: bool,
}

impl AttachmentPolicy {
    pub fn requires(&self, status: AttendanceStatus) -> bool {
        match status {
            AttendanceStatus::Excused => self.excused,
            AttendanceStatus::Sick => self.sick,
            _ => false,
        }
    }
}

/// Per-workspace attendance rules, stored under [`POLICY_SETTINGS_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendancePolicy {
    pub attachment: AttachmentPolicy,
    /// Reject unrecognized status tokens instead of falling back to absent.
    pub strict_status_tokens: bool,
    pub store_timeout_ms: u64,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            attachment: AttachmentPolicy::default(),
            strict_status_tokens: false,
            store_timeout_ms: 2000,
        }
    }
}

impl AttendancePolicy {
    /// Store call timeout, clamped to `1..=MAX_STORE_TIMEOUT_MS`.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.clamp(1, MAX_STORE_TIMEOUT_MS))
    }

    pub fn check(&self) -> anyhow::Result<()> {
        if !(1..=MAX_STORE_TIMEOUT_MS).contains(&self.store_timeout_ms) {
            anyhow::bail!(
                "storeTimeoutMs must be between 1 and {}, got {}",
                MAX_STORE_TIMEOUT_MS,
                self.store_timeout_ms
            );
        }
        Ok(())
    }

    /// Overlay a partial JSON object on top of this policy. The result is
    /// checked before it is returned.
    pub fn merged(&self, patch: &serde_json::Value) -> anyhow::Result<AttendancePolicy> {
        let mut base = serde_json::to_value(self)?;
        merge_json(&mut base, patch);
        let next: AttendancePolicy = serde_json::from_value(base)?;
        next.check()?;
        Ok(next)
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(b), serde_json::Value::Object(p)) => {
            for (k, v) in p {
                merge_json(b.entry(k.clone()).or_insert(serde_json::Value::Null), v);
            }
        }
        (b, p) => *b = p.clone(),
    }
}
