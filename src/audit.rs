//! Jaskier Shared Pattern — audit
//! Structured audit entries (spec.md §4.8 step 9), written fire-and-forget
//! to a rotated log file instead of the teacher's `ch_audit_log` table.
//! Persisted under `config_dir/audit.log[.N]` (spec.md §6).

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct AuditEntry<'a> {
    pub request_id: Uuid,
    /// Always `None` today — the core recognizes two shared bearer tokens
    /// (`user`, `model`), not individual user identities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a str>,
    pub client_ip: String,
    pub rule_uuid: Option<Uuid>,
    pub service_key: Option<String>,
    pub status: u16,
    pub duration_ms: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

/// Holds the non-blocking writer for the rotated audit log. The `WorkerGuard`
/// must stay alive for the lifetime of the process or buffered lines are lost.
pub struct AuditSink {
    writer: Mutex<NonBlocking>,
    _guard: WorkerGuard,
}

impl AuditSink {
    pub fn init(config_dir: &std::path::Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config_dir)?;
        let appender = tracing_appender::rolling::Builder::new()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("audit")
            .filename_suffix("log")
            .build(config_dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Ok(Self { writer: Mutex::new(writer), _guard: guard })
    }

    /// Fire-and-forget: errors are logged but never propagated, audit must
    /// not break the request flow.
    pub fn emit(&self, entry: &AuditEntry) {
        let Ok(mut line) = serde_json::to_vec(entry) else {
            tracing::warn!("audit: failed to serialize entry for request {}", entry.request_id);
            return;
        };
        line.push(b'\n');

        let mut writer = match self.writer.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.write_all(&line) {
            tracing::warn!("audit: failed to write entry for request {}: {e}", entry.request_id);
        }
    }
}
