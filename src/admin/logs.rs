//! Jaskier Shared Pattern — admin::logs
//! `GET /admin/logs` — paginated audit log (spec.md §6), reading the
//! rotated `audit.<date>.log` files `AuditSink` writes under `config_dir`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::models::AuditLogPage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[utoipa::path(get, path = "/admin/logs", tag = "admin",
    params(("offset" = Option<usize>, Query), ("limit" = Option<usize>, Query)),
    responses((status = 200, description = "Paginated audit log entries", body = AuditLogPage)))]
pub async fn logs(State(state): State<AppState>, Query(params): Query<LogsParams>) -> Json<AuditLogPage> {
    let config_dir = state.stats.config_dir();
    let entries = read_all_entries(config_dir);

    let limit = params.limit.clamp(1, 1000);
    let page: Vec<Value> = entries.iter().skip(params.offset).take(limit).cloned().collect();
    let next_offset = if params.offset + page.len() < entries.len() {
        Some(params.offset + page.len())
    } else {
        None
    };

    Json(AuditLogPage { entries: page, next_offset })
}

/// Reads every `audit.*.log` file under `config_dir`, newest-file-last
/// (lexicographic date ordering), one JSON object per line.
fn read_all_entries(config_dir: &std::path::Path) -> Vec<Value> {
    let Ok(read_dir) = std::fs::read_dir(config_dir) else {
        return Vec::new();
    };

    let mut files: Vec<std::path::PathBuf> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("audit.") && n.ends_with(".log"))
        })
        .collect();
    files.sort();

    let mut entries = Vec::new();
    for file in files {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        for line in content.lines() {
            if let Ok(value) = serde_json::from_str::<Value>(line) {
                entries.push(value);
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_all_entries_on_empty_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_all_entries(dir.path()).is_empty());
    }

    #[test]
    fn read_all_entries_parses_ndjson_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("audit.2026-01-01.log"), "{\"a\":1}\n{\"a\":2}\n").unwrap();
        std::fs::write(dir.path().join("not-audit.log"), "{\"a\":99}\n").unwrap();

        let entries = read_all_entries(dir.path());
        assert_eq!(entries.len(), 2);
    }
}
