//! Jaskier Shared Pattern — state
//! Central application state tying the Config Store (C1), Stats Store (C2),
//! Rate Limiter (C3), and Client Pool (C4) together.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::AuditSink;
use crate::client_pool::ClientPool;
use crate::config::ConfigStore;
use crate::ratelimit::RateLimiter;
use crate::remote_exec::SessionStore;
use crate::stats::StatsStore;

/// Central application state. Clone-friendly — every field is an `Arc` (or
/// `Copy`) internally.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub stats: Arc<StatsStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub client_pool: Arc<ClientPool>,
    pub audit: Arc<AuditSink>,
    pub sessions: Arc<SessionStore>,
    pub http_client: reqwest::Client,
    pub start_time: Instant,
    /// `true` once startup config load completes.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("gateway marked as READY");
    }

    pub fn new(config_dir: PathBuf) -> anyhow::Result<Self> {
        let config = Arc::new(ConfigStore::load(&config_dir)?);
        let stats = StatsStore::spawn(config_dir.clone());

        let rate_limiter = RateLimiter::new(10, Duration::from_secs(300), Duration::from_secs(900));
        rate_limiter.spawn_janitor();

        let client_pool = ClientPool::new(Duration::from_secs(600));
        client_pool.spawn_janitor();

        let audit = Arc::new(AuditSink::init(&config_dir)?);

        let sessions = SessionStore::new(Duration::from_secs(900));
        sessions.spawn_sweeper();

        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        tracing::info!(
            "AppState initialised — {} providers, {} rules",
            config.list_providers().len(),
            config.list_rules(None).len()
        );

        Ok(Self {
            config,
            stats,
            rate_limiter,
            client_pool,
            audit,
            sessions,
            http_client,
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Test-only constructor — config lives under a fresh temp dir so tests
    /// never touch a real `~/.tingly-box`.
    #[doc(hidden)]
    pub fn new_test() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = Self::new(dir.path().to_path_buf()).expect("test AppState");
        (state, dir)
    }
}
