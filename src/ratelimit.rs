//! Jaskier Shared Pattern — ratelimit
//! Per-IP sliding-window counter for auth endpoints (spec.md §4.3, C3).
//! Distinct from the blanket `tower_governor` layer wired in `lib.rs`: this
//! one tracks `Allow`/`Reset`/`GetStats` explicitly because the admin API
//! needs to read and clear individual buckets.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone)]
struct Bucket {
    attempt_timestamps: Vec<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

impl Bucket {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            attempt_timestamps: Vec::new(),
            blocked_until: None,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RateLimitStats {
    pub total_ips_tracked: usize,
    pub currently_blocked: usize,
    pub max_attempts: u32,
    pub window_seconds: u64,
    pub block_duration_seconds: u64,
}

pub struct RateLimiter {
    buckets: DashMap<IpAddr, Bucket>,
    max_attempts: u32,
    window: Duration,
    block_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration, block_duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            buckets: DashMap::new(),
            max_attempts,
            window,
            block_duration,
        })
    }

    /// Records an attempt from `ip` and returns whether it's allowed through.
    /// Returns `false` (and (re-)arms `blocked_until`) once attempts within
    /// `window` exceed `max_attempts`.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Utc::now();
        let mut bucket = self.buckets.entry(ip).or_insert_with(|| Bucket::new(now));
        bucket.last_seen = now;

        if let Some(blocked_until) = bucket.blocked_until {
            if now < blocked_until {
                return false;
            }
            bucket.blocked_until = None;
            bucket.attempt_timestamps.clear();
        }

        let window_start = now - chrono::Duration::from_std(self.window).unwrap_or_default();
        bucket.attempt_timestamps.retain(|t| *t >= window_start);
        bucket.attempt_timestamps.push(now);

        if bucket.attempt_timestamps.len() as u32 > self.max_attempts {
            bucket.blocked_until = Some(now + chrono::Duration::from_std(self.block_duration).unwrap_or_default());
            return false;
        }
        true
    }

    /// Seconds remaining until `ip` can try again, if currently blocked.
    pub fn retry_after_secs(&self, ip: IpAddr) -> Option<u64> {
        let bucket = self.buckets.get(&ip)?;
        let blocked_until = bucket.blocked_until?;
        let now = Utc::now();
        if blocked_until <= now {
            return None;
        }
        Some((blocked_until - now).num_seconds().max(0) as u64)
    }

    pub fn reset(&self, ip: IpAddr) {
        self.buckets.remove(&ip);
    }

    pub fn stats(&self) -> RateLimitStats {
        let now = Utc::now();
        let currently_blocked = self
            .buckets
            .iter()
            .filter(|entry| entry.blocked_until.is_some_and(|b| b > now))
            .count();

        RateLimitStats {
            total_ips_tracked: self.buckets.len(),
            currently_blocked,
            max_attempts: self.max_attempts,
            window_seconds: self.window.as_secs(),
            block_duration_seconds: self.block_duration.as_secs(),
        }
    }

    /// Drops buckets idle longer than `window` with no active block. Run on
    /// a `window / 2` cadence by the background janitor in `main.rs`.
    fn sweep(&self) {
        let now = Utc::now();
        let idle_cutoff = now - chrono::Duration::from_std(self.window).unwrap_or_default();
        self.buckets.retain(|_, bucket| {
            let blocked = bucket.blocked_until.is_some_and(|b| b > now);
            blocked || bucket.last_seen >= idle_cutoff
        });
    }

    /// Spawns the janitor loop. Returns the `JoinHandle` so callers can
    /// abort it on shutdown.
    pub fn spawn_janitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = limiter.window / 2;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }
}
