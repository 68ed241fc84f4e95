//! Jaskier Shared Pattern — client_pool
//! `(provider_uuid, model) -> PooledClient` map (spec.md §4.4, C4). Creation
//! is lazy, synchronized per key, and entries are evicted by TTL since last
//! use — mirrors the `ModelCache` version-keyed lazy-refresh pattern from
//! the teacher's `model_registry.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Provider;

type PoolKey = (Uuid, String);

struct PooledClient {
    client: reqwest::Client,
    last_used: Instant,
}

pub struct ClientPool {
    entries: DashMap<PoolKey, PooledClient>,
    ttl: Duration,
}

impl ClientPool {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            ttl,
        })
    }

    /// Return the pooled client for `(provider, model)`, building one with
    /// the provider's proxy/timeout settings if absent or expired.
    pub fn get_or_create(&self, provider: &Provider, model: &str) -> anyhow::Result<reqwest::Client> {
        let key: PoolKey = (provider.uuid, model.to_string());

        if let Some(mut entry) = self.entries.get_mut(&key) {
            if entry.last_used.elapsed() < self.ttl {
                entry.last_used = Instant::now();
                return Ok(entry.client.clone());
            }
        }

        let client = build_client(provider)?;
        self.entries.insert(
            key,
            PooledClient {
                client: client.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(client)
    }

    /// Drops entries idle longer than `ttl`. Run periodically alongside the
    /// rate limiter janitor.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, v| v.last_used.elapsed() < ttl);
    }

    pub fn spawn_janitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let period = pool.ttl / 2;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_secs(5)));
            loop {
                ticker.tick().await;
                pool.sweep();
            }
        })
    }
}

fn build_client(provider: &Provider) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_millis(provider.timeout_ms.unwrap_or(60_000)))
        .gzip(true)
        .brotli(true);

    if let Some(proxy_url) = &provider.proxy_url {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    } else if let Ok(https_proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("https_proxy")) {
        builder = builder.proxy(reqwest::Proxy::https(&https_proxy)?);
    } else if let Ok(http_proxy) = std::env::var("HTTP_PROXY").or_else(|_| std::env::var("http_proxy")) {
        builder = builder.proxy(reqwest::Proxy::http(&http_proxy)?);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiStyle, AuthDetail};

    fn provider() -> Provider {
        Provider {
            uuid: Uuid::new_v4(),
            name: "test".to_string(),
            api_base: "https://example.test".to_string(),
            api_style: ApiStyle::OpenAi,
            auth: AuthDetail::ApiKey { token: "sk".to_string() },
            enabled: true,
            proxy_url: None,
            timeout_ms: Some(5_000),
            tags: vec![],
        }
    }

    #[test]
    fn reuses_client_for_same_key() {
        let pool = ClientPool::new(Duration::from_secs(60));
        let p = provider();
        pool.get_or_create(&p, "gpt-4").unwrap();
        pool.get_or_create(&p, "gpt-4").unwrap();
        assert_eq!(pool.entries.len(), 1);
    }

    #[test]
    fn distinct_models_get_distinct_entries() {
        let pool = ClientPool::new(Duration::from_secs(60));
        let p = provider();
        pool.get_or_create(&p, "gpt-4").unwrap();
        pool.get_or_create(&p, "gpt-3.5").unwrap();
        assert_eq!(pool.entries.len(), 2);
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let pool = ClientPool::new(Duration::from_millis(1));
        let p = provider();
        pool.get_or_create(&p, "gpt-4").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        pool.sweep();
        assert_eq!(pool.entries.len(), 0);
    }
}
