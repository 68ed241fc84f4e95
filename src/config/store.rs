//! Jaskier Shared Pattern — config::store
//! Copy-on-write config snapshot behind a `watch` channel (design note §9):
//! readers clone a cheap `Arc` and never block; writers serialize through
//! one `tokio::sync::Mutex` and publish a brand-new snapshot on success.
//! Persists to `config_dir/config.json`, provider secrets encrypted with
//! `crate::crypto`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};

use super::types::{AuthDetail, Provider, Rule, ScenarioFlagKey, GLOBAL_SCENARIO};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSnapshot {
    pub providers: HashMap<Uuid, Provider>,
    pub rules: Vec<Rule>,
    pub scenario_flags: HashMap<String, bool>,
    pub user_token: String,
    pub model_token: String,
}

impl ConfigSnapshot {
    fn flag_storage_key(key: &ScenarioFlagKey) -> String {
        format!("{}::{}", key.scenario, key.key)
    }
}

/// On-disk shape: identical to `ConfigSnapshot` except provider secrets are
/// encrypted. Kept as a separate type so "what's in memory" and "what's on
/// disk" can never be accidentally conflated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedConfig {
    providers: Vec<Provider>,
    rules: Vec<Rule>,
    scenario_flags: HashMap<String, bool>,
    user_token: String,
    model_token: String,
}

pub struct ConfigStore {
    tx: watch::Sender<Arc<ConfigSnapshot>>,
    write_lock: Mutex<()>,
    path: PathBuf,
    key_bytes: Option<[u8; 32]>,
}

impl ConfigStore {
    /// Load `config_dir/config.json` if present, otherwise start from an
    /// empty (but valid) snapshot with freshly minted tokens.
    pub fn load(config_dir: &Path) -> anyhow::Result<Self> {
        let key_bytes = crate::crypto::encryption_key(config_dir);
        let path = config_dir.join("config.json");

        let snapshot = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let persisted: PersistedConfig = serde_json::from_str(&raw)?;
                decrypt_snapshot(persisted, key_bytes.as_ref())
            }
            Err(_) => {
                tracing::info!("config: no existing config.json, starting fresh at {}", path.display());
                ConfigSnapshot {
                    user_token: crate::tokens::generate_token("bootstrap"),
                    model_token: crate::tokens::generate_token("bootstrap"),
                    ..Default::default()
                }
            }
        };

        let (tx, _rx) = watch::channel(Arc::new(snapshot));
        Ok(Self {
            tx,
            write_lock: Mutex::new(()),
            path,
            key_bytes,
        })
    }

    /// Lock-free read of the current snapshot.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.tx.borrow().clone()
    }

    /// Subscribe to snapshot replacement — used by the Proxy Engine to
    /// hot-reload without polling.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.tx.subscribe()
    }

    pub fn get_provider(&self, id: Uuid) -> Option<Provider> {
        self.snapshot().providers.get(&id).cloned()
    }

    pub fn list_providers(&self) -> Vec<Provider> {
        self.snapshot().providers.values().cloned().collect()
    }

    pub fn list_rules(&self, scenario: Option<&str>) -> Vec<Rule> {
        let snap = self.snapshot();
        match scenario {
            Some(s) => snap.rules.iter().filter(|r| r.scenario == s).cloned().collect(),
            None => snap.rules.clone(),
        }
    }

    pub fn get_scenario_flag(&self, key: &ScenarioFlagKey) -> bool {
        self.snapshot()
            .scenario_flags
            .get(&ConfigSnapshot::flag_storage_key(key))
            .copied()
            .unwrap_or(false)
    }

    pub fn user_token(&self) -> String {
        self.snapshot().user_token.clone()
    }

    pub fn model_token(&self) -> String {
        self.snapshot().model_token.clone()
    }

    async fn write_with<F>(&self, mutate: F) -> GatewayResult<()>
    where
        F: FnOnce(&mut ConfigSnapshot) -> GatewayResult<()>,
    {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.snapshot()).clone();
        mutate(&mut next)?;

        self.persist(&next).map_err(GatewayError::Internal)?;
        self.tx.send_replace(Arc::new(next));
        Ok(())
    }

    fn persist(&self, snapshot: &ConfigSnapshot) -> anyhow::Result<()> {
        let persisted = encrypt_snapshot(snapshot, self.key_bytes.as_ref());
        let serialized = serde_json::to_vec_pretty(&persisted)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub async fn upsert_provider(&self, provider: Provider) -> GatewayResult<()> {
        self.write_with(|snap| {
            snap.providers.insert(provider.uuid, provider);
            Ok(())
        })
        .await
    }

    pub async fn set_provider_enabled(&self, id: Uuid, enabled: bool) -> GatewayResult<()> {
        self.write_with(|snap| {
            let provider = snap
                .providers
                .get_mut(&id)
                .ok_or_else(|| GatewayError::NotFound(format!("provider {id}")))?;
            provider.enabled = enabled;
            Ok(())
        })
        .await
    }

    /// Hard delete, rejected if any rule still references the provider.
    pub async fn delete_provider(&self, id: Uuid) -> GatewayResult<()> {
        self.write_with(|snap| {
            let referenced = snap.rules.iter().any(|r| {
                r.services.iter().any(|s| s.provider_uuid == id)
                    || r.smart_routing.iter().any(|sr| sr.services.iter().any(|s| s.provider_uuid == id))
            });
            if referenced {
                return Err(GatewayError::InvalidRequest(format!(
                    "provider {id} is still referenced by a rule"
                )));
            }
            if snap.providers.remove(&id).is_none() {
                return Err(GatewayError::NotFound(format!("provider {id}")));
            }
            Ok(())
        })
        .await
    }

    /// Rejects the write if `(scenario, request_model)` collides with a
    /// different active rule (spec.md §3 Rule invariant).
    pub async fn upsert_rule(&self, rule: Rule) -> GatewayResult<()> {
        self.write_with(|snap| {
            if rule.active {
                let conflict = snap.rules.iter().any(|r| {
                    r.uuid != rule.uuid
                        && r.active
                        && r.scenario == rule.scenario
                        && r.request_model == rule.request_model
                });
                if conflict {
                    return Err(GatewayError::InvalidRequest(format!(
                        "active rule already exists for scenario={} request_model={}",
                        rule.scenario, rule.request_model
                    )));
                }
            }

            if let Some(slot) = snap.rules.iter_mut().find(|r| r.uuid == rule.uuid) {
                *slot = rule;
            } else {
                snap.rules.push(rule);
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_rule(&self, id: Uuid) -> GatewayResult<()> {
        self.write_with(|snap| {
            let before = snap.rules.len();
            snap.rules.retain(|r| r.uuid != id);
            if snap.rules.len() == before {
                return Err(GatewayError::NotFound(format!("rule {id}")));
            }
            Ok(())
        })
        .await
    }

    pub async fn set_scenario_flag(&self, key: ScenarioFlagKey, value: bool) -> GatewayResult<()> {
        self.write_with(|snap| {
            snap.scenario_flags.insert(ConfigSnapshot::flag_storage_key(&key), value);
            Ok(())
        })
        .await
    }

    /// Merge an updated service's in-memory stats back into the rule it
    /// belongs to — called by the Stats engine (C2) after a background
    /// flush so the next snapshot read reflects the latest counters.
    pub async fn update_service_stats(
        &self,
        rule_uuid: Uuid,
        service_key: (Uuid, String),
        stats: super::types::Stats,
    ) -> GatewayResult<()> {
        self.write_with(|snap| {
            let rule = snap
                .rules
                .iter_mut()
                .find(|r| r.uuid == rule_uuid)
                .ok_or_else(|| GatewayError::NotFound(format!("rule {rule_uuid}")))?;
            for service in rule.services.iter_mut().chain(
                rule.smart_routing.iter_mut().flat_map(|sr| sr.services.iter_mut()),
            ) {
                if service.key() == service_key {
                    service.stats = stats;
                    return Ok(());
                }
            }
            Err(GatewayError::NotFound(format!("service {service_key:?} in rule {rule_uuid}")))
        })
        .await
    }
}

fn encrypt_snapshot(snapshot: &ConfigSnapshot, key: Option<&[u8; 32]>) -> PersistedConfig {
    let providers = snapshot
        .providers
        .values()
        .cloned()
        .map(|mut p| {
            p.auth = encrypt_auth(p.auth, key);
            p
        })
        .collect();

    PersistedConfig {
        providers,
        rules: snapshot.rules.clone(),
        scenario_flags: snapshot.scenario_flags.clone(),
        user_token: snapshot.user_token.clone(),
        model_token: snapshot.model_token.clone(),
    }
}

fn decrypt_snapshot(persisted: PersistedConfig, key: Option<&[u8; 32]>) -> ConfigSnapshot {
    let providers = persisted
        .providers
        .into_iter()
        .map(|mut p| {
            p.auth = decrypt_auth(p.auth, key);
            (p.uuid, p)
        })
        .collect();

    ConfigSnapshot {
        providers,
        rules: persisted.rules,
        scenario_flags: persisted.scenario_flags,
        user_token: persisted.user_token,
        model_token: persisted.model_token,
    }
}

fn encrypt_auth(auth: AuthDetail, key: Option<&[u8; 32]>) -> AuthDetail {
    match auth {
        AuthDetail::ApiKey { token } => AuthDetail::ApiKey {
            token: crate::crypto::encrypt(&token, key),
        },
        AuthDetail::OAuth {
            access_token,
            refresh_token,
            expires_at,
            token_url,
            client_id,
        } => AuthDetail::OAuth {
            access_token: crate::crypto::encrypt(&access_token, key),
            refresh_token: crate::crypto::encrypt(&refresh_token, key),
            expires_at,
            token_url,
            client_id,
        },
    }
}

fn decrypt_auth(auth: AuthDetail, key: Option<&[u8; 32]>) -> AuthDetail {
    match auth {
        AuthDetail::ApiKey { token } => AuthDetail::ApiKey {
            token: crate::crypto::decrypt(&token, key).unwrap_or(token),
        },
        AuthDetail::OAuth {
            access_token,
            refresh_token,
            expires_at,
            token_url,
            client_id,
        } => AuthDetail::OAuth {
            access_token: crate::crypto::decrypt(&access_token, key).unwrap_or(access_token),
            refresh_token: crate::crypto::decrypt(&refresh_token, key).unwrap_or(refresh_token),
            expires_at,
            token_url,
            client_id,
        },
    }
}

/// Resolve the active rule for `(scenario, request_model)`, falling back to
/// the `global` scenario when nothing matches (spec.md §4.5 Router).
pub fn resolve_rule(snapshot: &ConfigSnapshot, scenario: &str, request_model: &str) -> Option<Rule> {
    let mut matches: Vec<&Rule> = snapshot
        .rules
        .iter()
        .filter(|r| r.active && r.scenario == scenario && r.request_model == request_model)
        .collect();

    if matches.is_empty() && scenario != GLOBAL_SCENARIO {
        matches = snapshot
            .rules
            .iter()
            .filter(|r| r.active && r.scenario == GLOBAL_SCENARIO && r.request_model == request_model)
            .collect();
    }

    if matches.len() > 1 {
        matches.sort_by_key(|r| r.uuid);
        tracing::warn!(
            "router: {} rules matched scenario={} request_model={}, picking lexicographically smallest uuid",
            matches.len(), scenario, request_model
        );
    }

    matches.into_iter().next().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ApiStyle, Service};

    fn provider(name: &str) -> Provider {
        Provider {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            api_base: "https://example.test".to_string(),
            api_style: ApiStyle::OpenAi,
            auth: AuthDetail::ApiKey { token: "sk-test".to_string() },
            enabled: true,
            proxy_url: None,
            timeout_ms: None,
            tags: vec![],
        }
    }

    fn rule(scenario: &str, request_model: &str, provider_uuid: Uuid) -> Rule {
        Rule {
            uuid: Uuid::new_v4(),
            scenario: scenario.to_string(),
            request_model: request_model.to_string(),
            response_model: request_model.to_string(),
            active: true,
            services: vec![Service {
                provider_uuid,
                model: "m".to_string(),
                weight: 1,
                active: true,
                time_window_seconds: 0,
                stats: Default::default(),
            }],
            smart_enabled: false,
            smart_routing: vec![],
            description: None,
        }
    }

    #[tokio::test]
    async fn upsert_rejects_duplicate_active_rule() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path()).unwrap();
        let p = provider("p1");
        store.upsert_provider(p.clone()).await.unwrap();
        store.upsert_rule(rule("global", "gpt-4", p.uuid)).await.unwrap();

        let conflict = rule("global", "gpt-4", p.uuid);
        let result = store.upsert_rule(conflict).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_provider_rejected_when_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path()).unwrap();
        let p = provider("p1");
        store.upsert_provider(p.clone()).await.unwrap();
        store.upsert_rule(rule("global", "gpt-4", p.uuid)).await.unwrap();

        assert!(store.delete_provider(p.uuid).await.is_err());
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConfigStore::load(dir.path()).unwrap();
            store.upsert_provider(provider("p1")).await.unwrap();
        }
        let reloaded = ConfigStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.list_providers().len(), 1);
    }

    #[test]
    fn resolve_rule_falls_back_to_global() {
        let mut snap = ConfigSnapshot::default();
        let pid = Uuid::new_v4();
        snap.rules.push(rule("global", "gpt-4", pid));

        let found = resolve_rule(&snap, "claude_code", "gpt-4").unwrap();
        assert_eq!(found.scenario, "global");
    }

    #[test]
    fn resolve_rule_prefers_specific_scenario() {
        let mut snap = ConfigSnapshot::default();
        let pid = Uuid::new_v4();
        snap.rules.push(rule("global", "gpt-4", pid));
        snap.rules.push(rule("claude_code", "gpt-4", pid));

        let found = resolve_rule(&snap, "claude_code", "gpt-4").unwrap();
        assert_eq!(found.scenario, "claude_code");
    }

    #[test]
    fn resolve_rule_none_when_no_match() {
        let snap = ConfigSnapshot::default();
        assert!(resolve_rule(&snap, "claude_code", "gpt-4").is_none());
    }
}
