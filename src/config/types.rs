//! Jaskier Shared Pattern — config::types
//! Data model for §3 of the spec: Provider, Service, Rule, ScenarioFlag.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// How a provider speaks the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    OpenAi,
    Anthropic,
}

/// Authentication material for a provider. OAuth tokens are refreshed by
/// `oauth::refresh_if_needed` when `expires_at` has passed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthDetail {
    ApiKey { token: String },
    OAuth {
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
        token_url: String,
        client_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Provider {
    pub uuid: Uuid,
    pub name: String,
    pub api_base: String,
    pub api_style: ApiStyle,
    pub auth: AuthDetail,
    pub enabled: bool,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One `(timestamp, input_tokens, output_tokens)` ring entry, used to
/// compute the time-windowed usage the load balancer de-prioritizes on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSample {
    pub at: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Counters embedded in a `Service` (spec.md §3 "Stats").
#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
pub struct Stats {
    pub requests_total: u64,
    pub errors_total: u64,
    pub input_tokens_total: u64,
    pub output_tokens_total: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[schema(ignore)]
    pub ring: VecDeque<UsageSample>,
}

const RING_CAP: usize = 4096;

impl Stats {
    /// Record a completed request. Monotonically increases the totals and
    /// pushes a usage sample, evicting the oldest entries past `RING_CAP`.
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64, is_error: bool, now: DateTime<Utc>) {
        self.requests_total += 1;
        if is_error {
            self.errors_total += 1;
        }
        self.input_tokens_total += input_tokens;
        self.output_tokens_total += output_tokens;
        self.last_used_at = Some(now);
        self.ring.push_back(UsageSample {
            at: now,
            input_tokens,
            output_tokens,
        });
        while self.ring.len() > RING_CAP {
            self.ring.pop_front();
        }
    }

    /// Sum of tokens recorded within `window_seconds` of `now`. Entries
    /// older than the window are evicted lazily, as the spec requires.
    pub fn usage_in_window(&mut self, window_seconds: u64, now: DateTime<Utc>) -> u64 {
        if window_seconds == 0 {
            return 0;
        }
        let cutoff = now - chrono::Duration::seconds(window_seconds as i64);
        while matches!(self.ring.front(), Some(sample) if sample.at < cutoff) {
            self.ring.pop_front();
        }
        self.ring
            .iter()
            .filter(|s| s.at >= cutoff)
            .map(|s| s.input_tokens + s.output_tokens)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Service {
    pub provider_uuid: Uuid,
    pub model: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub time_window_seconds: u64,
    #[serde(default)]
    pub stats: Stats,
}

fn default_true() -> bool {
    true
}

impl Service {
    pub fn key(&self) -> (Uuid, String) {
        (self.provider_uuid, self.model.clone())
    }
}

/// A conditional sub-rule: when `predicate` matches the request, its
/// `services` take precedence over the rule's base services.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SmartRoute {
    pub predicate: String,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rule {
    pub uuid: Uuid,
    pub scenario: String,
    pub request_model: String,
    pub response_model: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub services: Vec<Service>,
    #[serde(default)]
    pub smart_enabled: bool,
    #[serde(default)]
    pub smart_routing: Vec<SmartRoute>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Rule {
    /// The service list to balance over for this request: the first
    /// matching `smart_routing` entry when `smart_enabled`, else base.
    pub fn candidate_services(&self, request_body: &serde_json::Value, flags: &dyn Fn(&str) -> bool) -> &[Service] {
        if self.smart_enabled {
            for route in &self.smart_routing {
                if crate::router::predicate_matches(&route.predicate, request_body, &self.scenario, flags) {
                    return &route.services;
                }
            }
        }
        &self.services
    }
}

pub const GLOBAL_SCENARIO: &str = "global";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScenarioFlagKey {
    pub scenario: String,
    pub key: String,
}
