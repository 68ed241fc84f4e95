//! Jaskier Shared Pattern — models
//! Request/response DTOs for the admin HTTP surface that aren't already
//! covered by `config::types` (which providers/rules reuse directly as
//! their own create/update bodies).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub providers_configured: usize,
    pub rules_configured: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadyResponse {
    pub ready: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateTokenRequest {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GenerateTokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidateTokenResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResetRateLimitRequest {
    pub ip: std::net::IpAddr,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogPage {
    pub entries: Vec<serde_json::Value>,
    pub next_offset: Option<usize>,
}
