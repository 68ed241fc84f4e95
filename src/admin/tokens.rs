//! Jaskier Shared Pattern — admin::tokens
//! `/admin/tokens/generate` and `/admin/tokens/validate` (spec.md §6).
//! Tokens minted here are signed against the gateway's own `user_token`,
//! which doubles as the HMAC secret — there's no separate signing key in
//! the persisted config, and `user_token` is never handed to callers in
//! plaintext outside of bootstrap.

use axum::extract::State;
use axum::Json;

use crate::models::{GenerateTokenRequest, GenerateTokenResponse, ValidateTokenRequest, ValidateTokenResponse};
use crate::state::AppState;
use crate::tokens;

#[utoipa::path(post, path = "/admin/tokens/generate", tag = "admin", request_body = GenerateTokenRequest,
    responses((status = 200, description = "A freshly minted client token", body = GenerateTokenResponse)))]
pub async fn generate(State(state): State<AppState>, Json(req): Json<GenerateTokenRequest>) -> Json<GenerateTokenResponse> {
    let secret = state.config.user_token();
    let token = tokens::generate_token(&secret);
    if let Some(label) = req.label {
        tracing::info!(%label, "admin: minted a new client token");
    }
    Json(GenerateTokenResponse { token })
}

#[utoipa::path(post, path = "/admin/tokens/validate", tag = "admin", request_body = ValidateTokenRequest,
    responses((status = 200, description = "Whether the token is valid", body = ValidateTokenResponse)))]
pub async fn validate(State(state): State<AppState>, Json(req): Json<ValidateTokenRequest>) -> Json<ValidateTokenResponse> {
    let secret = state.config.user_token();
    Json(ValidateTokenResponse { valid: tokens::validate_token(&req.token, &secret) })
}
