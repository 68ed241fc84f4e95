//! Jaskier Shared Pattern — oauth
//! Refreshes a provider's OAuth access token when it's past expiry. The
//! authorization flow that first obtains these tokens is the admin UI's
//! job (out of scope here); the core only ever reads/refreshes.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::{AuthDetail, ConfigStore, Provider};

const TOKEN_EXPIRY_BUFFER: ChronoDuration = ChronoDuration::seconds(300);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Returns a usable access token for `provider`, refreshing and persisting
/// it through `config` first if it's within the expiry buffer. Providers
/// using `ApiKey` auth return that token unchanged.
pub async fn valid_access_token(http_client: &reqwest::Client, config: &ConfigStore, provider: &Provider) -> Option<String> {
    match &provider.auth {
        AuthDetail::ApiKey { token } => Some(token.clone()),
        AuthDetail::OAuth {
            access_token,
            refresh_token,
            expires_at,
            token_url,
            client_id,
        } => {
            if Utc::now() < *expires_at - TOKEN_EXPIRY_BUFFER {
                return Some(access_token.clone());
            }
            refresh(http_client, config, provider.uuid, refresh_token, token_url, client_id).await
        }
    }
}

async fn refresh(
    http_client: &reqwest::Client,
    config: &ConfigStore,
    provider_uuid: Uuid,
    refresh_token: &str,
    token_url: &str,
    client_id: &str,
) -> Option<String> {
    tracing::info!("oauth: refreshing token for provider {provider_uuid}");

    let resp = http_client
        .post(token_url)
        .header("content-type", "application/json")
        .json(&json!({
            "grant_type": "refresh_token",
            "client_id": client_id,
            "refresh_token": refresh_token,
        }))
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .ok()?;

    if !resp.status().is_success() {
        tracing::error!("oauth: refresh failed for provider {provider_uuid}: {}", resp.status());
        return None;
    }

    let token_resp: TokenResponse = resp.json().await.ok()?;
    let expires_at = Utc::now() + ChronoDuration::seconds(token_resp.expires_in);
    let new_refresh = token_resp.refresh_token.unwrap_or_else(|| refresh_token.to_string());

    let mut provider = config.get_provider(provider_uuid)?;
    provider.auth = AuthDetail::OAuth {
        access_token: token_resp.access_token.clone(),
        refresh_token: new_refresh,
        expires_at,
        token_url: token_url.to_string(),
        client_id: client_id.to_string(),
    };
    if let Err(e) = config.upsert_provider(provider).await {
        tracing::error!("oauth: failed to persist refreshed token for {provider_uuid}: {e}");
    }

    tracing::info!("oauth: refreshed token for provider {provider_uuid}");
    Some(token_resp.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiStyle;

    #[tokio::test]
    async fn api_key_provider_returns_token_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path()).unwrap();
        let client = reqwest::Client::new();
        let provider = Provider {
            uuid: Uuid::new_v4(),
            name: "p".to_string(),
            api_base: "https://example.test".to_string(),
            api_style: ApiStyle::OpenAi,
            auth: AuthDetail::ApiKey { token: "sk-abc".to_string() },
            enabled: true,
            proxy_url: None,
            timeout_ms: None,
            tags: vec![],
        };
        let token = valid_access_token(&client, &config, &provider).await;
        assert_eq!(token, Some("sk-abc".to_string()));
    }

    #[tokio::test]
    async fn unexpired_oauth_token_returned_without_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path()).unwrap();
        let client = reqwest::Client::new();
        let provider = Provider {
            uuid: Uuid::new_v4(),
            name: "p".to_string(),
            api_base: "https://example.test".to_string(),
            api_style: ApiStyle::Anthropic,
            auth: AuthDetail::OAuth {
                access_token: "still-good".to_string(),
                refresh_token: "rt".to_string(),
                expires_at: Utc::now() + ChronoDuration::hours(1),
                token_url: "https://unused.test/token".to_string(),
                client_id: "cid".to_string(),
            },
            enabled: true,
            proxy_url: None,
            timeout_ms: None,
            tags: vec![],
        };
        let token = valid_access_token(&client, &config, &provider).await;
        assert_eq!(token, Some("still-good".to_string()));
    }
}
