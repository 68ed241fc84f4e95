//! Jaskier Shared Pattern — admin::providers
//! `/api/providers` CRUD and `/api/provider-models/:name` (spec.md §6).
//! `Provider` already derives `Serialize`/`Deserialize`/`ToSchema`, so it's
//! reused directly as the request/response body here.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::config::Provider;
use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

#[utoipa::path(get, path = "/api/providers", tag = "admin",
    responses((status = 200, description = "All configured providers", body = [Provider])))]
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<Provider>> {
    Json(state.config.list_providers())
}

#[utoipa::path(post, path = "/api/providers", tag = "admin", request_body = Provider,
    responses((status = 200, description = "Provider created or updated")))]
pub async fn upsert_provider(State(state): State<AppState>, Json(provider): Json<Provider>) -> GatewayResult<Json<Provider>> {
    state.config.upsert_provider(provider.clone()).await?;
    Ok(Json(provider))
}

#[utoipa::path(delete, path = "/api/providers/{uuid}", tag = "admin",
    params(("uuid" = Uuid, Path, description = "Provider uuid")),
    responses((status = 204, description = "Provider deleted")))]
pub async fn delete_provider(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> GatewayResult<axum::http::StatusCode> {
    state.config.delete_provider(uuid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(get, path = "/api/provider-models/{name}", tag = "admin",
    params(("name" = String, Path, description = "Provider name")),
    responses((status = 200, description = "Models configured for this provider across all rules")))]
pub async fn provider_models(State(state): State<AppState>, Path(name): Path<String>) -> GatewayResult<Json<Vec<String>>> {
    let snapshot = state.config.snapshot();
    let Some(provider) = snapshot.providers.values().find(|p| p.name == name) else {
        return Err(GatewayError::NotFound(format!("no provider named {name}")));
    };

    let mut models: Vec<String> = snapshot
        .rules
        .iter()
        .flat_map(|rule| rule.services.iter().chain(rule.smart_routing.iter().flat_map(|r| r.services.iter())))
        .filter(|service| service.provider_uuid == provider.uuid)
        .map(|service| service.model.clone())
        .collect();
    models.sort();
    models.dedup();
    Ok(Json(models))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiStyle;

    #[tokio::test]
    async fn provider_models_collects_from_base_and_smart_routing() {
        let (state, _dir) = AppState::new_test();
        let provider = Provider {
            uuid: Uuid::new_v4(),
            name: "acme".to_string(),
            api_base: "https://acme.test".to_string(),
            api_style: ApiStyle::OpenAi,
            auth: crate::config::AuthDetail::ApiKey { token: "sk".to_string() },
            enabled: true,
            proxy_url: None,
            timeout_ms: None,
            tags: vec![],
        };
        state.config.upsert_provider(provider.clone()).await.unwrap();

        let rule = crate::config::Rule {
            uuid: Uuid::new_v4(),
            scenario: "global".to_string(),
            request_model: "m".to_string(),
            response_model: "m".to_string(),
            active: true,
            services: vec![crate::config::Service {
                provider_uuid: provider.uuid,
                model: "gpt-5".to_string(),
                weight: 1,
                active: true,
                time_window_seconds: 60,
                stats: Default::default(),
            }],
            smart_enabled: false,
            smart_routing: vec![],
            description: None,
        };
        state.config.upsert_rule(rule).await.unwrap();

        let Json(models) = provider_models(State(state), Path("acme".to_string())).await.unwrap();
        assert_eq!(models, vec!["gpt-5".to_string()]);
    }

    #[tokio::test]
    async fn provider_models_unknown_name_is_not_found() {
        let (state, _dir) = AppState::new_test();
        let result = provider_models(State(state), Path("nope".to_string())).await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }
}
