//! Jaskier Shared Pattern — admin::rules
//! `/api/rules` (collection) and `/api/rule/:name` (single rule, keyed by
//! uuid) per spec.md §6.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::Rule;
use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RuleListParams {
    pub scenario: Option<String>,
}

#[utoipa::path(get, path = "/api/rules", tag = "admin",
    responses((status = 200, description = "All rules, optionally filtered by scenario", body = [Rule])))]
pub async fn list_rules(State(state): State<AppState>, Query(params): Query<RuleListParams>) -> Json<Vec<Rule>> {
    Json(state.config.list_rules(params.scenario.as_deref()))
}

#[utoipa::path(post, path = "/api/rules", tag = "admin", request_body = Rule,
    responses((status = 200, description = "Rule created or updated")))]
pub async fn upsert_rule(State(state): State<AppState>, Json(rule): Json<Rule>) -> GatewayResult<Json<Rule>> {
    state.config.upsert_rule(rule.clone()).await?;
    Ok(Json(rule))
}

#[utoipa::path(get, path = "/api/rule/{name}", tag = "admin",
    params(("name" = Uuid, Path, description = "Rule uuid")),
    responses((status = 200, description = "A single rule", body = Rule)))]
pub async fn get_rule(State(state): State<AppState>, Path(name): Path<Uuid>) -> GatewayResult<Json<Rule>> {
    state
        .config
        .list_rules(None)
        .into_iter()
        .find(|r| r.uuid == name)
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("no rule {name}")))
}

#[utoipa::path(delete, path = "/api/rule/{name}", tag = "admin",
    params(("name" = Uuid, Path, description = "Rule uuid")),
    responses((status = 204, description = "Rule deleted")))]
pub async fn delete_rule(State(state): State<AppState>, Path(name): Path<Uuid>) -> GatewayResult<axum::http::StatusCode> {
    state.config.delete_rule(name).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> Rule {
        Rule {
            uuid: Uuid::new_v4(),
            scenario: "global".to_string(),
            request_model: "m".to_string(),
            response_model: "m".to_string(),
            active: true,
            services: vec![],
            smart_enabled: false,
            smart_routing: vec![],
            description: None,
        }
    }

    #[tokio::test]
    async fn get_rule_after_upsert_round_trips() {
        let (state, _dir) = AppState::new_test();
        let rule = sample_rule();
        upsert_rule(State(state.clone()), Json(rule.clone())).await.unwrap();

        let Json(fetched) = get_rule(State(state), Path(rule.uuid)).await.unwrap();
        assert_eq!(fetched.uuid, rule.uuid);
    }

    #[tokio::test]
    async fn get_rule_missing_is_not_found() {
        let (state, _dir) = AppState::new_test();
        let result = get_rule(State(state), Path(Uuid::new_v4())).await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_rule_removes_it() {
        let (state, _dir) = AppState::new_test();
        let rule = sample_rule();
        upsert_rule(State(state.clone()), Json(rule.clone())).await.unwrap();
        delete_rule(State(state.clone()), Path(rule.uuid)).await.unwrap();
        assert!(state.config.list_rules(None).is_empty());
    }
}
