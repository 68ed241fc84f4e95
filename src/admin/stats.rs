//! Jaskier Shared Pattern — admin::stats
//! `GET /admin/stats` — per-service usage counters (spec.md §6, §3 "Stats").

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Stats;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceStatsEntry {
    pub provider_uuid: Uuid,
    pub model: String,
    pub stats: Stats,
}

#[utoipa::path(get, path = "/admin/stats", tag = "admin",
    responses((status = 200, description = "Usage counters for every tracked provider/model pair", body = [ServiceStatsEntry])))]
pub async fn stats(State(state): State<AppState>) -> Json<Vec<ServiceStatsEntry>> {
    let all = state.stats.all_stats().await;
    let mut entries: Vec<ServiceStatsEntry> = all
        .into_iter()
        .map(|((provider_uuid, model), stats)| ServiceStatsEntry { provider_uuid, model, stats })
        .collect();
    entries.sort_by(|a, b| (a.provider_uuid, &a.model).cmp(&(b.provider_uuid, &b.model)));
    Json(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Service;

    #[tokio::test]
    async fn stats_reflects_recorded_usage() {
        let (state, _dir) = AppState::new_test();
        let provider_uuid = Uuid::new_v4();
        let service = Service {
            provider_uuid,
            model: "gpt-4".to_string(),
            weight: 1,
            active: true,
            time_window_seconds: 60,
            stats: Stats::default(),
        };
        state.stats.update_from_service(&service, 10, 5, false);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let Json(entries) = stats(State(state)).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].provider_uuid, provider_uuid);
        assert_eq!(entries[0].stats.requests_total, 1);
    }
}
