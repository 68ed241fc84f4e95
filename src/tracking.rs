//! Jaskier Shared Pattern — tracking
//! Tracking Middleware (spec.md §4.9, C9). The Proxy Engine hands this the
//! context it accumulated during `Select`/`Forward` — rule, service,
//! request/response model, stream flag — and this module is the single
//! place that turns that into a Stats Store update plus an audit entry.

use std::net::IpAddr;

use uuid::Uuid;

use crate::audit::{AuditEntry, AuditSink};
use crate::config::{ConfigStore, Service};
use crate::stats::StatsStore;

/// Everything the Proxy Engine knows about a request by the time it's
/// ready to finalize — mirrors the gin-context keys the spec describes.
pub struct RequestTrace {
    pub request_id: Uuid,
    pub client_ip: IpAddr,
    pub rule_uuid: Uuid,
    pub request_model: String,
    pub stream: bool,
}

/// On response finalize (or stream close): update the Stats Store, merge
/// the same counters into the Config Store's embedded `Service.stats` (so
/// the Load Balancer's usage-window decay sees real traffic, spec.md §4.6),
/// and forward a copy to the audit sink. `error` is `None` for a clean finish.
pub async fn record(
    config: &ConfigStore,
    stats: &StatsStore,
    audit: &AuditSink,
    trace: &RequestTrace,
    service: &Service,
    input_tokens: u64,
    output_tokens: u64,
    status: u16,
    duration_ms: u64,
    error: Option<&str>,
) {
    stats.update_from_service(service, input_tokens, output_tokens, error.is_some());

    let snapshot = config.snapshot();
    if let Some(rule) = snapshot.rules.iter().find(|r| r.uuid == trace.rule_uuid) {
        let current = rule
            .services
            .iter()
            .chain(rule.smart_routing.iter().flat_map(|sr| sr.services.iter()))
            .find(|s| s.key() == service.key())
            .map(|s| s.stats.clone())
            .unwrap_or_default();
        let mut updated = current;
        updated.record(input_tokens, output_tokens, error.is_some(), chrono::Utc::now());
        if let Err(e) = config.update_service_stats(trace.rule_uuid, service.key(), updated).await {
            tracing::warn!("tracking: failed to update balancer-visible stats: {e}");
        }
    }

    audit.emit(&AuditEntry {
        request_id: trace.request_id,
        user_id: None,
        client_ip: trace.client_ip.to_string(),
        rule_uuid: Some(trace.rule_uuid),
        service_key: Some(format!("{}/{}", service.provider_uuid, service.model)),
        status,
        duration_ms,
        tokens_in: input_tokens,
        tokens_out: output_tokens,
        error,
    });

    tracing::debug!(
        request_id = %trace.request_id, request_model = %trace.request_model, stream = trace.stream,
        tokens_in = input_tokens, tokens_out = output_tokens, "tracking: recorded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiStyle, ConfigStore, Rule};

    #[tokio::test]
    async fn record_updates_stats_and_does_not_panic_on_audit() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path()).unwrap();
        let stats = StatsStore::spawn(dir.path().to_path_buf());
        let audit = AuditSink::init(dir.path()).unwrap();

        let service = Service {
            provider_uuid: Uuid::new_v4(),
            model: "gpt-5".to_string(),
            weight: 1,
            active: true,
            time_window_seconds: 60,
            stats: Default::default(),
        };
        let _ = ApiStyle::OpenAi;

        let rule = Rule {
            uuid: Uuid::new_v4(),
            scenario: "global".to_string(),
            request_model: "gpt-5".to_string(),
            response_model: "gpt-5".to_string(),
            active: true,
            services: vec![service.clone()],
            smart_enabled: false,
            smart_routing: vec![],
            description: None,
        };
        config.upsert_rule(rule.clone()).await.unwrap();

        let trace = RequestTrace {
            request_id: Uuid::new_v4(),
            client_ip: "127.0.0.1".parse().unwrap(),
            rule_uuid: rule.uuid,
            request_model: "gpt-5".to_string(),
            stream: false,
        };

        record(&config, &stats, &audit, &trace, &service, 10, 20, 200, 5, None).await;

        let recorded = stats.get_stats(service.provider_uuid, &service.model).await;
        assert_eq!(recorded.requests_total, 1);
        assert_eq!(recorded.input_tokens_total, 10);
        assert_eq!(recorded.output_tokens_total, 20);

        let embedded = config
            .list_rules(None)
            .into_iter()
            .find(|r| r.uuid == rule.uuid)
            .unwrap()
            .services[0]
            .stats
            .clone();
        assert_eq!(embedded.requests_total, 1);
        assert_eq!(embedded.input_tokens_total, 10);
    }
}
