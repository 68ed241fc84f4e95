//! Jaskier Shared Pattern — balancer
//! Weighted-window selection (spec.md §4.6, C5): candidates are weighted by
//! configured `weight`, de-prioritized by recent token usage, and picked by
//! weighted-random with a deterministic fallback ordering.

use std::collections::HashSet;

use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{Rule, Service};
use crate::error::{GatewayError, GatewayResult};

/// Fixed reference point for `decay`; only needs to be consistent across
/// services, not tied to any real token budget.
const CAPACITY_HINT: f64 = 1_000_000.0;

pub struct Selection {
    pub service: Service,
    pub ordered_fallbacks: Vec<Service>,
}

/// Select a service from `rule`'s candidates, honoring `smart_routing` and
/// excluding anything in `failed` (previously attempted this request).
pub fn select(
    rule: &Rule,
    request_body: &Value,
    failed: &HashSet<(Uuid, String)>,
    provider_enabled: &dyn Fn(Uuid) -> bool,
    flags: &dyn Fn(&str) -> bool,
    now: chrono::DateTime<chrono::Utc>,
) -> GatewayResult<Selection> {
    let base = rule.candidate_services(request_body, flags);

    let mut candidates: Vec<Service> = base
        .iter()
        .filter(|s| s.active)
        .filter(|s| provider_enabled(s.provider_uuid))
        .filter(|s| !failed.contains(&s.key()))
        .cloned()
        .collect();

    if candidates.is_empty() {
        return Err(GatewayError::NoUpstreamAvailable);
    }

    let weights: Vec<f64> = candidates
        .iter_mut()
        .map(|s| {
            let usage = s.stats.usage_in_window(s.time_window_seconds, now) as f64;
            let decay = 1.0 / (1.0 + usage / CAPACITY_HINT);
            (s.weight.max(1) as f64) * decay
        })
        .collect();

    let total_weight: f64 = weights.iter().sum();

    let pick_index = if total_weight <= 0.0 {
        rand::rng().random_range(0..candidates.len())
    } else {
        let mut roll = rand::rng().random_range(0.0..total_weight);
        let mut idx = candidates.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if roll < *w {
                idx = i;
                break;
            }
            roll -= w;
        }
        idx
    };

    let chosen = candidates.remove(pick_index);
    let mut remaining_weights = weights;
    remaining_weights.remove(pick_index);

    let mut ranked: Vec<(Service, f64)> = candidates.into_iter().zip(remaining_weights).collect();
    ranked.sort_by(|(a, wa), (b, wb)| {
        wb.partial_cmp(wa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.stats.requests_total.cmp(&b.stats.requests_total))
    });

    Ok(Selection {
        service: chosen,
        ordered_fallbacks: ranked.into_iter().map(|(s, _)| s).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiStyle, AuthDetail, Rule, Stats};
    use serde_json::json;

    fn service(provider_uuid: Uuid, weight: u32) -> Service {
        Service {
            provider_uuid,
            model: "m".to_string(),
            weight,
            active: true,
            time_window_seconds: 3600,
            stats: Stats::default(),
        }
    }

    fn rule_with(services: Vec<Service>) -> Rule {
        Rule {
            uuid: Uuid::new_v4(),
            scenario: "global".to_string(),
            request_model: "gpt-4".to_string(),
            response_model: "gpt-4".to_string(),
            active: true,
            services,
            smart_enabled: false,
            smart_routing: vec![],
            description: None,
        }
    }

    fn always_enabled(_: Uuid) -> bool {
        true
    }
    fn no_flags(_: &str) -> bool {
        false
    }

    #[test]
    fn empty_candidates_yields_no_upstream_available() {
        let rule = rule_with(vec![]);
        let result = select(&rule, &json!({}), &HashSet::new(), &always_enabled, &no_flags, chrono::Utc::now());
        assert!(matches!(result, Err(GatewayError::NoUpstreamAvailable)));
    }

    #[test]
    fn single_candidate_is_always_selected() {
        let pid = Uuid::new_v4();
        let rule = rule_with(vec![service(pid, 5)]);
        let result = select(&rule, &json!({}), &HashSet::new(), &always_enabled, &no_flags, chrono::Utc::now()).unwrap();
        assert_eq!(result.service.provider_uuid, pid);
        assert!(result.ordered_fallbacks.is_empty());
    }

    #[test]
    fn excludes_failed_and_disabled_services() {
        let pid_a = Uuid::new_v4();
        let pid_b = Uuid::new_v4();
        let rule = rule_with(vec![service(pid_a, 1), service(pid_b, 1)]);
        let mut failed = HashSet::new();
        failed.insert((pid_a, "m".to_string()));
        let result = select(&rule, &json!({}), &failed, &always_enabled, &no_flags, chrono::Utc::now()).unwrap();
        assert_eq!(result.service.provider_uuid, pid_b);
    }

    #[test]
    fn disabled_provider_is_excluded() {
        let pid_a = Uuid::new_v4();
        let pid_b = Uuid::new_v4();
        let rule = rule_with(vec![service(pid_a, 1), service(pid_b, 1)]);
        let enabled = move |id: Uuid| id != pid_a;
        let result = select(&rule, &json!({}), &HashSet::new(), &enabled, &no_flags, chrono::Utc::now()).unwrap();
        assert_eq!(result.service.provider_uuid, pid_b);
    }

    #[test]
    fn zero_weight_services_still_selectable() {
        let pid = Uuid::new_v4();
        let rule = rule_with(vec![service(pid, 0)]);
        let result = select(&rule, &json!({}), &HashSet::new(), &always_enabled, &no_flags, chrono::Utc::now());
        assert!(result.is_ok());
    }

    #[test]
    fn smart_routing_predicate_overrides_base_services() {
        use crate::config::SmartRoute;
        let pid_base = Uuid::new_v4();
        let pid_smart = Uuid::new_v4();
        let mut rule = rule_with(vec![service(pid_base, 1)]);
        rule.smart_enabled = true;
        rule.smart_routing = vec![SmartRoute {
            predicate: r#"model == "gpt-4""#.to_string(),
            services: vec![service(pid_smart, 1)],
        }];

        let body = json!({"model": "gpt-4"});
        let result = select(&rule, &body, &HashSet::new(), &always_enabled, &no_flags, chrono::Utc::now()).unwrap();
        assert_eq!(result.service.provider_uuid, pid_smart);
    }

    #[test]
    fn fallbacks_are_sorted_by_descending_effective_weight() {
        let pid_a = Uuid::new_v4();
        let pid_b = Uuid::new_v4();
        let pid_c = Uuid::new_v4();
        let services = vec![service(pid_a, 1), service(pid_b, 100), service(pid_c, 50)];
        let rule = rule_with(services);
        let result = select(&rule, &json!({}), &HashSet::new(), &always_enabled, &no_flags, chrono::Utc::now()).unwrap();

        let mut combined: Vec<Uuid> = vec![result.service.provider_uuid];
        combined.extend(result.ordered_fallbacks.iter().map(|s| s.provider_uuid));
        assert_eq!(combined.len(), 3);
        assert!(result.ordered_fallbacks.len() <= 2);
    }
}
