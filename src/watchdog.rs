//! Jaskier Shared Pattern — watchdog
//! Background watchdog: periodically checks provider reachability and logs
//! rate-limiter pressure for external monitoring. Auto-recovery is limited
//! to what the core owns — config hot-reload already happens via the
//! Config Store's watch channel, so there's no cache to refresh here.

use std::time::Duration;

use crate::state::AppState;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);
const PROVIDER_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("watchdog: started (interval={}s)", CHECK_INTERVAL.as_secs());

        loop {
            tokio::time::sleep(CHECK_INTERVAL).await;

            let unreachable = check_providers(&state).await;
            let rl_stats = state.rate_limiter.stats();

            if unreachable.is_empty() {
                tracing::debug!("watchdog: all providers reachable, {} IPs blocked", rl_stats.currently_blocked);
            } else {
                tracing::warn!("watchdog: unreachable providers: {}", unreachable.join(", "));
            }
        }
    })
}

/// HEAD each enabled provider's `api_base`. Any response (even 4xx) counts
/// as reachable; only connection failures and timeouts are flagged.
async fn check_providers(state: &AppState) -> Vec<String> {
    let providers = state.config.list_providers();
    let mut unreachable = Vec::new();

    for provider in providers.iter().filter(|p| p.enabled) {
        let result = tokio::time::timeout(PROVIDER_CHECK_TIMEOUT, state.http_client.head(&provider.api_base).send()).await;

        match result {
            Ok(Ok(resp)) if resp.status().as_u16() < 500 => {}
            Ok(Ok(resp)) => {
                tracing::warn!("watchdog: provider {} returned server error {}", provider.name, resp.status());
                unreachable.push(provider.name.clone());
            }
            Ok(Err(e)) => {
                tracing::error!("watchdog: provider {} unreachable: {e}", provider.name);
                unreachable.push(provider.name.clone());
            }
            Err(_) => {
                tracing::error!("watchdog: provider {} check timed out after {}s", provider.name, PROVIDER_CHECK_TIMEOUT.as_secs());
                unreachable.push(provider.name.clone());
            }
        }
    }

    unreachable
}
