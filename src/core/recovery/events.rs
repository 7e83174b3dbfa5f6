//! Recovery event emission helpers: structured event plus tracing line.

use crate::core::pool::EndpointId;
use crate::events::structured::{publish_global, Event, RecoveryEvent};

pub fn emit_pair_degraded(endpoint: &EndpointId, domain: &str, consecutive_failures: u32) {
    tracing::debug!(
        target = "recovery",
        endpoint = %endpoint,
        domain,
        consecutive_failures,
        "pair degraded"
    );
    publish_global(Event::Recovery(RecoveryEvent::PairDegraded {
        endpoint: endpoint.to_string(),
        domain: domain.to_string(),
        consecutive_failures,
    }));
}

pub fn emit_pair_cooling_down(
    endpoint: &EndpointId,
    domain: &str,
    deadline_ms: i64,
    cooldown_count: u32,
) {
    tracing::warn!(
        target = "recovery",
        endpoint = %endpoint,
        domain,
        deadline_ms,
        cooldown_count,
        "pair cooling down"
    );
    publish_global(Event::Recovery(RecoveryEvent::PairCoolingDown {
        endpoint: endpoint.to_string(),
        domain: domain.to_string(),
        deadline_ms,
        cooldown_count,
    }));
}

pub fn emit_pair_retired(endpoint: &EndpointId, domain: &str, cooldown_count: u32) {
    tracing::warn!(
        target = "recovery",
        endpoint = %endpoint,
        domain,
        cooldown_count,
        "pair retired pending manual reset"
    );
    publish_global(Event::Recovery(RecoveryEvent::PairRetired {
        endpoint: endpoint.to_string(),
        domain: domain.to_string(),
        cooldown_count,
    }));
}

pub fn emit_pair_recovered(endpoint: &EndpointId, domain: &str) {
    tracing::info!(
        target = "recovery",
        endpoint = %endpoint,
        domain,
        "pair recovered"
    );
    publish_global(Event::Recovery(RecoveryEvent::PairRecovered {
        endpoint: endpoint.to_string(),
        domain: domain.to_string(),
    }));
}
