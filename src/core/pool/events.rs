//! Pool event emission helpers: structured event plus tracing line.

use crate::core::classify::BanKind;
use crate::core::pool::{EndpointId, EndpointStatus};
use crate::core::select::Strategy;
use crate::events::structured::{publish_global, ClassifierEvent, Event, PoolEvent};

pub fn emit_endpoint_status_changed(
    id: &EndpointId,
    previous: EndpointStatus,
    current: EndpointStatus,
) {
    tracing::info!(
        target = "pool",
        endpoint = %id,
        previous = %previous,
        current = %current,
        "endpoint status changed"
    );
    publish_global(Event::Pool(PoolEvent::EndpointStatusChanged {
        id: id.to_string(),
        previous: previous.to_string(),
        current: current.to_string(),
    }));
}

pub fn emit_endpoints_reloaded(count: usize) {
    tracing::info!(target = "pool", count, "endpoint inventory reloaded");
    publish_global(Event::Pool(PoolEvent::EndpointsReloaded { count }));
}

pub fn emit_selection_exhausted(domain: &str, strategy: Strategy) {
    tracing::warn!(
        target = "pool",
        domain,
        strategy = %strategy,
        "no eligible endpoint"
    );
    publish_global(Event::Pool(PoolEvent::SelectionExhausted {
        domain: domain.to_string(),
        strategy: strategy.as_str().to_string(),
    }));
}

pub fn emit_model_swapped(version: u64, samples: usize) {
    tracing::info!(target = "pool", version, samples, "adaptive model swapped");
    publish_global(Event::Pool(PoolEvent::ModelSwapped { version, samples }));
}

pub fn emit_ban_detected(endpoint: &EndpointId, domain: &str, kind: BanKind, confidence: f64) {
    tracing::warn!(
        target = "classify",
        endpoint = %endpoint,
        domain,
        category = %kind,
        confidence,
        "ban detected"
    );
    publish_global(Event::Classifier(ClassifierEvent::BanDetected {
        endpoint: endpoint.to_string(),
        domain: domain.to_string(),
        category: kind.as_str().to_string(),
        confidence,
    }));
}
