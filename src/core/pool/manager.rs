//! Pool facade tying the stores, classifier, selector and recovery machine
//! together behind the `select` / `report` contract.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::classify::{BanClassifier, BanEvent, BanKind, Rule, Signals, Verdict};
use crate::core::errors::EngineError;
use crate::core::recovery::RecoveryCoordinator;
use crate::core::reputation::{BanEventStore, ReputationTracker};
use crate::core::select::{
    adaptive::{train_logistic, ModelHandle, ModelSnapshot, TrainingExample},
    Candidate, Selection, SelectionRequest, Selector,
};
use crate::core::util::current_epoch_ms;

use super::config::EngineConfig;
use super::endpoint::{Endpoint, EndpointId};
use super::events;
use super::health::{EndpointStatus, HealthStore, Outcome};

/// Read-only aggregate view over the whole pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatistics {
    pub total_endpoints: usize,
    pub endpoints_by_kind: BTreeMap<String, usize>,
    pub total_success: u64,
    pub total_failure: u64,
    pub overall_success_rate: f64,
    pub total_cost: f64,
    pub cooling_pairs: usize,
    pub retired_pairs: usize,
    pub ban_events: usize,
    pub model_version: u64,
}

pub struct ProxyPool {
    config: Arc<EngineConfig>,
    endpoints: RwLock<BTreeMap<EndpointId, Arc<Endpoint>>>,
    health: Arc<HealthStore>,
    reputation: Arc<ReputationTracker>,
    classifier: RwLock<BanClassifier>,
    recovery: RecoveryCoordinator,
    selector: Selector,
    history: BanEventStore,
    model: ModelHandle,
    total_cost: Mutex<f64>,
}

impl ProxyPool {
    pub fn new(config: EngineConfig, endpoints: Vec<Endpoint>) -> Self {
        let history =
            BanEventStore::in_memory(config.ban_history_capacity, config.ban_history_window_ms);
        Self::with_ban_history(config, endpoints, history)
    }

    /// Construct with a caller-provided ban history store, e.g. a persistent
    /// one when durability across restarts is wanted.
    pub fn with_ban_history(
        config: EngineConfig,
        endpoints: Vec<Endpoint>,
        history: BanEventStore,
    ) -> Self {
        let config = Arc::new(config);
        let health = Arc::new(HealthStore::new(config.latency_smoothing));
        let reputation = Arc::new(ReputationTracker::new());
        let recovery = RecoveryCoordinator::new(Arc::clone(&config), Arc::clone(&reputation));

        let mut registry = BTreeMap::new();
        for endpoint in endpoints {
            health.register(endpoint.id.clone());
            registry.insert(endpoint.id.clone(), Arc::new(endpoint));
        }
        tracing::info!(target = "pool", count = registry.len(), "endpoint pool loaded");

        Self {
            config,
            endpoints: RwLock::new(registry),
            health,
            reputation,
            classifier: RwLock::new(BanClassifier::new()),
            recovery,
            selector: Selector::new(),
            history,
            model: ModelHandle::new(),
            total_cost: Mutex::new(0.0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn endpoint(&self, id: &EndpointId) -> Option<Arc<Endpoint>> {
        self.endpoints.read().ok()?.get(id).cloned()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Replace the endpoint inventory. Health records survive for endpoints
    /// that remain; records of removed endpoints are dropped.
    pub fn reload(&self, endpoints: Vec<Endpoint>) {
        let mut registry = BTreeMap::new();
        for endpoint in endpoints {
            self.health.register(endpoint.id.clone());
            registry.insert(endpoint.id.clone(), Arc::new(endpoint));
        }
        if let Ok(mut guard) = self.endpoints.write() {
            for id in guard.keys() {
                if !registry.contains_key(id) {
                    self.health.deregister(id);
                }
            }
            *guard = registry;
            events::emit_endpoints_reloaded(guard.len());
        }
    }

    /// Register a custom classification rule, evaluated before the defaults.
    pub fn register_rule(&self, rule: Rule) {
        if let Ok(mut classifier) = self.classifier.write() {
            classifier.register_rule(rule);
        }
    }

    /// Pick one eligible endpoint for the request, or fail with
    /// `NoEligibleEndpoint`. Never mutates health or reputation state and
    /// never blocks on anything but per-key snapshot reads.
    pub fn select(&self, request: &SelectionRequest) -> Result<Selection, EngineError> {
        let now_ms = current_epoch_ms();
        let candidates = self.eligible_candidates(request, now_ms);
        let model = self.model.load();
        self.selector
            .choose(request, candidates, &model, now_ms, &mut rand::thread_rng())
            .map_err(|err| {
                if matches!(err, EngineError::NoEligibleEndpoint { .. }) {
                    events::emit_selection_exhausted(&request.domain, request.strategy);
                }
                err
            })
    }

    fn eligible_candidates(&self, request: &SelectionRequest, now_ms: i64) -> Vec<Candidate> {
        let registry = match self.endpoints.read() {
            Ok(guard) => guard.values().cloned().collect::<Vec<_>>(),
            Err(_) => return Vec::new(),
        };

        registry
            .into_iter()
            .filter(|endpoint| {
                request
                    .required_kind
                    .map(|kind| endpoint.kind == kind)
                    .unwrap_or(true)
                    && endpoint.satisfies_tags(&request.required_tags)
            })
            .filter_map(|endpoint| {
                let health = self.health.snapshot(&endpoint.id)?;
                if health.status != EndpointStatus::Active {
                    return None;
                }
                if !self
                    .reputation
                    .is_available(&endpoint.id, &request.domain, now_ms)
                {
                    return None;
                }
                let reputation = self.reputation.snapshot(&endpoint.id, &request.domain);
                Some(Candidate {
                    endpoint,
                    health,
                    reputation,
                })
            })
            .collect()
    }

    /// Report the outcome of one attempt performed through `id` against
    /// `domain`. Outcomes for unknown endpoints are logged and dropped; they
    /// never surface into the caller's path.
    pub fn report(
        &self,
        id: &EndpointId,
        domain: &str,
        outcome: Outcome,
        latency_ms: Option<u32>,
        signals: Option<&Signals>,
    ) {
        let now_ms = current_epoch_ms();
        let Some(endpoint) = self.endpoint(id) else {
            tracing::warn!(
                target = "pool",
                endpoint = %id,
                domain,
                "outcome reported for unknown endpoint, dropped"
            );
            return;
        };
        if let Err(err) = self.health.record(id, outcome, latency_ms, now_ms) {
            tracing::warn!(target = "pool", error = %err, "health record update failed");
            return;
        }
        if let Ok(mut cost) = self.total_cost.lock() {
            *cost += endpoint.cost_per_request;
        }

        match outcome {
            Outcome::Success => self.recovery.apply_success_at(id, domain, now_ms),
            Outcome::Failure => {
                let verdict = self.classify(signals);
                if let Some(v) = verdict.filter(|v| v.kind != BanKind::Unknown) {
                    events::emit_ban_detected(id, domain, v.kind, v.confidence);
                    let event = BanEvent {
                        id: Uuid::new_v4(),
                        at_ms: now_ms,
                        endpoint: id.clone(),
                        domain: domain.to_string(),
                        signals: signals.cloned().unwrap_or_default(),
                        kind: v.kind,
                        confidence: v.confidence,
                    };
                    if let Err(err) = self.history.push(event) {
                        tracing::warn!(target = "pool", error = %err, "ban history append failed");
                    }
                }
                self.recovery.apply_failure_at(
                    id,
                    domain,
                    verdict.as_ref(),
                    now_ms,
                    &mut rand::thread_rng(),
                );
            }
        }
    }

    fn classify(&self, signals: Option<&Signals>) -> Option<Verdict> {
        let signals = signals?;
        match self.classifier.read() {
            Ok(classifier) => Some(classifier.classify(signals)),
            Err(_) => None,
        }
    }

    pub fn is_available(&self, id: &EndpointId, domain: &str) -> bool {
        self.reputation.is_available(id, domain, current_epoch_ms())
    }

    pub fn backoff_deadline(&self, id: &EndpointId, domain: &str) -> Option<i64> {
        self.reputation.backoff_deadline(id, domain)
    }

    /// Manual reset of one (endpoint, domain) pair; the only way out of
    /// retirement.
    pub fn reset_pair(&self, id: &EndpointId, domain: &str) -> bool {
        self.reputation.reset_pair(id, domain)
    }

    /// Lifecycle control for the external health-check process.
    pub fn set_endpoint_status(
        &self,
        id: &EndpointId,
        status: EndpointStatus,
    ) -> Result<(), EngineError> {
        let previous = self.health.set_status(id, status)?;
        if previous != status {
            events::emit_endpoint_status_changed(id, previous, status);
        }
        Ok(())
    }

    pub fn health_snapshot(&self, id: &EndpointId) -> Option<super::health::HealthRecord> {
        self.health.snapshot(id)
    }

    pub fn reputation(&self) -> &ReputationTracker {
        &self.reputation
    }

    pub fn ban_events(&self) -> Vec<BanEvent> {
        self.history.snapshot()
    }

    pub fn model_snapshot(&self) -> Arc<ModelSnapshot> {
        self.model.load()
    }

    /// Periodic out-of-band training entry point. Selection keeps serving the
    /// previous snapshot while this runs; a failed run keeps the last
    /// known-good model and reports the error to the operator.
    pub fn train_adaptive(&self) -> Result<()> {
        let now_ms = current_epoch_ms();
        let examples = self.training_examples(now_ms);
        let previous = self.model.load();
        match train_logistic(
            &examples,
            self.config.training_learning_rate,
            self.config.training_epochs,
            self.config.min_training_samples,
            &previous,
            now_ms,
        ) {
            Ok(snapshot) => {
                events::emit_model_swapped(snapshot.version, snapshot.samples);
                self.model.store(snapshot);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    target = "pool",
                    error = %err,
                    "adaptive training failed, keeping last known-good model"
                );
                Err(err)
            }
        }
    }

    /// Build the training set from accumulated pair outcomes plus the recent
    /// ban window. Each observed pair yields one example labeled by whether
    /// it mostly works; each retained ban event adds a negative example.
    fn training_examples(&self, now_ms: i64) -> Vec<TrainingExample> {
        let mut examples = Vec::new();
        for (key, rep) in self.reputation.snapshot_all() {
            if rep.total() == 0 {
                continue;
            }
            let Some(endpoint) = self.endpoint(&key.endpoint) else {
                continue;
            };
            let Some(health) = self.health.snapshot(&key.endpoint) else {
                continue;
            };
            let candidate = Candidate {
                endpoint,
                health,
                reputation: Some(rep.clone()),
            };
            examples.push(TrainingExample {
                features: candidate.training_features(now_ms),
                label: if rep.success_rate() >= 0.5 { 1.0 } else { 0.0 },
            });
        }
        for event in self.history.snapshot() {
            let Some(endpoint) = self.endpoint(&event.endpoint) else {
                continue;
            };
            let Some(health) = self.health.snapshot(&event.endpoint) else {
                continue;
            };
            let reputation = self.reputation.snapshot(&event.endpoint, &event.domain);
            let candidate = Candidate {
                endpoint,
                health,
                reputation,
            };
            examples.push(TrainingExample {
                features: candidate.training_features(now_ms),
                label: 0.0,
            });
        }
        examples
    }

    pub fn statistics(&self) -> PoolStatistics {
        let mut endpoints_by_kind = BTreeMap::new();
        let total_endpoints = match self.endpoints.read() {
            Ok(guard) => {
                for endpoint in guard.values() {
                    *endpoints_by_kind
                        .entry(endpoint.kind.to_string())
                        .or_insert(0) += 1;
                }
                guard.len()
            }
            Err(_) => 0,
        };
        let (total_success, total_failure) = self.health.totals();
        let attempts = total_success + total_failure;
        let overall_success_rate = if attempts > 0 {
            total_success as f64 / attempts as f64
        } else {
            0.0
        };
        let (cooling_pairs, retired_pairs) = self.reputation.state_counts();
        PoolStatistics {
            total_endpoints,
            endpoints_by_kind,
            total_success,
            total_failure,
            overall_success_rate,
            total_cost: self.total_cost.lock().map(|c| *c).unwrap_or(0.0),
            cooling_pairs,
            retired_pairs,
            ban_events: self.history.len(),
            model_version: self.model.load().version,
        }
    }
}
