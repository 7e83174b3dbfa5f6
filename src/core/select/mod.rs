//! Selection policy engine.
//!
//! Given a request and a candidate set the engine applies a fixed pipeline:
//! filter, score under the requested strategy, select. Selection is read-only
//! over health and reputation state; the only mutable piece is the per-domain
//! round-robin cursor, which is private to the selector.

pub mod adaptive;

pub use adaptive::{ModelHandle, ModelSnapshot, TrainingExample};

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::errors::EngineError;
use super::pool::{Endpoint, EndpointKind, HealthRecord};
use super::reputation::PairReputation;

use adaptive::Features;

/// Candidate ranking strategy, selectable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    #[default]
    WeightedRandom,
    LeastUsed,
    Adaptive,
    GeoTargeted,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::WeightedRandom => "weighted_random",
            Strategy::LeastUsed => "least_used",
            Strategy::Adaptive => "adaptive",
            Strategy::GeoTargeted => "geo_targeted",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selection request. Ephemeral; never persisted.
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest {
    pub domain: String,
    pub strategy: Strategy,
    pub required_tags: BTreeSet<String>,
    pub required_kind: Option<EndpointKind>,
    /// Requested geography; scored by `geo_targeted`, ignored by the filter.
    pub geo: Option<String>,
    /// Caller-supplied deadline (epoch ms). Selection answers synchronously,
    /// so this is carried for the caller's own bookkeeping; timeouts are
    /// enforced around the call, not inside it.
    pub deadline_ms: Option<i64>,
}

impl SelectionRequest {
    pub fn new<D: Into<String>>(domain: D) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_kind(mut self, kind: EndpointKind) -> Self {
        self.required_kind = Some(kind);
        self
    }

    pub fn with_geo<S: Into<String>>(mut self, geo: S) -> Self {
        self.geo = Some(geo.into());
        self
    }

    pub fn with_deadline(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A filtered candidate with the state snapshots scoring needs.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub endpoint: Arc<Endpoint>,
    pub health: HealthRecord,
    pub reputation: Option<PairReputation>,
}

impl Candidate {
    /// Laplace-smoothed domain-scoped success rate; the 0.5 prior applies to
    /// pairs that have never been tried.
    fn domain_rate(&self) -> f64 {
        self.reputation
            .as_ref()
            .map(|rep| rep.success_rate())
            .unwrap_or(0.5)
    }

    /// Features with the neutral geography match, for training examples that
    /// must transfer to any request.
    pub fn training_features(&self, now_ms: i64) -> Features {
        self.features(None, now_ms)
    }

    fn features(&self, requested_geo: Option<&str>, now_ms: i64) -> Features {
        let latency_norm = self
            .health
            .latency_ema_ms
            .map(|ema| (ema / 2_000.0).min(1.0))
            .unwrap_or(0.5);
        let kind_weight = match self.endpoint.kind {
            EndpointKind::Residential => 1.0,
            EndpointKind::Static => 0.75,
            EndpointKind::Mobile => 0.5,
            EndpointKind::Datacenter => 0.25,
        };
        let geo_match = if self.endpoint.matches_geo(requested_geo) {
            1.0
        } else {
            0.0
        };
        let recency = self
            .health
            .last_used_ms
            .map(|used| {
                let idle_ms = now_ms.saturating_sub(used).max(0) as f64;
                (idle_ms / 3_600_000.0).min(1.0)
            })
            .unwrap_or(1.0);
        [
            self.domain_rate(),
            self.health.success_rate(),
            latency_norm,
            kind_weight,
            geo_match,
            recency,
        ]
    }
}

/// The outcome of a selection: one endpoint plus how it was chosen.
#[derive(Debug, Clone)]
pub struct Selection {
    pub endpoint: Arc<Endpoint>,
    pub strategy: Strategy,
    pub score: f64,
}

/// Strategy execution over an already-filtered candidate set.
#[derive(Debug, Default)]
pub struct Selector {
    /// Per-domain round-robin cursors. Selector-private; health and
    /// reputation state is never written from the selection path.
    cursors: DashMap<String, usize>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choose(
        &self,
        request: &SelectionRequest,
        mut candidates: Vec<Candidate>,
        model: &ModelSnapshot,
        now_ms: i64,
        rng: &mut impl Rng,
    ) -> Result<Selection, EngineError> {
        if candidates.is_empty() {
            return Err(EngineError::NoEligibleEndpoint {
                domain: request.domain.clone(),
            });
        }
        // Stable base order so every tie-break is reproducible.
        candidates.sort_by(|a, b| a.endpoint.id.cmp(&b.endpoint.id));

        let selection = match request.strategy {
            Strategy::RoundRobin => self.round_robin(&request.domain, &candidates),
            Strategy::WeightedRandom => Self::weighted_random(&candidates, rng),
            Strategy::LeastUsed => Self::least_used(&candidates),
            Strategy::Adaptive => Self::adaptive(&candidates, request, model, now_ms, rng),
            Strategy::GeoTargeted => Self::geo_targeted(&candidates, request, rng),
        };
        Ok(selection)
    }

    /// Stable cyclic rotation scoped to the domain.
    fn round_robin(&self, domain: &str, candidates: &[Candidate]) -> Selection {
        let index = {
            let mut cursor = self.cursors.entry(domain.to_string()).or_insert(0);
            let index = *cursor % candidates.len();
            *cursor = cursor.wrapping_add(1);
            index
        };
        let chosen = &candidates[index];
        Selection {
            endpoint: Arc::clone(&chosen.endpoint),
            strategy: Strategy::RoundRobin,
            score: chosen.domain_rate(),
        }
    }

    /// Weighted draw over domain-scoped success rates.
    fn weighted_random(candidates: &[Candidate], rng: &mut impl Rng) -> Selection {
        let weights: Vec<f64> = candidates.iter().map(Candidate::domain_rate).collect();
        let index = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            // Laplace smoothing keeps every weight positive, so this arm only
            // guards against pathological float input.
            Err(_) => 0,
        };
        let chosen = &candidates[index];
        Selection {
            endpoint: Arc::clone(&chosen.endpoint),
            strategy: Strategy::WeightedRandom,
            score: weights[index],
        }
    }

    /// Oldest last-used wins; endpoints never used rank first. Ties fall back
    /// to id order via the sorted base order.
    fn least_used(candidates: &[Candidate]) -> Selection {
        let mut best = 0;
        for (i, candidate) in candidates.iter().enumerate() {
            let current = candidate.health.last_used_ms.unwrap_or(i64::MIN);
            let incumbent = candidates[best].health.last_used_ms.unwrap_or(i64::MIN);
            if current < incumbent {
                best = i;
            }
        }
        let chosen = &candidates[best];
        let newest = candidates
            .iter()
            .filter_map(|c| c.health.last_used_ms)
            .max()
            .unwrap_or(0);
        let oldest = candidates
            .iter()
            .map(|c| c.health.last_used_ms.unwrap_or(i64::MIN))
            .min()
            .unwrap_or(0);
        let span = (newest - oldest).max(1) as f64;
        let score = chosen
            .health
            .last_used_ms
            .map(|used| ((newest - used) as f64 / span).clamp(0.0, 1.0))
            .unwrap_or(1.0);
        Selection {
            endpoint: Arc::clone(&chosen.endpoint),
            strategy: Strategy::LeastUsed,
            score,
        }
    }

    /// Model-scored argmax; ties resolve to the lowest id through the sorted
    /// base order. An untrained model degrades to a weighted draw rather than
    /// pretending its neutral scores mean anything.
    fn adaptive(
        candidates: &[Candidate],
        request: &SelectionRequest,
        model: &ModelSnapshot,
        now_ms: i64,
        rng: &mut impl Rng,
    ) -> Selection {
        if !model.is_trained() {
            let mut selection = Self::weighted_random(candidates, rng);
            selection.strategy = Strategy::Adaptive;
            return selection;
        }
        let mut best = 0;
        let mut best_score = f64::MIN;
        for (i, candidate) in candidates.iter().enumerate() {
            let score = model.score(&candidate.features(request.geo.as_deref(), now_ms));
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        Selection {
            endpoint: Arc::clone(&candidates[best].endpoint),
            strategy: Strategy::Adaptive,
            score: best_score,
        }
    }

    /// Geography match dominates; the matching group is then drawn from by
    /// domain success rate. With no matching endpoint the full set is used.
    fn geo_targeted(
        candidates: &[Candidate],
        request: &SelectionRequest,
        rng: &mut impl Rng,
    ) -> Selection {
        let matching: Vec<Candidate> = candidates
            .iter()
            .filter(|c| c.endpoint.matches_geo(request.geo.as_deref()))
            .cloned()
            .collect();
        let (pool, matched) = if matching.is_empty() {
            (candidates.to_vec(), false)
        } else {
            (matching, true)
        };
        let mut selection = Self::weighted_random(&pool, rng);
        selection.strategy = Strategy::GeoTargeted;
        selection.score = if matched { 1.0 } else { 0.0 };
        selection
    }
}
