//! Thread-safe source of truth for per-endpoint aggregate statistics.
//!
//! Updates are atomic per endpoint; different endpoints never contend on a
//! shared lock, and no I/O happens while a shard guard is held.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

use super::endpoint::EndpointId;

/// Outcome of one request attempt through an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// Endpoint lifecycle status. `Disabled` is set by an external health-check
/// process and overrides all per-domain states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EndpointStatus {
    #[default]
    Active,
    CoolingDown,
    Disabled,
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::CoolingDown => write!(f, "coolingDown"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Mutable runtime state for one endpoint, independent of target domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub success: u64,
    pub failure: u64,
    /// Exponential moving average of observed latency, milliseconds.
    pub latency_ema_ms: Option<f64>,
    pub last_used_ms: Option<i64>,
    pub status: EndpointStatus,
}

impl HealthRecord {
    /// Laplace-smoothed global success rate in [0, 1].
    pub fn success_rate(&self) -> f64 {
        (self.success as f64 + 1.0) / ((self.success + self.failure) as f64 + 2.0)
    }

    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

#[derive(Debug)]
pub struct HealthStore {
    inner: DashMap<EndpointId, HealthRecord>,
    smoothing: f64,
}

impl HealthStore {
    pub fn new(smoothing: f64) -> Self {
        let smoothing = if smoothing.is_nan() {
            tracing::warn!(target = "health", "latency smoothing is NaN, using 0.2");
            0.2
        } else {
            smoothing.clamp(0.0, 1.0)
        };
        Self {
            inner: DashMap::new(),
            smoothing,
        }
    }

    /// Create a tracking record for an endpoint. Idempotent; an existing
    /// record keeps its counters across reloads.
    pub fn register(&self, id: EndpointId) {
        self.inner.entry(id).or_default();
    }

    pub fn deregister(&self, id: &EndpointId) {
        self.inner.remove(id);
    }

    pub fn contains(&self, id: &EndpointId) -> bool {
        self.inner.contains_key(id)
    }

    /// Fold one outcome into the endpoint's aggregate statistics.
    pub fn record(
        &self,
        id: &EndpointId,
        outcome: Outcome,
        latency_ms: Option<u32>,
        now_ms: i64,
    ) -> Result<(), EngineError> {
        let mut record = self
            .inner
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownEndpoint(id.clone()))?;
        match outcome {
            Outcome::Success => record.success = record.success.saturating_add(1),
            Outcome::Failure => record.failure = record.failure.saturating_add(1),
        }
        if let Some(sample) = latency_ms {
            let sample = f64::from(sample);
            record.latency_ema_ms = Some(match record.latency_ema_ms {
                Some(ema) => self.smoothing * sample + (1.0 - self.smoothing) * ema,
                None => sample,
            });
        }
        record.last_used_ms = Some(now_ms);
        Ok(())
    }

    /// Consistent copy of one record; never observes a mid-mutation state.
    pub fn snapshot(&self, id: &EndpointId) -> Option<HealthRecord> {
        self.inner.get(id).map(|r| r.clone())
    }

    /// Endpoints whose status is not `Disabled`.
    pub fn list_active(&self) -> Vec<EndpointId> {
        self.inner
            .iter()
            .filter(|entry| entry.value().status != EndpointStatus::Disabled)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Set lifecycle status, returning the previous value.
    pub fn set_status(
        &self,
        id: &EndpointId,
        status: EndpointStatus,
    ) -> Result<EndpointStatus, EngineError> {
        let mut record = self
            .inner
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownEndpoint(id.clone()))?;
        let previous = record.status;
        record.status = status;
        Ok(previous)
    }

    /// Aggregate success/failure across all endpoints.
    pub fn totals(&self) -> (u64, u64) {
        self.inner.iter().fold((0, 0), |(s, f), entry| {
            (s + entry.value().success, f + entry.value().failure)
        })
    }
}
