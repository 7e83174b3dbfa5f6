//! Per-(endpoint, domain) outcome history and cooldown bookkeeping.
//!
//! Records are created lazily on first contact and reset rather than deleted.
//! Mutations are atomic per pair; a failure burst against one domain never
//! touches records for another.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core::classify::BanKind;
use crate::core::pool::EndpointId;
use crate::core::recovery::PairState;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairKey {
    pub endpoint: EndpointId,
    pub domain: String,
}

impl PairKey {
    pub fn new<D: Into<String>>(endpoint: EndpointId, domain: D) -> Self {
        Self {
            endpoint,
            domain: domain.into(),
        }
    }
}

/// How one endpoint performs against one specific domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairReputation {
    pub success: u64,
    pub failure: u64,
    pub consecutive_failures: u32,
    pub last_ban: Option<BanKind>,
    /// Eligibility suspended while now < deadline. Monotone non-decreasing
    /// until a success clears it.
    pub backoff_until_ms: Option<i64>,
    /// Cooldown re-entries since the last success.
    pub cooldown_count: u32,
    pub state: PairState,
    pub last_outcome_ms: Option<i64>,
}

impl Default for PairReputation {
    fn default() -> Self {
        Self {
            success: 0,
            failure: 0,
            consecutive_failures: 0,
            last_ban: None,
            backoff_until_ms: None,
            cooldown_count: 0,
            state: PairState::Healthy,
            last_outcome_ms: None,
        }
    }
}

impl PairReputation {
    /// Laplace-smoothed domain-scoped success rate in [0, 1].
    pub fn success_rate(&self) -> f64 {
        (self.success as f64 + 1.0) / ((self.success + self.failure) as f64 + 2.0)
    }

    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

#[derive(Debug, Default)]
pub struct ReputationTracker {
    inner: DashMap<PairKey, PairReputation>,
}

impl ReputationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the pair's record under its shard lock, creating the
    /// record on first contact. No I/O may happen inside `f`.
    pub fn with_pair_mut<R>(
        &self,
        endpoint: &EndpointId,
        domain: &str,
        f: impl FnOnce(&mut PairReputation) -> R,
    ) -> R {
        let key = PairKey::new(endpoint.clone(), domain);
        let mut entry = self.inner.entry(key).or_default();
        f(entry.value_mut())
    }

    /// Plain outcome bookkeeping: a success fully resets the pair, a failure
    /// bumps the consecutive counter and remembers the ban category.
    /// State-machine effects (cooldown, retirement) live in the recovery
    /// coordinator, which drives richer updates through `with_pair_mut`.
    pub fn record_outcome(
        &self,
        endpoint: &EndpointId,
        domain: &str,
        success: bool,
        category: Option<BanKind>,
        now_ms: i64,
    ) {
        self.with_pair_mut(endpoint, domain, |rep| {
            rep.last_outcome_ms = Some(now_ms);
            if success {
                rep.success = rep.success.saturating_add(1);
                rep.consecutive_failures = 0;
                rep.backoff_until_ms = None;
                rep.cooldown_count = 0;
                rep.state = PairState::Healthy;
            } else {
                rep.failure = rep.failure.saturating_add(1);
                rep.consecutive_failures = rep.consecutive_failures.saturating_add(1);
                if let Some(kind) = category {
                    rep.last_ban = Some(kind);
                }
            }
        });
    }

    /// Raise the pair's backoff deadline, clamped so it never moves backwards.
    pub fn raise_backoff(&self, endpoint: &EndpointId, domain: &str, deadline_ms: i64) -> i64 {
        self.with_pair_mut(endpoint, domain, |rep| {
            let clamped = rep.backoff_until_ms.map_or(deadline_ms, |d| d.max(deadline_ms));
            rep.backoff_until_ms = Some(clamped);
            clamped
        })
    }

    /// False while the pair is retired or inside its backoff window.
    pub fn is_available(&self, endpoint: &EndpointId, domain: &str, now_ms: i64) -> bool {
        let key = PairKey::new(endpoint.clone(), domain);
        match self.inner.get(&key) {
            None => true,
            Some(rep) => {
                if rep.state == PairState::Retired {
                    return false;
                }
                match rep.backoff_until_ms {
                    Some(deadline) => now_ms >= deadline,
                    None => true,
                }
            }
        }
    }

    pub fn backoff_deadline(&self, endpoint: &EndpointId, domain: &str) -> Option<i64> {
        let key = PairKey::new(endpoint.clone(), domain);
        self.inner.get(&key).and_then(|rep| rep.backoff_until_ms)
    }

    pub fn snapshot(&self, endpoint: &EndpointId, domain: &str) -> Option<PairReputation> {
        let key = PairKey::new(endpoint.clone(), domain);
        self.inner.get(&key).map(|rep| rep.clone())
    }

    /// Domain-scoped success rate; 0.5 (the smoothed prior) when the pair has
    /// never been seen.
    pub fn success_rate(&self, endpoint: &EndpointId, domain: &str) -> f64 {
        self.snapshot(endpoint, domain)
            .map(|rep| rep.success_rate())
            .unwrap_or(0.5)
    }

    /// Manual reset: the only way out of `Retired`. Returns whether the pair
    /// had a record.
    pub fn reset_pair(&self, endpoint: &EndpointId, domain: &str) -> bool {
        let key = PairKey::new(endpoint.clone(), domain);
        let existed = self.inner.remove(&key).is_some();
        if existed {
            tracing::info!(
                target = "reputation",
                endpoint = %endpoint,
                domain,
                "pair reputation manually reset"
            );
        }
        existed
    }

    pub fn snapshot_all(&self) -> Vec<(PairKey, PairReputation)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// (cooling, retired) pair counts for statistics.
    pub fn state_counts(&self) -> (usize, usize) {
        self.inner.iter().fold((0, 0), |(c, r), entry| {
            match entry.value().state {
                PairState::CoolingDown => (c + 1, r),
                PairState::Retired => (c, r + 1),
                _ => (c, r),
            }
        })
    }
}
