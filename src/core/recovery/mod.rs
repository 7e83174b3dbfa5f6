//! Cooldown, retry and retirement per (endpoint, domain) pair.
//!
//! The coordinator owns the state machine
//! `healthy → degraded → coolingDown → (healthy | retired)` and drives it
//! from reported outcomes. A success is always a full recovery; retirement
//! ends only with an explicit manual reset.

pub mod events;
mod state;

pub use state::PairState;

use std::sync::Arc;

use rand::Rng;

use crate::core::classify::{BanKind, Verdict};
use crate::core::pool::{EndpointId, EngineConfig};
use crate::core::reputation::{backoff_delay_ms, ReputationTracker};
use crate::core::util::current_epoch_ms;

/// Event-worthy effect of one failure application, decided under the pair
/// lock and emitted after it is released.
enum FailureEffect {
    None,
    Degraded(u32),
    CoolingDown { deadline_ms: i64, cooldown_count: u32 },
    Retired { cooldown_count: u32 },
}

pub struct RecoveryCoordinator {
    config: Arc<EngineConfig>,
    tracker: Arc<ReputationTracker>,
}

impl RecoveryCoordinator {
    pub fn new(config: Arc<EngineConfig>, tracker: Arc<ReputationTracker>) -> Self {
        Self { config, tracker }
    }

    pub fn tracker(&self) -> &ReputationTracker {
        &self.tracker
    }

    pub fn apply_success(&self, endpoint: &EndpointId, domain: &str) {
        self.apply_success_at(endpoint, domain, current_epoch_ms());
    }

    /// A success fully resets the pair: counters, deadline and cooldown count.
    /// A retired pair keeps its success counted but stays retired; only a
    /// manual reset revives it.
    pub fn apply_success_at(&self, endpoint: &EndpointId, domain: &str, now_ms: i64) {
        let recovered = self.tracker.with_pair_mut(endpoint, domain, |rep| {
            rep.success = rep.success.saturating_add(1);
            rep.last_outcome_ms = Some(now_ms);
            if rep.state == PairState::Retired {
                return false;
            }
            let was = rep.state;
            rep.consecutive_failures = 0;
            rep.backoff_until_ms = None;
            rep.cooldown_count = 0;
            rep.state = PairState::Healthy;
            was != PairState::Healthy
        });
        if recovered {
            events::emit_pair_recovered(endpoint, domain);
        }
    }

    pub fn apply_failure(
        &self,
        endpoint: &EndpointId,
        domain: &str,
        verdict: Option<&Verdict>,
    ) -> PairState {
        self.apply_failure_at(
            endpoint,
            domain,
            verdict,
            current_epoch_ms(),
            &mut rand::thread_rng(),
        )
    }

    /// Fold one failure into the pair state machine.
    ///
    /// A cooldown is entered when the failure carries a confident ban
    /// classification, or when consecutive failures reach the hard threshold.
    /// Each cooldown entry without an intervening success increments
    /// `cooldown_count`; past the ceiling the pair retires. An `unknown`
    /// verdict with zero confidence counts as a plain failure only.
    pub fn apply_failure_at(
        &self,
        endpoint: &EndpointId,
        domain: &str,
        verdict: Option<&Verdict>,
        now_ms: i64,
        rng: &mut impl Rng,
    ) -> PairState {
        let config = &self.config;
        let ban_trigger = verdict
            .map(|v| v.kind != BanKind::Unknown && v.confidence >= config.ban_confidence_threshold)
            .unwrap_or(false);

        let (state, effect) = self.tracker.with_pair_mut(endpoint, domain, |rep| {
            rep.failure = rep.failure.saturating_add(1);
            rep.consecutive_failures = rep.consecutive_failures.saturating_add(1);
            rep.last_outcome_ms = Some(now_ms);
            if let Some(v) = verdict {
                if v.kind != BanKind::Unknown {
                    rep.last_ban = Some(v.kind);
                }
            }

            if rep.state == PairState::Retired {
                return (PairState::Retired, FailureEffect::None);
            }

            let count_trigger = rep.consecutive_failures >= config.cooldown_failure_threshold;
            if ban_trigger || count_trigger {
                rep.cooldown_count = rep.cooldown_count.saturating_add(1);
                if rep.cooldown_count > config.retire_cooldown_ceiling {
                    debug_assert!(rep.state.can_transition_to(PairState::Retired));
                    rep.state = PairState::Retired;
                    (
                        PairState::Retired,
                        FailureEffect::Retired {
                            cooldown_count: rep.cooldown_count,
                        },
                    )
                } else {
                    // Jitter is a pure draw; nothing blocking happens while
                    // the pair entry is held.
                    let attempt = rep.cooldown_count - 1;
                    let delay = backoff_delay_ms(
                        config.base_backoff_ms,
                        attempt,
                        config.max_backoff_ms,
                        rng,
                    );
                    // Clamp so the deadline never moves backwards while set.
                    let candidate = now_ms.saturating_add(delay as i64);
                    let deadline = rep.backoff_until_ms.map_or(candidate, |d| d.max(candidate));
                    rep.backoff_until_ms = Some(deadline);
                    debug_assert!(rep.state.can_transition_to(PairState::CoolingDown));
                    rep.state = PairState::CoolingDown;
                    (
                        PairState::CoolingDown,
                        FailureEffect::CoolingDown {
                            deadline_ms: deadline,
                            cooldown_count: rep.cooldown_count,
                        },
                    )
                }
            } else if rep.state == PairState::Healthy
                && rep.consecutive_failures >= config.degraded_threshold
            {
                debug_assert!(rep.state.can_transition_to(PairState::Degraded));
                rep.state = PairState::Degraded;
                (
                    PairState::Degraded,
                    FailureEffect::Degraded(rep.consecutive_failures),
                )
            } else {
                (rep.state, FailureEffect::None)
            }
        });

        match effect {
            FailureEffect::None => {}
            FailureEffect::Degraded(consecutive) => {
                events::emit_pair_degraded(endpoint, domain, consecutive);
            }
            FailureEffect::CoolingDown {
                deadline_ms,
                cooldown_count,
            } => {
                events::emit_pair_cooling_down(endpoint, domain, deadline_ms, cooldown_count);
            }
            FailureEffect::Retired { cooldown_count } => {
                events::emit_pair_retired(endpoint, domain, cooldown_count);
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn coordinator(config: EngineConfig) -> RecoveryCoordinator {
        RecoveryCoordinator::new(Arc::new(config), Arc::new(ReputationTracker::new()))
    }

    fn id(s: &str) -> EndpointId {
        EndpointId::new(s)
    }

    #[test]
    fn degraded_after_three_plain_failures() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        assert_eq!(
            c.apply_failure_at(&e, "a.example", None, 1, &mut rng),
            PairState::Healthy
        );
        assert_eq!(
            c.apply_failure_at(&e, "a.example", None, 2, &mut rng),
            PairState::Healthy
        );
        assert_eq!(
            c.apply_failure_at(&e, "a.example", None, 3, &mut rng),
            PairState::Degraded
        );
    }

    #[test]
    fn five_plain_failures_force_cooldown() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        for n in 1..=4 {
            c.apply_failure_at(&e, "a.example", None, n, &mut rng);
        }
        let state = c.apply_failure_at(&e, "a.example", None, 5, &mut rng);
        assert_eq!(state, PairState::CoolingDown);
        assert!(!c.tracker().is_available(&e, "a.example", 6));
    }

    #[test]
    fn confident_ban_skips_straight_to_cooldown() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        let verdict = Verdict::new(BanKind::RateLimited, 0.95);
        let state = c.apply_failure_at(&e, "a.example", Some(&verdict), 1, &mut rng);
        assert_eq!(state, PairState::CoolingDown);
    }

    #[test]
    fn low_confidence_verdict_is_a_plain_failure() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        let verdict = Verdict::ambiguous();
        let state = c.apply_failure_at(&e, "a.example", Some(&verdict), 1, &mut rng);
        assert_eq!(state, PairState::Healthy);
        assert_eq!(
            c.tracker()
                .snapshot(&e, "a.example")
                .unwrap()
                .consecutive_failures,
            1
        );
    }

    #[test]
    fn cooldown_deadlines_are_monotone() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        let verdict = Verdict::new(BanKind::IpBlocked, 0.9);
        let mut previous = 0;
        // Repeated confident bans at the same instant must never shrink the
        // deadline, jitter notwithstanding.
        for _ in 0..5 {
            c.apply_failure_at(&e, "a.example", Some(&verdict), 100, &mut rng);
            let deadline = c.tracker().backoff_deadline(&e, "a.example").unwrap();
            assert!(deadline >= previous);
            previous = deadline;
        }
    }

    #[test]
    fn success_is_a_full_reset() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        let verdict = Verdict::new(BanKind::RateLimited, 0.95);
        c.apply_failure_at(&e, "a.example", Some(&verdict), 1, &mut rng);
        c.apply_success_at(&e, "a.example", 2);
        let rep = c.tracker().snapshot(&e, "a.example").unwrap();
        assert_eq!(rep.state, PairState::Healthy);
        assert_eq!(rep.consecutive_failures, 0);
        assert_eq!(rep.cooldown_count, 0);
        assert_eq!(rep.backoff_until_ms, None);
    }

    #[test]
    fn sixth_cooldown_entry_retires_the_pair() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        let verdict = Verdict::new(BanKind::RateLimited, 0.95);
        for n in 1..=5 {
            let state = c.apply_failure_at(&e, "a.example", Some(&verdict), n, &mut rng);
            assert_eq!(state, PairState::CoolingDown, "entry {n}");
        }
        let state = c.apply_failure_at(&e, "a.example", Some(&verdict), 6, &mut rng);
        assert_eq!(state, PairState::Retired);
        assert!(!c.tracker().is_available(&e, "a.example", i64::MAX));
    }

    #[test]
    fn retired_pair_ignores_further_outcomes() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        let verdict = Verdict::new(BanKind::RateLimited, 0.95);
        for n in 1..=6 {
            c.apply_failure_at(&e, "a.example", Some(&verdict), n, &mut rng);
        }
        c.apply_success_at(&e, "a.example", 7);
        assert_eq!(
            c.tracker().snapshot(&e, "a.example").unwrap().state,
            PairState::Retired
        );
        // Manual reset is the only way back.
        assert!(c.tracker().reset_pair(&e, "a.example"));
        assert!(c.tracker().is_available(&e, "a.example", 8));
    }

    #[test]
    fn domains_are_isolated() {
        let c = coordinator(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let e = id("e1");
        let verdict = Verdict::new(BanKind::RateLimited, 0.95);
        c.apply_failure_at(&e, "a.example", Some(&verdict), 1, &mut rng);
        assert!(!c.tracker().is_available(&e, "a.example", 2));
        assert!(c.tracker().is_available(&e, "b.example", 2));
    }
}
