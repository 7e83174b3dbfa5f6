//! End-to-end scenarios across select → report → recover.

use std::thread;
use std::time::Duration;

use egress_engine::core::classify::Signals;
use egress_engine::core::pool::{
    Endpoint, EndpointId, EndpointKind, EngineConfig, Outcome, ProxyPool,
};
use egress_engine::core::recovery::PairState;
use egress_engine::core::select::{SelectionRequest, Strategy};

fn single_endpoint_pool(config: EngineConfig) -> (ProxyPool, EndpointId) {
    let id = EndpointId::new("res-1");
    let pool = ProxyPool::new(
        config,
        vec![Endpoint::new(
            "res-1",
            "203.0.113.10:3128",
            EndpointKind::Residential,
        )],
    );
    (pool, id)
}

#[test]
fn rate_limited_domain_cools_down_while_others_stay_eligible() {
    let (pool, id) = single_endpoint_pool(EngineConfig::default());

    // Five consecutive plain failures cross the hard threshold (M=5).
    for _ in 0..5 {
        pool.report(&id, "shop.example", Outcome::Failure, None, None);
    }

    assert!(!pool.is_available(&id, "shop.example"));
    assert!(pool.backoff_deadline(&id, "shop.example").is_some());
    assert!(
        pool.select(&SelectionRequest::new("shop.example")).is_err(),
        "cooling pair must not be selected"
    );

    // The same endpoint is immediately eligible for a different domain.
    assert!(pool.is_available(&id, "news.example"));
    let selection = pool.select(&SelectionRequest::new("news.example")).unwrap();
    assert_eq!(selection.endpoint.id, id);
}

#[test]
fn classified_429_burst_cools_down_via_ban_trigger() {
    let (pool, id) = single_endpoint_pool(EngineConfig::default());
    let signals = Signals::with_status(429);

    for _ in 0..5 {
        pool.report(&id, "shop.example", Outcome::Failure, Some(200), Some(&signals));
    }

    assert!(!pool.is_available(&id, "shop.example"));
    let rep = pool.reputation().snapshot(&id, "shop.example").unwrap();
    assert_eq!(rep.state, PairState::CoolingDown);
    assert!(!pool.ban_events().is_empty());
}

#[test]
fn pair_recovers_fully_after_deadline_and_one_success() {
    let mut config = EngineConfig::default();
    config.base_backoff_ms = 40;
    config.max_backoff_ms = 200;
    let (pool, id) = single_endpoint_pool(config);

    pool.report(
        &id,
        "shop.example",
        Outcome::Failure,
        None,
        Some(&Signals::with_status(429)),
    );
    let rep = pool.reputation().snapshot(&id, "shop.example").unwrap();
    assert_eq!(rep.state, PairState::CoolingDown);
    assert_eq!(rep.cooldown_count, 1);
    assert!(!pool.is_available(&id, "shop.example"));

    // Past the deadline the pair becomes selectable again.
    thread::sleep(Duration::from_millis(250));
    assert!(pool.is_available(&id, "shop.example"));

    pool.report(&id, "shop.example", Outcome::Success, Some(120), None);
    let rep = pool.reputation().snapshot(&id, "shop.example").unwrap();
    assert_eq!(rep.state, PairState::Healthy);
    assert_eq!(rep.cooldown_count, 0);
    assert_eq!(rep.backoff_until_ms, None);
    assert!(pool.is_available(&id, "shop.example"));
}

#[test]
fn six_cooldown_entries_retire_the_pair_until_manual_reset() {
    let (pool, id) = single_endpoint_pool(EngineConfig::default());
    let signals = Signals::with_status(429);

    // Ceiling is 5: the sixth confident ban retires the pair.
    for _ in 0..6 {
        pool.report(&id, "shop.example", Outcome::Failure, None, Some(&signals));
    }
    let rep = pool.reputation().snapshot(&id, "shop.example").unwrap();
    assert_eq!(rep.state, PairState::Retired);

    assert!(
        pool.select(&SelectionRequest::new("shop.example")).is_err(),
        "retired pair must never be selected"
    );
    // Other domains still work through the same endpoint.
    let selection = pool.select(&SelectionRequest::new("news.example")).unwrap();
    assert_eq!(selection.endpoint.id, id);

    // A stray success does not revive a retired pair.
    pool.report(&id, "shop.example", Outcome::Success, None, None);
    assert!(pool.select(&SelectionRequest::new("shop.example")).is_err());

    // Manual reset does.
    assert!(pool.reset_pair(&id, "shop.example"));
    let selection = pool.select(&SelectionRequest::new("shop.example")).unwrap();
    assert_eq!(selection.endpoint.id, id);
}

#[test]
fn weighted_random_favors_the_higher_success_rate() {
    let pool = ProxyPool::new(
        EngineConfig::default(),
        vec![
            Endpoint::new("strong", "203.0.113.1:3128", EndpointKind::Residential),
            Endpoint::new("weak", "203.0.113.2:3128", EndpointKind::Residential),
        ],
    );
    let strong = EndpointId::new("strong");
    let weak = EndpointId::new("weak");

    // Seed domain-scoped reputations without tripping recovery: the weak
    // endpoint interleaves a success every four failures so consecutive
    // failures stay below every threshold.
    for _ in 0..20 {
        pool.report(&strong, "shop.example", Outcome::Success, Some(100), None);
    }
    for _ in 0..4 {
        for _ in 0..4 {
            pool.report(&weak, "shop.example", Outcome::Failure, None, None);
        }
        pool.report(&weak, "shop.example", Outcome::Success, Some(100), None);
    }
    assert!(pool.is_available(&weak, "shop.example"));

    let request = SelectionRequest::new("shop.example").with_strategy(Strategy::WeightedRandom);
    let mut strong_picks = 0usize;
    let mut weak_picks = 0usize;
    for _ in 0..2_000 {
        match pool.select(&request).unwrap().endpoint.id.as_str() {
            "strong" => strong_picks += 1,
            _ => weak_picks += 1,
        }
    }
    // Rates are roughly 0.95 vs 0.23; statistically the strong endpoint must
    // dominate by a wide margin.
    assert!(
        strong_picks > weak_picks * 2,
        "strong={strong_picks} weak={weak_picks}"
    );
}

#[test]
fn no_eligible_endpoint_is_terminal_not_retried() {
    let (pool, id) = single_endpoint_pool(EngineConfig::default());
    for _ in 0..5 {
        pool.report(&id, "shop.example", Outcome::Failure, None, None);
    }
    // Repeated selects keep failing without any internal retry or state
    // change until the caller acts.
    for _ in 0..3 {
        assert!(pool.select(&SelectionRequest::new("shop.example")).is_err());
    }
    let rep = pool.reputation().snapshot(&id, "shop.example").unwrap();
    assert_eq!(rep.state, PairState::CoolingDown);
}
