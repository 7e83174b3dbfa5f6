//! Exponential backoff with jitter, as a pure function of its inputs so it
//! tests without wall-clock sleeps.

use rand::Rng;

/// Delay before a cooled-down pair becomes eligible again.
///
/// `attempt` is zero-based: the first cooldown waits `base + jitter`, each
/// re-entry doubles the exponential term. Jitter is uniform in `[0, base)` to
/// spread retries of endpoints sharing a domain. The sum is capped at
/// `max_ms`.
pub fn backoff_delay_ms(base_ms: u64, attempt: u32, max_ms: u64, rng: &mut impl Rng) -> u64 {
    let base = base_ms.max(1);
    let exponential = base.saturating_mul(1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX));
    let jitter = rng.gen_range(0..base);
    exponential.saturating_add(jitter).min(max_ms)
}
