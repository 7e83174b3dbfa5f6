use serde::{Deserialize, Serialize};

fn default_latency_smoothing() -> f64 {
    0.2
}

fn default_degraded_threshold() -> u32 {
    3
}

fn default_cooldown_failure_threshold() -> u32 {
    5
}

fn default_ban_confidence_threshold() -> f64 {
    0.6
}

fn default_base_backoff_ms() -> u64 {
    5_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_retire_cooldown_ceiling() -> u32 {
    5
}

fn default_ban_history_capacity() -> usize {
    10_000
}

fn default_ban_history_window_ms() -> i64 {
    7 * 24 * 3600 * 1000
}

fn default_min_training_samples() -> usize {
    20
}

fn default_training_learning_rate() -> f64 {
    0.05
}

fn default_training_epochs() -> u32 {
    4
}

/// Runtime knobs for the engine. Supplied by the inventory/configuration
/// loader at startup; the engine never reads configuration files itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Exponential moving average factor for rolling latency.
    #[serde(default = "default_latency_smoothing")]
    pub latency_smoothing: f64,
    /// Consecutive failures before a pair is marked degraded.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,
    /// Consecutive failures that force a cooldown regardless of category.
    #[serde(default = "default_cooldown_failure_threshold")]
    pub cooldown_failure_threshold: u32,
    /// Minimum classification confidence that triggers a cooldown.
    #[serde(default = "default_ban_confidence_threshold")]
    pub ban_confidence_threshold: f64,
    /// Base delay for exponential backoff (milliseconds).
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Upper bound on a single backoff delay (milliseconds).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Cooldown re-entries beyond this ceiling retire the pair.
    #[serde(default = "default_retire_cooldown_ceiling")]
    pub retire_cooldown_ceiling: u32,
    /// Maximum ban events kept for training and statistics.
    #[serde(default = "default_ban_history_capacity")]
    pub ban_history_capacity: usize,
    /// Age horizon for retained ban events (milliseconds).
    #[serde(default = "default_ban_history_window_ms")]
    pub ban_history_window_ms: i64,
    /// Minimum examples before an adaptive training run may publish a model.
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,
    #[serde(default = "default_training_learning_rate")]
    pub training_learning_rate: f64,
    #[serde(default = "default_training_epochs")]
    pub training_epochs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency_smoothing: default_latency_smoothing(),
            degraded_threshold: default_degraded_threshold(),
            cooldown_failure_threshold: default_cooldown_failure_threshold(),
            ban_confidence_threshold: default_ban_confidence_threshold(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            retire_cooldown_ceiling: default_retire_cooldown_ceiling(),
            ban_history_capacity: default_ban_history_capacity(),
            ban_history_window_ms: default_ban_history_window_ms(),
            min_training_samples: default_min_training_samples(),
            training_learning_rate: default_training_learning_rate(),
            training_epochs: default_training_epochs(),
        }
    }
}
