//! Adaptive scoring model.
//!
//! A small online logistic regression over endpoint/domain features. Training
//! runs out of band and publishes immutable snapshots; the selection path only
//! ever reads the current snapshot and never waits on a training cycle.

use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 6;

/// Feature order: domain success rate, global success rate, normalized
/// latency, endpoint kind weight, geography match, recency.
pub type Features = [f64; FEATURE_COUNT];

/// Immutable trained model. A zero-sample snapshot is the untrained neutral
/// model and scores every candidate at 0.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    /// Bias followed by one weight per feature.
    pub weights: [f64; FEATURE_COUNT + 1],
    pub trained_at_ms: i64,
    pub samples: usize,
    pub version: u64,
}

impl Default for ModelSnapshot {
    fn default() -> Self {
        Self {
            weights: [0.0; FEATURE_COUNT + 1],
            trained_at_ms: 0,
            samples: 0,
            version: 0,
        }
    }
}

impl ModelSnapshot {
    pub fn is_trained(&self) -> bool {
        self.samples > 0
    }

    /// Predicted success probability for one candidate.
    pub fn score(&self, features: &Features) -> f64 {
        let mut z = self.weights[0];
        for (w, x) in self.weights[1..].iter().zip(features.iter()) {
            z += w * x;
        }
        sigmoid(z)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Shared handle over the current snapshot. Readers clone the Arc; a store
/// swaps the whole snapshot so selection never observes a half-updated model.
#[derive(Debug, Default)]
pub struct ModelHandle {
    inner: RwLock<Arc<ModelSnapshot>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<ModelSnapshot> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(_) => Arc::new(ModelSnapshot::default()),
        }
    }

    pub fn store(&self, snapshot: ModelSnapshot) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Arc::new(snapshot);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: Features,
    /// 1.0 for a pair that works, 0.0 for one that does not.
    pub label: f64,
}

/// Fit a new snapshot by gradient descent, warm-started from the previous
/// weights so periodic runs refine rather than restart.
pub fn train_logistic(
    examples: &[TrainingExample],
    learning_rate: f64,
    epochs: u32,
    min_samples: usize,
    previous: &ModelSnapshot,
    now_ms: i64,
) -> Result<ModelSnapshot> {
    if examples.len() < min_samples {
        bail!(
            "insufficient training data: {} examples, need {}",
            examples.len(),
            min_samples
        );
    }

    let mut weights = previous.weights;
    for _ in 0..epochs {
        for example in examples {
            let snapshot = ModelSnapshot {
                weights,
                ..ModelSnapshot::default()
            };
            let predicted = snapshot.score(&example.features);
            let error = example.label - predicted;
            weights[0] += learning_rate * error;
            for (w, x) in weights[1..].iter_mut().zip(example.features.iter()) {
                *w += learning_rate * error * x;
            }
        }
    }

    Ok(ModelSnapshot {
        weights,
        trained_at_ms: now_ms,
        samples: examples.len(),
        version: previous.version + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(rate: f64, label: f64) -> TrainingExample {
        TrainingExample {
            features: [rate, rate, 0.2, 0.5, 1.0, 0.1],
            label,
        }
    }

    #[test]
    fn untrained_model_is_neutral() {
        let model = ModelSnapshot::default();
        assert!(!model.is_trained());
        assert!((model.score(&[0.9, 0.9, 0.1, 1.0, 1.0, 0.0]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn training_separates_good_from_bad() {
        let mut examples = Vec::new();
        for _ in 0..20 {
            examples.push(example(0.95, 1.0));
            examples.push(example(0.05, 0.0));
        }
        let model = train_logistic(&examples, 0.5, 30, 20, &ModelSnapshot::default(), 1).unwrap();
        assert!(model.is_trained());
        let good = model.score(&example(0.95, 1.0).features);
        let bad = model.score(&example(0.05, 0.0).features);
        assert!(
            good > bad + 0.2,
            "expected separation, got good={good} bad={bad}"
        );
    }

    #[test]
    fn too_few_examples_is_an_error() {
        let examples = vec![example(0.9, 1.0)];
        let err = train_logistic(&examples, 0.1, 5, 20, &ModelSnapshot::default(), 1);
        assert!(err.is_err());
    }

    #[test]
    fn version_increments_per_publish() {
        let mut examples = Vec::new();
        for _ in 0..20 {
            examples.push(example(0.9, 1.0));
            examples.push(example(0.1, 0.0));
        }
        let first = train_logistic(&examples, 0.1, 2, 1, &ModelSnapshot::default(), 1).unwrap();
        let second = train_logistic(&examples, 0.1, 2, 1, &first, 2).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
    }

    #[test]
    fn handle_swaps_atomically() {
        let handle = ModelHandle::new();
        assert_eq!(handle.load().version, 0);
        handle.store(ModelSnapshot {
            version: 3,
            samples: 10,
            ..ModelSnapshot::default()
        });
        assert_eq!(handle.load().version, 3);
    }
}
