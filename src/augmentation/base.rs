use crate::Result;
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Seeded random source shared by the simulation augmentations
#[derive(Clone)]
pub struct AugmentationBase {
    pub rng: StdRng,
}

impl Default for AugmentationBase {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl AugmentationBase {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw from the half-open interval `[min, max)`; `min` when the interval is empty.
    pub fn random_in_range(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }
}

/// A stack after simulation, with the ground truth that produced it
#[derive(Debug, Clone)]
pub struct AugmentedStack {
    pub stack: Array3<f32>,

    /// Injected `(tx, ty)` per projection, if the augmentation translates
    pub jitter: Option<Array2<f64>>,

    pub augmentations_applied: Vec<String>,
}

/// Simulated degradation of a projection stack
pub trait StackAugmentation: Send {
    fn apply(&mut self, stack: Array3<f32>) -> Result<AugmentedStack>;

    fn description(&self) -> String;

    fn get_params(&self) -> HashMap<String, Value>;
}

/// One simulation step as written to run reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentationRecord {
    pub description: String,
    pub params: HashMap<String, Value>,
}

impl AugmentationRecord {
    pub fn of(augmentation: &dyn StackAugmentation) -> Self {
        Self {
            description: augmentation.description(),
            params: augmentation.get_params(),
        }
    }
}
