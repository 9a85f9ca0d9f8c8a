use crate::augmentation::base::{AugmentationBase, AugmentedStack, StackAugmentation};
use crate::error::AlignError;
use crate::Result;
use ndarray::Array3;
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Additive zero-mean Gaussian noise with `std = ratio * max(stack)`.
pub struct NoiseAugmentation {
    base: AugmentationBase,
    ratio: f64,
}

impl NoiseAugmentation {
    pub fn new(ratio: f64) -> Self {
        Self {
            base: AugmentationBase::default(),
            ratio,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.base = AugmentationBase::with_seed(seed);
        self
    }
}

impl StackAugmentation for NoiseAugmentation {
    fn apply(&mut self, mut stack: Array3<f32>) -> Result<AugmentedStack> {
        if !self.ratio.is_finite() || self.ratio < 0.0 {
            return Err(AlignError::configuration(format!(
                "noise ratio must be a nonnegative number, got {}",
                self.ratio
            )));
        }

        let max = stack.iter().fold(f32::NEG_INFINITY, |acc, v| acc.max(*v));
        let std = max as f64 * self.ratio;
        if std > 0.0 && std.is_finite() {
            let normal =
                Normal::new(0.0, std).map_err(|e| AlignError::configuration(format!("noise distribution: {e}")))?;
            stack.mapv_inplace(|v| v + normal.sample(&mut self.base.rng) as f32);
        }

        tracing::debug!(ratio = self.ratio, std = std, "Added Gaussian noise");
        Ok(AugmentedStack {
            stack,
            jitter: None,
            augmentations_applied: vec![self.description()],
        })
    }

    fn description(&self) -> String {
        format!("Gaussian noise ({}% of max)", self.ratio * 100.0)
    }

    fn get_params(&self) -> HashMap<String, Value> {
        let mut params = HashMap::new();
        params.insert("ratio".to_string(), json!(self.ratio));
        params
    }
}
