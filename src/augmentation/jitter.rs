use crate::algorithms::warp::{translate, InterpolationOrder};
use crate::augmentation::base::{AugmentationBase, AugmentedStack, StackAugmentation};
use crate::error::AlignError;
use crate::normalize::Normalizer;
use crate::Result;
use ndarray::{Array2, Array3, Axis};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Random rigid translation of every projection.
///
/// `(tx, ty)` is drawn per image from `U[low, high)` and applied with the
/// nearest-neighbour warp, so the injected shift is snapped to whole pixels
/// of the source grid.
pub struct JitterAugmentation {
    base: AugmentationBase,
    low: f64,
    high: f64,
}

impl JitterAugmentation {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            base: AugmentationBase::default(),
            low,
            high,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.base = AugmentationBase::with_seed(seed);
        self
    }

    /// Symmetric range `[-amplitude, amplitude)`.
    pub fn symmetric(amplitude: f64) -> Self {
        Self::new(-amplitude, amplitude)
    }
}

impl StackAugmentation for JitterAugmentation {
    fn apply(&mut self, stack: Array3<f32>) -> Result<AugmentedStack> {
        if !(self.low.is_finite() && self.high.is_finite()) || self.high < self.low {
            return Err(AlignError::configuration(format!(
                "invalid jitter range [{}, {})",
                self.low, self.high
            )));
        }

        let (mut stack, scale) = Normalizer::scale(stack)?;
        let projections = stack.len_of(Axis(0));

        let mut jitter = Array2::<f64>::zeros((projections, 2));
        for m in 0..projections {
            jitter[[m, 0]] = self.base.random_in_range(self.low, self.high);
            jitter[[m, 1]] = self.base.random_in_range(self.low, self.high);
        }

        for (m, mut image) in stack.axis_iter_mut(Axis(0)).enumerate() {
            let moved = translate(image.view(), jitter[[m, 0]], jitter[[m, 1]], InterpolationOrder::Nearest)?;
            image.assign(&moved);
        }

        scale.restore(&mut stack);
        tracing::debug!(
            projections = projections,
            low = self.low,
            high = self.high,
            "Injected jitter"
        );

        Ok(AugmentedStack {
            stack,
            jitter: Some(jitter),
            augmentations_applied: vec![self.description()],
        })
    }

    fn description(&self) -> String {
        format!("Jitter U[{}, {})", self.low, self.high)
    }

    fn get_params(&self) -> HashMap<String, Value> {
        let mut params = HashMap::new();
        params.insert("low".to_string(), json!(self.low));
        params.insert("high".to_string(), json!(self.high));
        params
    }
}
