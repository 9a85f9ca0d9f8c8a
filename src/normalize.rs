use crate::error::AlignError;
use crate::Result;
use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

/// Scale factor retained by [`Normalizer::scale`] for exact inversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor(pub f32);

impl ScaleFactor {
    pub fn value(&self) -> f32 {
        self.0
    }

    /// Multiply every sample back by the factor.
    pub fn restore<D: Dimension>(&self, data: &mut Array<f32, D>) {
        let scl = self.0;
        data.mapv_inplace(|v| v * scl);
    }
}

/// Maps an image stack into [-1, 1] by its largest absolute sample.
pub struct Normalizer;

impl Normalizer {
    /// Divide every sample by `max(|max|, |min|)` and return the factor used.
    pub fn scale<D: Dimension>(mut data: Array<f32, D>) -> Result<(Array<f32, D>, ScaleFactor)> {
        let factor = Self::scale_factor(&data)?;
        data.mapv_inplace(|v| v / factor.0);
        Ok((data, factor))
    }

    /// Compute the factor without touching the data.
    pub fn scale_factor<D: Dimension>(data: &Array<f32, D>) -> Result<ScaleFactor> {
        if data.is_empty() {
            return Err(AlignError::configuration("cannot normalize an empty stack"));
        }

        let mut max = f32::NEG_INFINITY;
        let mut min = f32::INFINITY;
        for &v in data.iter() {
            if !v.is_finite() {
                return Err(AlignError::numeric("stack contains non-finite samples"));
            }
            max = max.max(v);
            min = min.min(v);
        }

        let scl = max.abs().max(min.abs());
        if scl == 0.0 {
            return Err(AlignError::numeric("cannot normalize an all-zero stack"));
        }
        Ok(ScaleFactor(scl))
    }

    pub fn denormalize<D: Dimension>(mut data: Array<f32, D>, factor: ScaleFactor) -> Array<f32, D> {
        factor.restore(&mut data);
        data
    }
}
