use crate::algorithms::warp::InterpolationOrder;
use crate::pipeline::types::{IterationReport, ProjectionFailure, Registration, RunContext};
use crate::Result;
use ndarray::{Array2, Array3, ArrayView2};

/// Forward projection of a volume into a projection stack.
pub trait Projector: Send + Sync {
    /// Returns the name of the projector
    fn name(&self) -> &str;

    /// Project a `(Z, Ny, Nx)` volume at `angles` into a `(P, Z, W)` stack.
    /// With `pad` the detector is widened symmetrically to the volume diagonal.
    fn project(&self, volume: &Array3<f32>, angles: &[f64], pad: bool) -> Result<Array3<f32>>;
}

/// Reconstruction of a volume from a projection stack.
pub trait Reconstructor: Send + Sync {
    fn name(&self) -> &str;

    /// Reconstruct `(P, H, W)` projections into a `(H, W, W)` volume.
    fn reconstruct(&self, stack: &Array3<f32>, angles: &[f64]) -> Result<Array3<f32>>;
}

/// Sub-pixel translation estimate between two images.
pub trait Registrar: Send + Sync {
    fn name(&self) -> &str;

    /// Displacement of `image` relative to `reference`, as `(row, col)`.
    fn register(
        &self,
        image: ArrayView2<f32>,
        reference: ArrayView2<f32>,
        upsample_factor: usize,
    ) -> Result<Registration>;
}

/// Translation of a single image.
pub trait Warper: Send + Sync {
    /// Output `(r, c)` samples the input at `(r + ty, c + tx)`.
    fn translate(
        &self,
        image: ArrayView2<f32>,
        tx: f64,
        ty: f64,
        order: InterpolationOrder,
    ) -> Result<Array2<f32>>;
}

/// Receives progress from the alignment engine.
///
/// All methods default to no-ops, so observers only implement what they need.
pub trait AlignmentObserver: Send + Sync {
    fn on_start(&self, _context: &RunContext) {}

    /// Called once per iteration when the run has `debug` set.
    fn on_iteration(&self, _report: &IterationReport) {}

    fn on_projection_failure(&self, _failure: &ProjectionFailure) {}

    fn on_finish(&self, _final_error: f64) {}
}

/// Persists intermediate results when the run has `save` set.
pub trait ArtifactSink: Send + Sync {
    /// `stack` is the normalized working stack after this iteration's warp and
    /// `slice` the reconstruction at mid depth.
    fn save_iteration(&self, iteration: usize, stack: &Array3<f32>, slice: ArrayView2<f32>) -> Result<()>;
}
