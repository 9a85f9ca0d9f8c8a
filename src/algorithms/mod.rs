pub mod fft;
pub mod phase_correlation;
pub mod radon;
pub mod reconstruction;
pub mod warp;

pub use phase_correlation::{register_translation, CorrelationMode, PhaseCorrelation};
pub use radon::RadonProjector;
pub use reconstruction::{FbpFilter, ReconstructionStrategy};
pub use warp::{pad_stack, InterpolationOrder, SplineWarp};
