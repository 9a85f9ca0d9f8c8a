//! Jitter correction for tomographic projection stacks by iterative
//! re-projection: reconstruct, re-project, register each projection against
//! its re-projection at sub-pixel precision, warp it back, repeat.

pub mod algorithms;
pub mod analysis;
pub mod augmentation;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod pipeline;

pub use algorithms::{
    CorrelationMode, FbpFilter, InterpolationOrder, PhaseCorrelation, RadonProjector, ReconstructionStrategy,
    SplineWarp,
};
pub use error::AlignError;
pub use normalize::{Normalizer, ScaleFactor};
pub use pipeline::{
    align, AlignOptions, Aligner, AlignerBuilder, AlignmentOutcome, CancellationToken, FailurePolicy, PadMode,
};

pub type Result<T> = std::result::Result<T, AlignError>;
