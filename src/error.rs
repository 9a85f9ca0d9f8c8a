//! Error taxonomy for the alignment library.

use thiserror::Error;

/// Errors produced by normalization, the operators and the alignment engine.
#[derive(Error, Debug)]
pub enum AlignError {
    /// Invalid shapes or options. Not recoverable by retrying.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Degenerate numeric input (all-zero stack, constant image, non-finite samples).
    #[error("numeric failure: {0}")]
    Numeric(String),

    /// An operator produced output of the wrong shape.
    #[error("shape mismatch in {stage}: expected {expected:?}, got {actual:?}")]
    Domain {
        stage: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// An external operator or sink failed.
    #[error("operator failure: {0}")]
    Resource(String),

    /// A single projection failed to register or warp.
    #[error("projection {index} failed: {source}")]
    Projection {
        index: usize,
        #[source]
        source: Box<AlignError>,
    },

    /// The run was cancelled between iterations.
    #[error("alignment cancelled before iteration {iteration}")]
    Cancelled { iteration: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl AlignError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        AlignError::Configuration(msg.into())
    }

    pub fn numeric(msg: impl Into<String>) -> Self {
        AlignError::Numeric(msg.into())
    }

    pub fn domain(stage: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        AlignError::Domain {
            stage,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Wrap a per-projection failure with its index.
    pub fn at_projection(self, index: usize) -> Self {
        AlignError::Projection {
            index,
            source: Box::new(self),
        }
    }

    /// True for failures caused by bad numeric input rather than bad configuration.
    pub fn is_numeric(&self) -> bool {
        match self {
            AlignError::Numeric(_) => true,
            AlignError::Projection { source, .. } => source.is_numeric(),
            _ => false,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AlignError::Configuration(_))
    }
}
