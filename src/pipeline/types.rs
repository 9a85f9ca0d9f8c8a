use crate::algorithms::reconstruction::ReconstructionStrategy;
use crate::algorithms::warp::InterpolationOrder;
use crate::error::AlignError;
use crate::normalize::ScaleFactor;
use crate::Result;
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How the working stack and the re-projection are padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PadMode {
    /// No padding anywhere.
    None,
    /// Reconstruct from projections zero-padded in width to the slice diagonal,
    /// then crop the re-projection back to the working width.
    Diagonal,
    /// Zero-pad every image by `y` rows and `x` columns on each side before the loop.
    Explicit { x: usize, y: usize },
}

impl Default for PadMode {
    fn default() -> Self {
        PadMode::Explicit { x: 0, y: 0 }
    }
}

impl PadMode {
    /// Map the boolean pad switch onto a mode.
    pub fn from_flag(pad: bool) -> Self {
        if pad {
            PadMode::Diagonal
        } else {
            PadMode::None
        }
    }
}

/// What to do when a single projection fails to register or warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole run.
    #[default]
    Abort,
    /// Leave the projection uncorrected for that iteration and keep going.
    Isolate,
}

/// Options for one alignment run. Every field has its own default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignOptions {
    pub iterations: usize,
    pub padding: PadMode,
    pub debug: bool,
    pub save: bool,
    pub reconstruction: ReconstructionStrategy,
    pub upsample_factor: usize,
    pub warp_order: InterpolationOrder,
    pub parallel: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            iterations: 10,
            padding: PadMode::default(),
            debug: false,
            save: false,
            reconstruction: ReconstructionStrategy::default(),
            upsample_factor: 100,
            warp_order: InterpolationOrder::Quintic,
            parallel: true,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl AlignOptions {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(AlignError::configuration("iterations must be greater than zero"));
        }
        if self.upsample_factor == 0 {
            return Err(AlignError::configuration("upsample_factor must be at least 1"));
        }
        self.reconstruction.validate()
    }
}

/// Sub-pixel displacement of an image relative to its reference, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShiftEstimate {
    pub row: f64,
    pub col: f64,
}

impl ShiftEstimate {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }

    pub fn magnitude(&self) -> f64 {
        self.row.hypot(self.col)
    }
}

/// Output of a registrar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub shift: ShiftEstimate,
    /// Normalized RMS mismatch after registration, in [0, 1].
    pub error: f64,
    /// Global phase offset at the correlation peak, in radians.
    pub phase_difference: f64,
}

/// Per-iteration, per-projection shift magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMatrix(pub Array2<f64>);

impl ErrorMatrix {
    pub fn zeros(iterations: usize, projections: usize) -> Self {
        Self(Array2::zeros((iterations, projections)))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }

    pub fn set(&mut self, iteration: usize, projection: usize, value: f64) {
        self.0[[iteration, projection]] = value;
    }

    /// Euclidean norm of one iteration row.
    pub fn iteration_norm(&self, iteration: usize) -> f64 {
        self.0
            .index_axis(Axis(0), iteration)
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    /// Largest entry of one iteration row.
    pub fn iteration_max(&self, iteration: usize) -> f64 {
        self.0
            .index_axis(Axis(0), iteration)
            .iter()
            .fold(0.0, |acc: f64, v| acc.max(*v))
    }

    /// Euclidean norm of every entry.
    pub fn frobenius_norm(&self) -> f64 {
        self.0.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.0
    }
}

/// Every `(row, col)` shift applied during a run, shape `(iterations, P, 2)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftHistory(pub Array3<f64>);

impl ShiftHistory {
    pub fn zeros(iterations: usize, projections: usize) -> Self {
        Self(Array3::zeros((iterations, projections, 2)))
    }

    pub fn record(&mut self, iteration: usize, projection: usize, shift: ShiftEstimate) {
        self.0[[iteration, projection, 0]] = shift.row;
        self.0[[iteration, projection, 1]] = shift.col;
    }

    pub fn get(&self, iteration: usize, projection: usize) -> ShiftEstimate {
        ShiftEstimate::new(
            self.0[[iteration, projection, 0]],
            self.0[[iteration, projection, 1]],
        )
    }

    pub fn iterations(&self) -> usize {
        self.0.len_of(Axis(0))
    }

    pub fn projections(&self) -> usize {
        self.0.len_of(Axis(1))
    }

    /// Sum of all shifts applied to one projection.
    pub fn cumulative(&self, projection: usize) -> ShiftEstimate {
        (0..self.iterations()).fold(ShiftEstimate::default(), |acc, n| {
            let s = self.get(n, projection);
            ShiftEstimate::new(acc.row + s.row, acc.col + s.col)
        })
    }
}

/// Progress report handed to the observer after each iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: usize,
    pub total_iterations: usize,
    /// Euclidean norm of this iteration's error row.
    pub error_norm: f64,
    pub max_shift: f64,
    pub failed_projections: usize,
    pub elapsed: Duration,
}

/// A projection left uncorrected under [`FailurePolicy::Isolate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionFailure {
    pub iteration: usize,
    pub index: usize,
    pub message: String,
}

/// Identity of a run, handed to the observer at start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub correlation_id: Uuid,
    pub projections: usize,
    pub height: usize,
    pub width: usize,
    pub options: AlignOptions,
}

/// Everything an alignment run produces.
#[derive(Debug, Clone)]
pub struct AlignmentOutcome {
    /// Corrected, denormalized stack; keeps any explicit padding.
    pub stack: Array3<f32>,
    pub errors: ErrorMatrix,
    pub shifts: ShiftHistory,
    pub failures: Vec<ProjectionFailure>,
    pub scale: ScaleFactor,
    pub correlation_id: Uuid,
    pub elapsed: Duration,
}

impl AlignmentOutcome {
    /// Norm of the last iteration's error row.
    pub fn final_error(&self) -> f64 {
        let (iterations, _) = self.errors.dim();
        if iterations == 0 {
            return 0.0;
        }
        self.errors.iteration_norm(iterations - 1)
    }

    /// Norm of the error matrix across all iterations.
    pub fn history_error(&self) -> f64 {
        self.errors.frobenius_norm()
    }
}

/// Cooperative cancellation flag, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
