use crate::error::AlignError;
use crate::pipeline::{AlignmentOutcome, ShiftHistory};
use crate::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Estimated correction of one projection against the jitter that was injected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionResidual {
    pub index: usize,
    pub estimated_row: f64,
    pub estimated_col: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub residual_row: f64,
    pub residual_col: f64,
}

impl ProjectionResidual {
    pub fn magnitude(&self) -> f64 {
        self.residual_row.hypot(self.residual_col)
    }
}

/// Estimated-vs-true jitter report for a simulated run.
///
/// Injecting `(tx, ty)` moves the content by `(-ty, -tx)`, so a perfect run
/// accumulates a correction of `(-ty, -tx)` and the residual
/// `estimate + jitter` is zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterComparison {
    pub projections: Vec<ProjectionResidual>,
    pub rms: f64,
    pub max: f64,
    /// RMS after removing the mean residual. Re-projection alignment cannot
    /// see a drift common to every projection.
    pub relative_rms: f64,
}

impl JitterComparison {
    /// `true_jitter` has shape `(P, 2)` with columns `(tx, ty)`.
    pub fn from_history(history: &ShiftHistory, true_jitter: &Array2<f64>) -> Result<Self> {
        let count = history.projections();
        if true_jitter.dim() != (count, 2) {
            return Err(AlignError::domain(
                "jitter comparison",
                &[count, 2],
                &[true_jitter.nrows(), true_jitter.ncols()],
            ));
        }

        let projections: Vec<ProjectionResidual> = (0..count)
            .map(|m| {
                let estimate = history.cumulative(m);
                let (true_x, true_y) = (true_jitter[[m, 0]], true_jitter[[m, 1]]);
                ProjectionResidual {
                    index: m,
                    estimated_row: estimate.row,
                    estimated_col: estimate.col,
                    true_x,
                    true_y,
                    residual_row: estimate.row + true_y,
                    residual_col: estimate.col + true_x,
                }
            })
            .collect();

        let n = count.max(1) as f64;
        let rms = (projections.iter().map(|p| p.magnitude().powi(2)).sum::<f64>() / n).sqrt();
        let max = projections.iter().map(|p| p.magnitude()).fold(0.0, f64::max);

        let mean_row = projections.iter().map(|p| p.residual_row).sum::<f64>() / n;
        let mean_col = projections.iter().map(|p| p.residual_col).sum::<f64>() / n;
        let relative_rms = (projections
            .iter()
            .map(|p| (p.residual_row - mean_row).powi(2) + (p.residual_col - mean_col).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        Ok(Self {
            projections,
            rms,
            max,
            relative_rms,
        })
    }

    pub fn from_outcome(outcome: &AlignmentOutcome, true_jitter: &Array2<f64>) -> Result<Self> {
        Self::from_history(&outcome.shifts, true_jitter)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-iteration error norms of a run, for reports.
pub fn error_curve(outcome: &AlignmentOutcome) -> Vec<f64> {
    let (iterations, _) = outcome.errors.dim();
    (0..iterations).map(|n| outcome.errors.iteration_norm(n)).collect()
}
