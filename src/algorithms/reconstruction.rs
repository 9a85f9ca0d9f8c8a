use crate::algorithms::radon::{backproject_slice, project_slice, trig_table};
use crate::error::AlignError;
use crate::pipeline::Reconstructor;
use crate::Result;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Frequency window applied on top of the ramp filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FbpFilter {
    #[default]
    Ramp,
    SheppLogan,
}

/// Closed set of reconstruction methods usable by the alignment engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "algorithm")]
pub enum ReconstructionStrategy {
    /// Maximum-likelihood expectation maximization.
    Mlem { iterations: usize },
    /// Direct filtered back-projection.
    Fbp { filter: FbpFilter },
}

impl Default for ReconstructionStrategy {
    fn default() -> Self {
        ReconstructionStrategy::Mlem { iterations: 10 }
    }
}

impl ReconstructionStrategy {
    pub fn validate(&self) -> Result<()> {
        match self {
            ReconstructionStrategy::Mlem { iterations: 0 } => {
                Err(AlignError::configuration("MLEM needs at least one iteration"))
            }
            _ => Ok(()),
        }
    }
}

impl Reconstructor for ReconstructionStrategy {
    fn name(&self) -> &str {
        match self {
            ReconstructionStrategy::Mlem { .. } => "mlem",
            ReconstructionStrategy::Fbp { .. } => "fbp",
        }
    }

    /// Reconstruct `(P, H, W)` projections into a `(H, W, W)` volume.
    fn reconstruct(&self, stack: &Array3<f32>, angles: &[f64]) -> Result<Array3<f32>> {
        self.validate()?;
        let (projections, rows, width) = stack.dim();
        if angles.is_empty() || angles.len() != projections {
            return Err(AlignError::configuration(format!(
                "{} angles for {} projections",
                angles.len(),
                projections
            )));
        }
        if rows == 0 || width == 0 {
            return Err(AlignError::configuration(format!(
                "cannot reconstruct from empty projections {:?}",
                stack.dim()
            )));
        }

        let trig = trig_table(angles);
        let solver = match *self {
            ReconstructionStrategy::Mlem { iterations } => {
                let ones = Array2::<f32>::ones((projections, width));
                SliceSolver::Mlem {
                    iterations,
                    sensitivity: backproject_slice(ones.view(), &trig, width, width),
                }
            }
            ReconstructionStrategy::Fbp { filter } => SliceSolver::Fbp(RampFilter::new(width, filter)),
        };

        let slices: Vec<Array2<f32>> = (0..rows)
            .into_par_iter()
            .map(|z| {
                let sinogram = stack.index_axis(Axis(1), z);
                match &solver {
                    SliceSolver::Mlem {
                        iterations,
                        sensitivity,
                    } => mlem_slice(sinogram, &trig, width, *iterations, sensitivity),
                    SliceSolver::Fbp(filter) => fbp_slice(sinogram, &trig, width, filter),
                }
            })
            .collect();

        let mut volume = Array3::<f32>::zeros((rows, width, width));
        for (z, slice) in slices.iter().enumerate() {
            volume.index_axis_mut(Axis(0), z).assign(slice);
        }
        Ok(volume)
    }
}

/// Per-run state shared by every slice of one reconstruction.
enum SliceSolver {
    Mlem {
        iterations: usize,
        sensitivity: Array2<f64>,
    },
    Fbp(RampFilter),
}

fn mlem_slice(
    sinogram: ArrayView2<f32>,
    trig: &[(f64, f64)],
    size: usize,
    iterations: usize,
    sensitivity: &Array2<f64>,
) -> Array2<f32> {
    let measured = sinogram.mapv(|v| v.max(0.0));
    let mut estimate = Array2::<f32>::ones((size, size));
    let mut forward = Array2::<f32>::zeros(measured.dim());

    for _ in 0..iterations {
        project_slice(estimate.view(), trig, forward.view_mut());

        let ratio = Zip::from(&measured).and(&forward).map_collect(|&b, &ax| {
            if ax > 1e-8 {
                b / ax
            } else {
                0.0
            }
        });

        let correction = backproject_slice(ratio.view(), trig, size, size);
        Zip::from(&mut estimate)
            .and(&correction)
            .and(sensitivity)
            .for_each(|x, &back, &sens| {
                *x = if sens > 1e-12 {
                    (*x as f64 * back / sens) as f32
                } else {
                    0.0
                };
            });
    }
    estimate
}

/// Ramp filter in Fourier space, zero padded to avoid wrap-around.
struct RampFilter {
    padded: usize,
    response: Array1<f64>,
}

impl RampFilter {
    fn new(width: usize, window: FbpFilter) -> Self {
        let padded = (2 * width).next_power_of_two().max(64);

        // Spatial Ram-Lak kernel for unit detector spacing.
        let mut kernel: Vec<Complex<f64>> = (0..padded)
            .map(|n| {
                let k = if n <= padded / 2 {
                    n as i64
                } else {
                    n as i64 - padded as i64
                };
                let value = if k == 0 {
                    0.25
                } else if k % 2 != 0 {
                    -1.0 / (PI * PI * (k * k) as f64)
                } else {
                    0.0
                };
                Complex::new(value, 0.0)
            })
            .collect();

        let mut planner = FftPlanner::new();
        planner.plan_fft_forward(padded).process(&mut kernel);

        let response = Array1::from_shape_fn(padded, |n| {
            let freq = if n <= padded / 2 {
                n as f64
            } else {
                n as f64 - padded as f64
            } / padded as f64;
            let window_gain = match window {
                FbpFilter::Ramp => 1.0,
                FbpFilter::SheppLogan if freq != 0.0 => (PI * freq).sin() / (PI * freq),
                FbpFilter::SheppLogan => 1.0,
            };
            kernel[n].re * window_gain
        });

        Self { padded, response }
    }

    fn apply(&self, line: &[f32]) -> Vec<f64> {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(self.padded);
        let inverse = planner.plan_fft_inverse(self.padded);

        let mut buffer = vec![Complex::new(0.0, 0.0); self.padded];
        for (b, &v) in buffer.iter_mut().zip(line) {
            *b = Complex::new(v as f64, 0.0);
        }
        forward.process(&mut buffer);
        for (b, &h) in buffer.iter_mut().zip(self.response.iter()) {
            *b *= h;
        }
        inverse.process(&mut buffer);

        let norm = 1.0 / self.padded as f64;
        buffer.iter().take(line.len()).map(|v| v.re * norm).collect()
    }
}

fn fbp_slice(sinogram: ArrayView2<f32>, trig: &[(f64, f64)], size: usize, filter: &RampFilter) -> Array2<f32> {
    let (projections, width) = sinogram.dim();
    let mut filtered = Array2::<f32>::zeros((projections, width));
    for (mut dst, src) in filtered.rows_mut().into_iter().zip(sinogram.rows()) {
        let line: Vec<f32> = src.iter().copied().collect();
        for (d, v) in dst.iter_mut().zip(filter.apply(&line)) {
            *d = v as f32;
        }
    }

    let scale = PI / projections as f64;
    backproject_slice(filtered.view(), trig, size, size).mapv(|v| (v * scale) as f32)
}
