//! Parallel-beam forward projection and its adjoint.
//!
//! Geometry: the rotation axis runs along volume axis 0, so every detector row
//! sees exactly one volume slice. Within a slice the projector is pixel driven:
//! the center of pixel `(r, c)` lands on detector coordinate
//! `x cos(t) + y sin(t) + (W - 1) / 2`, with `x, y` measured from the slice
//! center, and its value is split linearly between the two nearest bins.
//! [`backproject_slice`] applies the transposed weights.

use crate::error::AlignError;
use crate::pipeline::Projector;
use crate::Result;
use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut2, Axis};
use rayon::prelude::*;

/// Detector width for a slice of `rows x cols` pixels.
///
/// With `pad` the width grows to the slice diagonal, rounded up so the extra
/// margin is the same on both sides.
pub fn detector_width(rows: usize, cols: usize, pad: bool) -> usize {
    if !pad {
        return cols;
    }
    let diagonal = ((rows * rows + cols * cols) as f64).sqrt().ceil() as usize;
    let margin = diagonal.saturating_sub(cols).div_ceil(2);
    cols + 2 * margin
}

/// Precomputed `(cos, sin)` per angle.
pub fn trig_table(angles: &[f64]) -> Vec<(f64, f64)> {
    angles.iter().map(|a| (a.cos(), a.sin())).collect()
}

/// Visit every (pixel, bin, weight) triple of one slice at one angle.
#[inline]
fn for_each_weight(
    rows: usize,
    cols: usize,
    width: usize,
    (cos_t, sin_t): (f64, f64),
    mut visit: impl FnMut(usize, usize, usize, f64),
) {
    let row_center = (rows as f64 - 1.0) / 2.0;
    let col_center = (cols as f64 - 1.0) / 2.0;
    let det_center = (width as f64 - 1.0) / 2.0;

    for r in 0..rows {
        let y = r as f64 - row_center;
        let base = y * sin_t + det_center;
        for c in 0..cols {
            let x = c as f64 - col_center;
            let d = x * cos_t + base;
            let lower = d.floor();
            let frac = d - lower;
            let lower = lower as i64;

            if lower >= 0 && (lower as usize) < width {
                visit(r, c, lower as usize, 1.0 - frac);
            }
            let upper = lower + 1;
            if upper >= 0 && (upper as usize) < width && frac > 0.0 {
                visit(r, c, upper as usize, frac);
            }
        }
    }
}

/// Project one slice into a sinogram of shape `(angles, width)`.
pub fn project_slice(slice: ArrayView2<f32>, trig: &[(f64, f64)], mut sinogram: ArrayViewMut2<f32>) {
    let (rows, cols) = slice.dim();
    let width = sinogram.ncols();
    sinogram.fill(0.0);

    for (a, &cs) in trig.iter().enumerate() {
        let mut line = vec![0.0f64; width];
        for_each_weight(rows, cols, width, cs, |r, c, bin, w| {
            line[bin] += w * slice[[r, c]] as f64;
        });
        for (dst, src) in sinogram.row_mut(a).iter_mut().zip(line) {
            *dst = src as f32;
        }
    }
}

/// Adjoint of [`project_slice`]: smear a sinogram back over a `rows x cols` slice.
pub fn backproject_slice(sinogram: ArrayView2<f32>, trig: &[(f64, f64)], rows: usize, cols: usize) -> Array2<f64> {
    let width = sinogram.ncols();
    let mut slice = Array2::<f64>::zeros((rows, cols));

    for (a, &cs) in trig.iter().enumerate() {
        let line = sinogram.row(a);
        for_each_weight(rows, cols, width, cs, |r, c, bin, w| {
            slice[[r, c]] += w * line[bin] as f64;
        });
    }
    slice
}

/// Default [`Projector`]: pixel-driven parallel-beam projection, slices in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadonProjector;

impl Projector for RadonProjector {
    fn name(&self) -> &str {
        "RadonProjector"
    }

    fn project(&self, volume: &Array3<f32>, angles: &[f64], pad: bool) -> Result<Array3<f32>> {
        let (depth, rows, cols) = volume.dim();
        if angles.is_empty() {
            return Err(AlignError::configuration("projection needs at least one angle"));
        }
        if depth == 0 || rows == 0 || cols == 0 {
            return Err(AlignError::configuration(format!(
                "cannot project an empty volume {:?}",
                volume.dim()
            )));
        }

        let width = detector_width(rows, cols, pad);
        let trig = trig_table(angles);

        let sinograms: Vec<Array2<f32>> = (0..depth)
            .into_par_iter()
            .map(|z| {
                let mut sinogram = Array2::<f32>::zeros((angles.len(), width));
                project_slice(volume.index_axis(Axis(0), z), &trig, sinogram.view_mut());
                sinogram
            })
            .collect();

        // Sinogram z holds detector row z of every projection.
        let mut stack = Array3::<f32>::zeros((angles.len(), depth, width));
        for (z, sinogram) in sinograms.iter().enumerate() {
            stack.index_axis_mut(Axis(1), z).assign(sinogram);
        }
        Ok(stack)
    }
}
