//! Rigid translation of images with B-spline interpolation of order 0 to 5.

use crate::error::AlignError;
use crate::pipeline::Warper;
use crate::Result;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};

/// Spline order used when resampling an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationOrder {
    Nearest,
    Linear,
    Quadratic,
    Cubic,
    Quartic,
    Quintic,
}

impl InterpolationOrder {
    pub fn degree(self) -> usize {
        match self {
            InterpolationOrder::Nearest => 0,
            InterpolationOrder::Linear => 1,
            InterpolationOrder::Quadratic => 2,
            InterpolationOrder::Cubic => 3,
            InterpolationOrder::Quartic => 4,
            InterpolationOrder::Quintic => 5,
        }
    }

    pub fn from_degree(degree: usize) -> Result<Self> {
        Ok(match degree {
            0 => InterpolationOrder::Nearest,
            1 => InterpolationOrder::Linear,
            2 => InterpolationOrder::Quadratic,
            3 => InterpolationOrder::Cubic,
            4 => InterpolationOrder::Quartic,
            5 => InterpolationOrder::Quintic,
            _ => {
                return Err(AlignError::configuration(format!(
                    "interpolation order must be between 0 and 5, got {degree}"
                )))
            }
        })
    }

    /// Poles of the recursive prefilter that turns samples into spline coefficients.
    fn poles(self) -> Vec<f64> {
        match self {
            InterpolationOrder::Nearest | InterpolationOrder::Linear => Vec::new(),
            InterpolationOrder::Quadratic => vec![8f64.sqrt() - 3.0],
            InterpolationOrder::Cubic => vec![3f64.sqrt() - 2.0],
            InterpolationOrder::Quartic => vec![
                (664.0 - 438976f64.sqrt()).sqrt() + 304f64.sqrt() - 19.0,
                (664.0 + 438976f64.sqrt()).sqrt() - 304f64.sqrt() - 19.0,
            ],
            InterpolationOrder::Quintic => vec![
                (135.0 / 2.0 - (17745.0f64 / 4.0).sqrt()).sqrt() + (105.0f64 / 4.0).sqrt() - 13.0 / 2.0,
                (135.0 / 2.0 + (17745.0f64 / 4.0).sqrt()).sqrt() - (105.0f64 / 4.0).sqrt() - 13.0 / 2.0,
            ],
        }
    }
}

impl Default for InterpolationOrder {
    fn default() -> Self {
        InterpolationOrder::Quintic
    }
}

/// Translation warp with mirror-boundary spline prefiltering and zero fill
/// outside the image.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplineWarp;

impl Warper for SplineWarp {
    fn translate(
        &self,
        image: ArrayView2<f32>,
        tx: f64,
        ty: f64,
        order: InterpolationOrder,
    ) -> Result<Array2<f32>> {
        translate(image, tx, ty, order)
    }
}

/// Output pixel `(r, c)` takes the input value at `(r + ty, c + tx)`.
pub fn translate(image: ArrayView2<f32>, tx: f64, ty: f64, order: InterpolationOrder) -> Result<Array2<f32>> {
    if !tx.is_finite() || !ty.is_finite() {
        return Err(AlignError::numeric(format!(
            "translation ({tx}, {ty}) is not finite"
        )));
    }
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return Ok(image.to_owned());
    }
    // Every sample lands outside the frame; also keeps tap offsets in range.
    let reach = order.degree() as f64 + 1.0;
    if ty.abs() > height as f64 + reach || tx.abs() > width as f64 + reach {
        return Ok(Array2::zeros((height, width)));
    }

    let mut coeffs = image.mapv(|v| v as f64);
    let poles = order.poles();
    if !poles.is_empty() {
        for row in coeffs.rows_mut() {
            prefilter_line(row, &poles);
        }
        for col in coeffs.columns_mut() {
            prefilter_line(col, &poles);
        }
    }

    let row_taps = AxisTaps::new(ty, height, order);
    let col_taps = AxisTaps::new(tx, width, order);

    // Separable: resample columns of every row first, then rows.
    let mut horizontal = Array2::<f64>::zeros((height, width));
    for r in 0..height {
        let src = coeffs.row(r);
        for c in 0..width {
            horizontal[[r, c]] = col_taps.sample(c, |i| src[i]);
        }
    }

    let mut output = Array2::<f32>::zeros((height, width));
    for c in 0..width {
        let src = horizontal.column(c);
        for r in 0..height {
            output[[r, c]] = row_taps.sample(r, |i| src[i]) as f32;
        }
    }

    Ok(output)
}

/// Interpolation taps along one axis. A pure translation moves every sample by
/// the same fraction, so offsets and weights are shared by all positions.
struct AxisTaps {
    shift: f64,
    len: usize,
    first: i64,
    weights: Vec<f64>,
}

impl AxisTaps {
    fn new(shift: f64, len: usize, order: InterpolationOrder) -> Self {
        let degree = order.degree();
        let (first, weights) = if degree == 0 {
            ((shift + 0.5).floor() as i64, vec![1.0])
        } else {
            let first = if degree % 2 == 1 {
                shift.floor() as i64 - (degree as i64 - 1) / 2
            } else {
                (shift + 0.5).floor() as i64 - degree as i64 / 2
            };
            let weights = (0..=degree)
                .map(|k| bspline(degree, shift - (first + k as i64) as f64))
                .collect();
            (first, weights)
        };
        Self {
            shift,
            len,
            first,
            weights,
        }
    }

    fn sample(&self, position: usize, value_at: impl Fn(usize) -> f64) -> f64 {
        let coord = position as f64 + self.shift;
        let upper = self.len as f64 - 0.5;
        if coord < -0.5 || coord > upper {
            return 0.0;
        }

        if self.weights.len() == 1 {
            let idx = position as i64 + self.first;
            return if idx >= 0 && (idx as usize) < self.len {
                value_at(idx as usize)
            } else {
                0.0
            };
        }

        self.weights
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let idx = position as i64 + self.first + k as i64;
                mirror_index(idx, self.len).map_or(0.0, &value_at) * w
            })
            .sum()
    }
}

fn mirror_index(idx: i64, len: usize) -> Option<usize> {
    let n = len as i64;
    if n == 1 {
        return Some(0);
    }
    let period = 2 * (n - 1);
    let mut i = idx.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    usize::try_from(i).ok()
}

/// Centered B-spline of the given degree, via the truncated power formula.
fn bspline(degree: usize, x: f64) -> f64 {
    let half = (degree as f64 + 1.0) / 2.0;
    if x.abs() >= half {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut binom = 1.0;
    for k in 0..=degree + 1 {
        let t = x + half - k as f64;
        if t > 0.0 {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            sum += sign * binom * t.powi(degree as i32);
        }
        binom = binom * (degree + 1 - k) as f64 / (k + 1) as f64;
    }
    let factorial: f64 = (1..=degree).map(|v| v as f64).product();
    sum / factorial
}

/// In-place conversion of samples to spline coefficients along one line,
/// mirror boundary conditions.
fn prefilter_line(mut line: ArrayViewMut1<f64>, poles: &[f64]) {
    let n = line.len();
    if n < 2 {
        return;
    }

    let gain: f64 = poles.iter().map(|z| (1.0 - z) * (1.0 - 1.0 / z)).product();
    line.mapv_inplace(|v| v * gain);

    for &z in poles {
        let init = causal_init(&line, z);
        line[0] = init;
        for i in 1..n {
            line[i] = line[i] + z * line[i - 1];
        }
        line[n - 1] = (z / (z * z - 1.0)) * (z * line[n - 2] + line[n - 1]);
        for i in (0..n - 1).rev() {
            line[i] = z * (line[i + 1] - line[i]);
        }
    }
}

fn causal_init(line: &ArrayViewMut1<f64>, z: f64) -> f64 {
    let n = line.len();
    let horizon = ((1e-12f64).ln() / z.abs().ln()).ceil() as usize;

    if horizon < n {
        let mut zn = z;
        let mut sum = line[0];
        for k in 1..horizon {
            sum += zn * line[k];
            zn *= z;
        }
        sum
    } else {
        let mut zn = z;
        let iz = 1.0 / z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = line[0] + z2n * line[n - 1];
        z2n *= z2n * iz;
        for k in 1..n - 1 {
            sum += (zn + z2n) * line[k];
            zn *= z;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}

/// Zero-pad every image of a stack by `y` rows top and bottom and `x` columns
/// left and right.
pub fn pad_stack(stack: &Array3<f32>, x: usize, y: usize) -> Array3<f32> {
    if x == 0 && y == 0 {
        return stack.clone();
    }
    let (p, h, w) = stack.dim();
    let mut padded = Array3::zeros((p, h + 2 * y, w + 2 * x));
    padded
        .slice_mut(s![.., y..y + h, x..x + w])
        .assign(stack);
    padded
}

/// Crop every image of a stack symmetrically to `width` columns.
pub fn crop_width(stack: Array3<f32>, width: usize) -> Result<Array3<f32>> {
    let current = stack.len_of(Axis(2));
    if current == width {
        return Ok(stack);
    }
    if current < width || (current - width) % 2 != 0 {
        return Err(AlignError::domain(
            "crop",
            &[stack.len_of(Axis(0)), stack.len_of(Axis(1)), width],
            &[stack.len_of(Axis(0)), stack.len_of(Axis(1)), current],
        ));
    }
    let margin = (current - width) / 2;
    Ok(stack.slice(s![.., .., margin..margin + width]).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smooth(height: usize, width: usize) -> Array2<f32> {
        Array2::from_shape_fn((height, width), |(r, c)| {
            let dr = r as f64 - height as f64 / 2.0;
            let dc = c as f64 - width as f64 / 2.0;
            (-(dr * dr + dc * dc) / 18.0).exp() as f32
        })
    }

    #[test]
    fn test_bspline_partition_of_unity() {
        for degree in 1..=5 {
            for &frac in &[0.0, 0.25, 0.5, 0.8] {
                let total: f64 = (-4..=4).map(|k| bspline(degree, frac - k as f64)).sum();
                assert!((total - 1.0).abs() < 1e-9, "degree {degree} frac {frac}");
            }
        }
    }

    #[test]
    fn test_zero_translation_is_identity_for_every_order() {
        let img = smooth(20, 24);
        for degree in 0..=5 {
            let order = InterpolationOrder::from_degree(degree).unwrap();
            let out = translate(img.view(), 0.0, 0.0, order).unwrap();
            for (a, b) in img.iter().zip(out.iter()) {
                assert!((a - b).abs() < 1e-5, "order {degree}");
            }
        }
    }

    #[test]
    fn test_integer_translation_moves_content() {
        let img = smooth(32, 32);
        let out = translate(img.view(), 3.0, -2.0, InterpolationOrder::Quintic).unwrap();
        // out(r, c) = img(r - 2, c + 3)
        for r in 4..28 {
            for c in 4..26 {
                assert!((out[[r, c]] - img[[r - 2, c + 3]]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_outside_samples_are_zero() {
        let img = Array2::from_elem((8, 8), 1.0f32);
        let out = translate(img.view(), 3.0, 0.0, InterpolationOrder::Nearest).unwrap();
        assert_eq!(out[[0, 7]], 0.0);
        assert_eq!(out[[0, 4]], 1.0);
    }

    #[test]
    fn test_huge_shift_yields_empty_image() {
        let img = Array2::from_elem((8, 8), 1.0f32);
        for degree in 0..=5 {
            let order = InterpolationOrder::from_degree(degree).unwrap();
            for (tx, ty) in [(1e19, 0.0), (0.0, -1e19), (-9.5e18, 3.0), (14.0, 0.0)] {
                let out = translate(img.view(), tx, ty, order).unwrap();
                assert!(out.iter().all(|v| *v == 0.0), "order {degree} shift ({tx}, {ty})");
            }
        }
    }

    #[test]
    fn test_subpixel_round_trip_interior() {
        let img = smooth(40, 40);
        let there = translate(img.view(), 0.4, -0.7, InterpolationOrder::Cubic).unwrap();
        let back = translate(there.view(), -0.4, 0.7, InterpolationOrder::Cubic).unwrap();
        for r in 5..35 {
            for c in 5..35 {
                assert!((back[[r, c]] - img[[r, c]]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_order_bounds() {
        assert!(InterpolationOrder::from_degree(6).is_err());
        assert_eq!(InterpolationOrder::default().degree(), 5);
    }

    #[test]
    fn test_pad_and_crop() {
        let stack = Array3::from_elem((2, 3, 4), 1.0f32);
        let padded = pad_stack(&stack, 2, 1);
        assert_eq!(padded.dim(), (2, 5, 8));
        assert_eq!(padded[[0, 0, 0]], 0.0);
        assert_eq!(padded[[1, 1, 2]], 1.0);
        let cropped = crop_width(padded, 4).unwrap();
        assert_eq!(cropped.dim(), (2, 5, 4));
        assert_eq!(cropped[[0, 2, 0]], 1.0);
    }
}
