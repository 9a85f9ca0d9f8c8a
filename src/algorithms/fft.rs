//! Separable 2D FFT helpers shared by registration and filtering.

use ndarray::{Array2, ArrayView2};
use rustfft::{num_complex::Complex, FftPlanner};

pub type Spectrum = Array2<Complex<f64>>;

/// Lift a real image into the complex plane.
pub fn image_to_complex(img: ArrayView2<f32>) -> Spectrum {
    img.mapv(|v| Complex::new(v as f64, 0.0))
}

/// Forward 2D FFT, rows first then columns. Unnormalized.
pub fn fft2(input: &Spectrum) -> Spectrum {
    transform_2d(input, false)
}

/// Inverse 2D FFT, normalized by `1 / (rows * cols)`.
pub fn ifft2(input: &Spectrum) -> Spectrum {
    let (height, width) = input.dim();
    let mut result = transform_2d(input, true);
    let norm = 1.0 / (height * width) as f64;
    result.mapv_inplace(|v| v * norm);
    result
}

fn transform_2d(input: &Spectrum, inverse: bool) -> Spectrum {
    let (height, width) = input.dim();
    let mut result = input.clone();
    if height == 0 || width == 0 {
        return result;
    }

    let mut planner = FftPlanner::new();
    let (fft_row, fft_col) = if inverse {
        (planner.plan_fft_inverse(width), planner.plan_fft_inverse(height))
    } else {
        (planner.plan_fft_forward(width), planner.plan_fft_forward(height))
    };

    let mut buffer = vec![Complex::new(0.0, 0.0); width];
    for mut row in result.rows_mut() {
        buffer.iter_mut().zip(row.iter()).for_each(|(b, v)| *b = *v);
        fft_row.process(&mut buffer);
        row.iter_mut().zip(buffer.iter()).for_each(|(v, b)| *v = *b);
    }

    let mut buffer = vec![Complex::new(0.0, 0.0); height];
    for mut col in result.columns_mut() {
        buffer.iter_mut().zip(col.iter()).for_each(|(b, v)| *b = *v);
        fft_col.process(&mut buffer);
        col.iter_mut().zip(buffer.iter()).for_each(|(v, b)| *v = *b);
    }

    result
}

/// Signed frequency index of FFT bin `p` in a transform of length `n`.
pub fn signed_frequency(p: usize, n: usize) -> f64 {
    if p <= (n - 1) / 2 {
        p as f64
    } else {
        p as f64 - n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_round_trip() {
        let img = Array2::from_shape_fn((6, 5), |(r, c)| (r * 5 + c) as f32 * 0.25);
        let spectrum = fft2(&image_to_complex(img.view()));
        let back = ifft2(&spectrum);
        for (a, b) in img.iter().zip(back.iter()) {
            assert!((*a as f64 - b.re).abs() < 1e-9);
            assert!(b.im.abs() < 1e-9);
        }
    }

    #[test]
    fn test_dc_component_is_sum() {
        let img = Array2::from_elem((4, 4), 2.0f32);
        let spectrum = fft2(&image_to_complex(img.view()));
        assert!((spectrum[[0, 0]].re - 32.0).abs() < 1e-9);
        assert!(spectrum[[1, 2]].norm() < 1e-9);
    }

    #[test]
    fn test_signed_frequency() {
        let even: Vec<f64> = (0..4).map(|p| signed_frequency(p, 4)).collect();
        assert_eq!(even, vec![0.0, 1.0, -2.0, -1.0]);
        let odd: Vec<f64> = (0..5).map(|p| signed_frequency(p, 5)).collect();
        assert_eq!(odd, vec![0.0, 1.0, 2.0, -2.0, -1.0]);
    }
}
