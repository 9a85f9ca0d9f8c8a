use crate::algorithms::fft::{fft2, ifft2, image_to_complex, signed_frequency, Spectrum};
use crate::error::AlignError;
use crate::pipeline::{Registrar, Registration, ShiftEstimate};
use crate::Result;
use ndarray::{Array2, ArrayView2, Zip};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Relative magnitude below which cross-power bins are discarded in phase mode.
const PHASE_FLOOR: f64 = 1e-3;

/// How the cross-power spectrum is weighted before the inverse transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMode {
    /// Plain cross-correlation. Robust to the blur of a re-projected stack.
    #[default]
    Cross,
    /// Classic phase correlation, spectrum normalized to unit magnitude.
    Phase,
}

/// Sub-pixel translation registration by cross-correlation with
/// matrix-multiply DFT upsampling around the integer peak.
#[derive(Debug, Clone, Default)]
pub struct PhaseCorrelation {
    mode: CorrelationMode,
}

impl PhaseCorrelation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: CorrelationMode) -> Self {
        Self { mode }
    }
}

impl Registrar for PhaseCorrelation {
    fn name(&self) -> &str {
        "PhaseCorrelation"
    }

    fn register(
        &self,
        image: ArrayView2<f32>,
        reference: ArrayView2<f32>,
        upsample_factor: usize,
    ) -> Result<Registration> {
        register_translation(image, reference, upsample_factor, self.mode)
    }
}

/// Estimate the displacement of `image` relative to `reference`.
///
/// The returned shift is `(row, col)` in pixels, quantized to
/// `1 / upsample_factor`. Translating `image` with `ty = row, tx = col`
/// (output `(r, c)` reads input `(r + ty, c + tx)`) brings it onto `reference`.
pub fn register_translation(
    image: ArrayView2<f32>,
    reference: ArrayView2<f32>,
    upsample_factor: usize,
    mode: CorrelationMode,
) -> Result<Registration> {
    if image.dim() != reference.dim() {
        return Err(AlignError::configuration(format!(
            "registration needs equal shapes, got {:?} and {:?}",
            image.dim(),
            reference.dim()
        )));
    }
    if upsample_factor == 0 {
        return Err(AlignError::configuration("upsample factor must be at least 1"));
    }
    check_image(image, "image")?;
    check_image(reference, "reference")?;

    let (height, width) = image.dim();
    let src_freq = fft2(&image_to_complex(image));
    let tgt_freq = fft2(&image_to_complex(reference));

    let mut product: Spectrum = Array2::zeros((height, width));
    Zip::from(&mut product)
        .and(&src_freq)
        .and(&tgt_freq)
        .for_each(|p: &mut Complex<f64>, &s, &t| *p = s * t.conj());

    if mode == CorrelationMode::Phase {
        whiten(&mut product);
    }

    let correlation = ifft2(&product);
    let (peak_row, peak_col) = find_correlation_peak(&correlation);
    let mut shift_row = wrap_peak(peak_row, height);
    let mut shift_col = wrap_peak(peak_col, width);

    let cc_max = if upsample_factor == 1 {
        // ifft2 divides by the sample count; undo it to match the raw energies.
        correlation[[peak_row, peak_col]] * (height * width) as f64
    } else {
        let up = upsample_factor as f64;
        shift_row = (shift_row * up).round() / up;
        shift_col = (shift_col * up).round() / up;

        let region = (up * 1.5).ceil() as usize;
        let dftshift = (region as f64 / 2.0).trunc();
        let conj_product = product.mapv(|p| p.conj());
        let upsampled = upsampled_dft(
            &conj_product,
            region,
            up,
            (dftshift - shift_row * up, dftshift - shift_col * up),
        )
        .mapv(|v| v.conj());

        let (max_row, max_col) = find_correlation_peak(&upsampled);
        shift_row += (max_row as f64 - dftshift) / up;
        shift_col += (max_col as f64 - dftshift) / up;
        upsampled[[max_row, max_col]]
    };

    if height == 1 {
        shift_row = 0.0;
    }
    if width == 1 {
        shift_col = 0.0;
    }

    let (src_energy, tgt_energy) = match mode {
        CorrelationMode::Cross => (energy(&src_freq), energy(&tgt_freq)),
        CorrelationMode::Phase => {
            let unit = product.iter().filter(|p| p.norm() > 0.0).count() as f64;
            (unit, unit)
        }
    };
    let error = if src_energy > 0.0 && tgt_energy > 0.0 {
        (1.0 - cc_max.norm_sqr() / (src_energy * tgt_energy)).abs().sqrt()
    } else {
        1.0
    };

    Ok(Registration {
        shift: ShiftEstimate::new(shift_row, shift_col),
        error,
        phase_difference: cc_max.im.atan2(cc_max.re),
    })
}

/// Evaluate the inverse DFT of `data` on an upsampled grid of `region x region`
/// points, starting at `offsets` (in upsampled pixels). Two small matrix
/// products instead of a zero-padded FFT of the full image.
fn upsampled_dft(data: &Spectrum, region: usize, upsample: f64, offsets: (f64, f64)) -> Spectrum {
    let (rows, cols) = data.dim();

    let col_kernel = Array2::from_shape_fn((cols, region), |(k, j)| {
        let phase = -2.0 * PI / (cols as f64 * upsample)
            * signed_frequency(k, cols)
            * (j as f64 - offsets.1);
        Complex::from_polar(1.0, phase)
    });
    let row_kernel = Array2::from_shape_fn((region, rows), |(i, k)| {
        let phase = -2.0 * PI / (rows as f64 * upsample)
            * (i as f64 - offsets.0)
            * signed_frequency(k, rows);
        Complex::from_polar(1.0, phase)
    });

    row_kernel.dot(data).dot(&col_kernel)
}

/// Normalize the cross-power spectrum to unit magnitude.
///
/// The DC bin only carries the image means and is dropped. Bins weaker than
/// `PHASE_FLOOR` of the strongest remaining one carry rounding noise and
/// boundary leakage, not the shift, and are zeroed.
fn whiten(product: &mut Spectrum) {
    product[[0, 0]] = Complex::new(0.0, 0.0);
    let peak = product.iter().map(|p| p.norm()).fold(0.0, f64::max);
    let floor = PHASE_FLOOR * peak;
    product.mapv_inplace(|p| {
        let magnitude = p.norm();
        if magnitude > floor && magnitude > 0.0 {
            p / magnitude
        } else {
            Complex::new(0.0, 0.0)
        }
    });
}

fn find_correlation_peak(correlation: &Spectrum) -> (usize, usize) {
    let mut max_val = f64::NEG_INFINITY;
    let mut peak = (0, 0);

    for ((y, x), value) in correlation.indexed_iter() {
        let magnitude = value.norm_sqr();
        if magnitude > max_val {
            max_val = magnitude;
            peak = (y, x);
        }
    }

    peak
}

fn wrap_peak(peak: usize, size: usize) -> f64 {
    if peak > size / 2 {
        peak as f64 - size as f64
    } else {
        peak as f64
    }
}

fn energy(spectrum: &Spectrum) -> f64 {
    spectrum.iter().map(|v| v.norm_sqr()).sum()
}

fn check_image(img: ArrayView2<f32>, label: &str) -> Result<()> {
    if img.is_empty() {
        return Err(AlignError::configuration(format!("{label} is empty")));
    }

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in img.iter() {
        if !v.is_finite() {
            return Err(AlignError::numeric(format!("{label} contains non-finite samples")));
        }
        min = min.min(v);
        max = max.max(v);
    }

    let spread = (max - min) as f64;
    if spread <= 1e-9 * (max.abs().max(min.abs()) as f64).max(1.0) {
        return Err(AlignError::numeric(format!(
            "{label} is constant, translation is undefined"
        )));
    }
    Ok(())
}
