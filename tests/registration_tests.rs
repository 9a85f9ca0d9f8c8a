use ndarray::{s, Array2, Array3};
use tomo_align::algorithms::phase_correlation::register_translation;
use tomo_align::algorithms::warp::translate;
use tomo_align::pipeline::{Registrar, Warper};
use tomo_align::*;

fn create_scene(height: usize, width: usize) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(r, c)| {
        let blob = |cr: f64, cc: f64, sigma: f64| {
            let dr = r as f64 - cr;
            let dc = c as f64 - cc;
            (-(dr * dr + dc * dc) / (2.0 * sigma * sigma)).exp()
        };
        (blob(22.0, 26.0, 3.0) + 0.6 * blob(40.0, 34.0, 5.0) + 0.3 * blob(30.0, 18.0, 2.0)) as f32
    })
}

fn interior_max_diff(a: &Array2<f32>, b: &Array2<f32>, margin: usize) -> f32 {
    let (h, w) = a.dim();
    let a = a.slice(s![margin..h - margin, margin..w - margin]);
    let b = b.slice(s![margin..h - margin, margin..w - margin]);
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

#[test]
fn test_register_then_warp_restores_reference() {
    let reference = create_scene(64, 64);
    // Output (r, c) reads input (r + 2, c - 3), so content moves up 2 and right 3.
    let moved = translate(reference.view(), -3.0, 2.0, InterpolationOrder::Quintic).unwrap();

    let reg = register_translation(moved.view(), reference.view(), 100, CorrelationMode::Cross).unwrap();
    assert!((reg.shift.row + 2.0).abs() < 0.05, "row {}", reg.shift.row);
    assert!((reg.shift.col - 3.0).abs() < 0.05, "col {}", reg.shift.col);

    // Registrar's (row, col) maps onto the warp's (ty, tx).
    let restored = SplineWarp
        .translate(moved.view(), reg.shift.col, reg.shift.row, InterpolationOrder::Quintic)
        .unwrap();
    assert!(interior_max_diff(&restored, &reference, 8) < 0.02);
}

#[test]
fn test_swapped_axes_do_not_restore() {
    let reference = create_scene(64, 64);
    let moved = translate(reference.view(), -3.0, 2.0, InterpolationOrder::Quintic).unwrap();
    let reg = PhaseCorrelation::new().register(moved.view(), reference.view(), 10).unwrap();

    let swapped = translate(moved.view(), reg.shift.row, reg.shift.col, InterpolationOrder::Quintic).unwrap();
    assert!(interior_max_diff(&swapped, &reference, 8) > 0.1);
}

#[test]
fn test_subpixel_precision_follows_upsample_factor() {
    let reference = create_scene(64, 64);
    let moved = translate(reference.view(), 0.3, -0.7, InterpolationOrder::Cubic).unwrap();

    let coarse = register_translation(moved.view(), reference.view(), 1, CorrelationMode::Cross).unwrap();
    assert_eq!(coarse.shift.row.fract(), 0.0);
    assert_eq!(coarse.shift.col.fract(), 0.0);

    let fine = register_translation(moved.view(), reference.view(), 20, CorrelationMode::Cross).unwrap();
    assert!((fine.shift.row - 0.7).abs() < 0.1, "row {}", fine.shift.row);
    assert!((fine.shift.col + 0.3).abs() < 0.1, "col {}", fine.shift.col);
    let scaled = fine.shift.row * 20.0;
    assert!((scaled - scaled.round()).abs() < 1e-6);
}

#[test]
fn test_normalization_round_trip_on_stack() {
    let stack = Array3::from_shape_fn((4, 8, 8), |(p, r, c)| (p as f32 - 1.5) * (r * c) as f32 * 0.37);
    let (scaled, factor) = Normalizer::scale(stack.clone()).unwrap();
    assert!(scaled.iter().all(|v| (-1.0..=1.0).contains(v)));

    let restored = Normalizer::denormalize(scaled, factor);
    for (a, b) in restored.iter().zip(stack.iter()) {
        assert!((a - b).abs() <= 1e-5 * b.abs().max(1.0));
    }
}
