use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use std::f64::consts::PI;
use tomo_align::algorithms::phase_correlation::register_translation;
use tomo_align::algorithms::warp::translate;
use tomo_align::data::{linspace, shepp_logan_3d};
use tomo_align::pipeline::Projector;
use tomo_align::*;

fn make_scene(size: usize) -> Array2<f32> {
    let centre = size as f64 / 2.0;
    Array2::from_shape_fn((size, size), |(r, c)| {
        let dr = r as f64 - centre * 0.8;
        let dc = c as f64 - centre * 1.1;
        ((-(dr * dr + dc * dc) / 30.0).exp() + 0.02 * ((r * 7 + c * 3) % 11) as f64) as f32
    })
}

fn bench_registration(c: &mut Criterion) {
    let reference = make_scene(64);
    let moved = translate(reference.view(), 2.3, -1.7, InterpolationOrder::Cubic).unwrap();

    let mut group = c.benchmark_group("register_translation");
    for upsample in [1usize, 20, 100] {
        group.bench_function(format!("64x64_up{upsample}"), |b| {
            b.iter(|| {
                register_translation(
                    black_box(moved.view()),
                    black_box(reference.view()),
                    upsample,
                    CorrelationMode::Cross,
                )
            })
        });
    }
    group.finish();
}

fn bench_alignment_iteration(c: &mut Criterion) {
    let phantom = shepp_logan_3d(32);
    let angles = linspace(0.0, PI, 45);
    let stack = RadonProjector.project(&phantom, &angles, false).unwrap();

    let mut group = c.benchmark_group("alignment_iteration");
    group.sample_size(10);
    for (label, reconstruction) in [
        ("mlem", ReconstructionStrategy::Mlem { iterations: 10 }),
        ("fbp", ReconstructionStrategy::Fbp { filter: FbpFilter::Ramp }),
    ] {
        let aligner = Aligner::builder()
            .options(AlignOptions {
                iterations: 1,
                reconstruction,
                ..Default::default()
            })
            .build()
            .unwrap();
        group.bench_function(format!("32cube_45angles_{label}"), |b| {
            b.iter(|| aligner.align(black_box(&stack), black_box(&angles)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_registration, bench_alignment_iteration);
criterion_main!(benches);
