use ndarray::{Array3, ArrayView2, Axis};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tomo_align::analysis::JitterComparison;
use tomo_align::augmentation::{JitterAugmentation, StackAugmentation};
use tomo_align::data::{linspace, shepp_logan_3d, ImageSequenceSink};
use tomo_align::logging::{MetricsCollector, RecordingObserver};
use tomo_align::pipeline::{ArtifactSink, Projector, Registrar, Registration};
use tomo_align::*;

fn simulated_stack(size: usize, angle_count: usize) -> (Array3<f32>, Vec<f64>) {
    let phantom = shepp_logan_3d(size);
    let angles = linspace(0.0, PI, angle_count);
    let stack = RadonProjector.project(&phantom, &angles, false).unwrap();
    (stack, angles)
}

fn fast_options(iterations: usize) -> AlignOptions {
    AlignOptions {
        iterations,
        reconstruction: ReconstructionStrategy::Fbp { filter: FbpFilter::Ramp },
        upsample_factor: 20,
        ..Default::default()
    }
}

/// Fails registration for one projection index.
struct FailingRegistrar {
    bad_index_reference: Arc<AtomicUsize>,
    inner: PhaseCorrelation,
}

impl Registrar for FailingRegistrar {
    fn name(&self) -> &str {
        "failing"
    }

    fn register(&self, image: ArrayView2<f32>, reference: ArrayView2<f32>, up: usize) -> Result<Registration> {
        // The marked projection is the only one carrying this sentinel in its corner.
        if image[[0, 0]] == -1.0 {
            self.bad_index_reference.fetch_add(1, Ordering::SeqCst);
            return Err(AlignError::numeric("sentinel projection"));
        }
        self.inner.register(image, reference, up)
    }
}

struct CountingSink {
    calls: AtomicUsize,
}

impl ArtifactSink for CountingSink {
    fn save_iteration(&self, _iteration: usize, stack: &Array3<f32>, slice: ArrayView2<f32>) -> Result<()> {
        assert_eq!(slice.dim(), (stack.len_of(Axis(2)), stack.len_of(Axis(2))));
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_end_to_end_zero_jitter_64_cube() {
    let (stack, angles) = simulated_stack(64, 90);
    let options = AlignOptions {
        iterations: 2,
        padding: PadMode::None,
        ..Default::default()
    };
    let outcome = align(&stack, &angles, options).unwrap();

    assert_eq!(outcome.stack.dim(), (90, 64, 64));
    assert_eq!(outcome.errors.dim(), (2, 90));
    assert!(outcome.final_error() < 0.5, "final error {}", outcome.final_error());
}

#[test]
fn test_zero_jitter_is_fixed_point() {
    let (stack, angles) = simulated_stack(32, 45);
    let outcome = align(
        &stack,
        &angles,
        AlignOptions {
            iterations: 1,
            ..Default::default()
        },
    )
    .unwrap();

    let worst = outcome.errors.iteration_max(0);
    assert!(worst < 0.25, "largest shift {worst}");
}

#[test]
fn test_jitter_error_decreases() {
    let (stack, angles) = simulated_stack(32, 60);
    let jittered = JitterAugmentation::new(-2.0, 2.0).with_seed(2024).apply(stack).unwrap();
    let true_jitter = jittered.jitter.unwrap();

    let outcome = align(
        &jittered.stack,
        &angles,
        AlignOptions {
            iterations: 8,
            ..Default::default()
        },
    )
    .unwrap();

    let first = outcome.errors.iteration_norm(0);
    let last = outcome.final_error();
    assert!(last < first, "first {first}, last {last}");

    let comparison = JitterComparison::from_outcome(&outcome, &true_jitter).unwrap();
    let n = true_jitter.nrows() as f64;
    let mean_x = true_jitter.column(0).sum() / n;
    let mean_y = true_jitter.column(1).sum() / n;
    let spread = (true_jitter
        .rows()
        .into_iter()
        .map(|j| (j[0] - mean_x).powi(2) + (j[1] - mean_y).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    assert!(
        comparison.relative_rms < 0.65 * spread,
        "residual {} vs jitter spread {spread}",
        comparison.relative_rms
    );
}

#[test]
#[ignore = "slow: ten MLEM-backed iterations on a 32 cube"]
fn test_large_jitter_converges() {
    let (stack, angles) = simulated_stack(32, 60);
    let jittered = JitterAugmentation::symmetric(8.0).with_seed(7).apply(stack).unwrap();

    let outcome = align(
        &jittered.stack,
        &angles,
        AlignOptions {
            iterations: 10,
            ..Default::default()
        },
    )
    .unwrap();

    let first = outcome.errors.iteration_norm(0);
    let last = outcome.final_error();
    assert!(last < 0.25 * first, "first {first}, last {last}");
}

#[test]
fn test_explicit_padding_enlarges_output() {
    let (stack, angles) = simulated_stack(16, 24);
    let options = AlignOptions {
        padding: PadMode::Explicit { x: 4, y: 2 },
        ..fast_options(1)
    };
    let outcome = align(&stack, &angles, options).unwrap();
    assert_eq!(outcome.stack.dim(), (24, 20, 24));
}

#[test]
fn test_diagonal_padding_differs_from_none() {
    let (stack, angles) = simulated_stack(24, 30);
    let jittered = JitterAugmentation::new(-2.0, 2.0).with_seed(11).apply(stack).unwrap().stack;
    let run = |padding| {
        align(
            &jittered,
            &angles,
            AlignOptions {
                padding,
                iterations: 2,
                reconstruction: ReconstructionStrategy::Fbp { filter: FbpFilter::Ramp },
                ..Default::default()
            },
        )
        .unwrap()
    };

    let diagonal = run(PadMode::Diagonal);
    let plain = run(PadMode::None);

    assert_eq!(diagonal.stack.dim(), jittered.dim());
    assert_eq!(diagonal.errors.dim(), (2, 30));
    assert_ne!(diagonal.errors, plain.errors);
    assert_ne!(diagonal.stack, plain.stack);
}

#[test]
fn test_caller_stack_untouched() {
    let (stack, angles) = simulated_stack(16, 24);
    let before = stack.clone();
    let jittered = JitterAugmentation::new(-2.0, 2.0).with_seed(9).apply(stack).unwrap().stack;
    let snapshot = jittered.clone();

    let aligner = Aligner::builder().options(fast_options(2)).build().unwrap();
    let outcome = aligner.align(&jittered, &angles).unwrap();

    assert_eq!(jittered, snapshot);
    assert_ne!(outcome.stack, snapshot);
    assert_eq!(before.dim(), outcome.stack.dim());
}

#[test]
fn test_output_keeps_input_scale() {
    let (stack, angles) = simulated_stack(16, 24);
    let stack = stack.mapv(|v| v * 250.0);
    let input_max = stack.iter().cloned().fold(f32::MIN, f32::max);

    let outcome = align(&stack, &angles, fast_options(1)).unwrap();
    let output_max = outcome.stack.iter().cloned().fold(f32::MIN, f32::max);

    assert!((outcome.scale.value() - input_max).abs() < 1e-3);
    assert!(output_max > 0.5 * input_max && output_max < 1.5 * input_max);
}

#[test]
fn test_degenerate_inputs_fail() {
    let angles = linspace(0.0, PI, 4);

    let zeros = Array3::<f32>::zeros((4, 8, 8));
    assert!(align(&zeros, &angles, fast_options(1)).unwrap_err().is_numeric());

    let constant = Array3::<f32>::from_elem((4, 8, 8), 3.0);
    let err = align(&constant, &angles, fast_options(1)).unwrap_err();
    assert!(err.is_numeric(), "{err}");

    let empty = Array3::<f32>::zeros((0, 8, 8));
    assert!(align(&empty, &[], fast_options(1)).unwrap_err().is_configuration());

    let (stack, angles) = simulated_stack(16, 8);
    assert!(align(&stack, &angles, fast_options(0)).unwrap_err().is_configuration());
    assert!(align(&stack, &angles[1..], fast_options(1)).unwrap_err().is_configuration());
}

#[test]
fn test_cancellation_before_run() {
    let (stack, angles) = simulated_stack(16, 24);
    let token = CancellationToken::new();
    token.cancel();

    let aligner = Aligner::builder()
        .options(fast_options(3))
        .cancellation(token)
        .build()
        .unwrap();
    let err = aligner.align(&stack, &angles).unwrap_err();
    assert!(matches!(err, AlignError::Cancelled { iteration: 0 }));
}

#[test]
fn test_isolate_policy_keeps_going() {
    let (mut stack, angles) = simulated_stack(16, 24);
    // Negative corner survives normalization as the stack minimum.
    stack[[5, 0, 0]] = -stack.iter().cloned().fold(0.0, f32::max);
    let failures = Arc::new(AtomicUsize::new(0));

    let aligner = Aligner::builder()
        .options(AlignOptions {
            failure_policy: FailurePolicy::Isolate,
            ..fast_options(2)
        })
        .registrar(FailingRegistrar {
            bad_index_reference: failures.clone(),
            inner: PhaseCorrelation::new(),
        })
        .build()
        .unwrap();
    let outcome = aligner.align(&stack, &angles).unwrap();

    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome.failures.iter().all(|f| f.index == 5));
    assert_eq!(outcome.errors.as_array()[[0, 5]], 0.0);
    assert_eq!(outcome.errors.as_array()[[1, 5]], 0.0);
}

#[test]
fn test_abort_policy_reports_projection() {
    let (mut stack, angles) = simulated_stack(16, 24);
    stack[[5, 0, 0]] = -stack.iter().cloned().fold(0.0, f32::max);

    let aligner = Aligner::builder()
        .options(fast_options(2))
        .registrar(FailingRegistrar {
            bad_index_reference: Arc::new(AtomicUsize::new(0)),
            inner: PhaseCorrelation::new(),
        })
        .build()
        .unwrap();
    let err = aligner.align(&stack, &angles).unwrap_err();
    assert!(matches!(err, AlignError::Projection { index: 5, .. }));
    assert!(err.is_numeric());
}

#[test]
fn test_observer_reports_only_in_debug() {
    let (stack, angles) = simulated_stack(16, 24);

    let quiet = Arc::new(RecordingObserver::new());
    Aligner::builder()
        .options(fast_options(3))
        .observer(quiet.clone())
        .build()
        .unwrap()
        .align(&stack, &angles)
        .unwrap();
    assert_eq!(quiet.starts(), 1);
    assert!(quiet.reports().is_empty());
    assert!(quiet.final_error().is_some());

    let verbose = Arc::new(RecordingObserver::new());
    let outcome = Aligner::builder()
        .options(AlignOptions {
            debug: true,
            ..fast_options(3)
        })
        .observer(verbose.clone())
        .build()
        .unwrap()
        .align(&stack, &angles)
        .unwrap();
    let reports = verbose.reports();
    assert_eq!(reports.len(), 3);
    for (n, report) in reports.iter().enumerate() {
        assert_eq!(report.iteration, n);
        assert!((report.error_norm - outcome.errors.iteration_norm(n)).abs() < 1e-12);
    }
}

#[test]
fn test_sink_called_once_per_iteration_when_saving() {
    let (stack, angles) = simulated_stack(16, 24);

    let sink = Arc::new(CountingSink {
        calls: AtomicUsize::new(0),
    });
    Aligner::builder()
        .options(AlignOptions {
            save: true,
            ..fast_options(3)
        })
        .sink(sink.clone())
        .build()
        .unwrap()
        .align(&stack, &angles)
        .unwrap();
    assert_eq!(sink.calls.load(Ordering::SeqCst), 3);

    let idle = Arc::new(CountingSink {
        calls: AtomicUsize::new(0),
    });
    Aligner::builder()
        .options(fast_options(2))
        .sink(idle.clone())
        .build()
        .unwrap()
        .align(&stack, &angles)
        .unwrap();
    assert_eq!(idle.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_image_sequence_sink_writes_iterations() {
    let (stack, angles) = simulated_stack(16, 12);
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(ImageSequenceSink::new(dir.path()));

    Aligner::builder()
        .options(AlignOptions {
            save: true,
            ..fast_options(2)
        })
        .sink(sink.clone())
        .build()
        .unwrap()
        .align(&stack, &angles)
        .unwrap();

    for n in 0..2 {
        assert!(sink.iteration_dir(n).join("prj_00011.tiff").exists());
        assert!(sink.iteration_dir(n).join("frames.json").exists());
        assert!(sink.reconstruction_path(n).exists());
    }
}

#[test]
fn test_sequential_and_parallel_agree() {
    let (stack, angles) = simulated_stack(16, 24);
    let jittered = JitterAugmentation::new(-1.5, 1.5).with_seed(4).apply(stack).unwrap().stack;

    let parallel = align(&jittered, &angles, fast_options(2)).unwrap();
    let sequential = align(
        &jittered,
        &angles,
        AlignOptions {
            parallel: false,
            ..fast_options(2)
        },
    )
    .unwrap();

    assert_eq!(parallel.errors, sequential.errors);
    assert_eq!(parallel.stack, sequential.stack);
}

#[test]
fn test_stage_metrics_recorded() {
    let (stack, angles) = simulated_stack(16, 12);
    let metrics = MetricsCollector::shared(true);

    let outcome = Aligner::builder()
        .options(fast_options(2))
        .metrics(metrics.clone())
        .build()
        .unwrap()
        .align(&stack, &angles)
        .unwrap();

    for stage in ["reconstruct", "reproject", "register_warp"] {
        let stats = metrics.calculate_stats(stage).unwrap();
        assert_eq!(stats.count, 2, "{stage}");
    }
    assert_eq!(metrics.get_measurements_by_correlation(outcome.correlation_id).len(), 6);
}
