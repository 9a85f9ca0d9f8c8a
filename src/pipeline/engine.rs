use crate::algorithms::radon::detector_width;
use crate::algorithms::warp::{crop_width, pad_stack};
use crate::error::AlignError;
use crate::logging::{AlignmentSpan, MetricsCollector, Timer};
use crate::normalize::Normalizer;
use crate::pipeline::builder::AlignerBuilder;
use crate::pipeline::traits::{AlignmentObserver, ArtifactSink, Projector, Reconstructor, Registrar, Warper};
use crate::pipeline::types::{
    AlignOptions, AlignmentOutcome, CancellationToken, ErrorMatrix, FailurePolicy, IterationReport, PadMode,
    ProjectionFailure, RunContext, ShiftEstimate, ShiftHistory,
};
use crate::Result;
use instant::Instant;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Iterative re-projection alignment of a projection stack.
///
/// Each iteration reconstructs the working stack, re-projects the volume at
/// the same angles, registers every projection against its re-projection and
/// warps it by the estimated shift. Built with [`AlignerBuilder`].
pub struct Aligner {
    pub(crate) options: AlignOptions,
    pub(crate) projector: Arc<dyn Projector>,
    pub(crate) reconstructor: Arc<dyn Reconstructor>,
    pub(crate) registrar: Arc<dyn Registrar>,
    pub(crate) warper: Arc<dyn Warper>,
    pub(crate) observer: Arc<dyn AlignmentObserver>,
    pub(crate) sink: Option<Arc<dyn ArtifactSink>>,
    pub(crate) metrics: Option<Arc<MetricsCollector>>,
    pub(crate) cancellation: CancellationToken,
}

type ProjectionResult = Result<(ShiftEstimate, Array2<f32>)>;

impl Aligner {
    pub fn builder() -> AlignerBuilder {
        AlignerBuilder::new()
    }

    pub fn options(&self) -> &AlignOptions {
        &self.options
    }

    /// Align a copy of `stack`; the caller's array is left untouched.
    pub fn align(&self, stack: &Array3<f32>, angles: &[f64]) -> Result<AlignmentOutcome> {
        self.align_owned(stack.to_owned(), angles)
    }

    /// Align `stack` in place of a copy.
    pub fn align_owned(&self, stack: Array3<f32>, angles: &[f64]) -> Result<AlignmentOutcome> {
        let (projections, height, width) = stack.dim();
        self.check_inputs(projections, height, width, angles)?;

        let started = Instant::now();
        let correlation_id = Uuid::new_v4();
        let options = &self.options;
        let run_span = AlignmentSpan::new(projections, height, width, options.iterations, correlation_id);
        let _run_guard = run_span.enter();

        let (stack, scale) = Normalizer::scale(stack)?;
        let mut stack = match options.padding {
            PadMode::Explicit { x, y } if x > 0 || y > 0 => pad_stack(&stack, x, y),
            _ => stack,
        };
        let (_, work_height, work_width) = stack.dim();
        debug!(
            scale = scale.value(),
            work_height = work_height,
            work_width = work_width,
            "Normalized working stack"
        );

        self.observer.on_start(&RunContext {
            correlation_id,
            projections,
            height: work_height,
            width: work_width,
            options: options.clone(),
        });

        let mut errors = ErrorMatrix::zeros(options.iterations, projections);
        let mut shifts = ShiftHistory::zeros(options.iterations, projections);
        let mut failures = Vec::new();

        for n in 0..options.iterations {
            if self.cancellation.is_cancelled() {
                info!(iteration = n, "Alignment cancelled");
                return Err(AlignError::Cancelled { iteration: n });
            }

            let iteration_started = Instant::now();
            let iteration_span = run_span.iteration(n);
            let _iteration_guard = iteration_span.enter();

            let rec = self.reconstruct(&stack, angles, n, correlation_id)?;
            let sim = self.reproject(&rec, angles, stack.dim(), n, correlation_id)?;

            let timer = self.timer("register_warp", n, correlation_id);
            let results = self.register_all(&stack, &sim);
            timer.stop();

            let mut failed = 0;
            for (m, result) in results.into_iter().enumerate() {
                match result {
                    Ok((shift, warped)) => {
                        trace!(projection = m, row = shift.row, col = shift.col, "Projection registered");
                        errors.set(n, m, shift.magnitude());
                        shifts.record(n, m, shift);
                        stack.index_axis_mut(Axis(0), m).assign(&warped);
                    }
                    Err(e) if options.failure_policy == FailurePolicy::Isolate => {
                        let failure = ProjectionFailure {
                            iteration: n,
                            index: m,
                            message: e.to_string(),
                        };
                        self.observer.on_projection_failure(&failure);
                        failures.push(failure);
                        failed += 1;
                    }
                    Err(e) => return Err(e.at_projection(m)),
                }
            }

            let error_norm = errors.iteration_norm(n);
            let max_shift = errors.iteration_max(n);
            AlignmentSpan::record_iteration(&iteration_span, error_norm, max_shift);

            if options.debug {
                self.observer.on_iteration(&IterationReport {
                    iteration: n,
                    total_iterations: options.iterations,
                    error_norm,
                    max_shift,
                    failed_projections: failed,
                    elapsed: iteration_started.elapsed(),
                });
            }

            if options.save {
                if let Some(sink) = &self.sink {
                    let slice = rec.index_axis(Axis(0), rec.len_of(Axis(0)) / 2);
                    sink.save_iteration(n, &stack, slice).map_err(|e| {
                        AlignError::Resource(format!("saving iteration {n} failed: {e}"))
                    })?;
                }
            }
        }

        scale.restore(&mut stack);

        let outcome = AlignmentOutcome {
            stack,
            errors,
            shifts,
            failures,
            scale,
            correlation_id,
            elapsed: started.elapsed(),
        };
        let final_error = outcome.final_error();
        run_span.record_completion(final_error, outcome.failures.len());
        self.observer.on_finish(final_error);
        Ok(outcome)
    }

    fn check_inputs(&self, projections: usize, height: usize, width: usize, angles: &[f64]) -> Result<()> {
        self.options.validate()?;
        if projections == 0 || height == 0 || width == 0 {
            return Err(AlignError::configuration(format!(
                "projection stack is empty: ({projections}, {height}, {width})"
            )));
        }
        if angles.len() != projections {
            return Err(AlignError::configuration(format!(
                "{} angles given for {} projections",
                angles.len(),
                projections
            )));
        }
        if self.options.save && self.sink.is_none() {
            return Err(AlignError::configuration("save requested without an artifact sink"));
        }
        Ok(())
    }

    /// Reconstruct the working stack. Under [`PadMode::Diagonal`] the stack is
    /// zero-padded in width to the slice diagonal first, so the volume covers
    /// everything the detector can see at any angle.
    fn reconstruct(&self, stack: &Array3<f32>, angles: &[f64], n: usize, id: Uuid) -> Result<Array3<f32>> {
        let timer = self.timer("reconstruct", n, id);
        let (_, height, width) = stack.dim();
        let margin = self.reconstruction_margin(width);
        let rec = if margin > 0 {
            self.reconstructor.reconstruct(&pad_stack(stack, margin, 0), angles)?
        } else {
            self.reconstructor.reconstruct(stack, angles)?
        };
        timer.stop();

        let size = width + 2 * margin;
        if rec.dim() != (height, size, size) {
            let (z, y, x) = rec.dim();
            return Err(AlignError::domain("reconstruct", &[height, size, size], &[z, y, x]));
        }
        Ok(rec)
    }

    /// Re-project the volume without padding and crop it back to the working width.
    fn reproject(
        &self,
        rec: &Array3<f32>,
        angles: &[f64],
        expected: (usize, usize, usize),
        n: usize,
        id: Uuid,
    ) -> Result<Array3<f32>> {
        let timer = self.timer("reproject", n, id);
        let mut sim = self.projector.project(rec, angles, false)?;
        if sim.len_of(Axis(2)) > expected.2 {
            sim = crop_width(sim, expected.2)?;
        }
        timer.stop();

        if sim.dim() != expected {
            let (p, h, w) = sim.dim();
            return Err(AlignError::domain(
                "reproject",
                &[expected.0, expected.1, expected.2],
                &[p, h, w],
            ));
        }
        Ok(sim)
    }

    /// Columns of zero padding added on each side of the reconstruction input.
    fn reconstruction_margin(&self, width: usize) -> usize {
        match self.options.padding {
            PadMode::Diagonal => (detector_width(width, width, true) - width) / 2,
            PadMode::None | PadMode::Explicit { .. } => 0,
        }
    }

    /// Register every projection against its re-projection and warp it.
    /// Each task reads only its own index; `sim` is shared read-only.
    fn register_all(&self, stack: &Array3<f32>, sim: &Array3<f32>) -> Vec<ProjectionResult> {
        let count = stack.len_of(Axis(0));
        let task = |m: usize| self.register_and_warp(stack.index_axis(Axis(0), m), sim.index_axis(Axis(0), m));
        if self.options.parallel {
            (0..count).into_par_iter().map(task).collect()
        } else {
            (0..count).map(task).collect()
        }
    }

    fn register_and_warp(&self, image: ArrayView2<f32>, reference: ArrayView2<f32>) -> ProjectionResult {
        let registration = self
            .registrar
            .register(image, reference, self.options.upsample_factor)?;
        let shift = registration.shift;
        // Registrar reports (row, col); the warp takes (x, y).
        let warped = self
            .warper
            .translate(image, shift.col, shift.row, self.options.warp_order)?;
        Ok((shift, warped))
    }

    fn timer(&self, stage: &str, n: usize, id: Uuid) -> Timer {
        let timer = match &self.metrics {
            Some(collector) => Timer::start_with_collector(stage, Some(id), collector.clone()),
            None => Timer::start(stage, Some(id)),
        };
        timer.for_iteration(n)
    }
}

/// Align `stack` with the default operators and `options`.
pub fn align(stack: &Array3<f32>, angles: &[f64], options: AlignOptions) -> Result<AlignmentOutcome> {
    AlignerBuilder::new().options(options).build()?.align(stack, angles)
}
