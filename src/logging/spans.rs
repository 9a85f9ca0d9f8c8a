//! Structured spans for alignment runs
//!
//! Every run gets one `alignment_run` span carrying its correlation id, and one
//! `alignment_iteration` span per refinement round nested inside it. Fields are
//! declared up front so `record` calls land on the span.

use instant::Instant;
use tracing::{field, span, Level, Span};
use uuid::Uuid;

/// Span covering one whole alignment run
pub struct AlignmentSpan {
    span: Span,
    start_time: Instant,
    correlation_id: Uuid,
}

impl AlignmentSpan {
    pub fn new(projections: usize, height: usize, width: usize, iterations: usize, correlation_id: Uuid) -> Self {
        let span = span!(
            Level::INFO,
            "alignment_run",
            correlation_id = %correlation_id,
            projections = projections,
            height = height,
            width = width,
            iterations = iterations,
            final_error = field::Empty,
            failures = field::Empty,
            execution_time_ms = field::Empty
        );

        Self {
            span,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Open the span for iteration `n`, nested in this run
    pub fn iteration(&self, iteration: usize) -> Span {
        span!(
            parent: &self.span,
            Level::DEBUG,
            "alignment_iteration",
            iteration = iteration,
            error_norm = field::Empty,
            max_shift = field::Empty
        )
    }

    /// Record the per-iteration results on an iteration span
    pub fn record_iteration(iteration_span: &Span, error_norm: f64, max_shift: f64) {
        iteration_span.record("error_norm", error_norm);
        iteration_span.record("max_shift", max_shift);
        tracing::debug!(
            parent: iteration_span,
            error_norm = error_norm,
            max_shift = %format!("{:.3}px", max_shift),
            "Iteration completed"
        );
    }

    pub fn record_completion(&self, final_error: f64, failures: usize) {
        let duration = self.start_time.elapsed();
        self.span.record("final_error", final_error);
        self.span.record("failures", failures);
        self.span.record("execution_time_ms", duration.as_secs_f64() * 1000.0);

        tracing::info!(
            parent: &self.span,
            final_error = final_error,
            failures = failures,
            execution_time_ms = duration.as_millis() as u64,
            "Alignment run completed"
        );
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_span_lifecycle() {
        let correlation_id = Uuid::new_v4();
        let span = AlignmentSpan::new(90, 64, 64, 2, correlation_id);
        let _enter = span.enter();

        for n in 0..2 {
            let iteration = span.iteration(n);
            let _guard = iteration.enter();
            AlignmentSpan::record_iteration(&iteration, 1.5 / (n + 1) as f64, 0.4);
        }
        span.record_completion(0.75, 0);
        assert_eq!(span.correlation_id(), correlation_id);
    }
}
