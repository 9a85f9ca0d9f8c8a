//! Observers for alignment progress.

use crate::pipeline::{AlignmentObserver, IterationReport, ProjectionFailure, RunContext};
use std::sync::Mutex;

/// Forwards every callback to `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AlignmentObserver for TracingObserver {
    fn on_start(&self, context: &RunContext) {
        tracing::info!(
            correlation_id = %context.correlation_id,
            projections = context.projections,
            shape = %format!("{}x{}", context.height, context.width),
            iterations = context.options.iterations,
            reconstruction = ?context.options.reconstruction,
            padding = ?context.options.padding,
            "Starting alignment"
        );
    }

    fn on_iteration(&self, report: &IterationReport) {
        tracing::info!(
            iteration = report.iteration,
            total = report.total_iterations,
            error_norm = report.error_norm,
            max_shift = %format!("{:.3}px", report.max_shift),
            failed = report.failed_projections,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "iteration={} error={:.4}",
            report.iteration,
            report.error_norm
        );
    }

    fn on_projection_failure(&self, failure: &ProjectionFailure) {
        tracing::warn!(
            iteration = failure.iteration,
            projection = failure.index,
            "Projection left uncorrected: {}",
            failure.message
        );
    }

    fn on_finish(&self, final_error: f64) {
        tracing::info!(final_error = final_error, "Alignment finished");
    }
}

/// Keeps every callback in memory, for tests and reports.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    starts: Mutex<Vec<RunContext>>,
    reports: Mutex<Vec<IterationReport>>,
    failures: Mutex<Vec<ProjectionFailure>>,
    finish: Mutex<Option<f64>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn reports(&self) -> Vec<IterationReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn failures(&self) -> Vec<ProjectionFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn final_error(&self) -> Option<f64> {
        self.finish.lock().ok().and_then(|f| *f)
    }
}

impl AlignmentObserver for RecordingObserver {
    fn on_start(&self, context: &RunContext) {
        if let Ok(mut starts) = self.starts.lock() {
            starts.push(context.clone());
        }
    }

    fn on_iteration(&self, report: &IterationReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }

    fn on_projection_failure(&self, failure: &ProjectionFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure.clone());
        }
    }

    fn on_finish(&self, final_error: f64) {
        if let Ok(mut finish) = self.finish.lock() {
            *finish = Some(final_error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recording_observer_keeps_reports() {
        let observer = RecordingObserver::new();
        observer.on_iteration(&IterationReport {
            iteration: 0,
            total_iterations: 2,
            error_norm: 1.25,
            max_shift: 0.5,
            failed_projections: 0,
            elapsed: Duration::from_millis(5),
        });
        observer.on_finish(0.3);

        assert_eq!(observer.reports().len(), 1);
        assert_eq!(observer.reports()[0].error_norm, 1.25);
        assert_eq!(observer.final_error(), Some(0.3));
        assert_eq!(observer.starts(), 0);
    }
}
