//! Structured logging for alignment runs
//!
//! Subscriber setup, run spans with correlation ids, stage timing metrics and
//! the observers the engine reports progress to.

pub mod config;
pub mod metrics;
pub mod observer;
pub mod spans;

use crate::error::AlignError;
use crate::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use config::LoggingConfig;
pub use metrics::{MetricsCollector, StageMeasurement, StageStats, Timer};
pub use observer::{RecordingObserver, TracingObserver};
pub use spans::AlignmentSpan;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured levels. The returned guard flushes the
/// file writer and must be kept alive for the life of the program.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    config.validate().map_err(AlignError::Configuration)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let mut layers = Vec::new();

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(config.include_file_location)
            .with_file(config.include_file_location)
            .with_writer(std::io::stderr);
        layers.push(console_layer.boxed());
    }

    let mut guard = None;
    if let Some(ref log_dir) = config.log_directory {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "alignment.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false).json();
        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| AlignError::configuration(format!("logging already initialized: {e}")))?;

    tracing::debug!(?config, "Logging system initialized");
    Ok(guard)
}
