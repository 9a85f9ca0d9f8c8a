//! Logging configuration
//!
//! Log level, output destinations and whether stage timings are collected.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Level for the engine's per-iteration events
    pub pipeline_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for daily-rolling JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in console logs
    pub include_file_location: bool,

    /// Collect per-stage timings
    pub collect_metrics: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            pipeline_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            collect_metrics: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration with file output under `logs/`
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            pipeline_level: "trace".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            collect_metrics: true,
        }
    }

    /// Map a `-v` count onto a level: 0 keeps the configured one.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        let level = match verbose {
            0 => return self,
            1 => "debug",
            _ => "trace",
        };
        self.global_level = level.to_string();
        self.pipeline_level = level.to_string();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !VALID_LEVELS.contains(&self.global_level.as_str()) {
            return Err(format!(
                "Invalid global_level: {}. Must be one of: {:?}",
                self.global_level, VALID_LEVELS
            ));
        }

        if !VALID_LEVELS.contains(&self.pipeline_level.as_str()) {
            return Err(format!(
                "Invalid pipeline_level: {}. Must be one of: {:?}",
                self.pipeline_level, VALID_LEVELS
            ));
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> String {
        let krate = env!("CARGO_PKG_NAME").replace('-', "_");
        format!(
            "{krate}={global},{krate}::pipeline={pipeline}",
            global = self.global_level,
            pipeline = self.pipeline_level
        )
    }
}
