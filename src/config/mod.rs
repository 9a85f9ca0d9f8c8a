use crate::error::AlignError;
use crate::logging::LoggingConfig;
use crate::pipeline::{AlignOptions, PadMode};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub alignment: AlignOptions,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Synthetic data for the demo command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Edge length of the cubic phantom
    pub size: usize,
    pub angle_count: usize,
    pub angle_start: f64,
    pub angle_end: f64,
    /// Jitter drawn from `[-jitter, jitter)` pixels
    pub jitter: f64,
    /// Noise standard deviation as a fraction of the stack maximum
    pub noise_ratio: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            size: 64,
            angle_count: 90,
            angle_start: 0.0,
            angle_end: PI,
            jitter: 8.0,
            noise_ratio: 0.01,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub prefix: String,
    /// Write `report.json` next to the aligned stack
    pub write_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            prefix: "prj".to_string(),
            write_report: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

impl Config {
    /// Load TOML, or JSON when the content starts with `{`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            toml::from_str(&content).map_err(|e| AlignError::configuration(format!("invalid TOML: {e}")))
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| AlignError::configuration(format!("cannot encode TOML: {e}")))?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.alignment.validate() {
            errors.push(e.to_string());
        }

        if self.alignment.save && self.output.directory.as_os_str().is_empty() {
            errors.push("Saving artifacts needs an output directory".to_string());
        }

        if let PadMode::Explicit { x, y } = self.alignment.padding {
            if x > 4096 || y > 4096 {
                errors.push(format!("Explicit padding ({x}, {y}) is unreasonably large"));
            }
        }

        if self.simulation.size < 2 {
            errors.push("Simulation size must be at least 2".to_string());
        }

        if self.simulation.angle_count == 0 {
            errors.push("Simulation needs at least one angle".to_string());
        }

        if !self.simulation.jitter.is_finite() || self.simulation.jitter < 0.0 {
            errors.push("Jitter amplitude must be non-negative".to_string());
        }

        if !self.simulation.noise_ratio.is_finite() || self.simulation.noise_ratio < 0.0 {
            errors.push("Noise ratio must be non-negative".to_string());
        }

        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub fn load_config_or_default(config_path: Option<&str>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    eprintln!("Configuration validation errors:");
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                    eprintln!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                eprintln!("Failed to load config from '{}': {}", path, e);
                eprintln!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}
