//! Stage timing collection
//!
//! Records the duration of every reconstruct / reproject / register-warp stage
//! of an alignment run and summarizes them per stage.

use instant::Instant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// One timed stage execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMeasurement {
    pub stage: String,
    pub iteration: Option<usize>,
    pub duration_ms: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<Uuid>,
}

/// Statistical summary of one stage across a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: String,
    pub count: usize,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Thread-safe stage timing collector, shared by `Arc`
pub struct MetricsCollector {
    measurements: Mutex<Vec<StageMeasurement>>,
    enabled: bool,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            measurements: Mutex::new(Vec::new()),
            enabled,
        }
    }

    pub fn shared(enabled: bool) -> Arc<Self> {
        Arc::new(Self::new(enabled))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a stage duration
    pub fn record(&self, stage: &str, iteration: Option<usize>, duration: Duration, correlation_id: Option<Uuid>) {
        if !self.enabled {
            return;
        }

        let measurement = StageMeasurement {
            stage: stage.to_string(),
            iteration,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: chrono::Utc::now(),
            correlation_id,
        };

        if let Ok(mut measurements) = self.measurements.lock() {
            measurements.push(measurement);

            // Keep memory bounded on very long runs
            if measurements.len() > 10000 {
                measurements.drain(0..5000);
            }
        }
    }

    /// All measurements of one stage
    pub fn get_measurements(&self, stage: &str) -> Vec<StageMeasurement> {
        match self.measurements.lock() {
            Ok(measurements) => measurements.iter().filter(|m| m.stage == stage).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// All measurements of one run
    pub fn get_measurements_by_correlation(&self, correlation_id: Uuid) -> Vec<StageMeasurement> {
        match self.measurements.lock() {
            Ok(measurements) => measurements
                .iter()
                .filter(|m| m.correlation_id == Some(correlation_id))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn calculate_stats(&self, stage: &str) -> Option<StageStats> {
        let mut durations: Vec<f64> = self.get_measurements(stage).iter().map(|m| m.duration_ms).collect();
        if durations.is_empty() {
            return None;
        }
        durations.sort_by(|a, b| a.total_cmp(b));

        let count = durations.len();
        let total: f64 = durations.iter().sum();
        let mean = total / count as f64;
        let variance = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (durations[count / 2 - 1] + durations[count / 2]) / 2.0
        } else {
            durations[count / 2]
        };

        Some(StageStats {
            stage: stage.to_string(),
            count,
            total_ms: total,
            mean_ms: mean,
            median_ms: median,
            std_dev_ms: variance.sqrt(),
            min_ms: durations[0],
            max_ms: durations[count - 1],
        })
    }

    /// Stats for every stage seen so far, keyed by stage name
    pub fn summary(&self) -> HashMap<String, StageStats> {
        let stages: Vec<String> = match self.measurements.lock() {
            Ok(measurements) => {
                let mut names: Vec<String> = measurements.iter().map(|m| m.stage.clone()).collect();
                names.sort();
                names.dedup();
                names
            }
            Err(_) => Vec::new(),
        };
        stages
            .into_iter()
            .filter_map(|stage| self.calculate_stats(&stage).map(|stats| (stage, stats)))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut measurements) = self.measurements.lock() {
            measurements.clear();
        }
    }

    pub fn measurement_count(&self) -> usize {
        self.measurements.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn export_to_json(&self) -> Result<String, serde_json::Error> {
        match self.measurements.lock() {
            Ok(measurements) => serde_json::to_string_pretty(&*measurements),
            Err(_) => Ok("[]".to_string()),
        }
    }
}

/// Measures one stage and reports it to the collector on `stop`
pub struct Timer {
    start: Instant,
    stage: String,
    iteration: Option<usize>,
    correlation_id: Option<Uuid>,
    collector: Option<Arc<MetricsCollector>>,
}

impl Timer {
    pub fn start(stage: &str, correlation_id: Option<Uuid>) -> Self {
        Self {
            start: Instant::now(),
            stage: stage.to_string(),
            iteration: None,
            correlation_id,
            collector: None,
        }
    }

    pub fn start_with_collector(stage: &str, correlation_id: Option<Uuid>, collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector: Some(collector),
            ..Self::start(stage, correlation_id)
        }
    }

    pub fn for_iteration(mut self, iteration: usize) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Stop the timer and record the measurement
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();

        if let Some(collector) = &self.collector {
            collector.record(&self.stage, self.iteration, duration, self.correlation_id);
        }

        tracing::trace!(
            stage = %self.stage,
            iteration = ?self.iteration,
            duration_ms = duration.as_secs_f64() * 1000.0,
            "Stage completed"
        );

        duration
    }
}
