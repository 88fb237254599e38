use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::DataSource;

/// Service-level ceilings. The defaults are one deployment's reference SLA.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub total_latency_p95_ms: f64,
    pub sub_stage_latency_p95_ms: f64,
    pub max_error_rate: f64,
    pub max_memory_mb: f64,
    /// Width of the early-warning band below a ceiling, as a fraction of it.
    pub warning_margin: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            total_latency_p95_ms: 150.0,
            sub_stage_latency_p95_ms: 1.0,
            max_error_rate: 0.01,
            max_memory_mb: 1024.0,
            warning_margin: 0.5,
        }
    }
}

impl Thresholds {
    pub fn warning_floor(&self, ceiling: f64) -> f64 {
        ceiling * (1.0 - self.warning_margin)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Retention {
    pub max_samples: usize,
    /// Optional sliding age window, relative to the newest recorded timestamp.
    pub max_age_ms: Option<u64>,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_samples: 10_000,
            max_age_ms: None,
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ReportParams {
    pub interval_ms: u64,
    /// Nudge the reporter every N recorded samples; 0 disables.
    pub every_samples: u64,
    pub history_limit: usize,
}

impl Default for ReportParams {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            every_samples: 0,
            history_limit: 360,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ValidationParams {
    pub expected_source: DataSource,
    pub batch_endpoint: String,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            expected_source: DataSource::PrimaryIndex,
            batch_endpoint: "search".to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Params {
    pub thresholds: Thresholds,
    pub retention: Retention,
    pub report: ReportParams,
    pub validation: ValidationParams,
}

impl Params {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let params: Params =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let t = &self.thresholds;
        let ceilings = [
            ("thresholds.total_latency_p95_ms", t.total_latency_p95_ms),
            ("thresholds.sub_stage_latency_p95_ms", t.sub_stage_latency_p95_ms),
            ("thresholds.max_error_rate", t.max_error_rate),
            ("thresholds.max_memory_mb", t.max_memory_mb),
        ];
        for (name, value) in ceilings {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if t.max_error_rate > 1.0 {
            return Err(EngineError::InvalidConfig(
                "thresholds.max_error_rate must not exceed 1.0".into(),
            ));
        }
        if !(0.0..1.0).contains(&t.warning_margin) {
            return Err(EngineError::InvalidConfig(
                "thresholds.warning_margin must be in [0, 1)".into(),
            ));
        }
        if self.retention.max_samples == 0 {
            return Err(EngineError::InvalidConfig(
                "retention.max_samples must be at least 1".into(),
            ));
        }
        if self.retention.max_age_ms == Some(0) {
            return Err(EngineError::InvalidConfig(
                "retention.max_age_ms must be positive when set".into(),
            ));
        }
        if self.report.interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "report.interval_ms must be positive".into(),
            ));
        }
        if self.validation.batch_endpoint.is_empty() {
            return Err(EngineError::InvalidConfig(
                "validation.batch_endpoint must not be empty".into(),
            ));
        }
        Ok(())
    }
}
