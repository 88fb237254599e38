use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metrics::{percentile, sort_values};
use crate::params::Thresholds;
use crate::types::{DataSource, SearchBatch};

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct BatchMetrics {
    pub result_count: usize,
    pub sub_stage_latency_ms: Option<f64>,
    pub distance_min: Option<f64>,
    pub distance_max: Option<f64>,
    pub similarity_min: Option<f64>,
    pub similarity_max: Option<f64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: BatchMetrics,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub batch_count: usize,
    pub sub_stage_samples: usize,
    pub sub_stage_p50_ms: f64,
    pub sub_stage_p95_ms: f64,
    pub sub_stage_p99_ms: f64,
    pub fallback_count: usize,
    pub non_compliant_sources: usize,
    pub invalid_batches: usize,
    pub compliance_rate: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct BatchPerformance {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: PerformanceMetrics,
}

#[derive(Clone, Debug)]
pub struct ResultValidator {
    expected_source: DataSource,
    thresholds: Thresholds,
}

impl ResultValidator {
    pub fn new(expected_source: DataSource, thresholds: Thresholds) -> Self {
        Self {
            expected_source,
            thresholds,
        }
    }

    pub fn expected_source(&self) -> &DataSource {
        &self.expected_source
    }

    pub fn validate(&self, batch: &SearchBatch, expected_count: Option<usize>) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if batch.data_source != self.expected_source {
            errors.push(format!(
                "data source is '{}', expected '{}'",
                batch.data_source, self.expected_source
            ));
        }

        if batch.fallback_used {
            errors.push("fallback path used; primary index unavailable".to_string());
        }

        if let Some(ms) = batch.sub_stage_latency_ms {
            let ceiling = self.thresholds.sub_stage_latency_p95_ms;
            if !usable_latency(ms) {
                errors.push(format!("sub-stage latency {ms} is not a finite non-negative number"));
            } else if ms > ceiling {
                errors.push(format!(
                    "sub-stage latency {ms:.3}ms exceeds ceiling {ceiling:.3}ms"
                ));
            } else if ms > self.thresholds.warning_floor(ceiling) {
                warnings.push(format!(
                    "sub-stage latency {ms:.3}ms is within the warning band of ceiling {ceiling:.3}ms"
                ));
            }
        }

        if let Some(expected) = expected_count {
            if batch.items.len() != expected {
                errors.push(format!(
                    "result count {} does not match expected {}",
                    batch.items.len(),
                    expected
                ));
            }
        }

        for (i, item) in batch.items.iter().enumerate() {
            if !item.distance.is_finite() || item.distance < 0.0 {
                errors.push(format!("distance at index {i} is invalid: {}", item.distance));
            }
        }
        if let Some(i) = first_distance_inversion(batch) {
            errors.push(format!(
                "distance not monotonic at index {i}: {} < previous {}",
                batch.items[i].distance,
                batch.items[i - 1].distance
            ));
        }

        for (i, item) in batch.items.iter().enumerate() {
            if !(0.0..=1.0).contains(&item.similarity_score) {
                errors.push(format!(
                    "similarity score at index {i} out of range [0, 1]: {}",
                    item.similarity_score
                ));
            }
        }

        for (i, item) in batch.items.iter().enumerate() {
            match &item.metadata {
                None | Some(Value::Null) => errors.push(format!("metadata missing at index {i}")),
                Some(Value::Object(_)) | Some(Value::Array(_)) => {}
                Some(_) => errors.push(format!("metadata at index {i} is not a structured value")),
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            metrics: describe(batch),
        }
    }

    pub fn validate_batch_performance(&self, batches: &[SearchBatch]) -> BatchPerformance {
        let results: Vec<ValidationResult> =
            batches.par_iter().map(|b| self.validate(b, None)).collect();

        let mut sub_stage: Vec<f64> = batches
            .iter()
            .filter_map(|b| b.sub_stage_latency_ms)
            .filter(|ms| usable_latency(*ms))
            .collect();
        sort_values(&mut sub_stage);

        let fallback_count = batches.iter().filter(|b| b.fallback_used).count();
        let non_compliant_sources = batches
            .iter()
            .filter(|b| b.data_source != self.expected_source)
            .count();
        let invalid_batches = results.iter().filter(|r| !r.valid).count();
        let count = batches.len();
        let compliance_rate = if count == 0 {
            1.0
        } else {
            (count - invalid_batches) as f64 / count as f64
        };

        let metrics = PerformanceMetrics {
            batch_count: count,
            sub_stage_samples: sub_stage.len(),
            sub_stage_p50_ms: percentile(&sub_stage, 50.0),
            sub_stage_p95_ms: percentile(&sub_stage, 95.0),
            sub_stage_p99_ms: percentile(&sub_stage, 99.0),
            fallback_count,
            non_compliant_sources,
            invalid_batches,
            compliance_rate,
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let ceiling = self.thresholds.sub_stage_latency_p95_ms;
        if metrics.sub_stage_p95_ms > ceiling {
            errors.push(format!(
                "sub-stage p95 {:.3}ms exceeds ceiling {ceiling:.3}ms",
                metrics.sub_stage_p95_ms
            ));
        } else if !sub_stage.is_empty() && metrics.sub_stage_p95_ms > self.thresholds.warning_floor(ceiling) {
            warnings.push(format!(
                "sub-stage p95 {:.3}ms is within the warning band of ceiling {ceiling:.3}ms",
                metrics.sub_stage_p95_ms
            ));
        }
        if fallback_count > 0 {
            errors.push(format!("{fallback_count} batches used the fallback path"));
        }
        if non_compliant_sources > 0 {
            errors.push(format!(
                "{non_compliant_sources} batches served from a source other than '{}'",
                self.expected_source
            ));
        }
        if invalid_batches > 0 {
            errors.push(format!("{invalid_batches} of {count} batches failed validation"));
        }

        BatchPerformance {
            valid: errors.is_empty(),
            errors,
            warnings,
            metrics,
        }
    }
}

fn usable_latency(ms: f64) -> bool {
    ms.is_finite() && ms >= 0.0
}

pub fn first_distance_inversion(batch: &SearchBatch) -> Option<usize> {
    batch
        .items
        .windows(2)
        .position(|w| w[1].distance < w[0].distance)
        .map(|i| i + 1)
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
    })
}

fn describe(batch: &SearchBatch) -> BatchMetrics {
    let distance = min_max(batch.items.iter().map(|i| i.distance));
    let similarity = min_max(batch.items.iter().map(|i| i.similarity_score));
    BatchMetrics {
        result_count: batch.items.len(),
        sub_stage_latency_ms: batch.sub_stage_latency_ms,
        distance_min: distance.map(|d| d.0),
        distance_max: distance.map(|d| d.1),
        similarity_min: similarity.map(|s| s.0),
        similarity_max: similarity.map(|s| s.1),
    }
}
