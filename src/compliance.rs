use crate::params::Thresholds;
use crate::types::{ComplianceVerdict, LatencySample, MetricSummary, Rule, ViolationCounts};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleBreaches {
    pub total_latency: bool,
    pub sub_stage_latency: bool,
    pub error: bool,
    pub memory: bool,
}

impl SampleBreaches {
    pub fn any(&self) -> bool {
        self.total_latency || self.sub_stage_latency || self.error || self.memory
    }

    pub fn apply(&self, counts: &mut ViolationCounts) {
        counts.total_latency += u64::from(self.total_latency);
        counts.sub_stage_latency += u64::from(self.sub_stage_latency);
        counts.errors += u64::from(self.error);
        counts.memory += u64::from(self.memory);
    }
}

/// Evaluate a summary against every rule. Always returns one verdict per
/// [`Rule`], in [`Rule::ALL`] order, whether or not earlier rules failed.
pub fn evaluate(summary: &MetricSummary, thresholds: &Thresholds) -> Vec<ComplianceVerdict> {
    Rule::ALL
        .iter()
        .map(|&rule| {
            let (threshold_value, observed_value, compliant) = match rule {
                Rule::TotalLatencyP95 => {
                    let t = thresholds.total_latency_p95_ms;
                    (t, summary.total.p95, summary.total.p95 <= t)
                }
                Rule::SubStageLatencyP95 => {
                    let t = thresholds.sub_stage_latency_p95_ms;
                    (t, summary.sub_stage.p95, summary.sub_stage.p95 <= t)
                }
                Rule::ErrorRate => {
                    let t = thresholds.max_error_rate;
                    (t, summary.error_rate, summary.error_rate <= t)
                }
                Rule::FallbackCount => {
                    let observed = summary.fallback_count as f64;
                    (0.0, observed, summary.fallback_count == 0)
                }
                Rule::PeakMemory => {
                    let t = thresholds.max_memory_mb;
                    (t, summary.peak_memory_mb, summary.peak_memory_mb <= t)
                }
            };
            ComplianceVerdict {
                endpoint: summary.endpoint.clone(),
                rule_name: rule,
                threshold_value,
                observed_value,
                compliant,
                violation_count: violation_count(&summary.violations, rule),
            }
        })
        .collect()
}

pub fn evaluate_sample(sample: &LatencySample, thresholds: &Thresholds) -> SampleBreaches {
    SampleBreaches {
        total_latency: sample.total_latency_ms > thresholds.total_latency_p95_ms,
        sub_stage_latency: sample
            .sub_stage_latency_ms
            .is_some_and(|ms| ms > thresholds.sub_stage_latency_p95_ms),
        error: !sample.success,
        memory: sample
            .memory_usage_mb
            .is_some_and(|mb| mb > thresholds.max_memory_mb),
    }
}

pub fn all_requirements_met(verdicts: &[ComplianceVerdict]) -> bool {
    verdicts.iter().all(|v| v.compliant)
}

/// Observed error rate as a multiple of the allowed rate. `None` when the
/// allowed rate is zero.
pub fn error_budget_burn(summary: &MetricSummary, thresholds: &Thresholds) -> Option<f64> {
    if thresholds.max_error_rate <= 0.0 {
        return None;
    }
    Some(summary.error_rate / thresholds.max_error_rate)
}

fn violation_count(counts: &ViolationCounts, rule: Rule) -> u64 {
    match rule {
        Rule::TotalLatencyP95 => counts.total_latency,
        Rule::SubStageLatencyP95 => counts.sub_stage_latency,
        Rule::ErrorRate => counts.errors,
        Rule::FallbackCount => counts.fallback,
        Rule::PeakMemory => counts.memory,
    }
}
