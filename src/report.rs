use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::compliance::{all_requirements_met, error_budget_burn, evaluate};
use crate::params::Thresholds;
use crate::tracker::PercentileTracker;
use crate::types::{ComplianceVerdict, MetricSummary, Rule};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Snapshot,
    Final,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Recording,
    SnapshotEmitted,
    Finalized,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RunMetadata {
    pub run_id: String,
    pub started_at_ms: u64,
    pub generated_at_ms: u64,
    pub duration_ms: u64,
    pub state: RunState,
    pub sequence: u64,
}

/// Running totals over every batch that went through validation.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ValidationTally {
    pub batches: u64,
    pub invalid_batches: u64,
    pub fallback_batches: u64,
    pub non_compliant_sources: u64,
    pub warnings: u64,
    /// Errors of the most recent invalid batch.
    pub last_errors: Vec<String>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct PointStats {
    pub count: u64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub sub_stage_p95: f64,
    pub error_rate: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct HistoryPoint {
    pub sequence: u64,
    pub generated_at_ms: u64,
    pub all_requirements_met: bool,
    pub endpoints: BTreeMap<String, PointStats>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Report {
    pub kind: ReportKind,
    pub run: RunMetadata,
    pub endpoints: BTreeMap<String, MetricSummary>,
    pub verdicts: Vec<ComplianceVerdict>,
    pub validation: ValidationTally,
    pub error_budget_burn: BTreeMap<String, Option<f64>>,
    pub history: Vec<HistoryPoint>,
    pub all_requirements_met: bool,
}

impl Report {
    pub fn verdict(&self, endpoint: &str, rule: Rule) -> Option<&ComplianceVerdict> {
        self.verdicts
            .iter()
            .find(|v| v.endpoint == endpoint && v.rule_name == rule)
    }

    pub fn summary_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<24} {:>10} {:>10} {:>6}",
            "endpoint", "p95_ms", "limit_ms", "status"
        );
        for (endpoint, summary) in &self.endpoints {
            let limit = self
                .verdict(endpoint, Rule::TotalLatencyP95)
                .map_or(0.0, |v| v.threshold_value);
            let pass = self
                .verdicts
                .iter()
                .filter(|v| &v.endpoint == endpoint)
                .all(|v| v.compliant);
            let _ = writeln!(
                out,
                "{:<24} {:>10.2} {:>10.2} {:>6}",
                endpoint,
                summary.total.p95,
                limit,
                if pass { "PASS" } else { "FAIL" }
            );
        }
        for v in self.verdicts.iter().filter(|v| !v.compliant) {
            let _ = writeln!(
                out,
                "  {} {}: observed {:.3} > limit {:.3} ({} violations)",
                v.endpoint, v.rule_name, v.observed_value, v.threshold_value, v.violation_count
            );
        }
        if self.validation.invalid_batches > 0 {
            let _ = writeln!(
                out,
                "  {} of {} batches failed validation",
                self.validation.invalid_batches, self.validation.batches
            );
        }
        let _ = writeln!(
            out,
            "overall: {}",
            if self.all_requirements_met { "PASS" } else { "FAIL" }
        );
        out
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

pub struct ReportBuilder {
    run_id: String,
    started_at_ms: u64,
    history: VecDeque<HistoryPoint>,
    history_limit: usize,
    sequence: u64,
}

impl ReportBuilder {
    pub fn new(started_at_ms: u64, history_limit: usize) -> Self {
        Self {
            run_id: format!("run-{started_at_ms}"),
            started_at_ms,
            history: VecDeque::new(),
            history_limit,
            sequence: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn snapshots_emitted(&self) -> u64 {
        self.sequence
    }

    pub fn build_snapshot(
        &mut self,
        tracker: &PercentileTracker,
        tally: &ValidationTally,
        thresholds: &Thresholds,
        state: RunState,
        now_ms: u64,
    ) -> Report {
        self.sequence += 1;
        let report = self.assemble(ReportKind::Snapshot, tracker, tally, thresholds, state, now_ms);
        if self.history_limit > 0 {
            if self.history.len() == self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(digest(&report));
        }
        report
    }

    pub fn build_final(
        &mut self,
        tracker: &PercentileTracker,
        tally: &ValidationTally,
        thresholds: &Thresholds,
        now_ms: u64,
    ) -> Report {
        let mut report = self.assemble(
            ReportKind::Final,
            tracker,
            tally,
            thresholds,
            RunState::Finalized,
            now_ms,
        );
        report.history = self.history.iter().cloned().collect();
        report
    }

    fn assemble(
        &self,
        kind: ReportKind,
        tracker: &PercentileTracker,
        tally: &ValidationTally,
        thresholds: &Thresholds,
        state: RunState,
        now_ms: u64,
    ) -> Report {
        let endpoints = tracker.summarize_all();
        let verdicts: Vec<ComplianceVerdict> = endpoints
            .values()
            .flat_map(|s| evaluate(s, thresholds))
            .collect();
        let error_budget_burn = endpoints
            .iter()
            .map(|(k, s)| (k.clone(), error_budget_burn(s, thresholds)))
            .collect();
        let all_met = all_requirements_met(&verdicts) && tally.invalid_batches == 0;
        Report {
            kind,
            run: RunMetadata {
                run_id: self.run_id.clone(),
                started_at_ms: self.started_at_ms,
                generated_at_ms: now_ms,
                duration_ms: now_ms.saturating_sub(self.started_at_ms),
                state,
                sequence: self.sequence,
            },
            endpoints,
            verdicts,
            validation: tally.clone(),
            error_budget_burn,
            history: Vec::new(),
            all_requirements_met: all_met,
        }
    }
}

fn digest(report: &Report) -> HistoryPoint {
    HistoryPoint {
        sequence: report.run.sequence,
        generated_at_ms: report.run.generated_at_ms,
        all_requirements_met: report.all_requirements_met,
        endpoints: report
            .endpoints
            .iter()
            .map(|(k, s)| {
                (
                    k.clone(),
                    PointStats {
                        count: s.count,
                        p50: s.total.p50,
                        p95: s.total.p95,
                        p99: s.total.p99,
                        sub_stage_p95: s.sub_stage.p95,
                        error_rate: s.error_rate,
                    },
                )
            })
            .collect(),
    }
}
