use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the backend says a batch was served from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataSource {
    PrimaryIndex,
    Other(String),
}

impl DataSource {
    pub fn as_str(&self) -> &str {
        match self {
            DataSource::PrimaryIndex => "primary-index",
            DataSource::Other(s) => s,
        }
    }
}

impl From<String> for DataSource {
    fn from(s: String) -> Self {
        if s == "primary-index" {
            DataSource::PrimaryIndex
        } else {
            DataSource::Other(s)
        }
    }
}

impl From<&str> for DataSource {
    fn from(s: &str) -> Self {
        DataSource::from(s.to_string())
    }
}

impl From<DataSource> for String {
    fn from(d: DataSource) -> Self {
        d.as_str().to_string()
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SearchResultItem {
    pub similarity_score: f64,
    pub distance: f64,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// The full result set of one search request, in rank order.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SearchBatch {
    pub items: Vec<SearchResultItem>,
    pub data_source: DataSource,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub sub_stage_latency_ms: Option<f64>,
    #[serde(default)]
    pub total_latency_ms: Option<f64>,
    /// Endpoint the timing is attributed to; the engine default applies when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LatencySample {
    pub endpoint_key: String,
    pub timestamp_ms: u64,
    pub total_latency_ms: f64,
    #[serde(default)]
    pub sub_stage_latency_ms: Option<f64>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub memory_usage_mb: Option<f64>,
}

fn default_success() -> bool {
    true
}

impl LatencySample {
    pub fn new(endpoint_key: impl Into<String>, timestamp_ms: u64, total_latency_ms: f64) -> Self {
        Self {
            endpoint_key: endpoint_key.into(),
            timestamp_ms,
            total_latency_ms,
            sub_stage_latency_ms: None,
            success: true,
            memory_usage_mb: None,
        }
    }

    pub fn with_sub_stage(mut self, ms: f64) -> Self {
        self.sub_stage_latency_ms = Some(ms);
        self
    }

    pub fn with_memory(mut self, mb: f64) -> Self {
        self.memory_usage_mb = Some(mb);
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Cumulative breach counters for one endpoint. Never decremented during a run.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct ViolationCounts {
    pub total_latency: u64,
    pub sub_stage_latency: u64,
    pub errors: u64,
    pub fallback: u64,
    pub memory: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct MetricSummary {
    pub endpoint: String,
    pub count: u64,
    pub lifetime_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_rate: f64,
    pub total: LatencyStats,
    pub sub_stage: LatencyStats,
    pub peak_memory_mb: f64,
    pub fallback_count: u64,
    pub violations: ViolationCounts,
}

impl MetricSummary {
    pub fn empty(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    TotalLatencyP95,
    SubStageLatencyP95,
    ErrorRate,
    FallbackCount,
    PeakMemory,
}

impl Rule {
    pub const ALL: [Rule; 5] = [
        Rule::TotalLatencyP95,
        Rule::SubStageLatencyP95,
        Rule::ErrorRate,
        Rule::FallbackCount,
        Rule::PeakMemory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Rule::TotalLatencyP95 => "total_latency_p95",
            Rule::SubStageLatencyP95 => "sub_stage_latency_p95",
            Rule::ErrorRate => "error_rate",
            Rule::FallbackCount => "fallback_count",
            Rule::PeakMemory => "peak_memory",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ComplianceVerdict {
    pub endpoint: String,
    pub rule_name: Rule,
    pub threshold_value: f64,
    pub observed_value: f64,
    pub compliant: bool,
    pub violation_count: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Sample(LatencySample),
    Batch(SearchBatch),
}
