pub mod compliance;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod params;
pub mod report;
pub mod reporter;
pub mod storage;
pub mod tracker;
pub mod types;
pub mod validator;

pub use compliance::{all_requirements_met, evaluate, evaluate_sample};
pub use engine::Engine;
pub use error::EngineError;
pub use params::{Params, Retention, Thresholds};
pub use report::{Report, ReportBuilder, ReportKind, RunState};
pub use reporter::Reporter;
pub use storage::{ReportSink, SnapshotLog};
pub use tracker::PercentileTracker;
pub use types::{
    ComplianceVerdict, DataSource, Event, LatencySample, LatencyStats, MetricSummary, Rule, SearchBatch,
    SearchResultItem,
};
pub use validator::{BatchPerformance, ResultValidator, ValidationResult};
