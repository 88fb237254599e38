use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::EngineError;
use crate::params::Params;
use crate::report::{now_ms, Report, ReportBuilder, RunState, ValidationTally};
use crate::reporter::Tick;
use crate::tracker::PercentileTracker;
use crate::types::{Event, LatencySample, SearchBatch};
use crate::validator::{BatchPerformance, ResultValidator, ValidationResult};

/// Single entry point for observed traffic. Shared between producers via `Arc`.
pub struct Engine {
    params: Params,
    tracker: PercentileTracker,
    validator: ResultValidator,
    state: RwLock<RunState>,
    tally: Mutex<ValidationTally>,
    builder: Mutex<ReportBuilder>,
    final_report: Mutex<Option<Report>>,
    recorded: AtomicU64,
    nudge: Mutex<Option<SyncSender<Tick>>>,
}

impl Engine {
    pub fn new(params: Params) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(Self::new_unchecked(params, now_ms()))
    }

    pub fn with_start(params: Params, started_at_ms: u64) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(Self::new_unchecked(params, started_at_ms))
    }

    fn new_unchecked(params: Params, started_at_ms: u64) -> Self {
        Self {
            tracker: PercentileTracker::new(params.retention, params.thresholds),
            validator: ResultValidator::new(
                params.validation.expected_source.clone(),
                params.thresholds,
            ),
            state: RwLock::new(RunState::NotStarted),
            tally: Mutex::new(ValidationTally::default()),
            builder: Mutex::new(ReportBuilder::new(started_at_ms, params.report.history_limit)),
            final_report: Mutex::new(None),
            recorded: AtomicU64::new(0),
            nudge: Mutex::new(None),
            params,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn tracker(&self) -> &PercentileTracker {
        &self.tracker
    }

    pub fn validator(&self) -> &ResultValidator {
        &self.validator
    }

    pub fn run_id(&self) -> String {
        self.builder.lock().run_id().to_string()
    }

    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    pub fn samples_recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn start(&self) -> Result<(), EngineError> {
        self.begin().map(drop)
    }

    // The read guard is held for one whole record call so `finalize` cannot
    // interleave with a half-recorded sample.
    fn begin(&self) -> Result<RwLockReadGuard<'_, RunState>, EngineError> {
        {
            let state = self.state.read();
            let current = *state;
            match current {
                RunState::Recording => return Ok(state),
                RunState::Finalized => return Err(EngineError::Finalized),
                RunState::NotStarted | RunState::SnapshotEmitted => {}
            }
        }
        let mut state = self.state.write();
        let current = *state;
        match current {
            RunState::NotStarted => {
                *state = RunState::Recording;
                tracing::info!(run_id = self.builder.lock().run_id(), "run started");
            }
            RunState::SnapshotEmitted => *state = RunState::Recording,
            RunState::Recording | RunState::Finalized => {}
        }
        let state = RwLockWriteGuard::downgrade(state);
        let current = *state;
        if current == RunState::Finalized {
            return Err(EngineError::Finalized);
        }
        Ok(state)
    }

    pub fn record_sample(&self, sample: LatencySample) -> Result<(), EngineError> {
        let _guard = self.begin()?;
        check_sample(&sample)?;
        self.tracker.record(&sample);
        tracing::trace!(endpoint = %sample.endpoint_key, latency_ms = sample.total_latency_ms, "sample recorded");
        self.count_sample();
        Ok(())
    }

    pub fn record_batch(
        &self,
        batch: SearchBatch,
        expected_count: Option<usize>,
    ) -> Result<ValidationResult, EngineError> {
        let _guard = self.begin()?;
        let mut result = self.validator.validate(&batch, expected_count);

        {
            let mut tally = self.tally.lock();
            tally.batches += 1;
            tally.fallback_batches += u64::from(batch.fallback_used);
            tally.non_compliant_sources +=
                u64::from(&batch.data_source != self.validator.expected_source());
            tally.warnings += result.warnings.len() as u64;
            if !result.valid {
                tally.invalid_batches += 1;
                tally.last_errors = result.errors.clone();
            }
        }
        if !result.valid {
            tracing::warn!(errors = ?result.errors, "search batch failed validation");
        }

        let endpoint = batch
            .endpoint
            .clone()
            .unwrap_or_else(|| self.params.validation.batch_endpoint.clone());
        if batch.fallback_used {
            self.tracker.record_fallback(&endpoint);
        }
        if let Some(total) = batch.total_latency_ms {
            let timestamp_ms = batch
                .timestamp_ms
                .or_else(|| self.tracker.newest_ms(&endpoint))
                .unwrap_or_else(now_ms);
            let sample = LatencySample {
                endpoint_key: endpoint,
                timestamp_ms,
                total_latency_ms: total,
                sub_stage_latency_ms: batch.sub_stage_latency_ms,
                success: true,
                memory_usage_mb: None,
            };
            match check_sample(&sample) {
                Ok(()) => {
                    self.tracker.record(&sample);
                    self.count_sample();
                }
                Err(err) => result.warnings.push(format!("timing not recorded: {err}")),
            }
        }
        Ok(result)
    }

    /// Dispatch one replayed event. Batches return their validation result.
    pub fn ingest(
        &self,
        event: Event,
        expected_count: Option<usize>,
    ) -> Result<Option<ValidationResult>, EngineError> {
        match event {
            Event::Sample(sample) => self.record_sample(sample).map(|()| None),
            Event::Batch(batch) => self.record_batch(batch, expected_count).map(Some),
        }
    }

    pub fn validate_batches(&self, batches: &[SearchBatch]) -> BatchPerformance {
        self.validator.validate_batch_performance(batches)
    }

    pub fn snapshot(&self) -> Report {
        let state = {
            let mut state = self.state.write();
            if *state == RunState::Recording {
                *state = RunState::SnapshotEmitted;
            }
            *state
        };
        let tally = self.tally.lock().clone();
        let report = self.builder.lock().build_snapshot(
            &self.tracker,
            &tally,
            &self.params.thresholds,
            state,
            now_ms(),
        );
        tracing::info!(
            sequence = report.run.sequence,
            endpoints = report.endpoints.len(),
            all_requirements_met = report.all_requirements_met,
            "snapshot emitted"
        );
        report
    }

    /// Close the run and build the final report. A second call returns the same report.
    pub fn finalize(&self) -> Report {
        let mut state = self.state.write();
        let mut cached = self.final_report.lock();
        if let Some(report) = cached.as_ref() {
            return report.clone();
        }
        *state = RunState::Finalized;
        let tally = self.tally.lock().clone();
        let report = self.builder.lock().build_final(
            &self.tracker,
            &tally,
            &self.params.thresholds,
            now_ms(),
        );
        tracing::info!(
            run_id = %report.run.run_id,
            duration_ms = report.run.duration_ms,
            all_requirements_met = report.all_requirements_met,
            "run finalized"
        );
        *cached = Some(report.clone());
        report
    }

    pub(crate) fn attach_nudge(&self, tx: SyncSender<Tick>) {
        *self.nudge.lock() = Some(tx);
    }

    pub(crate) fn detach_nudge(&self) {
        self.nudge.lock().take();
    }

    fn count_sample(&self) {
        let n = self.recorded.fetch_add(1, Ordering::Relaxed) + 1;
        let every = self.params.report.every_samples;
        if every > 0 && n % every == 0 {
            if let Some(tx) = self.nudge.lock().as_ref() {
                // A pending nudge already covers this one.
                if let Err(TrySendError::Disconnected(_)) = tx.try_send(Tick::Nudge) {
                    tracing::debug!("reporter gone, nudge dropped");
                }
            }
        }
    }
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn check_sample(sample: &LatencySample) -> Result<(), EngineError> {
    if sample.endpoint_key.is_empty() {
        return Err(EngineError::InvalidSample("empty endpoint key".into()));
    }
    let fields = [
        ("total latency", Some(sample.total_latency_ms)),
        ("sub-stage latency", sample.sub_stage_latency_ms),
        ("memory usage", sample.memory_usage_mb),
    ];
    for (name, value) in fields {
        if let Some(v) = value.filter(|v| !non_negative(*v)) {
            return Err(EngineError::InvalidSample(format!(
                "{name} {v} is not a finite non-negative number"
            )));
        }
    }
    Ok(())
}
