use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use crate::compliance::evaluate_sample;
use crate::params::{Retention, Thresholds};
use crate::types::{LatencySample, LatencyStats, MetricSummary, ViolationCounts};

#[derive(Clone, Copy, Debug)]
struct Observation {
    timestamp_ms: u64,
    total_ms: f64,
    sub_stage_ms: Option<f64>,
    success: bool,
    memory_mb: Option<f64>,
}

#[derive(Default)]
struct EndpointStore {
    window: VecDeque<Observation>,
    lifetime: u64,
    newest_ms: u64,
    fallback_count: u64,
    violations: ViolationCounts,
}

impl EndpointStore {
    fn push(&mut self, obs: Observation, retention: &Retention) {
        self.lifetime += 1;
        self.newest_ms = self.newest_ms.max(obs.timestamp_ms);
        let cutoff = retention
            .max_age_ms
            .map(|age| self.newest_ms.saturating_sub(age));

        if cutoff.is_some_and(|c| obs.timestamp_ms < c) {
            tracing::debug!(timestamp_ms = obs.timestamp_ms, "sample older than retention window, not retained");
        } else if self.window.back().map_or(true, |b| b.timestamp_ms <= obs.timestamp_ms) {
            self.window.push_back(obs);
        } else {
            // Late arrival: keep the window ordered by timestamp.
            let at = self.window.partition_point(|o| o.timestamp_ms <= obs.timestamp_ms);
            self.window.insert(at, obs);
        }

        let mut evicted = 0usize;
        while self.window.len() > retention.max_samples {
            self.window.pop_front();
            evicted += 1;
        }
        if let Some(c) = cutoff {
            while self.window.front().is_some_and(|o| o.timestamp_ms < c) {
                self.window.pop_front();
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::trace!(evicted, retained = self.window.len(), "evicted oldest samples");
        }
    }
}

pub struct PercentileTracker {
    retention: Retention,
    thresholds: Thresholds,
    stores: RwLock<HashMap<String, Arc<Mutex<EndpointStore>>>>,
}

impl PercentileTracker {
    pub fn new(retention: Retention, thresholds: Thresholds) -> Self {
        Self {
            retention,
            thresholds,
            stores: RwLock::new(HashMap::new()),
        }
    }

    fn store(&self, key: &str) -> Arc<Mutex<EndpointStore>> {
        if let Some(store) = self.stores.read().get(key) {
            return Arc::clone(store);
        }
        let mut stores = self.stores.write();
        Arc::clone(stores.entry(key.to_string()).or_default())
    }

    pub fn record(&self, sample: &LatencySample) {
        let breaches = evaluate_sample(sample, &self.thresholds);
        let obs = Observation {
            timestamp_ms: sample.timestamp_ms,
            total_ms: sample.total_latency_ms,
            sub_stage_ms: sample.sub_stage_latency_ms,
            success: sample.success,
            memory_mb: sample.memory_usage_mb,
        };
        let store = self.store(&sample.endpoint_key);
        let mut store = store.lock();
        breaches.apply(&mut store.violations);
        store.push(obs, &self.retention);
    }

    pub fn record_fallback(&self, key: &str) {
        let store = self.store(key);
        let mut store = store.lock();
        store.fallback_count += 1;
        store.violations.fallback += 1;
    }

    pub fn endpoints(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.stores.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self, key: &str) -> usize {
        self.stores
            .read()
            .get(key)
            .map_or(0, |s| s.lock().window.len())
    }

    pub fn newest_ms(&self, key: &str) -> Option<u64> {
        self.stores
            .read()
            .get(key)
            .map(|s| s.lock())
            .filter(|s| s.lifetime > 0)
            .map(|s| s.newest_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }

    pub fn summarize(&self, key: &str) -> MetricSummary {
        let store = self.stores.read().get(key).cloned();
        match store {
            Some(store) => summarize_store(key, &store),
            None => MetricSummary::empty(key),
        }
    }

    pub fn summarize_all(&self) -> BTreeMap<String, MetricSummary> {
        let stores: Vec<(String, Arc<Mutex<EndpointStore>>)> = self
            .stores
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        stores
            .par_iter()
            .map(|(key, store)| (key.clone(), summarize_store(key, store)))
            .collect()
    }
}

fn summarize_store(key: &str, store: &Mutex<EndpointStore>) -> MetricSummary {
    // Copy under the lock, compute outside it.
    let (window, lifetime, fallback_count, violations) = {
        let s = store.lock();
        (
            s.window.iter().copied().collect::<Vec<_>>(),
            s.lifetime,
            s.fallback_count,
            s.violations,
        )
    };

    let count = window.len() as u64;
    let success_count = window.iter().filter(|o| o.success).count() as u64;
    let failure_count = count - success_count;
    let error_rate = if count == 0 {
        0.0
    } else {
        failure_count as f64 / count as f64
    };
    let peak_memory_mb = window
        .iter()
        .filter_map(|o| o.memory_mb)
        .fold(0.0, f64::max);

    MetricSummary {
        endpoint: key.to_string(),
        count,
        lifetime_count: lifetime,
        success_count,
        failure_count,
        error_rate,
        total: LatencyStats::from_values(window.iter().map(|o| o.total_ms).collect()),
        sub_stage: LatencyStats::from_values(window.iter().filter_map(|o| o.sub_stage_ms).collect()),
        peak_memory_mb,
        fallback_count,
        violations,
    }
}
