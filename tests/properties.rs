use proptest::prelude::*;
use serde_json::json;
use searchwatch::{
    DataSource, LatencySample, PercentileTracker, ResultValidator, Retention, SearchBatch,
    SearchResultItem, Thresholds,
};

fn batch_from(distances: &[f64], fallback: bool, source: &str) -> SearchBatch {
    SearchBatch {
        items: distances
            .iter()
            .map(|d| SearchResultItem {
                similarity_score: 0.5,
                distance: *d,
                metadata: Some(json!({"k": 1})),
            })
            .collect(),
        data_source: DataSource::from(source),
        fallback_used: fallback,
        sub_stage_latency_ms: None,
        total_latency_ms: None,
        endpoint: None,
        timestamp_ms: None,
    }
}

fn validator() -> ResultValidator {
    ResultValidator::new(DataSource::PrimaryIndex, Thresholds::default())
}

proptest! {
    #[test]
    fn monotonicity_error_iff_decreasing(distances in prop::collection::vec(0.0f64..10.0, 0..24)) {
        let r = validator().validate(&batch_from(&distances, false, "primary-index"), None);
        let sorted = distances.windows(2).all(|w| w[0] <= w[1]);
        let reported = r.errors.iter().any(|e| e.contains("monotonic"));
        prop_assert_eq!(reported, !sorted);
        prop_assert_eq!(r.valid, sorted);
    }

    #[test]
    fn fallback_always_invalid(
        distances in prop::collection::vec(0.0f64..10.0, 0..12),
        source in prop_oneof![Just("primary-index"), Just("replica")],
    ) {
        let r = validator().validate(&batch_from(&distances, true, source), None);
        prop_assert!(!r.valid);
        prop_assert!(r.errors.iter().any(|e| e.contains("fallback")));
    }

    #[test]
    fn percentile_ordering(latencies in prop::collection::vec(0.0f64..5_000.0, 1..300)) {
        let t = PercentileTracker::new(Retention::default(), Thresholds::default());
        for (i, l) in latencies.iter().enumerate() {
            t.record(&LatencySample::new("search", i as u64, *l));
        }
        let s = t.summarize("search");
        prop_assert!(s.total.p95 >= s.total.p50);
        prop_assert!(s.total.p50 >= s.total.min);
        prop_assert!(s.total.max >= s.total.p99);
        prop_assert!(s.total.mean >= s.total.min - 1e-6 && s.total.mean <= s.total.max + 1e-6);
        prop_assert_eq!(t.summarize("search"), s);
    }

    #[test]
    fn ring_retains_newest(
        latencies in prop::collection::vec(0.0f64..100.0, 1..200),
        cap in 1usize..50,
    ) {
        let t = PercentileTracker::new(
            Retention { max_samples: cap, max_age_ms: None },
            Thresholds::default(),
        );
        for (i, l) in latencies.iter().enumerate() {
            t.record(&LatencySample::new("search", i as u64, *l));
        }
        let kept = &latencies[latencies.len().saturating_sub(cap)..];
        let s = t.summarize("search");
        prop_assert_eq!(s.count as usize, kept.len());
        let max = kept.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert_eq!(s.total.max, max);
    }
}
