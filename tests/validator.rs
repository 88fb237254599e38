use anyhow::Result;
use serde_json::json;
use searchwatch::{DataSource, ResultValidator, SearchBatch, SearchResultItem, Thresholds};

fn item(distance: f64, similarity: f64) -> SearchResultItem {
    SearchResultItem {
        similarity_score: similarity,
        distance,
        metadata: Some(json!({"id": "doc", "region": "eu"})),
    }
}

fn batch(distances: &[f64]) -> SearchBatch {
    SearchBatch {
        items: distances.iter().map(|d| item(*d, 0.9)).collect(),
        data_source: DataSource::PrimaryIndex,
        fallback_used: false,
        sub_stage_latency_ms: Some(0.1),
        total_latency_ms: Some(25.0),
        endpoint: None,
        timestamp_ms: None,
    }
}

fn validator() -> ResultValidator {
    ResultValidator::new(DataSource::PrimaryIndex, Thresholds::default())
}

#[test]
fn clean_batch_passes() {
    let r = validator().validate(&batch(&[0.1, 0.2, 0.2, 0.5]), Some(4));
    assert!(r.valid, "{:?}", r.errors);
    assert!(r.errors.is_empty());
    assert!(r.warnings.is_empty());
    assert_eq!(r.metrics.result_count, 4);
    assert_eq!(r.metrics.distance_min, Some(0.1));
    assert_eq!(r.metrics.distance_max, Some(0.5));
    assert_eq!(r.metrics.similarity_min, Some(0.9));
    assert_eq!(r.metrics.sub_stage_latency_ms, Some(0.1));
}

#[test]
fn monotonicity_violation_cites_index() {
    let r = validator().validate(&batch(&[0.1, 0.3, 0.2]), None);
    assert!(!r.valid);
    let mono: Vec<&String> = r.errors.iter().filter(|e| e.contains("monotonic")).collect();
    assert_eq!(mono.len(), 1);
    assert!(mono[0].contains("index 2"), "{}", mono[0]);
}

#[test]
fn only_first_inversion_reported() {
    let r = validator().validate(&batch(&[0.5, 0.4, 0.3, 0.2]), None);
    assert!(!r.valid);
    let mono: Vec<&String> = r.errors.iter().filter(|e| e.contains("monotonic")).collect();
    assert_eq!(mono.len(), 1);
    assert!(mono[0].contains("index 1"));
}

#[test]
fn fallback_alone_invalidates() {
    let mut b = batch(&[0.1, 0.2]);
    b.fallback_used = true;
    let r = validator().validate(&b, Some(2));
    assert!(!r.valid);
    assert_eq!(r.errors.len(), 1);
    assert!(r.errors[0].contains("fallback"));
}

#[test]
fn wrong_source_is_error() {
    let mut b = batch(&[0.1]);
    b.data_source = DataSource::from("database-scan");
    let r = validator().validate(&b, None);
    assert!(!r.valid);
    assert!(r.errors[0].contains("database-scan"));
    assert!(r.warnings.is_empty());
}

#[test]
fn every_bad_similarity_reported() {
    let mut b = batch(&[0.1, 0.2, 0.3, 0.4]);
    b.items[1].similarity_score = 1.5;
    b.items[3].similarity_score = -0.1;
    let r = validator().validate(&b, None);
    let sim: Vec<&String> = r.errors.iter().filter(|e| e.contains("similarity")).collect();
    assert_eq!(sim.len(), 2);
    assert!(sim[0].contains("index 1"));
    assert!(sim[1].contains("index 3"));
}

#[test]
fn metadata_shape_checked_per_index() {
    let mut b = batch(&[0.1, 0.2, 0.3, 0.4]);
    b.items[0].metadata = None;
    b.items[1].metadata = Some(json!("just a string"));
    b.items[2].metadata = Some(json!(["tag-a", "tag-b"]));
    b.items[3].metadata = Some(serde_json::Value::Null);
    let r = validator().validate(&b, None);
    let meta: Vec<&String> = r.errors.iter().filter(|e| e.contains("metadata")).collect();
    assert_eq!(meta.len(), 3);
    assert!(meta[0].contains("index 0"));
    assert!(meta[1].contains("index 1"));
    assert!(meta[2].contains("index 3"));
}

#[test]
fn count_mismatch() {
    let r = validator().validate(&batch(&[0.1, 0.2]), Some(3));
    assert!(!r.valid);
    assert!(r.errors[0].contains("expected 3"));
}

#[test]
fn sub_stage_bands() {
    let v = validator();
    let mut b = batch(&[0.1]);

    b.sub_stage_latency_ms = Some(0.8);
    let r = v.validate(&b, None);
    assert!(r.valid);
    assert_eq!(r.warnings.len(), 1);

    b.sub_stage_latency_ms = Some(1.2);
    let r = v.validate(&b, None);
    assert!(!r.valid);
    assert!(r.errors[0].contains("sub-stage"));
    assert!(r.warnings.is_empty());

    b.sub_stage_latency_ms = None;
    let r = v.validate(&b, None);
    assert!(r.valid);
    assert!(r.warnings.is_empty());
}

#[test]
fn all_problems_accumulate() {
    let mut b = batch(&[0.4, 0.1]);
    b.fallback_used = true;
    b.data_source = DataSource::from("cache");
    b.sub_stage_latency_ms = Some(5.0);
    b.items[0].similarity_score = 2.0;
    b.items[1].metadata = None;
    let r = validator().validate(&b, Some(3));
    assert!(!r.valid);
    // source, fallback, sub-stage, count, monotonicity, similarity, metadata
    assert_eq!(r.errors.len(), 7);
    assert_eq!(r.metrics.result_count, 2);
}

#[test]
fn negative_distance_flagged() {
    let r = validator().validate(&batch(&[-0.1, 0.2]), None);
    assert!(!r.valid);
    assert!(r.errors.iter().any(|e| e.contains("distance at index 0")));
    assert!(!r.errors.iter().any(|e| e.contains("monotonic")));
}

#[test]
fn batch_performance_aggregates() {
    let v = validator();
    let mut batches: Vec<SearchBatch> = (0..20)
        .map(|i| {
            let mut b = batch(&[0.1, 0.2]);
            b.sub_stage_latency_ms = Some(0.05 * f64::from(i as u32));
            b
        })
        .collect();
    batches[3].fallback_used = true;
    batches[7].data_source = DataSource::from("fallback-db");

    let perf = v.validate_batch_performance(&batches);
    assert_eq!(perf.metrics.batch_count, 20);
    assert_eq!(perf.metrics.fallback_count, 1);
    assert_eq!(perf.metrics.non_compliant_sources, 1);
    assert_eq!(perf.metrics.invalid_batches, 2);
    assert_eq!(perf.metrics.compliance_rate, 0.9);
    // p95 sits inside the warning band but under the 1ms ceiling
    assert_eq!(perf.warnings.len(), 1);
    assert!(perf.metrics.sub_stage_p95_ms >= perf.metrics.sub_stage_p50_ms);
    assert!(!perf.valid);
    assert!(perf.errors.iter().any(|e| e.contains("fallback")));
}

#[test]
fn batch_performance_clean_set() {
    let batches: Vec<SearchBatch> = (0..10).map(|_| batch(&[0.1, 0.3])).collect();
    let perf = validator().validate_batch_performance(&batches);
    assert!(perf.valid, "{:?}", perf.errors);
    assert_eq!(perf.metrics.compliance_rate, 1.0);
    assert_eq!(perf.metrics.sub_stage_p95_ms, 0.1);
}

#[test]
fn batch_performance_empty() {
    let perf = validator().validate_batch_performance(&[]);
    assert!(perf.valid);
    assert_eq!(perf.metrics.batch_count, 0);
    assert_eq!(perf.metrics.compliance_rate, 1.0);
    assert_eq!(perf.metrics.sub_stage_p95_ms, 0.0);
}

#[test]
fn batch_json_shape() -> Result<()> {
    let b: SearchBatch = serde_json::from_value(json!({
        "items": [
            {"similarity_score": 0.93, "distance": 0.07, "metadata": {"sku": "A1"}},
            {"similarity_score": 0.81, "distance": 0.19}
        ],
        "data_source": "primary-index",
        "sub_stage_latency_ms": 0.4,
        "total_latency_ms": 31
    }))?;
    assert_eq!(b.data_source, DataSource::PrimaryIndex);
    assert!(!b.fallback_used);
    let r = validator().validate(&b, Some(2));
    assert_eq!(r.errors, vec!["metadata missing at index 1".to_string()]);
    Ok(())
}

#[test]
fn nan_sub_stage_kept_out_of_aggregate() {
    let mut batches: Vec<SearchBatch> = (0..4).map(|_| batch(&[0.1, 0.2])).collect();
    batches[2].sub_stage_latency_ms = Some(f64::NAN);
    let perf = validator().validate_batch_performance(&batches);
    assert!(!perf.valid);
    assert_eq!(perf.metrics.invalid_batches, 1);
    assert_eq!(perf.metrics.sub_stage_samples, 3);
    assert_eq!(perf.metrics.sub_stage_p95_ms, 0.1);
    assert_eq!(perf.metrics.compliance_rate, 0.75);
    let text = serde_json::to_string(&perf.metrics).unwrap();
    assert!(!text.contains("null"), "{text}");
}
