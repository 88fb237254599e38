use ordered_float::OrderedFloat;

use crate::types::LatencyStats;

/// Nearest-rank percentile over an ascending slice: index `ceil(p/100 * n) - 1`,
/// clamped to `[0, n-1]`. Returns 0.0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let rank = (p / 100.0 * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx]
}

/// Sort ascending with a total order so a stray NaN cannot poison the sort.
pub fn sort_values(values: &mut [f64]) {
    values.sort_unstable_by_key(|v| OrderedFloat(*v));
}

impl LatencyStats {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        sort_values(&mut values);
        let sum: f64 = values.iter().sum();
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        Self {
            count: values.len() as u64,
            p50: percentile(&values, 50.0),
            p95: percentile(&values, 95.0),
            p99: percentile(&values, 99.0),
            mean: sum / values.len() as f64,
            min,
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zeroed() {
        assert_eq!(LatencyStats::from_values(Vec::new()), LatencyStats::default());
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn single_value_everywhere() {
        let s = LatencyStats::from_values(vec![42.0]);
        assert_eq!(s.count, 1);
        for v in [s.p50, s.p95, s.p99, s.mean, s.min, s.max] {
            assert_eq!(v, 42.0);
        }
    }

    #[test]
    fn nearest_rank_on_one_to_hundred() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let s = LatencyStats::from_values(values);
        assert_eq!(s.p50, 50.0);
        assert_eq!(s.p95, 95.0);
        assert_eq!(s.p99, 99.0);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 100.0);
        assert!((s.mean - 50.5).abs() < 1e-9);
    }

    #[test]
    fn unsorted_input() {
        let s = LatencyStats::from_values(vec![30.0, 10.0, 20.0]);
        assert_eq!(s.p50, 20.0);
        assert_eq!(s.p95, 30.0);
        assert_eq!(s.min, 10.0);
    }

    #[test]
    fn percentile_clamps() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 3.0);
        assert_eq!(percentile(&v, 150.0), 3.0);
    }
}
