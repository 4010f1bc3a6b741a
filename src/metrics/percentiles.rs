use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentile breakdown of one accounted quantity (µs or blocks).
/// All zero until the first chain is recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PercentileSet {
    pub count: u64,
    pub min: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
    pub max: u64,
}

impl From<&Histogram<u64>> for PercentileSet {
    fn from(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }

        Self {
            count: hist.len(),
            min: hist.min(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p99: hist.value_at_quantile(0.99),
            p999: hist.value_at_quantile(0.999),
            max: hist.max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_yields_zeroes() {
        let hist = Histogram::<u64>::new_with_bounds(1, 1_000, 3).unwrap();
        let set = PercentileSet::from(&hist);
        assert_eq!(set.count, 0);
        assert_eq!(set.p99, 0);
    }

    #[test]
    fn percentiles_follow_recorded_values() {
        let mut hist = Histogram::<u64>::new_with_bounds(1, 1_000, 3).unwrap();
        for v in 1..=100 {
            hist.record(v).unwrap();
        }
        let set = PercentileSet::from(&hist);
        assert_eq!(set.min, 1);
        assert_eq!(set.max, 100);
        assert_eq!(set.p50, 50);
        assert_eq!(set.p90, 90);
        assert_eq!(set.count, 100);
    }
}
