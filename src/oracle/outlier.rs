use super::types::Submission;

/// Minimum submissions before statistical filtering is meaningful. Below
/// this, an outlier cannot be distinguished from legitimate variance.
pub const MIN_FILTER_SAMPLE: usize = 3;

/// Guards the relative-deviation division for medians at or near zero.
const MEDIAN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct FilterVerdict {
    pub kept: Vec<Submission>,
    pub rejected: Vec<Submission>,
    /// False when too few submissions existed to filter. The aggregator
    /// must not treat an unfiltered set as verified agreement.
    pub filter_applied: bool,
}

/// Relative deviation of `value` from `reference`, safe near zero.
pub fn relative_deviation(value: f64, reference: f64) -> f64 {
    (value - reference).abs() / reference.abs().max(MEDIAN_EPSILON)
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("intake rejects non-finite values"));

    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Splits submissions into kept and rejected by relative deviation from the
/// median. The median is robust against a minority of dishonest nodes, which
/// a mean-based filter is not.
pub fn filter_outliers(submissions: Vec<Submission>, tolerance: f64) -> FilterVerdict {
    if submissions.len() < MIN_FILTER_SAMPLE {
        return FilterVerdict {
            kept: submissions,
            rejected: Vec::new(),
            filter_applied: false,
        };
    }

    let values: Vec<f64> = submissions.iter().map(|s| s.value).collect();
    let median = median_of(&values);

    let (kept, rejected): (Vec<Submission>, Vec<Submission>) = submissions
        .into_iter()
        .partition(|s| relative_deviation(s.value, median) <= tolerance);

    for submission in &rejected {
        tracing::debug!(
            "🔍 Outlier rejected: node={} sensor={} value={} (median={}, tolerance={})",
            submission.node_id,
            submission.sensor_type,
            submission.value,
            median,
            tolerance
        );
    }

    FilterVerdict {
        kept,
        rejected,
        filter_applied: true,
    }
}
