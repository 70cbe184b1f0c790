use statrs::statistics::Statistics;

/// Reduction applied to the present values of a sparse window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobustStat {
    Mean,
    Median,
    Min,
}

/// Reduce a window that may contain missing samples.
///
/// Missing and non-finite entries are dropped first; if nothing remains the
/// reduction is undefined and `None` is returned; sparse trading is an
/// expected input, not an error.
pub fn robust_reduce(values: &[Option<f64>], stat: RobustStat) -> Option<f64> {
    let finite: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if finite.is_empty() {
        return None;
    }
    match stat {
        RobustStat::Mean => Some(finite.mean()),
        RobustStat::Median => median(&finite),
        RobustStat::Min => Some(finite.min()),
    }
}

/// Median of the finite entries, `None` when none remain.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);
    let n = finite.len();
    if n % 2 == 1 {
        Some(finite[n / 2])
    } else {
        Some((finite[n / 2 - 1] + finite[n / 2]) / 2.0)
    }
}

/// Sample standard deviation divided by mean, a scale-free volatility
/// measure. Undefined (`None`) with fewer than 3 finite values, and when
/// the mean is <= 0: free or untradeable items must not divide by zero and
/// must not be scored as volatile.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 3 {
        return None;
    }
    let mean = finite.clone().mean();
    if mean <= 0.0 {
        return None;
    }
    let std_dev = finite.std_dev();
    Some(std_dev / mean)
}
