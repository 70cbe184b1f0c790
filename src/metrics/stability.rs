use crate::stats::coefficient_of_variation;
use crate::types::StabilityMetrics;

/// Multi-horizon volatility from an item's daily mid-price series,
/// oldest to newest. Each horizon looks at the last min(H, len) points
/// and is independently undefined when that slice is too short or its
/// mean is non-positive.
pub fn stability(daily_mids: &[f64]) -> StabilityMetrics {
    StabilityMetrics {
        cv_7d: horizon_cv(daily_mids, 7),
        cv_30d: horizon_cv(daily_mids, 30),
        cv_1y: horizon_cv(daily_mids, 365),
    }
}

fn horizon_cv(mids: &[f64], horizon: usize) -> Option<f64> {
    let tail = if mids.len() > horizon {
        &mids[mids.len() - horizon..]
    } else {
        mids
    };
    coefficient_of_variation(tail)
}
