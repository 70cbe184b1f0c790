use crate::config::score_defaults;
use crate::types::{SpreadMetrics, StabilityMetrics};

/// Composite spread score (higher = better candidate).
///
/// Rewards wide spreads (percentage first) and discounts volatility across
/// every horizon. A missing volatility figure is replaced by a fixed mild
/// penalty instead of disqualifying the item: a genuinely new but
/// currently-stable item should rank lower, not vanish. The absolute-spread
/// term is capped so high-nominal-value items cannot drown out low-priced
/// items with large percentage spreads.
pub fn score_spread(spread: &SpreadMetrics, stability: &StabilityMetrics) -> f64 {
    let spread_pct = spread.spread_pct_median.unwrap_or(0.0);
    let spread_abs = spread.spread_abs_median.unwrap_or(0.0);

    let v1 = spread.stability_cv_1d.unwrap_or(score_defaults::MISSING_CV_1D);
    let v7 = stability.cv_7d.unwrap_or(score_defaults::MISSING_CV_7D);
    let v30 = stability.cv_30d.unwrap_or(score_defaults::MISSING_CV_30D);
    let v1y = stability.cv_1y.unwrap_or(score_defaults::MISSING_CV_1Y);

    let stability_factor = 1.0 / (1.0 + 2.0 * v1 + v7 + 0.7 * v30 + 0.5 * v1y);
    let raw = spread_pct * 100.0 + (spread_abs / 1000.0).min(50.0);
    raw * stability_factor
}
