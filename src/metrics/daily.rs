use crate::stats;
use crate::types::{SeriesPoint, SpreadMetrics};

/// Aggregate one item's trailing-24h 5-minute series (288 buckets; shorter
/// input is tolerated, it just lowers confidence).
///
/// Total volume always computes. Mid-price, spreads and 1-day volatility
/// need buckets where *both* sides traded; with fewer than 3 such buckets
/// they are all undefined. The spread fraction is the median of per-bucket
/// spread/mid ratios, not a ratio of medians.
pub fn daily_metrics(points: &[SeriesPoint]) -> SpreadMetrics {
    let daily_volume_24h: u64 = points.iter().map(SeriesPoint::total_volume).sum();

    let mut mids = Vec::new();
    let mut spreads = Vec::new();
    for p in points {
        if let (Some(mid), Some(spread)) = (p.mid_price(), p.spread()) {
            mids.push(mid);
            spreads.push(spread);
        }
    }

    if mids.len() < 3 {
        return SpreadMetrics {
            daily_volume_24h,
            ..SpreadMetrics::default()
        };
    }

    let daily_mid_price = stats::median(&mids);
    let spread_abs_median = stats::median(&spreads);
    let spread_pct_median = match daily_mid_price {
        Some(mid) if mid > 0.0 => {
            let fractions: Vec<f64> = mids
                .iter()
                .zip(&spreads)
                .map(|(mid, spread)| spread / mid)
                .collect();
            stats::median(&fractions)
        }
        _ => None,
    };
    let stability_cv_1d = stats::coefficient_of_variation(&mids);

    SpreadMetrics {
        daily_volume_24h,
        daily_mid_price,
        spread_abs_median,
        spread_pct_median,
        stability_cv_1d,
    }
}
