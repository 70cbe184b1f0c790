use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ItemId, SeriesPoint};

/// Collaborator that materializes long-horizon daily series on demand.
///
/// Implemented outside the core by the cache/fetch layer. Points must come
/// back time-ascending with a uniform one-day step and absent buckets
/// represented as missing-price points. A failed fetch is reported as an
/// error and absorbed by the pipeline: the item degrades to null
/// stability rather than failing the whole request.
#[async_trait]
pub trait DailySeriesSource: Send + Sync {
    async fn daily_series(&self, item_id: ItemId) -> Result<Vec<SeriesPoint>>;
}

/// True when consecutive buckets are exactly `step_secs` apart. Window
/// arithmetic is positional and a gappy series silently shifts every
/// window, so callers warn on misalignment rather than scanning garbage.
pub fn is_aligned(points: &[SeriesPoint], step_secs: i64) -> bool {
    points
        .windows(2)
        .all(|w| w[1].bucket_ts - w[0].bucket_ts == step_secs)
}

/// Mid-prices of the buckets where both sides traded, in series order.
pub fn mid_prices(points: &[SeriesPoint]) -> Vec<f64> {
    points.iter().filter_map(SeriesPoint::mid_price).collect()
}
