use serde::{Deserialize, Serialize};

use crate::stats::RobustStat;

/// Upstream item identifier.
pub type ItemId = u32;

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// One bucket's market sample for one item.
///
/// A missing price means no trades were observed on that side during the
/// bucket; volumes are always known and default to zero. Series handed to
/// the engine must be gap-free: absent buckets appear as points with both
/// prices `None`, never as omitted indices, because window arithmetic is
/// purely positional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Unix epoch seconds, aligned to the bucket width.
    pub bucket_ts: i64,
    pub avg_high_price: Option<f64>,
    pub high_volume: u64,
    pub avg_low_price: Option<f64>,
    pub low_volume: u64,
}

impl SeriesPoint {
    /// Midpoint of the two sides; requires both prices present and finite.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.avg_low_price, self.avg_high_price) {
            (Some(low), Some(high)) if low.is_finite() && high.is_finite() => {
                Some((low + high) / 2.0)
            }
            _ => None,
        }
    }

    /// Absolute buy/sell spread; requires both prices present and finite.
    pub fn spread(&self) -> Option<f64> {
        match (self.avg_low_price, self.avg_high_price) {
            (Some(low), Some(high)) if low.is_finite() && high.is_finite() => Some(high - low),
            _ => None,
        }
    }

    pub fn total_volume(&self) -> u64 {
        self.low_volume + self.high_volume
    }
}

/// Item metadata supplied by the catalog collaborator. Used for display
/// and filter fields only, never by the numeric engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMeta {
    pub name: String,
    pub buy_limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Scan parameter enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStat {
    Mean,
    Median,
}

impl BaselineStat {
    pub fn reduction(self) -> RobustStat {
        match self {
            BaselineStat::Mean => RobustStat::Mean,
            BaselineStat::Median => RobustStat::Median,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriceMode {
    Mean,
    Min,
}

impl EventPriceMode {
    pub fn reduction(self) -> RobustStat {
        match self {
            EventPriceMode::Mean => RobustStat::Mean,
            EventPriceMode::Min => RobustStat::Min,
        }
    }
}

/// How the event window's volume must qualify before a drop counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMode {
    /// Event volume >= a fixed minimum.
    Absolute,
    /// Event volume >= baseline mean per-bucket volume × a multiplier.
    RelativeToBaseline,
    /// Event volume >= a minimum share of the item's 24h volume.
    FractionOfDaily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpSortKey {
    BiggestDrop,
    MostRecent,
    BiggestVolume,
    BiggestEventDailyPct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadSortKey {
    Score,
    SpreadPct,
    SpreadAbs,
    Stability1y,
}

impl std::fmt::Display for DumpSortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DumpSortKey::BiggestDrop => "biggest_drop",
            DumpSortKey::MostRecent => "most_recent",
            DumpSortKey::BiggestVolume => "biggest_volume",
            DumpSortKey::BiggestEventDailyPct => "biggest_event_daily_pct",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for SpreadSortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpreadSortKey::Score => "score",
            SpreadSortKey::SpreadPct => "spread_pct",
            SpreadSortKey::SpreadAbs => "spread_abs",
            SpreadSortKey::Stability1y => "stability_1y",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Dump scan results
// ---------------------------------------------------------------------------

/// The single best dump event found for one item. Immutable result value;
/// `still_low` is always true on a returned event: candidates whose price
/// has already recovered never make it out of the scanner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DumpEvent {
    pub item_id: ItemId,
    pub name: String,
    pub dump_bucket_ts: i64,

    pub baseline_price: f64,
    pub event_price: f64,
    /// Signed fraction; negative = drop.
    pub price_drop_pct: f64,

    /// Summed low-side volume over the event window.
    pub event_volume: u64,
    /// Mean low-side volume per bucket over the baseline window.
    pub baseline_mean_bucket_volume: f64,

    /// Low + high volume over the trailing 24h of the scanned series.
    pub daily_volume_24h: u64,
    /// Event volume as a share of `daily_volume_24h`, if that is non-zero.
    pub event_daily_volume_pct: Option<f64>,

    pub still_low: bool,
    /// Most recent present low-side price in the series.
    pub latest_price: Option<f64>,
}

// ---------------------------------------------------------------------------
// Spread scan results
// ---------------------------------------------------------------------------

/// Per-item 24h aggregate. Computed fresh on every request; the engine
/// caches nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpreadMetrics {
    pub daily_volume_24h: u64,
    pub daily_mid_price: Option<f64>,
    pub spread_abs_median: Option<f64>,
    pub spread_pct_median: Option<f64>,
    pub stability_cv_1d: Option<f64>,
}

/// Long-horizon volatility, each horizon independently absent when the
/// daily history is too short or degenerate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StabilityMetrics {
    pub cv_7d: Option<f64>,
    pub cv_30d: Option<f64>,
    pub cv_1y: Option<f64>,
}

/// One qualifying item in a spread scan: identity + daily aggregates +
/// stability figures + ranking score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadScanResult {
    pub item_id: ItemId,
    pub name: String,
    pub buy_limit: Option<u32>,

    pub daily_volume_24h: u64,
    pub daily_mid_price: Option<f64>,
    pub spread_abs_median: Option<f64>,
    pub spread_pct_median: Option<f64>,

    pub stability_cv_1d: Option<f64>,
    pub stability_cv_7d: Option<f64>,
    pub stability_cv_30d: Option<f64>,
    pub stability_cv_1y: Option<f64>,

    pub score: f64,
}
