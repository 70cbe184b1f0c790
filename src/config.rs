use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::types::{BaselineStat, DumpSortKey, EventPriceMode, SpreadSortKey, VolumeMode};

/// Number of 5-minute blocks per hour.
pub const BLOCKS_PER_HOUR: u32 = 12;

/// Number of 5-minute blocks in 24 hours, the daily aggregation window.
pub const DAY_BLOCKS_5M: usize = 288;

/// Bucket step of the short-horizon series (seconds).
pub const FIVE_MINUTE_STEP_SECS: i64 = 300;

/// Bucket step of the long-horizon daily series (seconds).
pub const DAILY_STEP_SECS: i64 = 86_400;

/// Maximum in-flight daily-series fetches during stability enrichment.
/// The upstream source rate-limits per client; the shortlist fan-out must
/// never exceed this many outstanding requests.
pub const STABILITY_FETCH_CONCURRENCY: usize = 8;

/// Volatility values substituted when a stability horizon has no data.
/// Missing history discounts an item instead of disqualifying it, so each
/// default sits a little above a typical "stable" CV for its horizon.
pub mod score_defaults {
    pub const MISSING_CV_1D: f64 = 0.25;
    pub const MISSING_CV_7D: f64 = 0.35;
    pub const MISSING_CV_30D: f64 = 0.40;
    pub const MISSING_CV_1Y: f64 = 0.50;
}

// ---------------------------------------------------------------------------
// ScanConfig: dump scan parameters
// ---------------------------------------------------------------------------

/// Immutable parameter set for one dump scan request.
///
/// Deserializes with production defaults for omitted fields; call
/// [`ScanConfig::validate`] before scanning: the pipeline rejects
/// out-of-range values up front rather than mid-scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Baseline window length in hours (12 five-minute blocks each).
    pub baseline_hours: u32,
    /// Event window length in 5-minute blocks.
    pub event_window_blocks: u32,
    /// Still-low tail length in 5-minute blocks. Zero still checks the
    /// single most recent bucket.
    pub still_low_blocks: u32,

    pub baseline_stat: BaselineStat,
    pub event_price_mode: EventPriceMode,

    /// Minimum drop fraction for a candidate to qualify (one-sided).
    pub min_drop_pct: f64,

    pub volume_mode: VolumeMode,
    /// Absolute mode: minimum summed low-side volume over the event window.
    pub min_event_volume: u64,
    /// Relative mode: event volume must reach baseline mean × this.
    pub volume_multiplier: f64,
    /// Fraction-of-daily mode: minimum event share of the 24h volume.
    pub min_event_daily_volume_pct: f64,

    /// Depth below baseline the tail must hold: threshold = baseline × (1 − pct).
    pub still_low_pct: f64,

    // Sparse trading is normal; avgLowPrice can be absent for many buckets.
    // These are counts of buckets WITH a present price.
    pub min_valid_baseline_price_points: usize,
    pub min_valid_event_price_points: usize,
    pub min_valid_still_low_price_points: usize,

    // Optional item filters
    pub min_buy_limit: Option<u32>,
    pub max_buy_limit: Option<u32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,

    pub sort_by: DumpSortKey,
    pub limit: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            baseline_hours: 6,
            event_window_blocks: 1,
            still_low_blocks: 3,
            baseline_stat: BaselineStat::Median,
            event_price_mode: EventPriceMode::Min,
            min_drop_pct: 0.07,
            volume_mode: VolumeMode::RelativeToBaseline,
            min_event_volume: 0,
            volume_multiplier: 3.0,
            min_event_daily_volume_pct: 0.02,
            still_low_pct: 0.05,
            min_valid_baseline_price_points: 12,
            min_valid_event_price_points: 1,
            min_valid_still_low_price_points: 1,
            min_buy_limit: None,
            max_buy_limit: None,
            min_price: None,
            max_price: None,
            sort_by: DumpSortKey::BiggestDrop,
            limit: 100,
        }
    }
}

impl ScanConfig {
    /// Baseline window length in 5-minute blocks.
    pub fn baseline_blocks(&self) -> usize {
        (self.baseline_hours * BLOCKS_PER_HOUR) as usize
    }

    pub fn validate(&self) -> Result<()> {
        check_range_u32("baseline_hours", self.baseline_hours, 1, 30)?;
        check_range_u32("event_window_blocks", self.event_window_blocks, 1, 12)?;
        check_range_u32("still_low_blocks", self.still_low_blocks, 0, 36)?;
        check_fraction("min_drop_pct", self.min_drop_pct, 0.95)?;
        check_fraction("still_low_pct", self.still_low_pct, 0.95)?;
        if !self.volume_multiplier.is_finite() || self.volume_multiplier < 0.0 {
            return Err(config_err("volume_multiplier must be finite and >= 0"));
        }
        check_fraction("min_event_daily_volume_pct", self.min_event_daily_volume_pct, 1.0)?;
        if self.limit < 1 || self.limit > 500 {
            return Err(config_err("limit must be in 1..=500"));
        }
        check_optional_price("min_price", self.min_price)?;
        check_optional_price("max_price", self.max_price)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpreadScanRequest: spread scan parameters
// ---------------------------------------------------------------------------

/// Immutable parameter set for one spread/stability scan request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpreadScanRequest {
    // Hard filters, applied before any expensive work
    pub min_daily_volume_24h: Option<u64>,
    pub max_daily_volume_24h: Option<u64>,
    pub min_avg_price: Option<f64>,
    pub max_avg_price: Option<f64>,
    pub min_buy_limit: Option<u32>,

    pub sort_by: SpreadSortKey,
    pub limit: usize,

    /// How many items get long-horizon stability enrichment. Survivors are
    /// shortlisted by daily spread first; only the shortlist pays the
    /// per-item daily-series fetch.
    pub stability_top_k: usize,
}

impl Default for SpreadScanRequest {
    fn default() -> Self {
        Self {
            min_daily_volume_24h: None,
            max_daily_volume_24h: None,
            min_avg_price: None,
            max_avg_price: None,
            min_buy_limit: None,
            sort_by: SpreadSortKey::Score,
            limit: 50,
            stability_top_k: 150,
        }
    }
}

impl SpreadScanRequest {
    pub fn validate(&self) -> Result<()> {
        if self.limit < 1 || self.limit > 200 {
            return Err(config_err("limit must be in 1..=200"));
        }
        if self.stability_top_k < 10 || self.stability_top_k > 500 {
            return Err(config_err("stability_top_k must be in 10..=500"));
        }
        check_optional_price("min_avg_price", self.min_avg_price)?;
        check_optional_price("max_avg_price", self.max_avg_price)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn config_err(msg: impl Into<String>) -> AppError {
    AppError::Config(msg.into())
}

fn check_range_u32(name: &str, value: u32, lo: u32, hi: u32) -> Result<()> {
    if value < lo || value > hi {
        return Err(config_err(format!("{name} must be in {lo}..={hi}, got {value}")));
    }
    Ok(())
}

fn check_fraction(name: &str, value: f64, hi: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 || value > hi {
        return Err(config_err(format!("{name} must be in 0.0..={hi}, got {value}")));
    }
    Ok(())
}

fn check_optional_price(name: &str, value: Option<f64>) -> Result<()> {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            return Err(config_err(format!("{name} must be finite and >= 0, got {v}")));
        }
    }
    Ok(())
}
