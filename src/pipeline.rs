use std::collections::HashMap;

use futures_util::future::join_all;
use rayon::prelude::*;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{
    ScanConfig, SpreadScanRequest, FIVE_MINUTE_STEP_SECS, STABILITY_FETCH_CONCURRENCY,
};
use crate::detector::dump;
use crate::error::Result;
use crate::metrics::{daily_metrics, stability};
use crate::scorer::score_spread;
use crate::series::{is_aligned, mid_prices, DailySeriesSource};
use crate::types::{
    DumpEvent, DumpSortKey, ItemId, ItemMeta, SeriesPoint, SpreadMetrics, SpreadScanResult,
    SpreadSortKey, StabilityMetrics,
};

fn placeholder_name(item_id: ItemId) -> String {
    format!("item_{item_id}")
}

fn buy_limit_in_range(limit: Option<u32>, min: Option<u32>, max: Option<u32>) -> bool {
    if let Some(min) = min {
        match limit {
            Some(l) if l >= min => {}
            _ => return false,
        }
    }
    if let Some(max) = max {
        match limit {
            Some(l) if l <= max => {}
            _ => return false,
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Dump scan
// ---------------------------------------------------------------------------

/// Scan every item's series for dump events, filter, rank and truncate.
///
/// Each per-item scan is pure and reads only its own series, so the catalog
/// fans out over the rayon worker pool. Buy-limit filters apply before the
/// scan, price filters apply to the found event's baseline price after it.
pub fn run_dump_scan(
    series_by_item: &HashMap<ItemId, Vec<SeriesPoint>>,
    meta: &HashMap<ItemId, ItemMeta>,
    cfg: &ScanConfig,
) -> Result<Vec<DumpEvent>> {
    cfg.validate()?;

    let candidates = series_by_item.len();
    let mut events: Vec<DumpEvent> = series_by_item
        .par_iter()
        .filter_map(|(&item_id, points)| {
            let item_meta = meta.get(&item_id);
            let buy_limit = item_meta.and_then(|m| m.buy_limit);
            if !buy_limit_in_range(buy_limit, cfg.min_buy_limit, cfg.max_buy_limit) {
                return None;
            }

            if !is_aligned(points, FIVE_MINUTE_STEP_SECS) {
                warn!(item_id, "5m series has gaps or irregular steps");
            }

            let name = item_meta
                .map(|m| m.name.clone())
                .unwrap_or_else(|| placeholder_name(item_id));
            let event = dump::scan_item(item_id, &name, points, cfg)?;

            if let Some(min) = cfg.min_price {
                if event.baseline_price < min {
                    return None;
                }
            }
            if let Some(max) = cfg.max_price {
                if event.baseline_price > max {
                    return None;
                }
            }
            Some(event)
        })
        .collect();

    sort_dump_events(&mut events, cfg.sort_by);
    events.truncate(cfg.limit);

    info!(
        candidates,
        qualified = events.len(),
        sort_by = %cfg.sort_by,
        "dump scan complete"
    );
    Ok(events)
}

fn sort_dump_events(events: &mut [DumpEvent], key: DumpSortKey) {
    match key {
        DumpSortKey::MostRecent => {
            events.sort_by(|a, b| b.dump_bucket_ts.cmp(&a.dump_bucket_ts));
        }
        DumpSortKey::BiggestVolume => {
            events.sort_by(|a, b| b.event_volume.cmp(&a.event_volume));
        }
        DumpSortKey::BiggestEventDailyPct => {
            events.sort_by(|a, b| {
                b.event_daily_volume_pct
                    .unwrap_or(-1.0)
                    .total_cmp(&a.event_daily_volume_pct.unwrap_or(-1.0))
            });
        }
        // More negative = bigger drop, so ascending.
        DumpSortKey::BiggestDrop => {
            events.sort_by(|a, b| a.price_drop_pct.total_cmp(&b.price_drop_pct));
        }
    }
}

// ---------------------------------------------------------------------------
// Spread scan
// ---------------------------------------------------------------------------

struct PrelimItem {
    item_id: ItemId,
    name: String,
    buy_limit: Option<u32>,
    metrics: SpreadMetrics,
}

/// Two-phase spread/stability scan.
///
/// Phase one computes cheap daily aggregates for every item and applies the
/// hard filters. Survivors are ranked by percentage spread and the top
/// `stability_top_k` form the shortlist; only those pay a long-horizon
/// daily-series fetch, bounded to [`STABILITY_FETCH_CONCURRENCY`] in-flight
/// requests. A failed or missing fetch degrades that item to null stability
/// instead of failing the request. Dropping the returned future cancels the
/// fan-out as a unit; no engine state outlives the call.
pub async fn run_spread_scan<S>(
    series_by_item: &HashMap<ItemId, Vec<SeriesPoint>>,
    meta: &HashMap<ItemId, ItemMeta>,
    source: &S,
    req: &SpreadScanRequest,
) -> Result<Vec<SpreadScanResult>>
where
    S: DailySeriesSource + ?Sized,
{
    req.validate()?;

    let candidates = series_by_item.len();
    let mut prelim: Vec<PrelimItem> = Vec::new();
    for (&item_id, points) in series_by_item {
        let item_meta = meta.get(&item_id);
        let buy_limit = item_meta.and_then(|m| m.buy_limit);
        if !buy_limit_in_range(buy_limit, req.min_buy_limit, None) {
            continue;
        }

        if !is_aligned(points, FIVE_MINUTE_STEP_SECS) {
            warn!(item_id, "5m series has gaps or irregular steps");
        }

        let metrics = daily_metrics(points);

        if let Some(min) = req.min_daily_volume_24h {
            if metrics.daily_volume_24h < min {
                continue;
            }
        }
        if let Some(max) = req.max_daily_volume_24h {
            if metrics.daily_volume_24h > max {
                continue;
            }
        }
        if let Some(min) = req.min_avg_price {
            match metrics.daily_mid_price {
                Some(mid) if mid >= min => {}
                _ => continue,
            }
        }
        if let Some(max) = req.max_avg_price {
            match metrics.daily_mid_price {
                Some(mid) if mid <= max => {}
                _ => continue,
            }
        }

        let name = item_meta
            .map(|m| m.name.clone())
            .unwrap_or_else(|| placeholder_name(item_id));
        prelim.push(PrelimItem {
            item_id,
            name,
            buy_limit,
            metrics,
        });
    }

    // Shortlist by percentage spread; this bounds the expensive phase.
    prelim.sort_by(|a, b| {
        b.metrics
            .spread_pct_median
            .unwrap_or(0.0)
            .total_cmp(&a.metrics.spread_pct_median.unwrap_or(0.0))
    });
    let shortlist: Vec<ItemId> = prelim
        .iter()
        .take(req.stability_top_k)
        .map(|p| p.item_id)
        .collect();

    let stability_by_item = fetch_stability(source, &shortlist).await;

    let mut results: Vec<SpreadScanResult> = prelim
        .into_iter()
        .map(|p| {
            let st = stability_by_item
                .get(&p.item_id)
                .copied()
                .unwrap_or_default();
            let score = score_spread(&p.metrics, &st);
            SpreadScanResult {
                item_id: p.item_id,
                name: p.name,
                buy_limit: p.buy_limit,
                daily_volume_24h: p.metrics.daily_volume_24h,
                daily_mid_price: p.metrics.daily_mid_price,
                spread_abs_median: p.metrics.spread_abs_median,
                spread_pct_median: p.metrics.spread_pct_median,
                stability_cv_1d: p.metrics.stability_cv_1d,
                stability_cv_7d: st.cv_7d,
                stability_cv_30d: st.cv_30d,
                stability_cv_1y: st.cv_1y,
                score,
            }
        })
        .collect();

    sort_spread_results(&mut results, req.sort_by);
    results.truncate(req.limit);

    info!(
        candidates,
        shortlisted = shortlist.len(),
        returned = results.len(),
        sort_by = %req.sort_by,
        "spread scan complete"
    );
    Ok(results)
}

/// Fetch daily series for the shortlist and reduce each to stability
/// figures, with a bounded number of in-flight requests.
async fn fetch_stability<S>(source: &S, item_ids: &[ItemId]) -> HashMap<ItemId, StabilityMetrics>
where
    S: DailySeriesSource + ?Sized,
{
    let semaphore = Semaphore::new(STABILITY_FETCH_CONCURRENCY);
    let fetches = item_ids.iter().map(|&item_id| {
        let semaphore = &semaphore;
        async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (item_id, None),
            };
            match source.daily_series(item_id).await {
                Ok(points) => {
                    let mids = mid_prices(&points);
                    (item_id, Some(stability(&mids)))
                }
                Err(e) => {
                    warn!(item_id, error = %e, "daily series fetch failed, degrading to null stability");
                    (item_id, None)
                }
            }
        }
    });

    join_all(fetches)
        .await
        .into_iter()
        .filter_map(|(item_id, st)| st.map(|st| (item_id, st)))
        .collect()
}

fn sort_spread_results(results: &mut [SpreadScanResult], key: SpreadSortKey) {
    match key {
        SpreadSortKey::SpreadPct => {
            results.sort_by(|a, b| {
                b.spread_pct_median
                    .unwrap_or(0.0)
                    .total_cmp(&a.spread_pct_median.unwrap_or(0.0))
            });
        }
        SpreadSortKey::SpreadAbs => {
            results.sort_by(|a, b| {
                b.spread_abs_median
                    .unwrap_or(0.0)
                    .total_cmp(&a.spread_abs_median.unwrap_or(0.0))
            });
        }
        // Lower CV is more stable; items with no 1y history sort last.
        SpreadSortKey::Stability1y => {
            results.sort_by(|a, b| match (a.stability_cv_1y, b.stability_cv_1y) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        SpreadSortKey::Score => {
            results.sort_by(|a, b| b.score.total_cmp(&a.score));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::types::VolumeMode;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn five_minute_series(samples: &[(Option<f64>, u64)]) -> Vec<SeriesPoint> {
        samples
            .iter()
            .enumerate()
            .map(|(i, &(price, low_volume))| SeriesPoint {
                bucket_ts: 300 * i as i64,
                avg_high_price: None,
                high_volume: 0,
                avg_low_price: price,
                low_volume,
            })
            .collect()
    }

    /// 12 buckets at `base` then 8 dumped to `base * (1 - drop)`.
    fn dump_series(base: f64, drop: f64) -> Vec<SeriesPoint> {
        let mut samples = vec![(Some(base), 10u64); 12];
        samples.extend(vec![(Some(base * (1.0 - drop)), 50u64); 8]);
        five_minute_series(&samples)
    }

    fn dump_config() -> ScanConfig {
        ScanConfig {
            baseline_hours: 1,
            still_low_blocks: 3,
            min_drop_pct: 0.1,
            volume_mode: VolumeMode::Absolute,
            min_event_volume: 20,
            still_low_pct: 0.1,
            ..ScanConfig::default()
        }
    }

    fn named(name: &str, buy_limit: Option<u32>) -> ItemMeta {
        ItemMeta {
            name: name.to_string(),
            buy_limit,
        }
    }

    #[test]
    fn dump_scan_rejects_invalid_config() {
        let mut cfg = dump_config();
        cfg.limit = 0;
        let err = run_dump_scan(&HashMap::new(), &HashMap::new(), &cfg).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn dump_scan_sorts_by_drop_and_truncates() {
        let mut series = HashMap::new();
        series.insert(1, dump_series(100.0, 0.2));
        series.insert(2, dump_series(100.0, 0.4));
        series.insert(3, dump_series(100.0, 0.3));
        let meta: HashMap<ItemId, ItemMeta> = HashMap::new();

        let cfg = dump_config();
        let events = run_dump_scan(&series, &meta, &cfg).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].item_id, 2);
        assert_eq!(events[1].item_id, 3);
        assert_eq!(events[2].item_id, 1);
        // Unknown metadata scans under a placeholder name.
        assert_eq!(events[0].name, "item_2");

        let mut cfg = dump_config();
        cfg.limit = 1;
        let events = run_dump_scan(&series, &meta, &cfg).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, 2);
    }

    #[test]
    fn dump_scan_buy_limit_filter_drops_unknown_limits() {
        let mut series = HashMap::new();
        series.insert(1, dump_series(100.0, 0.2));
        series.insert(2, dump_series(100.0, 0.2));
        let mut meta = HashMap::new();
        meta.insert(1, named("Limited", Some(100)));
        meta.insert(2, named("Unlimited", None));

        let mut cfg = dump_config();
        cfg.min_buy_limit = Some(50);
        let events = run_dump_scan(&series, &meta, &cfg).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, 1);
    }

    #[test]
    fn dump_scan_price_filters_apply_to_baseline_price() {
        let mut series = HashMap::new();
        series.insert(1, dump_series(100.0, 0.2));
        series.insert(2, dump_series(10_000.0, 0.2));
        let meta = HashMap::new();

        let mut cfg = dump_config();
        cfg.min_price = Some(1_000.0);
        let events = run_dump_scan(&series, &meta, &cfg).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, 2);

        let mut cfg = dump_config();
        cfg.max_price = Some(1_000.0);
        let events = run_dump_scan(&series, &meta, &cfg).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, 1);
    }

    // -- spread pipeline --------------------------------------------------

    struct FakeSource {
        daily: HashMap<ItemId, Vec<SeriesPoint>>,
        fail: HashSet<ItemId>,
        calls: Mutex<Vec<ItemId>>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                daily: HashMap::new(),
                fail: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DailySeriesSource for FakeSource {
        async fn daily_series(&self, item_id: ItemId) -> crate::error::Result<Vec<SeriesPoint>> {
            self.calls.lock().unwrap().push(item_id);
            if self.fail.contains(&item_id) {
                return Err(AppError::Source(format!("fetch failed for {item_id}")));
            }
            Ok(self.daily.get(&item_id).cloned().unwrap_or_default())
        }
    }

    /// A day of buckets trading `low`/`high` on both sides.
    fn spread_series(low: f64, high: f64, vol: u64, blocks: usize) -> Vec<SeriesPoint> {
        (0..blocks)
            .map(|i| SeriesPoint {
                bucket_ts: 300 * i as i64,
                avg_high_price: Some(high),
                high_volume: vol,
                avg_low_price: Some(low),
                low_volume: vol,
            })
            .collect()
    }

    /// Daily series with a constant mid price, so CV 0 on every horizon.
    fn flat_daily_series(mid: f64, days: usize) -> Vec<SeriesPoint> {
        (0..days)
            .map(|i| SeriesPoint {
                bucket_ts: 86_400 * i as i64,
                avg_high_price: Some(mid + 1.0),
                high_volume: 10,
                avg_low_price: Some(mid - 1.0),
                low_volume: 10,
            })
            .collect()
    }

    #[tokio::test]
    async fn spread_scan_rejects_invalid_request() {
        let req = SpreadScanRequest {
            stability_top_k: 5,
            ..SpreadScanRequest::default()
        };
        let err = run_spread_scan(&HashMap::new(), &HashMap::new(), &FakeSource::new(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn spread_scan_enriches_scores_and_ranks() {
        let mut series = HashMap::new();
        // 10% spread vs 2% spread around mid 100.
        series.insert(1, spread_series(95.0, 105.0, 5, 24));
        series.insert(2, spread_series(99.0, 101.0, 5, 24));
        let mut meta = HashMap::new();
        meta.insert(1, named("Wide", Some(1000)));
        meta.insert(2, named("Narrow", Some(1000)));

        let mut source = FakeSource::new();
        source.daily.insert(1, flat_daily_series(100.0, 40));
        source.daily.insert(2, flat_daily_series(100.0, 40));

        let req = SpreadScanRequest::default();
        let results = run_spread_scan(&series, &meta, &source, &req).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item_id, 1, "wider spread must rank first");
        assert!(results[0].score > results[1].score);
        assert!((results[0].spread_pct_median.unwrap() - 0.1).abs() < 1e-12);
        // Enrichment landed: flat daily history means zero CV everywhere.
        assert!(results[0].stability_cv_1y.unwrap().abs() < 1e-12);
        assert_eq!(results[0].name, "Wide");
    }

    #[tokio::test]
    async fn spread_scan_shortlists_top_k_by_spread_pct() {
        let mut series = HashMap::new();
        let mut meta = HashMap::new();
        // 12 items with strictly decreasing spread pct: item 1 widest.
        for id in 1..=12u32 {
            let half_spread = (13 - id) as f64;
            series.insert(id, spread_series(100.0 - half_spread, 100.0 + half_spread, 5, 24));
            meta.insert(id, named(&format!("Item {id}"), Some(100)));
        }

        let mut source = FakeSource::new();
        for id in 1..=12u32 {
            source.daily.insert(id, flat_daily_series(100.0, 40));
        }

        let req = SpreadScanRequest {
            stability_top_k: 10,
            limit: 200,
            ..SpreadScanRequest::default()
        };
        let results = run_spread_scan(&series, &meta, &source, &req).await.unwrap();

        assert_eq!(source.call_count(), 10, "only the shortlist is fetched");
        assert_eq!(results.len(), 12, "non-shortlisted survivors are still returned");

        let shortlisted: Vec<_> = results.iter().filter(|r| r.stability_cv_1y.is_some()).collect();
        let rest: Vec<_> = results.iter().filter(|r| r.stability_cv_1y.is_none()).collect();
        assert_eq!(shortlisted.len(), 10);
        assert_eq!(rest.len(), 2);
        let min_shortlisted = shortlisted
            .iter()
            .map(|r| r.spread_pct_median.unwrap())
            .fold(f64::INFINITY, f64::min);
        let max_rest = rest
            .iter()
            .map(|r| r.spread_pct_median.unwrap())
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(min_shortlisted >= max_rest);
    }

    #[tokio::test]
    async fn spread_scan_failed_fetch_degrades_to_null_stability() {
        let mut series = HashMap::new();
        series.insert(1, spread_series(95.0, 105.0, 5, 24));
        let mut meta = HashMap::new();
        meta.insert(1, named("Flaky", Some(100)));

        let mut source = FakeSource::new();
        source.fail.insert(1);

        let req = SpreadScanRequest::default();
        let results = run_spread_scan(&series, &meta, &source, &req).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].stability_cv_7d, None);
        assert_eq!(results[0].stability_cv_1y, None);
        assert!(results[0].score > 0.0, "penalty defaults still score the item");
    }

    #[tokio::test]
    async fn spread_scan_filters_run_before_enrichment() {
        let mut series = HashMap::new();
        series.insert(1, spread_series(95.0, 105.0, 5, 24)); // volume 240
        series.insert(2, spread_series(95.0, 105.0, 500, 24)); // volume 24000
        let mut meta = HashMap::new();
        meta.insert(1, named("Quiet", Some(100)));
        meta.insert(2, named("Busy", Some(100)));

        let source = FakeSource::new();
        let req = SpreadScanRequest {
            min_daily_volume_24h: Some(1000),
            ..SpreadScanRequest::default()
        };
        let results = run_spread_scan(&series, &meta, &source, &req).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id, 2);
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[2], "filtered items never reach the fetch phase");
    }

    #[tokio::test]
    async fn spread_scan_min_buy_limit_drops_unknown_limits() {
        let mut series = HashMap::new();
        series.insert(1, spread_series(95.0, 105.0, 5, 24));
        series.insert(2, spread_series(95.0, 105.0, 5, 24));
        let mut meta = HashMap::new();
        meta.insert(1, named("Limited", Some(200)));
        meta.insert(2, named("Unlimited", None));

        let req = SpreadScanRequest {
            min_buy_limit: Some(100),
            ..SpreadScanRequest::default()
        };
        let results = run_spread_scan(&series, &meta, &FakeSource::new(), &req)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id, 1);
    }

    #[tokio::test]
    async fn spread_scan_stability_sort_puts_missing_history_last() {
        let mut series = HashMap::new();
        series.insert(1, spread_series(95.0, 105.0, 5, 24));
        series.insert(2, spread_series(90.0, 110.0, 5, 24));
        let mut meta = HashMap::new();
        meta.insert(1, named("Tracked", Some(100)));
        meta.insert(2, named("Fresh", Some(100)));

        let mut source = FakeSource::new();
        source.daily.insert(1, flat_daily_series(100.0, 40));
        source.fail.insert(2);

        let req = SpreadScanRequest {
            sort_by: SpreadSortKey::Stability1y,
            ..SpreadScanRequest::default()
        };
        let results = run_spread_scan(&series, &meta, &source, &req).await.unwrap();

        assert_eq!(results[0].item_id, 1);
        assert!(results[0].stability_cv_1y.is_some());
        assert_eq!(results[1].stability_cv_1y, None);
    }

    #[tokio::test]
    async fn spread_scan_truncates_to_limit() {
        let mut series = HashMap::new();
        let mut meta = HashMap::new();
        for id in 1..=30u32 {
            series.insert(id, spread_series(95.0, 105.0, 5, 24));
            meta.insert(id, named(&format!("Item {id}"), Some(100)));
        }
        let req = SpreadScanRequest {
            limit: 5,
            ..SpreadScanRequest::default()
        };
        let results = run_spread_scan(&series, &meta, &FakeSource::new(), &req)
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
    }
}
