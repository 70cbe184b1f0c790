use crate::config::{ScanConfig, DAY_BLOCKS_5M};
use crate::stats::robust_reduce;
use crate::types::{DumpEvent, DumpSortKey, ItemId, SeriesPoint, VolumeMode};

/// Find the best dump event for one item within the provided window.
///
/// `points` must be the item's aligned 5-minute series, time-ascending.
/// With `L` baseline blocks, `M` event blocks and `S` still-low blocks, a
/// candidate index `t` uses baseline `[t-L, t)`, event `[t, t+M)`, and a
/// still-low tail anchored to the *end of the series*: the most recent
/// `max(S, 1)` buckets at or after the event window. Anchoring the tail to
/// the series end rather than the buckets right after `t` excludes stale
/// dumps whose price has since recovered: the check is "still low now",
/// not "was low afterwards".
///
/// Pure and deterministic: identical `(points, cfg)` always yields an
/// identical result. Sparse data (missing prices, short history) yields
/// `None`, never an error.
pub fn scan_item(
    item_id: ItemId,
    name: &str,
    points: &[SeriesPoint],
    cfg: &ScanConfig,
) -> Option<DumpEvent> {
    let n = points.len();
    let l = cfg.baseline_blocks();
    let m = cfg.event_window_blocks as usize;
    let s = cfg.still_low_blocks as usize;

    if n < l + m + s + 1 {
        return None;
    }

    // Low-side prices with non-finite values treated as missing, extracted
    // once so every window below is a plain slice.
    let lows: Vec<Option<f64>> = points
        .iter()
        .map(|p| p.avg_low_price.filter(|v| v.is_finite()))
        .collect();

    // 24h volume over the trailing day of the scanned window, both sides.
    let daily_volume_24h: u64 = points
        .iter()
        .rev()
        .take(DAY_BLOCKS_5M)
        .map(SeriesPoint::total_volume)
        .sum();

    let latest_price = lows.iter().rev().find_map(|p| *p);

    let mut best: Option<DumpEvent> = None;

    for t in l..(n - m - s) {
        let baseline = &lows[t - l..t];
        if baseline.iter().flatten().count() < cfg.min_valid_baseline_price_points {
            continue;
        }
        let Some(baseline_price) = robust_reduce(baseline, cfg.baseline_stat.reduction()) else {
            continue;
        };
        if baseline_price <= 0.0 {
            continue;
        }

        let event = &lows[t..t + m];
        if event.iter().flatten().count() < cfg.min_valid_event_price_points {
            continue;
        }
        let Some(event_price) = robust_reduce(event, cfg.event_price_mode.reduction()) else {
            continue;
        };
        if event_price <= 0.0 {
            continue;
        }

        // One-sided test: rises never qualify.
        let price_drop_pct = (event_price - baseline_price) / baseline_price;
        if price_drop_pct > -cfg.min_drop_pct {
            continue;
        }

        let event_volume: u64 = points[t..t + m].iter().map(|p| p.low_volume).sum();
        let baseline_mean_bucket_volume =
            points[t - l..t].iter().map(|p| p.low_volume).sum::<u64>() as f64 / l as f64;

        match cfg.volume_mode {
            VolumeMode::Absolute => {
                if event_volume < cfg.min_event_volume {
                    continue;
                }
            }
            VolumeMode::RelativeToBaseline => {
                if baseline_mean_bucket_volume <= 0.0 {
                    continue;
                }
                if (event_volume as f64) < baseline_mean_bucket_volume * cfg.volume_multiplier {
                    continue;
                }
            }
            VolumeMode::FractionOfDaily => {
                if daily_volume_24h == 0 {
                    continue;
                }
                let share = event_volume as f64 / daily_volume_24h as f64;
                if share < cfg.min_event_daily_volume_pct {
                    continue;
                }
            }
        }

        // Still-low tail: the most recent max(S, 1) buckets at or after the
        // event window, every present price at or below the threshold.
        let threshold = baseline_price * (1.0 - cfg.still_low_pct);
        let s_eff = s.max(1);
        let tail_start = (t + m).max(n - s_eff);
        let tail: Vec<f64> = lows[tail_start..].iter().flatten().copied().collect();
        if tail.len() < cfg.min_valid_still_low_price_points {
            continue;
        }
        if tail.iter().any(|&p| p > threshold) {
            continue;
        }

        let event_daily_volume_pct = if daily_volume_24h > 0 {
            Some(event_volume as f64 / daily_volume_24h as f64)
        } else {
            None
        };

        let cand = DumpEvent {
            item_id,
            name: name.to_string(),
            dump_bucket_ts: points[t].bucket_ts,
            baseline_price,
            event_price,
            price_drop_pct,
            event_volume,
            baseline_mean_bucket_volume,
            daily_volume_24h,
            event_daily_volume_pct,
            still_low: true,
            latest_price,
        };

        best = Some(match best.take() {
            None => cand,
            Some(held) => pick_better(held, cand, cfg.sort_by),
        });
    }

    best
}

/// Keep one of two eligible candidates per the configured tie-break.
/// Comparisons are strict, so the earlier-found candidate wins on equality.
fn pick_better(held: DumpEvent, cand: DumpEvent, key: DumpSortKey) -> DumpEvent {
    let cand_wins = match key {
        DumpSortKey::MostRecent => cand.dump_bucket_ts > held.dump_bucket_ts,
        DumpSortKey::BiggestVolume => cand.event_volume > held.event_volume,
        DumpSortKey::BiggestEventDailyPct => {
            cand.event_daily_volume_pct.unwrap_or(-1.0)
                > held.event_daily_volume_pct.unwrap_or(-1.0)
        }
        DumpSortKey::BiggestDrop => cand.price_drop_pct < held.price_drop_pct,
    };
    if cand_wins {
        cand
    } else {
        held
    }
}
