// src/series/resample.rs
//! Coarser timeframes from the hourly base: fixed 4h UTC buckets and
//! daily bars (FX days roll at 17:00 New York, modelled as a 17h shift).

use super::{Bar, InstrumentKind, NoDataReason, Normalized, Series, Timeframe};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

const FX_ROLLOVER_SHIFT_HOURS: i64 = 17;

/// Running OHLC aggregate for one bucket.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bucket {
    fn start(b: &Bar) -> Self {
        Self {
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        }
    }

    fn push(&mut self, b: &Bar) {
        self.high = self.high.max(b.high);
        self.low = self.low.min(b.low);
        self.close = b.close;
        self.volume += b.volume;
    }

    fn into_bar(self, ts: DateTime<Utc>) -> Bar {
        Bar {
            ts,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

fn finish(timeframe: Timeframe, bars: Vec<Bar>) -> Normalized {
    match bars.len() {
        0 => Normalized::NoData(NoDataReason::EmptyFeed),
        1 => Normalized::NoData(NoDataReason::TooFewRows { valid: 1 }),
        _ => Normalized::Ready(Series::from_sorted(timeframe, bars)),
    }
}

/// 4-hour bars on fixed UTC boundaries. A trailing bucket the base series
/// has not yet filled is dropped.
pub fn resample_4h(base: &Series) -> Normalized {
    let span = Timeframe::H4.duration().num_seconds();
    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for b in base.bars() {
        let key = b.ts.timestamp().div_euclid(span) * span;
        buckets
            .entry(key)
            .and_modify(|acc| acc.push(b))
            .or_insert_with(|| Bucket::start(b));
    }

    if let (Some(last_bar), Some((&last_key, _))) = (base.last(), buckets.iter().next_back()) {
        let covered_until = last_bar.ts.timestamp() + base.timeframe().duration().num_seconds();
        if covered_until < last_key + span {
            buckets.remove(&last_key);
        }
    }

    let bars = buckets
        .into_iter()
        .filter_map(|(k, acc)| DateTime::from_timestamp(k, 0).map(|ts| acc.into_bar(ts)))
        .collect();
    finish(Timeframe::H4, bars)
}

/// Daily bars. Currency pairs shift back 17h before grouping by calendar day
/// and forward again afterwards; other instruments use the plain UTC day.
pub fn resample_daily(base: &Series, kind: InstrumentKind) -> Normalized {
    let shift = match kind {
        InstrumentKind::CurrencyPair => Duration::hours(FX_ROLLOVER_SHIFT_HOURS),
        InstrumentKind::Metal | InstrumentKind::Crypto => Duration::zero(),
    };

    let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    for b in base.bars() {
        let day = (b.ts - shift).date_naive();
        buckets
            .entry(day)
            .and_modify(|acc| acc.push(b))
            .or_insert_with(|| Bucket::start(b));
    }

    let bars = buckets
        .into_iter()
        .filter_map(|(day, acc)| {
            day.and_hms_opt(0, 0, 0)
                .map(|midnight| acc.into_bar(midnight.and_utc() + shift))
        })
        .collect();
    finish(Timeframe::D1, bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::normalize_bars;
    use chrono::TimeZone;

    fn hourly(start: DateTime<Utc>, closes: &[f64]) -> Series {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                ts: start + Duration::hours(i as i64),
                open: c - 0.1,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1.0,
            })
            .collect();
        normalize_bars(bars, Timeframe::H1).into_series().unwrap()
    }

    #[test]
    fn four_hour_drops_unfinished_tail() {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        // 10 hourly bars → buckets 00-04, 04-08 complete, 08-12 partial (2 bars).
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let s = resample_4h(&hourly(start, &closes)).into_series().unwrap();
        assert_eq!(s.len(), 2);
        let first = s.bars()[0];
        assert_eq!(first.ts, start);
        assert!((first.open - 99.9).abs() < 1e-9);
        assert_eq!(first.close, 103.0);
        assert_eq!(first.high, 103.5);
        assert_eq!(first.low, 99.5);
        assert_eq!(first.volume, 4.0);
    }

    #[test]
    fn four_hour_keeps_exactly_filled_tail() {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        let closes: Vec<f64> = (0..8).map(|i| 1.0 + i as f64 * 0.01).collect();
        let s = resample_4h(&hourly(start, &closes)).into_series().unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn fx_daily_rolls_at_seventeen_utc_shift() {
        // 16:00 and 17:00 UTC fall on different FX days.
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
        let s = hourly(start, &[1.0, 2.0, 3.0, 4.0]);
        let d = resample_daily(&s, InstrumentKind::CurrencyPair)
            .into_series()
            .unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.bars()[0].ts, Utc.with_ymd_and_hms(2025, 3, 2, 17, 0, 0).unwrap());
        assert_eq!(d.bars()[0].close, 2.0);
        assert_eq!(d.bars()[1].ts, Utc.with_ymd_and_hms(2025, 3, 3, 17, 0, 0).unwrap());
        assert!((d.bars()[1].open - 2.9).abs() < 1e-9);

        let plain = resample_daily(&s, InstrumentKind::Crypto);
        assert!(matches!(plain, Normalized::NoData(NoDataReason::TooFewRows { valid: 1 })));
    }
}
