// tests/series_normalize.rs
use chrono::{TimeZone, Utc};
use market_brief::series::{
    normalize_rows, resample_4h, resample_daily, InstrumentKind, NoDataReason, Normalized, SeriesSet, Timeframe,
};
use serde_json::{json, Value};

fn hourly_rows(start_epoch: i64, hours: i64) -> Vec<Value> {
    (0..hours)
        .map(|i| {
            let c = 100.0 + i as f64;
            json!({"Timestamp": start_epoch + i * 3600, "Open": c, "High": c + 0.5, "Low": c - 0.5, "Close": c})
        })
        .collect()
}

#[test]
fn mixed_feed_is_cleaned_and_ordered() {
    let rows = vec![
        json!({"date": "2025-03-03 02:00", "close": "150.2"}),
        json!({"date": "2025-03-03T00:00:00Z", "close": 150.0, "high": 149.0}),
        json!({"date": "2025-03-03 01:00:00", "Adj Close": 150.1}),
        json!({"date": "bogus", "close": 1.0}),
        json!({"date": "2025-03-03 01:00:00", "close": 150.15}),
    ];
    let Normalized::Ready(s) = normalize_rows(&rows, Timeframe::H1) else {
        panic!("expected a series");
    };
    let closes = s.closes();
    assert_eq!(closes, vec![150.0, 150.15, 150.2]);
    for b in s.bars() {
        assert!(b.high >= b.open.max(b.close));
        assert!(b.low <= b.open.min(b.close));
    }
    assert!(s.bars().windows(2).all(|w| w[0].ts < w[1].ts));
}

#[test]
fn empty_and_single_row_feeds_are_no_data() {
    assert_eq!(normalize_rows(&[], Timeframe::H1), Normalized::NoData(NoDataReason::EmptyFeed));
    assert_eq!(
        normalize_rows(&[json!({"ts": 0, "close": 1.0})], Timeframe::H1),
        Normalized::NoData(NoDataReason::TooFewRows { valid: 1 })
    );
}

#[test]
fn four_hour_and_daily_views() {
    // Monday 2025-03-03 00:00 UTC, three days of hourly bars.
    let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap().timestamp();
    let hourly = normalize_rows(&hourly_rows(start, 72), Timeframe::H1).into_series().unwrap();

    let h4 = resample_4h(&hourly).into_series().unwrap();
    assert_eq!(h4.len(), 18);
    assert_eq!(h4.bars()[0].open, 100.0);
    assert_eq!(h4.bars()[0].close, 103.0);
    assert_eq!(h4.bars()[0].high, 103.5);

    // FX days roll at 17:00 UTC, so the first day is 00:00–16:59 on Monday.
    let fx = resample_daily(&hourly, InstrumentKind::CurrencyPair).into_series().unwrap();
    assert_eq!(fx.bars()[0].close, 116.0);
    let utc_day = resample_daily(&hourly, InstrumentKind::Crypto).into_series().unwrap();
    assert_eq!(utc_day.len(), 3);
    assert_eq!(utc_day.bars()[0].close, 123.0);

    let set = SeriesSet::from_hourly(hourly, InstrumentKind::CurrencyPair);
    assert!(set.get(Timeframe::H4).is_some());
    assert!(set.get(Timeframe::D1).is_some());
}
