// src/series/mod.rs
//! # Series Normalizer
//! Turns loose provider rows into clean, strictly increasing bar series.
//!
//! - Field names are reconciled case-insensitively (`Adj Close` backs up `Close`).
//! - Missing open/high/low are back-filled from close; missing volume is 0.
//! - Rows without a usable timestamp or a numeric close are dropped.
//! - Fewer than two valid rows → [`Normalized::NoData`]; bars are never invented.

pub mod resample;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub use resample::{resample_4h, resample_daily};

/// One OHLC bar. `ts` is the bar open time in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Pull high/low out so the body never pokes outside its own wick.
    pub fn corrected(mut self) -> Self {
        self.high = self.high.max(self.open).max(self.close);
        self.low = self.low.min(self.open).min(self.close);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn duration(self) -> chrono::Duration {
        match self {
            Timeframe::H1 => chrono::Duration::hours(1),
            Timeframe::H4 => chrono::Duration::hours(4),
            Timeframe::D1 => chrono::Duration::days(1),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Query-string interval used by chart APIs.
    pub fn interval_param(self) -> &'static str {
        match self {
            Timeframe::H1 => "60m",
            Timeframe::H4 => "60m",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Instrument families. Only currency pairs roll their day at 17:00 New York.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    #[default]
    CurrencyPair,
    Metal,
    Crypto,
}

/// Ordered bars for one timeframe. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    timeframe: Timeframe,
    bars: Vec<Bar>,
}

impl Series {
    /// Build from bars that are already sorted; the safety correction is reapplied.
    pub(crate) fn from_sorted(timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        let bars = bars.into_iter().map(Bar::corrected).collect();
        Self { timeframe, bars }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Why a feed produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoDataReason {
    EmptyFeed,
    TooFewRows { valid: usize },
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoDataReason::EmptyFeed => f.write_str("feed returned no rows"),
            NoDataReason::TooFewRows { valid } => {
                write!(f, "only {valid} valid row(s), need at least 2")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Ready(Series),
    NoData(NoDataReason),
}

impl Normalized {
    pub fn series(&self) -> Option<&Series> {
        match self {
            Normalized::Ready(s) => Some(s),
            Normalized::NoData(_) => None,
        }
    }

    pub fn into_series(self) -> Option<Series> {
        match self {
            Normalized::Ready(s) => Some(s),
            Normalized::NoData(_) => None,
        }
    }
}

/// The three aligned views used for one report.
#[derive(Debug, Clone)]
pub struct SeriesSet {
    pub hourly: Series,
    pub four_hour: Option<Series>,
    pub daily: Option<Series>,
}

impl SeriesSet {
    /// Derive 4h and daily series from the hourly base.
    pub fn from_hourly(hourly: Series, kind: InstrumentKind) -> Self {
        let four_hour = resample_4h(&hourly).into_series();
        let daily = resample_daily(&hourly, kind).into_series();
        Self {
            hourly,
            four_hour,
            daily,
        }
    }

    pub fn get(&self, tf: Timeframe) -> Option<&Series> {
        match tf {
            Timeframe::H1 => Some(&self.hourly),
            Timeframe::H4 => self.four_hour.as_ref(),
            Timeframe::D1 => self.daily.as_ref(),
        }
    }
}

/// Normalize loose JSON rows (one object per bar) into a series.
pub fn normalize_rows(rows: &[Value], timeframe: Timeframe) -> Normalized {
    if rows.is_empty() {
        return Normalized::NoData(NoDataReason::EmptyFeed);
    }

    // BTreeMap keyed by timestamp: sorted, and the last row for a timestamp wins.
    let mut by_ts: BTreeMap<i64, Bar> = BTreeMap::new();
    let mut dropped = 0usize;
    for row in rows {
        match parse_row(row) {
            Some(bar) => {
                by_ts.insert(bar.ts.timestamp_millis(), bar);
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, kept = by_ts.len(), timeframe = %timeframe, "normalizer dropped rows");
    }

    if by_ts.len() < 2 {
        return Normalized::NoData(NoDataReason::TooFewRows {
            valid: by_ts.len(),
        });
    }
    Normalized::Ready(Series::from_sorted(timeframe, by_ts.into_values().collect()))
}

/// Normalize already-typed bars (e.g. from tests or in-memory fixtures).
pub fn normalize_bars(bars: Vec<Bar>, timeframe: Timeframe) -> Normalized {
    if bars.is_empty() {
        return Normalized::NoData(NoDataReason::EmptyFeed);
    }
    let mut by_ts: BTreeMap<i64, Bar> = BTreeMap::new();
    for b in bars {
        if b.close.is_finite() && b.open.is_finite() && b.high.is_finite() && b.low.is_finite() {
            by_ts.insert(b.ts.timestamp_millis(), b);
        }
    }
    if by_ts.len() < 2 {
        return Normalized::NoData(NoDataReason::TooFewRows {
            valid: by_ts.len(),
        });
    }
    Normalized::Ready(Series::from_sorted(timeframe, by_ts.into_values().collect()))
}

fn parse_row(row: &Value) -> Option<Bar> {
    let obj = row.as_object()?;
    // Lowercase, whitespace/underscore-free keys: "Adj Close" → "adjclose".
    let fields: BTreeMap<String, &Value> = obj
        .iter()
        .map(|(k, v)| {
            let key: String = k
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '_')
                .collect::<String>()
                .to_ascii_lowercase();
            (key, v)
        })
        .collect();

    let ts = ["timestamp", "datetime", "date", "time", "ts"]
        .iter()
        .find_map(|k| fields.get(*k).and_then(|v| parse_timestamp(v)))?;

    let num = |k: &str| fields.get(k).and_then(|v| as_number(v));
    let close = num("close").or_else(|| num("adjclose"))?;
    let open = num("open").unwrap_or(close);
    let high = num("high").unwrap_or(close);
    let low = num("low").unwrap_or(close);
    let volume = num("volume").unwrap_or(0.0);

    Some(Bar {
        ts,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// JSON number or numeric string, finite only.
pub(crate) fn as_number(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    x.is_finite().then_some(x)
}

/// Epoch seconds/milliseconds, RFC 3339, or naive `YYYY-MM-DD HH:MM[:SS]` (UTC).
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if s.chars().all(|c| c.is_ascii_digit()) {
                return s.parse::<f64>().ok().and_then(from_epoch);
            }
            parse_datetime_str(s)
        }
        _ => None,
    }
}

fn from_epoch(x: f64) -> Option<DateTime<Utc>> {
    if !x.is_finite() || x < 0.0 {
        return None;
    }
    // Anything past 10^12 is milliseconds.
    let millis = if x > 1e12 { x } else { x * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

pub(crate) fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = s.replace('T', " ").trim_end_matches('Z').to_string();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(n) = chrono::NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(n.and_utc());
        }
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backfills_ohl_and_volume_from_close() {
        let rows = vec![
            json!({"Datetime": 1_700_000_000, "Close": 150.0}),
            json!({"Datetime": 1_700_003_600, "Open": 150.0, "High": 151.0, "Low": 149.5, "Close": "150.5", "Volume": 10}),
        ];
        let s = normalize_rows(&rows, Timeframe::H1).into_series().unwrap();
        assert_eq!(s.len(), 2);
        let b0 = s.bars()[0];
        assert_eq!((b0.open, b0.high, b0.low, b0.close), (150.0, 150.0, 150.0, 150.0));
        assert_eq!(b0.volume, 0.0);
        assert_eq!(s.bars()[1].close, 150.5);
    }

    #[test]
    fn adj_close_stands_in_for_close() {
        let rows = vec![
            json!({"date": "2025-01-06", "Adj Close": 1.1}),
            json!({"date": "2025-01-07", "adj_close": 1.2}),
        ];
        let s = normalize_rows(&rows, Timeframe::D1).into_series().unwrap();
        assert_eq!(s.closes(), vec![1.1, 1.2]);
    }

    #[test]
    fn drops_non_numeric_and_reports_no_data() {
        let rows = vec![
            json!({"timestamp": 1_700_000_000, "close": "n/a"}),
            json!({"timestamp": 1_700_003_600, "close": 1.0}),
        ];
        assert_eq!(
            normalize_rows(&rows, Timeframe::H1),
            Normalized::NoData(NoDataReason::TooFewRows { valid: 1 })
        );
        assert_eq!(
            normalize_rows(&[], Timeframe::H1),
            Normalized::NoData(NoDataReason::EmptyFeed)
        );
    }

    #[test]
    fn sorts_and_deduplicates_timestamps() {
        let rows = vec![
            json!({"timestamp": 1_700_007_200_000i64, "close": 3.0}),
            json!({"timestamp": 1_700_003_600, "close": 1.0}),
            json!({"timestamp": "2023-11-14T22:13:20Z", "close": 2.0}),
            json!({"timestamp": 1_700_003_600, "close": 1.5}),
        ];
        let s = normalize_rows(&rows, Timeframe::H1).into_series().unwrap();
        assert_eq!(s.closes(), vec![2.0, 1.5, 3.0]);
        assert!(s.bars().windows(2).all(|w| w[0].ts < w[1].ts));
    }

    #[test]
    fn correction_keeps_body_inside_wick() {
        let rows = vec![
            json!({"timestamp": 1_700_000_000, "open": 10.0, "high": 9.0, "low": 11.0, "close": 10.5}),
            json!({"timestamp": 1_700_003_600, "open": 10.0, "high": 10.2, "low": 9.8, "close": 10.1}),
        ];
        let s = normalize_rows(&rows, Timeframe::H1).into_series().unwrap();
        let b = s.bars()[0];
        assert_eq!(b.high, 10.5);
        assert_eq!(b.low, 10.0);
    }
}
