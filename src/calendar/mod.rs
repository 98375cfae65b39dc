// src/calendar/mod.rs
//! # Event Ranker & Deduplicator
//! Raw calendar records → canonical [`EconomicEvent`]s → [`RankedEventList`].
//!
//! A record whose time cannot be parsed is kept as [`EventTime::Unknown`];
//! only records without any name are dropped.

pub mod canon;
pub mod line;
pub mod rank;

use crate::config::CalendarConfig;
use crate::series::parse_timestamp;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

pub use line::{calendar_line, default_points, point_label};
pub use rank::{EventScorer, RankedEventList};

const FULL_TIME_KEYS: &[&str] = &["datetime", "dateTime", "dateUtc", "date_utc", "timestamp"];
const NAME_KEYS: &[&str] = &["name", "title", "event", "indicator", "Event", "指標"];
const REGION_KEYS: &[&str] = &["countryCode", "country", "region", "currency", "Country", "地域"];
const CATEGORY_KEYS: &[&str] = &["category", "Category", "カテゴリ"];

/// Local wall-clock time of a release, or Unknown when the feed's value was unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventTime {
    At { hour: u32, minute: u32 },
    Unknown,
}

impl EventTime {
    /// Unknown sorts after every real time.
    pub fn sort_key(self) -> (u32, u32) {
        match self {
            EventTime::At { hour, minute } => (hour, minute),
            EventTime::Unknown => (99, 99),
        }
    }

    pub fn hour(self) -> Option<u32> {
        match self {
            EventTime::At { hour, .. } => Some(hour),
            EventTime::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, EventTime::At { .. })
    }

    /// `H:MM` without a leading zero on the hour.
    pub fn parse_clock(s: &str) -> Option<Self> {
        let s = s.trim().replace('：', ":");
        let mut parts = s.split(':');
        let h: u32 = parts.next()?.trim().parse().ok()?;
        let m: u32 = parts.next()?.trim().parse().ok()?;
        if let Some(sec) = parts.next() {
            sec.trim().parse::<u32>().ok()?;
        }
        if parts.next().is_some() || h >= 48 || m >= 60 {
            return None;
        }
        Some(EventTime::At { hour: h, minute: m })
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::At { hour, minute } => write!(f, "{hour}:{minute:02}"),
            EventTime::Unknown => f.write_str("--:--"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicEvent {
    pub time: EventTime,
    /// Local calendar date when the feed carried one.
    pub date: Option<NaiveDate>,
    /// Canonical display label, region prefix included (`米・失業率`).
    pub name: String,
    pub region: String,
    pub category: String,
    pub score: i32,
}

/// Raw record → event (score 0; scoring happens in [`RankedEventList::build`]).
pub fn parse_record(record: &Value, cfg: &CalendarConfig, offset: FixedOffset) -> Option<EconomicEvent> {
    let obj = record.as_object()?;
    let raw_name = first_str(obj, NAME_KEYS)?;
    let region = first_str(obj, REGION_KEYS)
        .map(|r| canon::canonical_region(&r, cfg))
        .unwrap_or_default();
    let name = canon::canonical_name(&raw_name, &region, cfg);
    if name.is_empty() {
        return None;
    }
    let raw_cat = obj
        .iter()
        .find(|(k, _)| CATEGORY_KEYS.contains(&k.as_str()))
        .and_then(|(_, v)| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .unwrap_or_default();
    let category = canon::canonical_category(&raw_cat, &raw_name, cfg);
    let (time, date) = parse_event_time(obj, offset);

    Some(EconomicEvent {
        time,
        date,
        name,
        region,
        category,
        score: 0,
    })
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn to_local(dt: DateTime<Utc>, offset: FixedOffset) -> (EventTime, Option<NaiveDate>) {
    use chrono::Timelike;
    let local = dt.with_timezone(&offset);
    (
        EventTime::At {
            hour: local.hour(),
            minute: local.minute(),
        },
        Some(local.date_naive()),
    )
}

/// Full timestamps (UTC) → local; bare `H:MM` is already local.
fn parse_event_time(obj: &Map<String, Value>, offset: FixedOffset) -> (EventTime, Option<NaiveDate>) {
    for key in FULL_TIME_KEYS {
        if let Some(dt) = obj.get(*key).and_then(parse_timestamp) {
            return to_local(dt, offset);
        }
    }

    let plain_date = obj
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());

    for key in ["time", "時刻"] {
        if let Some(v) = obj.get(key) {
            if let Some(s) = v.as_str() {
                if let Some(t) = EventTime::parse_clock(s) {
                    return (t, plain_date);
                }
            }
            if let Some(dt) = parse_timestamp(v) {
                return to_local(dt, offset);
            }
        }
    }

    // A "date" value only counts as a time when it carries one.
    if let Some(v) = obj.get("date") {
        let has_clock = v.as_str().map(|s| s.contains(':')).unwrap_or(v.is_number());
        if has_clock {
            if let Some(dt) = parse_timestamp(v) {
                return to_local(dt, offset);
            }
        }
    }
    (EventTime::Unknown, plain_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use serde_json::json;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn clock_parsing() {
        assert_eq!(EventTime::parse_clock("08:50"), Some(EventTime::At { hour: 8, minute: 50 }));
        assert_eq!(EventTime::parse_clock("26:00"), Some(EventTime::At { hour: 26, minute: 0 }));
        assert_eq!(EventTime::parse_clock("22:30:00"), Some(EventTime::At { hour: 22, minute: 30 }));
        assert_eq!(EventTime::parse_clock("tba"), None);
        assert_eq!(EventTime::At { hour: 8, minute: 5 }.to_string(), "8:05");
    }

    #[test]
    fn utc_timestamps_become_local() {
        let cfg = ReportConfig::builtin().calendar;
        let ev = parse_record(
            &json!({"name": "Nonfarm Payrolls", "country": "United States", "datetime": "2025-03-07T13:30:00Z"}),
            &cfg,
            jst(),
        )
        .unwrap();
        assert_eq!(ev.time, EventTime::At { hour: 22, minute: 30 });
        assert_eq!(ev.date, NaiveDate::from_ymd_opt(2025, 3, 7));
        assert_eq!(ev.name, "米・非農業部門雇用者数");
        assert_eq!(ev.region, "US");
        assert_eq!(ev.category, "雇用");

        let ms = parse_record(
            &json!({"title": "GDP", "countryCode": "JP", "timestamp": 1_741_303_800_000i64}),
            &cfg,
            jst(),
        )
        .unwrap();
        assert_eq!(ms.time, EventTime::At { hour: 8, minute: 30 });
    }

    #[test]
    fn unparseable_time_is_kept_as_unknown() {
        let cfg = ReportConfig::builtin().calendar;
        let ev = parse_record(
            &json!({"name": "BoJ Governor speech", "country": "Japan", "time": "tentative", "date": "2025-03-07"}),
            &cfg,
            jst(),
        )
        .unwrap();
        assert_eq!(ev.time, EventTime::Unknown);
        assert_eq!(ev.date, NaiveDate::from_ymd_opt(2025, 3, 7));
        assert!(parse_record(&json!({"country": "Japan"}), &cfg, jst()).is_none());
    }
}
