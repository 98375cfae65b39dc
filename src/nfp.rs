// src/nfp.rs
//! Next US employment report date: official schedule first, first-Friday rule otherwise.

use crate::config::NfpConfig;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn first_friday(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (Weekday::Fri.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
    Some(first + Duration::days(offset as i64))
}

/// First Friday on or after `from`.
pub fn rule_based_next(from: NaiveDate) -> Option<NaiveDate> {
    let this_month = first_friday(from.year(), from.month())?;
    if this_month >= from {
        return Some(this_month);
    }
    let (y, m) = if from.month() == 12 {
        (from.year() + 1, 1)
    } else {
        (from.year(), from.month() + 1)
    };
    first_friday(y, m)
}

/// Earliest official date on or after `from`, else the rule.
pub fn next_nfp_date(from: NaiveDate, cfg: &NfpConfig) -> Option<NaiveDate> {
    cfg.official
        .iter()
        .copied()
        .filter(|d| *d >= from)
        .min()
        .or_else(|| rule_based_next(from))
}
