// src/calendar/rank.rs
//! Scoring, collapse and final ordering.
//!
//! score = region weight + category weight + time-of-day point + market boost − speech penalty.
//! Collapse 1 keeps the best record per (time, region, category); collapse 2 keeps
//! the best per (time, region). Unknown-time records never share a time slot, so
//! they only collapse on exact (region, name) duplicates.

use super::{parse_record, EconomicEvent, EventTime};
use crate::config::CalendarConfig;
use anyhow::{anyhow, Result};
use chrono::{FixedOffset, NaiveDate};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Compiled scoring policy; build once per run.
#[derive(Debug, Clone)]
pub struct EventScorer {
    cfg: CalendarConfig,
    offset: FixedOffset,
    speech: Option<Regex>,
    high_rank: Option<Regex>,
}

fn keyword_regex(words: &[String]) -> Result<Option<Regex>> {
    let alts: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if alts.is_empty() {
        return Ok(None);
    }
    let pattern = format!("(?i)(?:{})", alts.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| anyhow!("invalid calendar keyword pattern: {e}"))
}

impl EventScorer {
    pub fn new(cfg: &CalendarConfig, offset: FixedOffset) -> Result<Self> {
        Ok(Self {
            speech: keyword_regex(&cfg.speech_keywords)?,
            high_rank: keyword_regex(&cfg.high_rank_keywords)?,
            cfg: cfg.clone(),
            offset,
        })
    }

    fn time_weight(&self, t: EventTime) -> i32 {
        match t.hour() {
            Some(h) if self.cfg.time_windows.iter().any(|[lo, hi]| (*lo..=*hi).contains(&h)) => 1,
            _ => 0,
        }
    }

    fn is_penalized_speech(&self, name: &str) -> bool {
        let speechy = self.speech.as_ref().map(|re| re.is_match(name)).unwrap_or(false);
        let official = self.high_rank.as_ref().map(|re| re.is_match(name)).unwrap_or(false);
        speechy && !official
    }

    pub fn score(&self, ev: &EconomicEvent) -> i32 {
        let c = &self.cfg;
        let region_w = c.region_weights.get(&ev.region).copied().unwrap_or(c.default_weight);
        let cat_w = c.category_weights.get(&ev.category).copied().unwrap_or(c.default_weight);
        let boost = c.boosts.get(&ev.region).copied().unwrap_or(0);
        let penalty = if self.is_penalized_speech(&ev.name) {
            c.speech_penalty
        } else {
            0
        };
        region_w + cat_w + self.time_weight(ev.time) + boost - penalty
    }

    /// Parse, filter to the date window (undated records stay), score and rank.
    pub fn rank_records(&self, records: &[Value], window: Option<(NaiveDate, NaiveDate)>) -> RankedEventList {
        let mut skipped = 0usize;
        let mut events = Vec::with_capacity(records.len());
        for r in records {
            match parse_record(r, &self.cfg, self.offset) {
                Some(ev) => {
                    let in_window = match (window, ev.date) {
                        (Some((from, to)), Some(d)) => d >= from && d <= to,
                        _ => true,
                    };
                    if in_window {
                        events.push(ev);
                    }
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "calendar records without a usable name");
        }
        RankedEventList::build(events, self)
    }
}

/// Final order: score desc, hour asc, minute asc, name asc.
pub fn final_order(a: &EconomicEvent, b: &EconomicEvent) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.time.cmp(&b.time))
        .then_with(|| a.name.cmp(&b.name))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Timed(EventTime, String, Option<String>),
    Untimed(String, String),
}

/// Ordered, deduplicated events. Immutable after [`build`](Self::build).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RankedEventList(Vec<EconomicEvent>);

impl RankedEventList {
    pub fn build(mut events: Vec<EconomicEvent>, scorer: &EventScorer) -> Self {
        let total = events.len();
        for ev in events.iter_mut() {
            ev.score = scorer.score(ev);
        }
        events.sort_by(final_order);

        // Sorted by final order, so the first record of each group is the one kept.
        let mut seen = HashSet::new();
        events.retain(|ev| {
            let key = if ev.time.is_known() {
                SlotKey::Timed(ev.time, ev.region.clone(), Some(ev.category.clone()))
            } else {
                SlotKey::Untimed(ev.region.clone(), ev.name.clone())
            };
            seen.insert(key)
        });
        let after_first = events.len();

        let mut seen = HashSet::new();
        events.retain(|ev| {
            if !ev.time.is_known() {
                return true;
            }
            seen.insert(SlotKey::Timed(ev.time, ev.region.clone(), None))
        });
        let after_second = events.len();

        events.truncate(scorer.cfg.max_items);
        tracing::debug!(
            total,
            collapsed_category = total - after_first,
            collapsed_slot = after_first - after_second,
            kept = events.len(),
            "calendar ranked"
        );
        Self(events)
    }

    pub fn events(&self) -> &[EconomicEvent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EconomicEvent> {
        self.0.iter()
    }
}
