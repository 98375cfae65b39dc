// src/calendar/line.rs
//! Calendar sentence body and default "points of the day".

use super::canon::dedup_label;
use super::{EconomicEvent, RankedEventList};
use crate::config::CalendarConfig;

/// `H:MMに{label}`, or just the label when the time is unknown.
pub fn point_label(ev: &EconomicEvent) -> String {
    if ev.time.is_known() {
        format!("{}に{}", ev.time, ev.name)
    } else {
        ev.name.clone()
    }
}

/// Chronological listing joined with `、`; near-identical labels in one slot appear once
/// (the higher-scored one).
pub fn calendar_line(list: &RankedEventList, cfg: &CalendarConfig) -> Option<String> {
    let mut events: Vec<&EconomicEvent> = list.iter().collect();
    events.sort_by(|a, b| {
        a.time
            .cmp(&b.time)
            .then_with(|| b.score.cmp(&a.score))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut kept: Vec<(&EconomicEvent, String)> = Vec::with_capacity(events.len());
    for ev in events {
        let label = dedup_label(&ev.name, cfg);
        let dup = kept.iter().any(|(k, l)| {
            k.time == ev.time && strsim::normalized_levenshtein(l, &label) >= cfg.near_duplicate_similarity
        });
        if !dup {
            kept.push((ev, label));
        }
    }

    if kept.is_empty() {
        return None;
    }
    Some(
        kept.into_iter()
            .map(|(ev, _)| point_label(ev))
            .collect::<Vec<_>>()
            .join("、"),
    )
}

/// Top two ranked events, rendered as point labels.
pub fn default_points(list: &RankedEventList) -> Vec<String> {
    list.iter().take(2).map(point_label).collect()
}
