// src/assemble/draft.rs
//! Draft stage: computed facts into paragraph skeletons, title and recall.

use super::render::{contains_normalized, push_sentence, sentences, AssembledText};
use super::ReportInput;
use crate::calendar::{calendar_line, default_points};
use crate::config::{CalendarConfig, TextRules};
use crate::phrase::{PhraseBank, CAT_CLOSER, CAT_TITLE_TAIL};
use crate::technical::enforce_regime_language;

/// Paragraph body plus the closing sentence that must stay last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub body: String,
    pub closer: Option<String>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        let mut s = self.body.trim().to_string();
        if let Some(c) = &self.closer {
            push_sentence(&mut s, c);
        }
        s
    }
}

/// Sections in flight between stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    pub title: String,
    pub points: [String; 2],
    pub para1: Paragraph,
    pub para2: Paragraph,
    pub event_line: String,
    pub recall: String,
}

impl Work {
    pub fn to_text(&self) -> AssembledText {
        AssembledText {
            title: self.title.clone(),
            points: self.points.clone(),
            paragraph1: self.para1.text(),
            paragraph2: self.para2.text(),
            event_line: self.event_line.clone(),
            recall: self.recall.clone(),
        }
    }
}

/// `{display}の方向感に{tail}` for question tails, `…を{tail}` otherwise.
pub fn compose_title(display: &str, tail: &str) -> String {
    let tail = tail.trim();
    if tail.ends_with('か') {
        format!("{display}の方向感に{tail}")
    } else {
        format!("{display}の方向感を{tail}")
    }
}

/// Closing sentence that recalls the title. Rules are matched longest suffix first.
pub fn title_recall(title: &str, rules: &TextRules) -> String {
    let t = title.trim().trim_end_matches('。');
    for rule in &rules.title_recall {
        if let Some(stem) = t.strip_suffix(rule.suffix.as_str()) {
            let joiner = if rule.closer.ends_with("したい。") && !stem.is_empty() && !stem.ends_with('に') && !stem.ends_with('を') {
                "に"
            } else {
                ""
            };
            return format!("{stem}{joiner}{}", rule.closer);
        }
    }
    if let Some(stem) = t.strip_suffix('か') {
        return format!("{stem}に注視したい。");
    }
    format!("{t}。")
}

fn non_empty(s: Option<&String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Caller text as one block: blank lines dropped, lines equal to a point removed.
fn clean_paragraph(raw: &str, points: &[String; 2]) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !points.iter().any(|p| !p.is_empty() && *l == p.as_str()))
        .collect::<Vec<_>>()
        .join("")
}

/// Closers are removed from a body so exactly one can be appended later.
pub(crate) fn strip_closers(body: &str, closers: &[String]) -> String {
    sentences(body)
        .into_iter()
        .filter(|s| !closers.iter().any(|c| c == s))
        .collect::<Vec<_>>()
        .join("")
}

pub fn draft(input: &ReportInput<'_>, rules: &TextRules, calendar: &CalendarConfig, bank: &PhraseBank) -> Work {
    let subject = input.instrument.key.as_str();
    let date_key = input.date_key();
    let picks = input.picks;

    let title = non_empty(input.title.as_ref()).unwrap_or_else(|| {
        let tail = non_empty(input.title_tail.as_ref())
            .or_else(|| {
                picks
                    .title_tail
                    .as_ref()
                    .filter(|p| bank.contains(CAT_TITLE_TAIL, p))
                    .cloned()
            })
            .or_else(|| bank.select(CAT_TITLE_TAIL, subject, &date_key).map(str::to_string))
            .unwrap_or_else(|| rules.default_title_tail.clone());
        compose_title(&input.instrument.display, &tail)
    });

    let mut chosen: Vec<String> = Vec::with_capacity(2);
    for p in input
        .points
        .iter()
        .map(|p| p.trim().to_string())
        .chain(default_points(input.events))
    {
        if chosen.len() == 2 {
            break;
        }
        if !p.is_empty() && !chosen.contains(&p) {
            chosen.push(p);
        }
    }
    let mut it = chosen.into_iter();
    let points = [it.next().unwrap_or_default(), it.next().unwrap_or_default()];

    let closers = bank.get(CAT_CLOSER);
    let mut para1 = strip_closers(&clean_paragraph(&input.paragraph1, &points), closers);
    let mentioned = points.iter().any(|p| !p.is_empty() && contains_normalized(&para1, p));
    if !mentioned && points.iter().all(|p| !p.is_empty()) {
        let hint = rules.point_hint.replace("{a}", &points[0]).replace("{b}", &points[1]);
        push_sentence(&mut para1, &hint);
    }

    let closer = picks
        .closer
        .as_ref()
        .filter(|c| bank.contains(CAT_CLOSER, c))
        .cloned()
        .or_else(|| bank.select(CAT_CLOSER, subject, &date_key).map(str::to_string))
        .unwrap_or_else(|| bank.safe_sentence().to_string());

    let raw2 = non_empty(input.paragraph2.as_ref())
        .map(|s| clean_paragraph(&s, &points))
        .unwrap_or_else(|| input.seed.text.clone());
    let body2 = match input.seed.regime() {
        Some(regime) => {
            let (text, notes) = enforce_regime_language(&raw2, regime, bank, subject, &date_key);
            if !notes.is_empty() {
                tracing::debug!(?notes, %regime, "regime language aligned");
            }
            text
        }
        None => raw2,
    };

    let event_line = match calendar_line(input.events, calendar) {
        Some(line) => format!("{}{}{}", rules.event_line_prefix, line, rules.event_line_suffix),
        None => rules.event_line_empty.clone(),
    };
    let recall = title_recall(&title, rules);

    Work {
        title,
        points,
        para1: Paragraph {
            body: para1,
            closer: None,
        },
        para2: Paragraph {
            body: strip_closers(&body2, closers),
            closer: Some(closer),
        },
        event_line,
        recall,
    }
}
