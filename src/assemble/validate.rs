// src/assemble/validate.rs
//! Validated stage: the full rule set over an assembled report.

use super::draft::title_recall;
use super::render::{char_len, sentences, AssembledText};
use crate::config::TextRules;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Paragraph1,
    Paragraph2,
    Events,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ViolationKind {
    MinLength { section: Section },
    BannedVocabulary,
    CloserNotWhitelisted,
    DuplicateCloser,
    RecallMismatch,
    PointsIncomplete,
    UnresolvedPlaceholder,
    UnsourcedNumber,
    Layout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    fn push(&mut self, kind: ViolationKind, detail: impl Into<String>) {
        self.violations.push(Violation {
            kind,
            detail: detail.into(),
        });
    }
}

fn to_ascii_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '．' => '.',
            _ => c,
        })
        .collect()
}

/// Numeric tokens with leading zeros of the integer part removed (`08` → `8`).
pub fn number_tokens(s: &str) -> Vec<String> {
    static RE_NUM: OnceCell<Regex> = OnceCell::new();
    let re = RE_NUM.get_or_init(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("number regex"));
    let ascii = to_ascii_digits(s);
    re.find_iter(&ascii)
        .map(|m| {
            let t = m.as_str();
            let (int, frac) = t.split_once('.').map_or((t, None), |(i, f)| (i, Some(f)));
            let int = int.trim_start_matches('0');
            let int = if int.is_empty() { "0" } else { int };
            match frac {
                Some(f) => format!("{int}.{f}"),
                None => int.to_string(),
            }
        })
        .collect()
}

/// Every number the report may contain: computed values, caller facts, feed
/// labels and bank phrases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactSources {
    numbers: BTreeSet<String>,
}

impl FactSources {
    pub fn from_texts<'a, I: IntoIterator<Item = &'a str>>(texts: I) -> Self {
        let mut f = Self::default();
        for t in texts {
            f.add(t);
        }
        f
    }

    pub fn add(&mut self, text: &str) {
        self.numbers.extend(number_tokens(text));
    }

    pub fn contains(&self, token: &str) -> bool {
        self.numbers.contains(token)
    }
}

pub struct ValidationContext<'a> {
    pub rules: &'a TextRules,
    /// Whitelist for the sentence that ends paragraph 2.
    pub closers: &'a [String],
    pub facts: &'a FactSources,
}

fn check_banned(full: &str, rules: &TextRules, report: &mut ValidationReport) {
    let mut scrubbed = full.to_string();
    for ok in &rules.allowed_compounds {
        if !ok.is_empty() {
            scrubbed = scrubbed.replace(ok.as_str(), "\u{FFFC}");
        }
    }
    let hits: Vec<&str> = rules
        .banned_words
        .iter()
        .map(String::as_str)
        .filter(|w| !w.is_empty() && scrubbed.contains(w))
        .collect();
    if !hits.is_empty() {
        report.push(ViolationKind::BannedVocabulary, hits.join(", "));
    }
}

fn check_layout(full: &str, rules: &TextRules, report: &mut ValidationReport) {
    let lines: Vec<&str> = full.lines().collect();
    if !lines.first().is_some_and(|l| l.starts_with(rules.title_label.as_str())) {
        report.push(ViolationKind::Layout, "first line is not the title line");
    }
    match lines.iter().position(|l| l.trim() == rules.points_heading) {
        None => report.push(ViolationKind::Layout, "points heading missing"),
        Some(i) => {
            let next_two = lines.iter().skip(i + 1).take(2).filter(|l| !l.trim().is_empty()).count();
            if next_two < 2 {
                report.push(ViolationKind::Layout, "points heading must be followed directly by two points");
            }
        }
    }
    let blocks: Vec<&str> = full.split("\n\n").filter(|b| !b.trim().is_empty()).collect();
    if blocks.len() < 5 {
        report.push(ViolationKind::Layout, format!("expected 5 blocks, found {}", blocks.len()));
    }
    if blocks.last().is_some_and(|b| b.trim().contains('\n')) {
        report.push(ViolationKind::Layout, "calendar block must be a single line");
    }
    if !full.trim_end().ends_with('。') {
        report.push(ViolationKind::Layout, "text must end with 。");
    }
}

/// Run every rule. The report names each violated rule with a short detail.
pub fn validate(text: &AssembledText, ctx: &ValidationContext<'_>) -> ValidationReport {
    static RE_PLACEHOLDER: OnceCell<Regex> = OnceCell::new();
    let re_placeholder = RE_PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{[^{}]*\}|｛[^｛｝]*｝|〇〇|○○").expect("placeholder regex"));

    let rules = ctx.rules;
    let mut report = ValidationReport::default();
    let full = text.render(rules);

    let mins = &rules.min_chars;
    for (section, body, min) in [
        (Section::Paragraph1, text.paragraph1.clone(), mins.para1),
        (Section::Paragraph2, text.paragraph2.clone(), mins.para2),
        (Section::Events, text.event_block(), mins.events),
    ] {
        let n = char_len(&body);
        if n < min {
            report.push(ViolationKind::MinLength { section }, format!("{n} < {min}"));
        }
    }

    check_banned(&full, rules, &mut report);

    let para2 = sentences(&text.paragraph2);
    match para2.last() {
        Some(last) if ctx.closers.iter().any(|c| c == last) => {}
        Some(last) => report.push(ViolationKind::CloserNotWhitelisted, *last),
        None => report.push(ViolationKind::CloserNotWhitelisted, "paragraph 2 is empty"),
    }
    let closer_count = para2
        .iter()
        .filter(|s| ctx.closers.iter().any(|c| c == *s))
        .count();
    let closer_in_para1 = sentences(&text.paragraph1)
        .iter()
        .any(|s| ctx.closers.iter().any(|c| c == s));
    if closer_count > 1 || closer_in_para1 {
        report.push(
            ViolationKind::DuplicateCloser,
            format!("{closer_count} closers in paragraph 2; in paragraph 1: {closer_in_para1}"),
        );
    }

    let expected = title_recall(&text.title, rules);
    if text.recall != expected || !full.trim_end().ends_with(expected.as_str()) {
        report.push(ViolationKind::RecallMismatch, format!("expected '{expected}'"));
    }

    let [a, b] = &text.points;
    if a.trim().is_empty() || b.trim().is_empty() || a.trim() == b.trim() {
        report.push(ViolationKind::PointsIncomplete, "two distinct points are required");
    }

    let placeholders: Vec<&str> = re_placeholder.find_iter(&full).map(|m| m.as_str()).collect();
    if !placeholders.is_empty() {
        report.push(ViolationKind::UnresolvedPlaceholder, placeholders.join(", "));
    }

    let unsourced: BTreeSet<String> = number_tokens(&full)
        .into_iter()
        .filter(|t| !ctx.facts.contains(t))
        .collect();
    if !unsourced.is_empty() {
        let listed: Vec<&str> = unsourced.iter().map(String::as_str).collect();
        report.push(ViolationKind::UnsourcedNumber, listed.join(", "));
    }

    check_layout(&full, rules, &mut report);
    report
}
