// src/assemble/render.rs
//! Final text shape and the small sentence helpers shared by the stages.

use crate::config::TextRules;
use serde::Serialize;

/// The five sections of a report. `event_line` and `recall` share the last line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledText {
    pub title: String,
    pub points: [String; 2],
    pub paragraph1: String,
    pub paragraph2: String,
    pub event_line: String,
    pub recall: String,
}

impl AssembledText {
    pub fn event_block(&self) -> String {
        format!("{}{}", self.event_line, self.recall)
    }

    pub fn render(&self, rules: &TextRules) -> String {
        format!(
            "{label}{title}\n\n{heading}\n{p1}\n{p2}\n\n{para1}\n\n{para2}\n\n{events}",
            label = rules.title_label,
            title = self.title.trim(),
            heading = rules.points_heading,
            p1 = self.points[0].trim(),
            p2 = self.points[1].trim(),
            para1 = self.paragraph1.trim(),
            para2 = self.paragraph2.trim(),
            events = self.event_block().trim(),
        )
    }
}

/// Character count with newlines excluded.
pub fn char_len(s: &str) -> usize {
    s.chars().filter(|c| *c != '\n' && *c != '\r').count()
}

/// Split after every `。`; a trailing fragment without one is kept as-is.
pub fn sentences(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '。' {
            let end = i + c.len_utf8();
            let piece = s[start..end].trim();
            if !piece.is_empty() {
                out.push(piece);
            }
            start = end;
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Comparison form: no whitespace, no `、`/`。`.
pub fn compare_form(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '、' && *c != '。')
        .collect()
}

pub fn contains_normalized(hay: &str, needle: &str) -> bool {
    let n = compare_form(needle);
    !n.is_empty() && compare_form(hay).contains(&n)
}

/// Append a sentence, closing the current text with `。` first when needed.
pub fn push_sentence(body: &mut String, sentence: &str) {
    let sentence = sentence.trim();
    if sentence.is_empty() {
        return;
    }
    let trimmed = body.trim_end().len();
    body.truncate(trimmed);
    if !body.is_empty() && !body.ends_with('。') {
        body.push('。');
    }
    body.push_str(sentence);
    if !body.ends_with('。') {
        body.push('。');
    }
}
