// src/assemble/polish.rs
//! Polished stage: sentence dedup, punctuation, term lock and number style.

use super::draft::{strip_closers, title_recall, Paragraph, Work};
use super::render::{compare_form, sentences};
use crate::config::TextRules;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;

/// Term lock, punctuation cleanup, `08:30 → 8:30`, `N%ほど上昇 → 約N%上昇`.
pub fn polish_text(s: &str, rules: &TextRules) -> String {
    static RE_SPACE_BEFORE_MARK: OnceCell<Regex> = OnceCell::new();
    static RE_COMMAS: OnceCell<Regex> = OnceCell::new();
    static RE_STOPS: OnceCell<Regex> = OnceCell::new();
    static RE_HOUR_ZERO: OnceCell<Regex> = OnceCell::new();
    static RE_APPROX: OnceCell<Regex> = OnceCell::new();
    let re_space = RE_SPACE_BEFORE_MARK.get_or_init(|| Regex::new(r"[ \t]+([、。])").expect("space regex"));
    let re_commas = RE_COMMAS.get_or_init(|| Regex::new(r"、{2,}").expect("comma regex"));
    let re_stops = RE_STOPS.get_or_init(|| Regex::new(r"[。．]{2,}|、。").expect("stop regex"));
    let re_hour = RE_HOUR_ZERO.get_or_init(|| Regex::new(r"(^|[^0-9])0([0-9]):").expect("hour regex"));
    let re_approx = RE_APPROX.get_or_init(|| {
        Regex::new(r"([0-9]+(?:\.[0-9]+)?)%ほど(上昇|低下|下落|上振れ|下振れ)").expect("approx regex")
    });

    let mut out = s.replace('\u{3000}', "");
    for r in &rules.term_lock {
        if !r.from.is_empty() {
            out = out.replace(&r.from, &r.to);
        }
    }
    out = re_space.replace_all(&out, "$1").into_owned();
    out = re_commas.replace_all(&out, "、").into_owned();
    out = re_stops.replace_all(&out, "。").into_owned();
    out = re_hour.replace_all(&out, "${1}${2}:").into_owned();
    out = re_approx.replace_all(&out, "約${1}%${2}").into_owned();
    out.trim().to_string()
}

/// Drop repeated sentences, keeping the first occurrence.
pub fn dedup_sentences(s: &str) -> String {
    let mut seen = HashSet::new();
    sentences(s)
        .into_iter()
        .filter(|sent| seen.insert(compare_form(sent)))
        .collect::<Vec<_>>()
        .join("")
}

fn polish_paragraph(p: &Paragraph, rules: &TextRules, closers: &[String]) -> Paragraph {
    // Closers are stripped from every body; only paragraph 2 carries one back.
    let body = strip_closers(&dedup_sentences(&polish_text(&p.body, rules)), closers);
    Paragraph {
        body,
        closer: p.closer.clone(),
    }
}

/// Cut the event line after its own closing phrase; a stale recall may follow it.
/// Lines without a known ending are kept whole.
fn trim_event_line(line: &str, rules: &TextRules) -> String {
    for end in [rules.event_line_suffix.as_str(), rules.event_line_empty.as_str()] {
        if end.is_empty() {
            continue;
        }
        if let Some(i) = line.find(end) {
            return line[..i + end.len()].to_string();
        }
    }
    line.to_string()
}

pub fn polish(work: &Work, rules: &TextRules, closers: &[String]) -> Work {
    let title = polish_text(&work.title, rules);
    Work {
        recall: title_recall(&title, rules),
        title,
        points: [polish_text(&work.points[0], rules), polish_text(&work.points[1], rules)],
        para1: polish_paragraph(&work.para1, rules, closers),
        para2: polish_paragraph(&work.para2, rules, closers),
        event_line: trim_event_line(&polish_text(&work.event_line, rules), rules),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;

    #[test]
    fn punctuation_terms_and_numbers() {
        let rules = ReportConfig::builtin().text;
        assert_eq!(
            polish_text("08:30に発表、、ＳＭＡは上向き 。。", &rules),
            "8:30に発表、SMAは上向き。"
        );
        assert_eq!(polish_text("株価は1.5％ほど上昇した。", &rules), "株価は約1.5%上昇した。");
        assert_eq!(polish_text("10:30と20:00", &rules), "10:30と20:00");
        assert_eq!(polish_text("ボリンジャー・バンド", &rules), "ボリンジャーバンド");
    }

    #[test]
    fn dedup_keeps_order() {
        assert_eq!(dedup_sentences("A。B。A。C。"), "A。B。C。");
    }

    #[test]
    fn stale_recall_after_event_line_is_removed() {
        let rules = ReportConfig::builtin().text;
        let w = Work {
            title: "t".into(),
            points: ["a".into(), "b".into()],
            para1: Paragraph {
                body: "x。".into(),
                closer: None,
            },
            para2: Paragraph {
                body: "y。行方を注視したい。".into(),
                closer: Some("行方を注視したい。".into()),
            },
            event_line: "本日の指標は、8:50に日・GDPが発表予定となっている。古い回収文。".into(),
            recall: String::new(),
        };
        let p = polish(&w, &rules, &["行方を注視したい。".to_string()]);
        assert_eq!(p.event_line, "本日の指標は、8:50に日・GDPが発表予定となっている。");
        assert_eq!(p.para2.body, "y。");
        assert_eq!(p.para2.text(), "y。行方を注視したい。");
        assert_eq!(p.recall, "t。");
    }

    #[test]
    fn closers_are_stripped_from_paragraph_one() {
        let rules = ReportConfig::builtin().text;
        let closers = ["行方を注視したい。".to_string()];
        let w = Work {
            title: "t".into(),
            points: ["a".into(), "b".into()],
            para1: Paragraph {
                body: "ドル円は方向感を欠いた。行方を注視したい。".into(),
                closer: None,
            },
            para2: Paragraph {
                body: "y。".into(),
                closer: Some("行方を注視したい。".into()),
            },
            event_line: String::new(),
            recall: String::new(),
        };
        let p = polish(&w, &rules, &closers);
        assert_eq!(p.para1.text(), "ドル円は方向感を欠いた。");
        assert_eq!(p.para2.text(), "y。行方を注視したい。");
    }

    #[test]
    fn event_line_without_known_ending_is_kept_whole() {
        let rules = ReportConfig::builtin().text;
        assert_eq!(trim_event_line("本日の指標は、A。B。", &rules), "本日の指標は、A。B。");
        assert_eq!(
            trim_event_line("本日の指標は、主要な発表予定は確認されていない。古い文。", &rules),
            "本日の指標は、主要な発表予定は確認されていない。"
        );
    }
}
