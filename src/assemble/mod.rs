// src/assemble/mod.rs
//! # Assembly & Validation Engine
//!
//! Draft → Padded → Polished → Validated → Final. A Validated state with
//! violations re-enters Padded while the retry budget lasts; once the budget
//! is spent the text is frozen together with its non-empty report.

pub mod draft;
pub mod pad;
pub mod polish;
pub mod render;
pub mod validate;

use crate::calendar::RankedEventList;
use crate::config::{CalendarConfig, Instrument, TextRules};
use crate::phrase::{PhraseBank, CAT_CLOSER, CAT_PARA1_FILLER, CAT_PARA2_FILLER};
use crate::technical::TechnicalSeed;
use chrono::NaiveDate;
use serde::Serialize;

pub use draft::{compose_title, title_recall, Paragraph, Work};
pub use render::{char_len, AssembledText};
pub use validate::{FactSources, Section, ValidationContext, ValidationReport, Violation, ViolationKind};

/// Reranker answers, already checked against their candidate lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Picks {
    pub title_tail: Option<String>,
    pub closer: Option<String>,
}

/// Everything the caller and the upstream stages supply for one report.
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    pub instrument: &'a Instrument,
    pub date: NaiveDate,
    /// Manual title; wins over the composed one.
    pub title: Option<String>,
    pub title_tail: Option<String>,
    pub points: Vec<String>,
    pub paragraph1: String,
    /// Replaces the technical seed as paragraph 2.
    pub paragraph2: Option<String>,
    pub seed: &'a TechnicalSeed,
    pub events: &'a RankedEventList,
    pub picks: &'a Picks,
}

impl ReportInput<'_> {
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    Padded,
    Polished,
    Validated,
    Final,
}

enum State {
    Draft(Work),
    Padded(Work),
    Polished(Work),
    Validated(Work, ValidationReport),
    Final(Work, ValidationReport),
}

impl State {
    fn stage(&self) -> Stage {
        match self {
            State::Draft(_) => Stage::Draft,
            State::Padded(_) => Stage::Padded,
            State::Polished(_) => Stage::Polished,
            State::Validated(..) => Stage::Validated,
            State::Final(..) => Stage::Final,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assembly {
    pub text: AssembledText,
    pub rendered: String,
    pub report: ValidationReport,
    /// Every state visited, in order.
    pub stages: Vec<Stage>,
    /// Padding passes run (1 + retries).
    pub attempts: u32,
}

pub struct Assembler<'a> {
    rules: &'a TextRules,
    calendar: &'a CalendarConfig,
    bank: &'a PhraseBank,
}

impl<'a> Assembler<'a> {
    pub fn new(rules: &'a TextRules, calendar: &'a CalendarConfig, bank: &'a PhraseBank) -> Self {
        Self { rules, calendar, bank }
    }

    /// The sentence that may end paragraph 2.
    pub fn closer_whitelist(&self) -> Vec<String> {
        let list = self.bank.get(CAT_CLOSER);
        if list.is_empty() {
            vec![self.bank.safe_sentence().to_string()]
        } else {
            list.to_vec()
        }
    }

    /// Numbers the report may legitimately contain.
    pub fn fact_sources(&self, input: &ReportInput<'_>, draft: &Work) -> FactSources {
        let mut facts = FactSources::from_texts(self.bank.all_phrases());
        facts.add(&input.seed.text);
        facts.add(&input.instrument.fallback_paragraph());
        facts.add(&input.paragraph1);
        if let Some(p) = &input.paragraph2 {
            facts.add(p);
        }
        if let Some(t) = &input.title {
            facts.add(t);
        }
        for p in draft.points.iter().chain(input.points.iter()) {
            facts.add(p);
        }
        facts.add(&draft.event_line);
        facts
    }

    fn pad(&self, work: Work, input: &ReportInput<'_>, attempt: u32) -> Work {
        let subject = input.instrument.key.as_str();
        let date_key = input.date_key();
        let mins = &self.rules.min_chars;

        let p1_cats = vec![CAT_PARA1_FILLER.to_string()];
        let mut p2_cats = vec![format!("{CAT_PARA2_FILLER}.{subject}"), CAT_PARA2_FILLER.to_string()];
        if attempt > 0 {
            if let Some(regime) = input.seed.regime() {
                p2_cats.push(format!("commentary.{}", regime.key()));
            }
        }

        Work {
            para1: pad::pad_paragraph(&work.para1, mins.para1, &p1_cats, self.bank, subject, &date_key),
            para2: pad::pad_paragraph(&work.para2, mins.para2, &p2_cats, self.bank, subject, &date_key),
            ..work
        }
    }

    /// Run the state machine to Final.
    pub fn assemble(&self, input: &ReportInput<'_>) -> Assembly {
        let closers = self.closer_whitelist();
        let budget = self.rules.retry_budget;

        let first = draft::draft(input, self.rules, self.calendar, self.bank);
        let facts = self.fact_sources(input, &first);
        let ctx = ValidationContext {
            rules: self.rules,
            closers: &closers,
            facts: &facts,
        };

        let mut stages = Vec::new();
        let mut attempts = 0u32;
        let mut state = State::Draft(first);
        loop {
            stages.push(state.stage());
            state = match state {
                State::Draft(w) => {
                    attempts += 1;
                    State::Padded(self.pad(w, input, 0))
                }
                State::Padded(w) => State::Polished(polish::polish(&w, self.rules, &closers)),
                State::Polished(w) => {
                    let report = validate::validate(&w.to_text(), &ctx);
                    State::Validated(w, report)
                }
                State::Validated(w, report) if report.is_clean() || attempts > budget => State::Final(w, report),
                State::Validated(w, report) => {
                    tracing::debug!(
                        attempt = attempts,
                        violations = report.violations.len(),
                        "violations found; padding again"
                    );
                    attempts += 1;
                    State::Padded(self.pad(w, input, attempts - 1))
                }
                State::Final(w, report) => {
                    let text = w.to_text();
                    return Assembly {
                        rendered: text.render(self.rules),
                        text,
                        report,
                        stages,
                        attempts,
                    };
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use crate::technical::TechnicalSeed;

    #[test]
    fn clean_run_visits_each_stage_once() {
        let cfg = ReportConfig::builtin();
        let bank = PhraseBank::builtin();
        let inst = cfg.instrument("USDJPY").unwrap().clone();
        let seed = TechnicalSeed::fallback(&inst);
        let events = RankedEventList::default();
        let picks = Picks::default();
        let input = ReportInput {
            instrument: &inst,
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            title: None,
            title_tail: Some("注視か".into()),
            points: vec!["日銀の政策姿勢".into(), "米長期金利の動向".into()],
            paragraph1: String::new(),
            paragraph2: None,
            seed: &seed,
            events: &events,
            picks: &picks,
        };
        let out = Assembler::new(&cfg.text, &cfg.calendar, &bank).assemble(&input);
        assert!(out.report.is_clean(), "{:?}", out.report.violations);
        assert_eq!(
            out.stages,
            vec![Stage::Draft, Stage::Padded, Stage::Polished, Stage::Validated, Stage::Final]
        );
        assert_eq!(out.attempts, 1);
        assert!(out.rendered.ends_with("主要な発表予定は確認されていない。ドル円の方向感に注視したい。"));
    }

    #[test]
    fn unfixable_violation_spends_the_budget() {
        let cfg = ReportConfig::builtin();
        let bank = PhraseBank::builtin();
        let inst = cfg.instrument("USDJPY").unwrap().clone();
        let seed = TechnicalSeed::fallback(&inst);
        let events = RankedEventList::default();
        let picks = Picks::default();
        let input = ReportInput {
            instrument: &inst,
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            title: None,
            title_tail: None,
            points: vec!["日銀の政策姿勢".into()],
            paragraph1: "ドル円は買い推奨。".into(),
            paragraph2: None,
            seed: &seed,
            events: &events,
            picks: &picks,
        };
        let out = Assembler::new(&cfg.text, &cfg.calendar, &bank).assemble(&input);
        assert!(out.report.has(ViolationKind::BannedVocabulary));
        assert!(out.report.has(ViolationKind::PointsIncomplete));
        assert_eq!(out.attempts, cfg.text.retry_budget + 1);
        assert_eq!(out.stages.last(), Some(&Stage::Final));
        assert_eq!(out.stages.iter().filter(|s| **s == Stage::Validated).count() as u32, out.attempts);
    }
}
