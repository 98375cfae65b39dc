// src/lib.rs
//! Deterministic daily market brief.
//!
//! Bars and calendar records go in; a Japanese report text and a
//! [`ValidationReport`](assemble::ValidationReport) come out. Every number in
//! the text was computed from the bars or supplied by the caller, the feeds or
//! the phrase bank.

pub mod assemble;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod indicators;
pub mod nfp;
pub mod phrase;
pub mod regime;
pub mod rerank;
pub mod series;
pub mod sources;
pub mod technical;

pub use crate::assemble::{AssembledText, ValidationReport, Violation, ViolationKind};
pub use crate::config::ReportConfig;
pub use crate::engine::{ReportEngine, ReportInputs, ReportOutcome, ReportRequest};
pub use crate::phrase::PhraseBank;
