// src/sources/mod.rs
//! External collaborators: market data and calendar feeds.
//!
//! Providers return raw JSON records; normalization happens downstream.
//! A chain asks its providers in fixed order and the first non-empty answer
//! wins. Errors, timeouts and empty answers are logged, counted and skipped;
//! after the providers comes the caller's cached value, then `Unavailable`.

pub mod chart;
pub mod fixture;
pub mod json_calendar;

use crate::config::Instrument;
use crate::series::Timeframe;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use chart::ChartApiProvider;
pub use fixture::{FailingProvider, StaticBars, StaticCalendar};
pub use json_calendar::JsonCalendarProvider;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_bars(&self, instrument: &Instrument, timeframe: Timeframe) -> Result<Vec<Value>>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn fetch_events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Value>>;
    fn name(&self) -> &'static str;
}

/// One-time metrics registration.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("source_errors_total", "Provider errors and timeouts.");
        describe_counter!(
            "source_fallback_total",
            "Fetches not served by the first provider (later provider, cache or nothing)."
        );
        describe_counter!("report_builds_total", "Reports assembled.");
        describe_counter!("report_violations_total", "Violations left in final reports.");
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Records { count: usize },
    Empty,
    Error { message: String },
    TimedOut,
    Cached { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAttempt {
    pub source: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Fresh { source: String, records: Vec<Value> },
    Cached { records: Vec<Value> },
    Unavailable,
}

impl Fetched {
    pub fn records(&self) -> &[Value] {
        match self {
            Fetched::Fresh { records, .. } | Fetched::Cached { records } => records,
            Fetched::Unavailable => &[],
        }
    }

    pub fn into_records(self) -> Vec<Value> {
        match self {
            Fetched::Fresh { records, .. } | Fetched::Cached { records } => records,
            Fetched::Unavailable => Vec::new(),
        }
    }

    /// Provider name, `cache`, or `none`.
    pub fn source(&self) -> &str {
        match self {
            Fetched::Fresh { source, .. } => source,
            Fetched::Cached { .. } => "cache",
            Fetched::Unavailable => "none",
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Fetched::Fresh { .. })
    }
}

/// Result of a chain plus the record of every attempt made.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced {
    pub fetched: Fetched,
    pub attempts: Vec<SourceAttempt>,
}

/// Fold one provider call into the attempt log; `Some` only for a non-empty answer.
fn settle(
    kind: &'static str,
    provider: &'static str,
    res: Result<Result<Vec<Value>>, tokio::time::error::Elapsed>,
    attempts: &mut Vec<SourceAttempt>,
) -> Option<Vec<Value>> {
    let outcome = match res {
        Ok(Ok(records)) if !records.is_empty() => {
            attempts.push(SourceAttempt {
                source: provider.to_string(),
                outcome: AttemptOutcome::Records { count: records.len() },
            });
            return Some(records);
        }
        Ok(Ok(_)) => {
            tracing::info!(kind, provider, "provider returned no records");
            AttemptOutcome::Empty
        }
        Ok(Err(e)) => {
            tracing::warn!(error = ?e, kind, provider, "provider error");
            counter!("source_errors_total", "kind" => kind, "provider" => provider).increment(1);
            AttemptOutcome::Error {
                message: format!("{e:#}"),
            }
        }
        Err(_) => {
            tracing::warn!(kind, provider, "provider timed out");
            counter!("source_errors_total", "kind" => kind, "provider" => provider).increment(1);
            AttemptOutcome::TimedOut
        }
    };
    attempts.push(SourceAttempt {
        source: provider.to_string(),
        outcome,
    });
    None
}

fn finish(
    kind: &'static str,
    fresh: Option<(&'static str, Vec<Value>)>,
    cached: Option<Vec<Value>>,
    mut attempts: Vec<SourceAttempt>,
) -> Sourced {
    let first_served = matches!(&fresh, Some(_)) && attempts.len() == 1;
    if !first_served {
        counter!("source_fallback_total", "kind" => kind).increment(1);
    }
    let fetched = match (fresh, cached) {
        (Some((source, records)), _) => Fetched::Fresh {
            source: source.to_string(),
            records,
        },
        (None, Some(records)) if !records.is_empty() => {
            tracing::info!(kind, count = records.len(), "serving cached records");
            attempts.push(SourceAttempt {
                source: "cache".into(),
                outcome: AttemptOutcome::Cached { count: records.len() },
            });
            Fetched::Cached { records }
        }
        _ => {
            tracing::warn!(kind, "no source available");
            Fetched::Unavailable
        }
    };
    Sourced { fetched, attempts }
}

/// Market-data providers in priority order.
#[derive(Clone)]
pub struct MarketChain {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    timeout: Duration,
}

impl MarketChain {
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub async fn fetch(&self, instrument: &Instrument, timeframe: Timeframe, cached: Option<Vec<Value>>) -> Sourced {
        ensure_metrics_described();
        let mut attempts = Vec::with_capacity(self.providers.len() + 1);
        for p in &self.providers {
            let res = tokio::time::timeout(self.timeout, p.fetch_bars(instrument, timeframe)).await;
            if let Some(records) = settle("bars", p.name(), res, &mut attempts) {
                return finish("bars", Some((p.name(), records)), None, attempts);
            }
        }
        finish("bars", None, cached, attempts)
    }
}

/// Calendar providers in priority order.
#[derive(Clone)]
pub struct CalendarChain {
    providers: Vec<Arc<dyn CalendarProvider>>,
    timeout: Duration,
}

impl CalendarChain {
    pub fn new(providers: Vec<Arc<dyn CalendarProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub async fn fetch(&self, from: NaiveDate, to: NaiveDate, cached: Option<Vec<Value>>) -> Sourced {
        ensure_metrics_described();
        let mut attempts = Vec::with_capacity(self.providers.len() + 1);
        for p in &self.providers {
            let res = tokio::time::timeout(self.timeout, p.fetch_events(from, to)).await;
            if let Some(records) = settle("calendar", p.name(), res, &mut attempts) {
                return finish("calendar", Some((p.name(), records)), None, attempts);
            }
        }
        finish("calendar", None, cached, attempts)
    }
}
