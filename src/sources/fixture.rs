// src/sources/fixture.rs
//! In-memory providers for tests, demos and offline runs.

use super::{CalendarProvider, MarketDataProvider};
use crate::config::Instrument;
use crate::series::Timeframe;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

/// Returns the same bar rows for every instrument.
#[derive(Debug, Clone)]
pub struct StaticBars {
    rows: Vec<Value>,
    name: &'static str,
}

impl StaticBars {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows, name: "static-bars" }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[async_trait]
impl MarketDataProvider for StaticBars {
    async fn fetch_bars(&self, _instrument: &Instrument, _timeframe: Timeframe) -> Result<Vec<Value>> {
        Ok(self.rows.clone())
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

/// Returns the same calendar records for every date range.
#[derive(Debug, Clone)]
pub struct StaticCalendar {
    records: Vec<Value>,
}

impl StaticCalendar {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Records from a JSON document: an array, or an object with an array field.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let v: Value = serde_json::from_str(s)?;
        Ok(Self::new(super::json_calendar::extract_records(v)))
    }
}

#[async_trait]
impl CalendarProvider for StaticCalendar {
    async fn fetch_events(&self, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<Value>> {
        Ok(self.records.clone())
    }
    fn name(&self) -> &'static str {
        "static-calendar"
    }
}

/// Always fails, optionally after a delay (to exercise timeouts).
#[derive(Debug, Clone, Default)]
pub struct FailingProvider {
    pub delay: Option<Duration>,
    pub message: Option<String>,
}

impl FailingProvider {
    async fn fail(&self) -> Result<Vec<Value>> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Err(anyhow!(self.message.clone().unwrap_or_else(|| "provider unavailable".into())))
    }
}

#[async_trait]
impl MarketDataProvider for FailingProvider {
    async fn fetch_bars(&self, _instrument: &Instrument, _timeframe: Timeframe) -> Result<Vec<Value>> {
        self.fail().await
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl CalendarProvider for FailingProvider {
    async fn fetch_events(&self, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<Value>> {
        self.fail().await
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}
