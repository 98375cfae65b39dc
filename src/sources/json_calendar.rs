// src/sources/json_calendar.rs
//! Generic JSON calendar feed: `GET {url}?from=YYYY-MM-DD&to=YYYY-MM-DD`.

use super::CalendarProvider;
use crate::config::SourcesConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

const RECORD_FIELDS: &[&str] = &["events", "items", "data", "rows"];

/// Array at the root, or under the first known field holding an array.
pub fn extract_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(a) => a,
        Value::Object(mut o) => RECORD_FIELDS
            .iter()
            .find_map(|k| match o.remove(*k) {
                Some(Value::Array(a)) => Some(a),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub struct JsonCalendarProvider {
    http: reqwest::Client,
    url: String,
}

impl JsonCalendarProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("market-brief/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building calendar http client")?;
        Ok(Self { http, url: url.into() })
    }

    /// `None` when no calendar URL is configured.
    pub fn from_config(cfg: &SourcesConfig) -> Result<Option<Self>> {
        if cfg.calendar_url.trim().is_empty() {
            return Ok(None);
        }
        Self::new(cfg.calendar_url.trim(), Duration::from_secs(cfg.timeout_secs)).map(Some)
    }
}

#[async_trait]
impl CalendarProvider for JsonCalendarProvider {
    async fn fetch_events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Value>> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await
            .context("calendar request")?;
        if !resp.status().is_success() {
            bail!("calendar feed returned {}", resp.status());
        }
        let body: Value = resp.json().await.context("calendar body is not JSON")?;
        Ok(extract_records(body))
    }

    fn name(&self) -> &'static str {
        "json-calendar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_at_root_or_nested() {
        assert_eq!(extract_records(json!([{"a": 1}])).len(), 1);
        assert_eq!(extract_records(json!({"items": [{"a": 1}, {"a": 2}]})).len(), 2);
        assert_eq!(extract_records(json!({"meta": {}, "data": [{"a": 1}]})).len(), 1);
        assert!(extract_records(json!({"events": "none"})).is_empty());
        assert!(extract_records(json!(3)).is_empty());
    }
}
