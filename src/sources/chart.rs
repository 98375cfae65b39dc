// src/sources/chart.rs
//! Chart API adapter (`{base}/{ticker}?interval=60m&range=30d`).
//!
//! Reads `chart.result[0].timestamp` with the parallel arrays of
//! `indicators.quote[0]`. The instrument's tickers are tried in order.

use super::MarketDataProvider;
use crate::config::{Instrument, SourcesConfig};
use crate::series::Timeframe;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Chart response body → one JSON row per timestamp (nulls kept; the normalizer drops them).
pub fn parse_chart(body: &Value) -> Result<Vec<Value>> {
    let chart = body.get("chart").ok_or_else(|| anyhow!("missing 'chart'"))?;
    if let Some(err) = chart.get("error").filter(|e| !e.is_null()) {
        bail!("chart api error: {err}");
    }
    let Some(result) = chart.pointer("/result/0") else {
        return Ok(Vec::new());
    };
    let Some(ts) = result.get("timestamp").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let quote = result.pointer("/indicators/quote/0");
    let adj = result.pointer("/indicators/adjclose/0/adjclose");
    let col = |name: &str, i: usize| -> Value {
        quote
            .and_then(|q| q.get(name))
            .and_then(|a| a.get(i))
            .cloned()
            .unwrap_or(Value::Null)
    };

    Ok(ts
        .iter()
        .enumerate()
        .map(|(i, t)| {
            json!({
                "timestamp": t,
                "open": col("open", i),
                "high": col("high", i),
                "low": col("low", i),
                "close": col("close", i),
                "volume": col("volume", i),
                "adjclose": adj.and_then(|a| a.get(i)).cloned().unwrap_or(Value::Null),
            })
        })
        .collect())
}

pub struct ChartApiProvider {
    http: reqwest::Client,
    base_url: String,
    range: String,
}

impl ChartApiProvider {
    pub fn new(cfg: &SourcesConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("market-brief/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building chart http client")?;
        Ok(Self {
            http,
            base_url: cfg.chart_base_url.trim_end_matches('/').to_string(),
            range: cfg.chart_range.clone(),
        })
    }

    async fn fetch_ticker(&self, ticker: &str, timeframe: Timeframe) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, ticker);
        let resp = self
            .http
            .get(&url)
            .query(&[("interval", timeframe.interval_param()), ("range", self.range.as_str())])
            .send()
            .await
            .with_context(|| format!("chart request for {ticker}"))?;
        if !resp.status().is_success() {
            bail!("chart api returned {} for {ticker}", resp.status());
        }
        let body: Value = resp.json().await.context("chart body is not JSON")?;
        parse_chart(&body)
    }
}

#[async_trait]
impl MarketDataProvider for ChartApiProvider {
    async fn fetch_bars(&self, instrument: &Instrument, timeframe: Timeframe) -> Result<Vec<Value>> {
        let mut last_err = None;
        for ticker in &instrument.tickers {
            match self.fetch_ticker(ticker, timeframe).await {
                Ok(rows) if !rows.is_empty() => return Ok(rows),
                Ok(_) => tracing::debug!(ticker = %ticker, "ticker returned no rows"),
                Err(e) => {
                    tracing::debug!(ticker = %ticker, error = %e, "ticker failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e.context(format!("all tickers failed for {}", instrument.key))),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "chart-api"
    }
}
