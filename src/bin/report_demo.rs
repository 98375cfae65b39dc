//! Builds one report from fixture data and prints the text plus its metadata.
//!
//! `REPORT_DEMO_LIVE=1` uses the HTTP adapters from the config instead.
//! `LOG_FORMAT=json` switches the log output to JSON lines.

use chrono::{Duration, TimeZone, Utc};
use market_brief::sources::{StaticBars, StaticCalendar};
use market_brief::{PhraseBank, ReportConfig, ReportEngine, ReportRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("market_brief=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .init();
    }
}

/// Two weeks of gently rising hourly bars.
fn demo_bars() -> Vec<Value> {
    let start = Utc.with_ymd_and_hms(2025, 2, 17, 0, 0, 0).single().unwrap_or_default();
    (0..24 * 14)
        .map(|i| {
            let c = 149.0 + i as f64 * 0.01 + ((i % 7) as f64 - 3.0) * 0.02;
            json!({
                "timestamp": (start + Duration::hours(i)).timestamp(),
                "open": c - 0.02,
                "high": c + 0.05,
                "low": c - 0.06,
                "close": c,
            })
        })
        .collect()
}

fn demo_calendar() -> Vec<Value> {
    vec![
        json!({"name": "Nonfarm Payrolls", "country": "United States", "datetime": "2025-03-07T13:30:00Z"}),
        json!({"name": "Average Hourly Earnings", "country": "US", "datetime": "2025-03-07T13:30:00Z"}),
        json!({"name": "Household Spending", "country": "Japan", "time": "08:30", "date": "2025-03-07"}),
        json!({"name": "ECB President Lagarde Speaks", "country": "Euro Area", "time": "tentative", "date": "2025-03-07"}),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = ReportConfig::load_default()?;
    let bank = PhraseBank::load_default()?;
    let live = std::env::var("REPORT_DEMO_LIVE").map(|v| v == "1").unwrap_or(false);
    let engine = if live {
        ReportEngine::with_http_sources(config, bank)?
    } else {
        ReportEngine::new(config, bank)?
            .with_market_providers(vec![Arc::new(StaticBars::new(demo_bars()))])
            .with_calendar_providers(vec![Arc::new(StaticCalendar::new(demo_calendar()))])
    };

    let date = if live {
        Utc::now().date_naive()
    } else {
        chrono::NaiveDate::from_ymd_opt(2025, 3, 7).unwrap_or_default()
    };
    let request = ReportRequest {
        instrument: std::env::args().nth(1).unwrap_or_else(|| "USDJPY".into()),
        date,
        paragraph1: "為替市場は、週末の米雇用統計を控えて持ち高調整が中心となった。".into(),
        ..ReportRequest::default()
    };

    let outcome = engine.generate(request).await?;
    println!("{}\n", outcome.text);
    println!("{}", serde_json::to_string_pretty(&outcome.meta)?);
    if !outcome.is_compliant() {
        for v in &outcome.report.violations {
            eprintln!("violation: {v}");
        }
    }
    Ok(())
}
