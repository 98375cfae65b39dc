// tests/pipeline_fallback.rs
use chrono::NaiveDate;
use market_brief::regime::Regime;
use market_brief::sources::{AttemptOutcome, FailingProvider, StaticBars, StaticCalendar};
use market_brief::technical::SeedOrigin;
use market_brief::{PhraseBank, ReportConfig, ReportEngine, ReportRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn request(instrument: &str) -> ReportRequest {
    ReportRequest {
        instrument: instrument.into(),
        date: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
        title_tail: Some("注視か".into()),
        points: vec!["米雇用統計の結果".into(), "米長期金利の動向".into()],
        ..ReportRequest::default()
    }
}

fn climbing_rows(n: i64) -> Vec<Value> {
    // 2025-02-24 00:00 UTC onwards.
    (0..n)
        .map(|i| {
            let c = 140.0 + i as f64 * 0.05;
            json!({"timestamp": 1_740_355_200 + i * 3600, "open": c - 0.05, "high": c + 0.02, "low": c - 0.07, "close": c})
        })
        .collect()
}

#[tokio::test]
async fn failing_feeds_still_produce_a_clean_report() {
    let engine = ReportEngine::new(ReportConfig::builtin(), PhraseBank::builtin())
        .unwrap()
        .with_market_providers(vec![Arc::new(FailingProvider::default())])
        .with_calendar_providers(vec![Arc::new(FailingProvider::default())]);

    let out = engine.generate(request("USDJPY")).await.unwrap();
    assert!(out.is_compliant(), "{:?}", out.report.violations);
    assert_eq!(out.meta.seed_origin, SeedOrigin::Fallback);
    assert_eq!(out.meta.regime, None);
    assert_eq!(out.meta.bars_source, "none");
    assert_eq!(out.meta.calendar_source, "none");
    assert_eq!(out.meta.bars.h1, 0);
    assert!(out.text.contains("ボリンジャーバンド±2σ"));
    assert!(out.text.contains("主要な発表予定は確認されていない。"));
    assert!(out
        .meta
        .attempts
        .iter()
        .any(|a| matches!(a.outcome, AttemptOutcome::Error { .. })));
}

#[tokio::test]
async fn single_row_feed_counts_as_no_data() {
    let engine = ReportEngine::new(ReportConfig::builtin(), PhraseBank::builtin())
        .unwrap()
        .with_market_providers(vec![Arc::new(StaticBars::new(climbing_rows(1)))])
        .with_calendar_providers(vec![Arc::new(StaticCalendar::new(vec![]))]);
    let out = engine.generate(request("EURUSD")).await.unwrap();
    assert_eq!(out.meta.seed_origin, SeedOrigin::Fallback);
    assert!(out.is_compliant(), "{:?}", out.report.violations);
}

#[tokio::test]
async fn live_bars_drive_the_technical_paragraph() {
    let calendar = StaticCalendar::from_json_str(
        r#"{"events": [
            {"datetime": "2025-03-07T13:30:00Z", "country": "US", "name": "Nonfarm Payrolls"},
            {"date": "2025-03-07", "time": "8:30", "country": "JP", "name": "家計支出"}
        ]}"#,
    )
    .unwrap();
    let engine = ReportEngine::new(ReportConfig::builtin(), PhraseBank::builtin())
        .unwrap()
        .with_market_providers(vec![Arc::new(StaticBars::new(climbing_rows(360)))])
        .with_calendar_providers(vec![Arc::new(calendar)]);

    let out = engine.generate(request("USDJPY")).await.unwrap();
    assert_eq!(out.meta.seed_origin, SeedOrigin::Live);
    assert_eq!(out.meta.regime, Some(Regime::TrendUp));
    assert_eq!(out.meta.bars.h1, 360);
    assert_eq!(out.meta.bars.h4, 90);
    assert!(out.text.contains("上昇トレンド"));
    assert!(out.text.contains("22:30に米・非農業部門雇用者数"));
    assert!(out.is_compliant(), "{:?}", out.report.violations);
}

#[tokio::test]
async fn slow_provider_times_out_and_the_next_one_answers() {
    let mut cfg = ReportConfig::builtin();
    cfg.sources.timeout_secs = 1;
    let slow = FailingProvider {
        delay: Some(Duration::from_secs(5)),
        message: None,
    };
    let engine = ReportEngine::new(cfg, PhraseBank::builtin())
        .unwrap()
        .with_market_providers(vec![
            Arc::new(slow),
            Arc::new(StaticBars::new(climbing_rows(48)).named("backup-bars")),
        ])
        .with_calendar_providers(vec![]);

    let out = engine.generate(request("USDJPY")).await.unwrap();
    assert_eq!(out.meta.bars_source, "backup-bars");
    assert!(out
        .meta
        .attempts
        .iter()
        .any(|a| a.source == "failing" && a.outcome == AttemptOutcome::TimedOut));
}
