// tests/rerank_stub.rs
use chrono::NaiveDate;
use market_brief::config::RerankConfig;
use market_brief::rerank::{build_reranker, FixedReranker, PhraseReranker, PickFuture};
use market_brief::sources::StaticCalendar;
use market_brief::{PhraseBank, ReportConfig, ReportEngine, ReportRequest};
use serde_json::json;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn request() -> ReportRequest {
    ReportRequest {
        instrument: "USDJPY".into(),
        date: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
        ..ReportRequest::default()
    }
}

fn engine() -> ReportEngine {
    ReportEngine::new(ReportConfig::builtin(), PhraseBank::builtin())
        .unwrap()
        .with_calendar_providers(vec![Arc::new(StaticCalendar::new(vec![
            json!({"date": "2025-03-07", "time": "8:50", "countryCode": "JP", "name": "GDP Growth Rate QoQ"}),
            json!({"date": "2025-03-07", "time": "22:30", "countryCode": "US", "name": "Nonfarm Payrolls"}),
        ]))])
}

#[serial_test::serial]
#[tokio::test]
async fn picks_from_the_bank_are_used() {
    let e = engine().with_reranker(Arc::new(FixedReranker::default()));
    let out = e.generate(request()).await.unwrap();
    // The fixed reranker answers with the last candidate of each list.
    assert_eq!(out.sections.title, "ドル円の方向感を見極めたい");
    assert!(out.sections.paragraph2.ends_with("均衡が崩れるかを見守りたい。"));
    assert!(out.text.ends_with("ドル円の方向感を見極めたい。"));
    assert!(out.is_compliant(), "{:?}", out.report.violations);
}

#[serial_test::serial]
#[tokio::test]
async fn answers_outside_the_bank_are_ignored() {
    let picked = engine()
        .with_reranker(Arc::new(FixedReranker {
            answer: Some("今日は強気で買いたい。".into()),
        }))
        .generate(request())
        .await
        .unwrap();
    let plain = engine().generate(request()).await.unwrap();
    assert_eq!(picked.text, plain.text);
    assert!(!picked.text.contains("買いたい"));
}

/// Answers like the fixed reranker but reports itself as switched off.
#[derive(Default)]
struct PausedReranker {
    calls: AtomicUsize,
}

impl PhraseReranker for PausedReranker {
    fn pick<'a>(&'a self, _category: &'a str, _context: &'a str, candidates: &'a [String]) -> PickFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = candidates.last().cloned();
        Box::pin(async move { last })
    }
    fn name(&self) -> &'static str {
        "paused"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

#[serial_test::serial]
#[tokio::test]
async fn switched_off_reranker_is_never_asked_whatever_its_name() {
    let paused = Arc::new(PausedReranker::default());
    let out = engine().with_reranker(paused.clone()).generate(request()).await.unwrap();
    let plain = engine().generate(request()).await.unwrap();
    assert_eq!(paused.calls.load(Ordering::SeqCst), 0);
    assert_eq!(out.text, plain.text);
}

#[serial_test::serial]
#[tokio::test]
async fn factory_honours_test_mode_and_config() {
    env::set_var("RERANK_TEST_MODE", "mock");
    assert_eq!(build_reranker(&RerankConfig::default()).name(), "mock");
    env::remove_var("RERANK_TEST_MODE");

    assert_eq!(build_reranker(&RerankConfig::default()).name(), "disabled");

    env::remove_var("OPENAI_API_KEY");
    let enabled = RerankConfig {
        enabled: true,
        ..RerankConfig::default()
    };
    // Missing key degrades to disabled instead of failing the run.
    let degraded = build_reranker(&enabled);
    assert_eq!(degraded.name(), "disabled");
    assert!(!degraded.is_enabled());

    let keyed = RerankConfig {
        enabled: true,
        api_key: "sk-test".into(),
        ..RerankConfig::default()
    };
    let r = build_reranker(&keyed);
    assert_eq!(r.name(), "openai");
    assert!(r.is_enabled());
    // Empty candidate lists never reach the network.
    assert_eq!(r.pick("closer", "ドル円", &[]).await, None);
}
