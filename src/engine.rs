//! # Report Engine
//! Wires the pipeline: sources → normalizer → indicators/regime → technical seed,
//! calendar ranking, phrase picks → assembly and validation.
//!
//! [`ReportEngine::build`] is pure and synchronous. [`ReportEngine::generate`]
//! does the provider calls (each bounded by a timeout) and then calls `build`.

use crate::assemble::{AssembledText, Assembler, Picks, ReportInput, Stage, ValidationReport};
use crate::calendar::{EconomicEvent, EventScorer};
use crate::config::{Instrument, ReportConfig};
use crate::nfp::next_nfp_date;
use crate::phrase::{PhraseBank, CAT_CLOSER, CAT_TITLE_TAIL};
use crate::regime::Regime;
use crate::rerank::{build_reranker, DynReranker};
use crate::series::{normalize_rows, SeriesSet, Timeframe};
use crate::sources::{
    ensure_metrics_described, CalendarChain, CalendarProvider, ChartApiProvider, Fetched, JsonCalendarProvider,
    MarketChain, MarketDataProvider, SourceAttempt,
};
use crate::technical::{build_seed, SeedOrigin};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Caller-selected facts for one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportRequest {
    /// Instrument key (`USDJPY`) or display name (`ドル円`).
    pub instrument: String,
    pub date: NaiveDate,
    pub title: Option<String>,
    pub title_tail: Option<String>,
    pub points: Vec<String>,
    pub paragraph1: String,
    pub paragraph2: Option<String>,
}

/// Everything `build` needs; no I/O happens past this point.
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub request: ReportRequest,
    pub hourly_rows: Vec<Value>,
    pub calendar_records: Vec<Value>,
    pub picks: Picks,
    /// Provider attempts, carried into the metadata.
    pub attempts: Vec<SourceAttempt>,
    pub bars_source: String,
    pub calendar_source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BarCounts {
    pub h1: usize,
    pub h4: usize,
    pub d1: usize,
}

/// Serialisable audit record of one build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub instrument: String,
    pub date: NaiveDate,
    pub title: String,
    pub points: [String; 2],
    pub regime: Option<Regime>,
    pub seed_origin: SeedOrigin,
    pub bars: BarCounts,
    pub events: Vec<EconomicEvent>,
    pub bars_source: String,
    pub calendar_source: String,
    pub attempts: Vec<SourceAttempt>,
    pub next_nfp: Option<NaiveDate>,
    pub compliant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOutcome {
    pub text: String,
    pub sections: AssembledText,
    pub report: ValidationReport,
    pub stages: Vec<Stage>,
    pub attempts: u32,
    pub meta: ReportMeta,
}

impl ReportOutcome {
    pub fn is_compliant(&self) -> bool {
        self.report.is_clean()
    }
}

pub struct ReportEngine {
    config: ReportConfig,
    bank: PhraseBank,
    scorer: EventScorer,
    reranker: DynReranker,
    market: MarketChain,
    calendar: CalendarChain,
    /// Last good records per key; the chain's "previous value" step.
    cache: Mutex<HashMap<String, Vec<Value>>>,
}

impl ReportEngine {
    /// Engine without providers: `generate` falls straight through to static templates.
    pub fn new(config: ReportConfig, bank: PhraseBank) -> Result<Self> {
        let scorer = EventScorer::new(&config.calendar, config.local_offset())?;
        let timeout = Duration::from_secs(config.sources.timeout_secs.max(1));
        let reranker = build_reranker(&config.rerank);
        Ok(Self {
            scorer,
            reranker,
            market: MarketChain::new(Vec::new(), timeout),
            calendar: CalendarChain::new(Vec::new(), timeout),
            cache: Mutex::new(HashMap::new()),
            config,
            bank,
        })
    }

    /// Engine with the HTTP adapters named in `config.sources`.
    pub fn with_http_sources(config: ReportConfig, bank: PhraseBank) -> Result<Self> {
        let chart: Arc<dyn MarketDataProvider> = Arc::new(ChartApiProvider::new(&config.sources)?);
        let calendars: Vec<Arc<dyn CalendarProvider>> = match JsonCalendarProvider::from_config(&config.sources)? {
            Some(p) => vec![Arc::new(p)],
            None => Vec::new(),
        };
        Ok(Self::new(config, bank)?
            .with_market_providers(vec![chart])
            .with_calendar_providers(calendars))
    }

    pub fn with_market_providers(mut self, providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        self.market = MarketChain::new(providers, self.timeout());
        self
    }

    pub fn with_calendar_providers(mut self, providers: Vec<Arc<dyn CalendarProvider>>) -> Self {
        self.calendar = CalendarChain::new(providers, self.timeout());
        self
    }

    pub fn with_reranker(mut self, reranker: DynReranker) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn bank(&self) -> &PhraseBank {
        &self.bank
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.sources.timeout_secs.max(1))
    }

    fn instrument(&self, name: &str) -> Result<&Instrument> {
        self.config
            .instrument(name)
            .ok_or_else(|| anyhow!("unknown instrument '{name}'"))
    }

    fn cached(&self, key: &str) -> Option<Vec<Value>> {
        self.cache.lock().ok().and_then(|c| c.get(key).cloned())
    }

    fn remember(&self, key: String, fetched: &Fetched) {
        if !fetched.is_fresh() {
            return;
        }
        if let Ok(mut c) = self.cache.lock() {
            c.insert(key, fetched.records().to_vec());
        }
    }

    async fn pick(&self, category: &str, context: &str) -> Option<String> {
        let candidates = self.bank.get(category);
        if candidates.is_empty() {
            return None;
        }
        let wait = Duration::from_secs(self.config.rerank.timeout_secs.max(1));
        match tokio::time::timeout(wait, self.reranker.pick(category, context, candidates)).await {
            Ok(p) => p.filter(|p| candidates.contains(p)),
            Err(_) => {
                tracing::warn!(category, reranker = self.reranker.name(), "rerank timed out");
                None
            }
        }
    }

    /// Fetch through the chains, then [`build`](Self::build).
    /// Only an unknown instrument is an error; missing data degrades to templates.
    pub async fn generate(&self, request: ReportRequest) -> Result<ReportOutcome> {
        let instrument = self.instrument(&request.instrument)?.clone();
        let bars_key = format!("bars:{}", instrument.key);
        let cal_key = format!("calendar:{}", request.date);

        let bars = self
            .market
            .fetch(&instrument, Timeframe::H1, self.cached(&bars_key))
            .await;
        self.remember(bars_key, &bars.fetched);
        let calendar = self
            .calendar
            .fetch(request.date, request.date, self.cached(&cal_key))
            .await;
        self.remember(cal_key, &calendar.fetched);

        let picks = if !self.reranker.is_enabled() {
            Picks::default()
        } else {
            let context = format!("{} {}", instrument.display, request.date);
            Picks {
                title_tail: self.pick(CAT_TITLE_TAIL, &context).await,
                closer: self.pick(CAT_CLOSER, &context).await,
            }
        };

        let mut attempts = bars.attempts;
        attempts.extend(calendar.attempts);
        let inputs = ReportInputs {
            request,
            bars_source: bars.fetched.source().to_string(),
            calendar_source: calendar.fetched.source().to_string(),
            hourly_rows: bars.fetched.into_records(),
            calendar_records: calendar.fetched.into_records(),
            picks,
            attempts,
        };
        self.build(inputs)
    }

    /// Pure build: same inputs, same outcome.
    pub fn build(&self, inputs: ReportInputs) -> Result<ReportOutcome> {
        ensure_metrics_described();
        let ReportInputs {
            request,
            hourly_rows,
            calendar_records,
            picks,
            attempts,
            bars_source,
            calendar_source,
        } = inputs;
        let instrument = self.instrument(&request.instrument)?;
        let date_key = request.date.format("%Y-%m-%d").to_string();

        let hourly = normalize_rows(&hourly_rows, Timeframe::H1);
        let bars = match hourly.series() {
            Some(s) => {
                let set = SeriesSet::from_hourly(s.clone(), instrument.kind);
                BarCounts {
                    h1: set.hourly.len(),
                    h4: set.get(Timeframe::H4).map_or(0, |s| s.len()),
                    d1: set.get(Timeframe::D1).map_or(0, |s| s.len()),
                }
            }
            None => BarCounts::default(),
        };
        let seed = build_seed(instrument, &hourly, &self.config.regime, &self.bank, &date_key);
        let events = self
            .scorer
            .rank_records(&calendar_records, Some((request.date, request.date)));

        let input = ReportInput {
            instrument,
            date: request.date,
            title: request.title.clone(),
            title_tail: request.title_tail.clone(),
            points: request.points.clone(),
            paragraph1: request.paragraph1.clone(),
            paragraph2: request.paragraph2.clone(),
            seed: &seed,
            events: &events,
            picks: &picks,
        };
        let assembly = Assembler::new(&self.config.text, &self.config.calendar, &self.bank).assemble(&input);

        counter!("report_builds_total").increment(1);
        if !assembly.report.is_clean() {
            counter!("report_violations_total").increment(assembly.report.violations.len() as u64);
            for v in &assembly.report.violations {
                tracing::warn!(instrument = %instrument.key, violation = %v, "report violation");
            }
        }
        tracing::info!(
            instrument = %instrument.key,
            date = %date_key,
            regime = ?seed.regime(),
            events = events.len(),
            attempts = assembly.attempts,
            compliant = assembly.report.is_clean(),
            "report built"
        );

        let meta = ReportMeta {
            instrument: instrument.key.clone(),
            date: request.date,
            title: assembly.text.title.clone(),
            points: assembly.text.points.clone(),
            regime: seed.regime(),
            seed_origin: seed.origin,
            bars,
            events: events.events().to_vec(),
            bars_source,
            calendar_source,
            attempts,
            next_nfp: next_nfp_date(request.date, &self.config.nfp),
            compliant: assembly.report.is_clean(),
        };

        Ok(ReportOutcome {
            text: assembly.rendered,
            sections: assembly.text,
            report: assembly.report,
            stages: assembly.stages,
            attempts: assembly.attempts,
            meta,
        })
    }
}
