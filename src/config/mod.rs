// src/config/mod.rs
//! Report configuration: thresholds, scoring tables, text rules, instruments.
//!
//! The built-in defaults live in `config/defaults/report.toml` and are compiled in.
//! A user file is deep-merged over them, so it only lists what it changes.
//! Lookup order: `$MARKET_BRIEF_CONFIG` → `config/report.toml` → `config/report.json`
//! → built-in.

pub mod rerank;

use crate::regime::RegimeThresholds;
use crate::series::InstrumentKind;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub use rerank::RerankConfig;

pub const ENV_CONFIG_PATH: &str = "MARKET_BRIEF_CONFIG";
const BUILTIN_REPORT: &str = include_str!("../../config/defaults/report.toml");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocaleConfig {
    /// Offset of the audience's local time from UTC, in hours.
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcesConfig {
    pub timeout_secs: u64,
    pub chart_base_url: String,
    pub chart_range: String,
    /// Empty disables the HTTP calendar provider.
    pub calendar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AliasRule {
    /// Case-insensitive substring.
    pub pattern: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarConfig {
    pub default_weight: i32,
    pub max_items: usize,
    pub speech_penalty: i32,
    pub near_duplicate_similarity: f64,
    /// Inclusive local-hour windows that earn the time-of-day point.
    pub time_windows: Vec<[u32; 2]>,
    pub speech_keywords: Vec<String>,
    pub high_rank_keywords: Vec<String>,
    pub region_weights: BTreeMap<String, i32>,
    pub category_weights: BTreeMap<String, i32>,
    pub boosts: BTreeMap<String, i32>,
    pub country_regions: BTreeMap<String, String>,
    pub region_prefixes: BTreeMap<String, String>,
    pub name_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub contains_aliases: Vec<AliasRule>,
    pub category_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub category_keywords: Vec<KeywordRule>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MinChars {
    pub para1: usize,
    pub para2: usize,
    pub events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecallRule {
    pub suffix: String,
    pub closer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRules {
    pub retry_budget: u32,
    pub banned_words: Vec<String>,
    pub allowed_compounds: Vec<String>,
    pub points_heading: String,
    pub title_label: String,
    pub event_line_prefix: String,
    pub event_line_suffix: String,
    pub event_line_empty: String,
    /// `{a}` / `{b}` are the two points.
    pub point_hint: String,
    pub default_title_tail: String,
    pub min_chars: MinChars,
    pub title_recall: Vec<RecallRule>,
    #[serde(default)]
    pub term_lock: Vec<Replacement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NfpConfig {
    /// Published release dates (`YYYY-MM-DD`); preferred over the first-Friday rule.
    #[serde(default)]
    pub official: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    /// Stable subject key (`USDJPY`), used for phrase rotation and filler lookup.
    pub key: String,
    /// Display name used in the text (`ドル円`).
    pub display: String,
    /// Market word used by the fallback template (`為替市場`).
    pub market: String,
    #[serde(default)]
    pub kind: InstrumentKind,
    pub tickers: Vec<String>,
    /// Static technical paragraph; `{market}` is substituted.
    pub template: String,
}

impl Instrument {
    pub fn fallback_paragraph(&self) -> String {
        self.template.replace("{market}", &self.market)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    pub locale: LocaleConfig,
    pub regime: RegimeThresholds,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    pub calendar: CalendarConfig,
    pub text: TextRules,
    #[serde(default)]
    pub nfp: NfpConfig,
    pub instruments: Vec<Instrument>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ReportConfig {
    /// Compiled-in defaults. The embedded file is covered by tests.
    pub fn builtin() -> Self {
        let cfg: ReportConfig =
            toml::from_str(BUILTIN_REPORT).expect("built-in report config parses");
        cfg.sanitized()
    }

    /// Parse a TOML document and deep-merge it over the built-in defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let over: toml::Table = toml::from_str(s).context("parsing report config TOML")?;
        Self::merged(over)
    }

    /// Same as [`from_toml_str`](Self::from_toml_str) for a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let over: toml::Table = serde_json::from_str(s).context("parsing report config JSON")?;
        Self::merged(over)
    }

    fn merged(over: toml::Table) -> Result<Self> {
        let mut base: toml::Table =
            toml::from_str(BUILTIN_REPORT).context("parsing built-in report config")?;
        merge_tables(&mut base, over);
        let cfg: ReportConfig = toml::Value::Table(base)
            .try_into()
            .context("report config has invalid shape")?;
        Ok(cfg.sanitized().with_env_overrides())
    }

    /// Load from an explicit path; format is chosen by extension (TOML unless `.json`).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading report config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if ext == "json" {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Env var + fallbacks, ending with the built-in defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in ["config/report.toml", "config/report.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::builtin().with_env_overrides())
    }

    fn sanitized(mut self) -> Self {
        self.regime = self.regime.sanitized();
        if self.calendar.max_items == 0 {
            tracing::warn!("calendar.max_items is 0; using 14");
            self.calendar.max_items = 14;
        }
        let sim = self.calendar.near_duplicate_similarity;
        if !(sim.is_finite() && (0.0..=1.0).contains(&sim)) {
            tracing::warn!(value = sim, "calendar.near_duplicate_similarity out of range; using 0.9");
            self.calendar.near_duplicate_similarity = 0.9;
        }
        if !(-12..=14).contains(&self.locale.utc_offset_hours) {
            tracing::warn!(value = self.locale.utc_offset_hours, "locale.utc_offset_hours out of range; using 9");
            self.locale.utc_offset_hours = 9;
        }
        // Longest suffix first so "要注意か" is tried before "注意か".
        self.text
            .title_recall
            .sort_by(|a, b| b.suffix.chars().count().cmp(&a.suffix.chars().count()));
        self
    }

    fn with_env_overrides(mut self) -> Self {
        self.regime = self.regime.with_env_override().sanitized();
        self
    }

    /// Find an instrument by key (`USDJPY`) or display name (`ドル円`).
    pub fn instrument(&self, name: &str) -> Option<&Instrument> {
        let needle = name.trim();
        self.instruments
            .iter()
            .find(|i| i.key.eq_ignore_ascii_case(needle) || i.display == needle)
    }

    pub fn local_offset(&self) -> chrono::FixedOffset {
        // Range-checked in `sanitized`.
        chrono::FixedOffset::east_opt(self.locale.utc_offset_hours * 3600)
            .unwrap_or_else(|| chrono::FixedOffset::east_opt(9 * 3600).expect("valid offset"))
    }
}

/// Recursive merge: tables merge key by key, everything else is replaced.
fn merge_tables(base: &mut toml::Table, over: toml::Table) {
    for (k, v) in over {
        match (base.get_mut(&k), v) {
            (Some(toml::Value::Table(b)), toml::Value::Table(o)) => merge_tables(b, o),
            (_, v) => {
                base.insert(k, v);
            }
        }
    }
}
