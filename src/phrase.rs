// src/phrase.rs
//! # Deterministic Phrase Selector
//! Picks among whitelisted sentence fragments with a stable keyed hash, so the
//! same (subject, date, category) always yields the same phrase while different
//! dates rotate through the list. Never returns anything outside the candidates.

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PHRASES_PATH: &str = "MARKET_BRIEF_PHRASES";
const BUILTIN_PHRASES: &str = include_str!("../config/defaults/phrases.toml");

pub const CAT_TITLE_TAIL: &str = "title_tail";
pub const CAT_CLOSER: &str = "closer";
pub const CAT_PARA1_FILLER: &str = "para1_filler";
pub const CAT_PARA2_FILLER: &str = "para2_filler";
pub const CAT_SAFE_FALLBACK: &str = "safe_fallback";

/// Last-resort sentence when the bank has no `safe_fallback` entry.
pub const SAFE_SENTENCE: &str = "市場の振れに留意したい。";

/// Every candidate was rejected (already used / duplicate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionExhausted {
    pub category: String,
}

impl fmt::Display for SelectionExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no unused candidate left in '{}'", self.category)
    }
}

impl std::error::Error for SelectionExhausted {}

/// First 8 bytes of SHA-256, big endian.
pub fn stable_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

/// Slot for `subject|date|category` in a list of `len` candidates.
///
/// ISO dates rotate one step per calendar day from a keyed offset, so `len`
/// consecutive dates cover the whole list. Other date keys hash the full key.
pub fn slot(category: &str, subject: &str, date: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let n = len as u64;
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(d) => {
            let base = stable_hash(&format!("{subject}|{category}")) % n;
            let day = d.num_days_from_ce().rem_euclid(len as i32) as u64;
            ((base + day) % n) as usize
        }
        Err(_) => (stable_hash(&format!("{subject}|{date}|{category}")) % n) as usize,
    }
}

/// Pure selection over caller-supplied candidates.
pub fn select<'a>(category: &str, subject: &str, date: &str, candidates: &'a [String]) -> Option<&'a str> {
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[slot(category, subject, date, candidates.len())].as_str())
}

/// Walk cyclically from the selected slot; first candidate not rejected wins.
pub fn select_excluding<'a, F>(
    category: &str,
    subject: &str,
    date: &str,
    candidates: &'a [String],
    mut reject: F,
) -> Result<&'a str, SelectionExhausted>
where
    F: FnMut(&str) -> bool,
{
    let len = candidates.len();
    let start = slot(category, subject, date, len);
    (0..len)
        .map(|k| candidates[(start + k) % len].as_str())
        .find(|c| !reject(*c))
        .ok_or_else(|| SelectionExhausted {
            category: category.to_string(),
        })
}

/// Category → ordered candidates. Immutable for one run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhraseBank {
    #[serde(default)]
    categories: BTreeMap<String, Vec<String>>,
}

impl Default for PhraseBank {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PhraseBank {
    pub fn builtin() -> Self {
        toml::from_str::<PhraseBank>(BUILTIN_PHRASES)
            .expect("built-in phrase bank parses")
            .cleaned()
    }

    pub fn from_categories(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self { categories }.cleaned()
    }

    /// User categories replace built-in categories of the same name.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let user: PhraseBank = toml::from_str(s).context("parsing phrase bank TOML")?;
        let mut bank = Self::builtin();
        for (k, v) in user.cleaned().categories {
            bank.categories.insert(k, v);
        }
        Ok(bank)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading phrase bank from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// `$MARKET_BRIEF_PHRASES` → `config/phrases.toml` → built-in.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PHRASES_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PHRASES_PATH} points to non-existent path"));
        }
        let pb = PathBuf::from("config/phrases.toml");
        if pb.exists() {
            return Self::load_from(&pb);
        }
        Ok(Self::builtin())
    }

    fn cleaned(mut self) -> Self {
        for list in self.categories.values_mut() {
            let mut seen = std::collections::HashSet::new();
            list.retain(|s| {
                let t = s.trim();
                !t.is_empty() && seen.insert(t.to_string())
            });
            for s in list.iter_mut() {
                *s = s.trim().to_string();
            }
        }
        self
    }

    pub fn get(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, category: &str, phrase: &str) -> bool {
        self.get(category).iter().any(|c| c == phrase)
    }

    pub fn select(&self, category: &str, subject: &str, date: &str) -> Option<&str> {
        select(category, subject, date, self.get(category))
    }

    /// The always-safe sentence: first `safe_fallback` entry or [`SAFE_SENTENCE`].
    pub fn safe_sentence(&self) -> &str {
        self.get(CAT_SAFE_FALLBACK)
            .first()
            .map(String::as_str)
            .unwrap_or(SAFE_SENTENCE)
    }

    /// Every phrase in the bank, for provenance checks.
    pub fn all_phrases(&self) -> impl Iterator<Item = &str> {
        self.categories.values().flatten().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{i}")).collect()
    }

    #[test]
    fn same_key_same_phrase() {
        let l = list(5);
        let a = select("closer", "USDJPY", "2025-03-03", &l);
        let b = select("closer", "USDJPY", "2025-03-03", &l);
        assert_eq!(a, b);
        assert!(a.is_some());
        assert_eq!(select("closer", "USDJPY", "2025-03-03", &[]), None);
    }

    #[test]
    fn consecutive_dates_visit_every_candidate() {
        let l = list(7);
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let seen: std::collections::HashSet<&str> = (0..7)
            .map(|d| {
                let date = (start + chrono::Duration::days(d)).format("%Y-%m-%d").to_string();
                select("closer", "GBPJPY", &date, &l).unwrap()
            })
            .collect();
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn excluding_walks_and_exhausts() {
        let l = list(3);
        let all = select_excluding("c", "s", "d", &l, |_| true);
        assert_eq!(all, Err(SelectionExhausted { category: "c".into() }));
        let first = select("c", "s", "d", &l).unwrap();
        let next = select_excluding("c", "s", "d", &l, |c| c == first).unwrap();
        assert_ne!(next, first);
        assert!(l.iter().any(|x| x == next));
    }

    #[test]
    fn builtin_bank_has_core_categories() {
        let bank = PhraseBank::builtin();
        assert!(!bank.get(CAT_CLOSER).is_empty());
        assert!(!bank.get(CAT_TITLE_TAIL).is_empty());
        assert_eq!(bank.safe_sentence(), SAFE_SENTENCE);
        assert!(bank.get("para2_filler.USDJPY").len() >= 1);
    }

    #[test]
    fn user_bank_replaces_categories() {
        let bank = PhraseBank::from_toml_str(
            r#"
[categories]
closer = ["行方を注視したい。", " ", "行方を注視したい。"]
"#,
        )
        .unwrap();
        assert_eq!(bank.get(CAT_CLOSER), &["行方を注視したい。".to_string()]);
        assert!(!bank.get(CAT_PARA1_FILLER).is_empty());
    }
}
