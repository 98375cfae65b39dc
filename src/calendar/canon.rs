// src/calendar/canon.rs
//! Region, name and category canonicalization for calendar records.

use crate::config::CalendarConfig;
use once_cell::sync::OnceCell;
use regex::Regex;

/// Feed text → single-line plain text (entities decoded, tags stripped, whitespace collapsed).
/// Sentence stops become spaces so a label never ends the calendar sentence early.
pub fn clean_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));

    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags.replace_all(&decoded, "");
    let spaced = stripped.replace(['\u{3000}', '。', '．'], " ");
    re_ws.replace_all(&spaced, " ").trim().to_string()
}

/// Country name / ISO-3 / currency code → two-letter region code.
/// Unknown values fall back to their first two letters, uppercased.
pub fn canonical_region(raw: &str, cfg: &CalendarConfig) -> String {
    let key: String = raw.trim().replace('.', "").to_uppercase();
    if key.is_empty() {
        return String::new();
    }
    if let Some(code) = cfg.country_regions.get(&key) {
        return code.clone();
    }
    if let Some((_, code)) = cfg
        .country_regions
        .iter()
        .find(|(k, _)| k.to_uppercase() == key)
    {
        return code.clone();
    }
    if cfg.region_prefixes.contains_key(&key) || cfg.region_weights.contains_key(&key) {
        return key;
    }
    key.chars().take(2).collect()
}

/// Remove every leading `{prefix}・` token (a doubled prefix is removed twice).
pub fn strip_region_prefix<'a>(name: &'a str, cfg: &CalendarConfig) -> &'a str {
    let mut prefixes: Vec<&str> = cfg.region_prefixes.values().map(String::as_str).collect();
    prefixes.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));

    let mut rest = name.trim_start();
    loop {
        let stripped = prefixes.iter().find_map(|p| {
            rest.strip_prefix(p)
                .and_then(|r| r.strip_prefix('・'))
                .map(str::trim_start)
        });
        match stripped {
            Some(r) => rest = r,
            None => return rest,
        }
    }
}

/// Apply the alias tables to an unprefixed name.
fn alias_name(name: &str, cfg: &CalendarConfig) -> String {
    if let Some(a) = cfg.name_aliases.get(name) {
        return a.clone();
    }
    let lower = name.to_lowercase();
    if let Some((_, a)) = cfg
        .name_aliases
        .iter()
        .find(|(k, _)| k.to_lowercase() == lower)
    {
        return a.clone();
    }
    cfg.contains_aliases
        .iter()
        .find(|r| !r.pattern.is_empty() && lower.contains(&r.pattern.to_lowercase()))
        .map(|r| r.name.clone())
        .unwrap_or_else(|| name.to_string())
}

/// Display label: prefix stripped, alias applied, exactly one region prefix re-applied.
pub fn canonical_name(raw: &str, region: &str, cfg: &CalendarConfig) -> String {
    let cleaned = clean_text(raw);
    let base = alias_name(strip_region_prefix(&cleaned, cfg), cfg);
    // An alias target may itself carry a prefix.
    let base = strip_region_prefix(&base, cfg).to_string();
    match cfg.region_prefixes.get(region) {
        Some(p) if !base.is_empty() => format!("{p}・{base}"),
        _ => base,
    }
}

/// Alias table, then the known category set, then keyword rules over category + name.
pub fn canonical_category(raw: &str, name: &str, cfg: &CalendarConfig) -> String {
    let cat = clean_text(raw);
    let lower = cat.to_lowercase();
    if !lower.is_empty() {
        if let Some((_, c)) = cfg
            .category_aliases
            .iter()
            .find(|(k, _)| k.to_lowercase() == lower)
        {
            return c.clone();
        }
        if cfg.category_weights.contains_key(&cat) {
            return cat;
        }
    }
    let hay = format!("{lower} {}", name.to_lowercase());
    cfg.category_keywords
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| hay.contains(&k.to_lowercase())))
        .map(|rule| rule.category.clone())
        .unwrap_or(cat)
}

/// Comparison form of a label: no prefix, no whitespace, lowercase, unified variants.
pub fn dedup_label(label: &str, cfg: &CalendarConfig) -> String {
    let s = strip_region_prefix(label, cfg)
        .replace("ミシガン大学", "ミシガン大")
        .replace('（', "(")
        .replace('）', ")");
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;

    fn cfg() -> CalendarConfig {
        ReportConfig::builtin().calendar
    }

    #[test]
    fn regions_from_names_codes_and_fallback() {
        let c = cfg();
        assert_eq!(canonical_region("United States", &c), "US");
        assert_eq!(canonical_region("euro area", &c), "EU");
        assert_eq!(canonical_region("GBR", &c), "UK");
        assert_eq!(canonical_region("JP", &c), "JP");
        assert_eq!(canonical_region("Mexico", &c), "ME");
        assert_eq!(canonical_region("", &c), "");
    }

    #[test]
    fn sentence_stops_in_labels_become_spaces() {
        assert_eq!(clean_text("家計調査。速報"), "家計調査 速報");
        assert_eq!(clean_text("<b>CPI</b>．　速報。"), "CPI 速報");
    }

    #[test]
    fn name_gets_exactly_one_prefix() {
        let c = cfg();
        assert_eq!(canonical_name("米・米・ 失業率", "US", &c), "米・失業率");
        assert_eq!(canonical_name("Unemployment Rate", "US", &c), "米・失業率");
        assert_eq!(
            canonical_name("UoM Michigan Consumer Sentiment Prel", "US", &c),
            "米・ミシガン大学消費者信頼感指数"
        );
        assert_eq!(canonical_name("Retail Sales &amp; Co", "MX", &c), "Retail Sales & Co");
    }

    #[test]
    fn categories_alias_then_keywords() {
        let c = cfg();
        assert_eq!(canonical_category("Employment", "", &c), "雇用");
        assert_eq!(canonical_category("", "Core CPI MoM", &c), "インフレ");
        assert_eq!(canonical_category("", "MBA Mortgage Applications", &c), "住宅");
        assert_eq!(canonical_category("住宅", "x", &c), "住宅");
        assert_eq!(canonical_category("Auctions", "10-Year Note Auction", &c), "Auctions");
    }
}
