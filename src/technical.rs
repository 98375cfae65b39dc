// src/technical.rs
//! Technical paragraph seed: computed metrics → regime template, or the
//! instrument's static template when there is no data.

use crate::config::Instrument;
use crate::indicators::IndicatorFrame;
use crate::phrase::PhraseBank;
use crate::regime::{classify_frame, Classification, Regime, RegimeMetrics, RegimeThresholds};
use crate::series::Normalized;
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedOrigin {
    Live,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalSeed {
    pub text: String,
    pub origin: SeedOrigin,
    pub classification: Option<Classification>,
    pub metrics: Option<RegimeMetrics>,
}

impl TechnicalSeed {
    pub fn regime(&self) -> Option<Regime> {
        self.classification.map(|c| c.regime)
    }

    /// Static, already-approved template. Used whenever bars are unavailable.
    pub fn fallback(instrument: &Instrument) -> Self {
        Self {
            text: instrument.fallback_paragraph(),
            origin: SeedOrigin::Fallback,
            classification: None,
            metrics: None,
        }
    }
}

/// Build the seed from the hourly series. `NoData` is a normal input.
pub fn build_seed(
    instrument: &Instrument,
    hourly: &Normalized,
    thresholds: &RegimeThresholds,
    bank: &PhraseBank,
    date_key: &str,
) -> TechnicalSeed {
    let Some(series) = hourly.series() else {
        if let Normalized::NoData(reason) = hourly {
            tracing::info!(instrument = %instrument.key, %reason, "no bars; using static technical template");
        }
        return TechnicalSeed::fallback(instrument);
    };

    let frame = IndicatorFrame::compute(series);
    let Some((classification, m)) = classify_frame(&frame, thresholds) else {
        return TechnicalSeed::fallback(instrument);
    };

    let mut text = live_text(instrument, &m, classification.regime);
    let commentary_cat = format!("commentary.{}", classification.regime.key());
    if let Some(c) = bank.select(&commentary_cat, &instrument.key, date_key) {
        text.push_str(c);
    }

    tracing::debug!(
        instrument = %instrument.key,
        regime = %classification.regime,
        basis = ?classification.basis,
        adx = m.adx,
        bb_width = m.bb_width_ratio,
        "technical seed from live metrics"
    );

    TechnicalSeed {
        text,
        origin: SeedOrigin::Live,
        classification: Some(classification),
        metrics: Some(m),
    }
}

fn live_text(inst: &Instrument, m: &RegimeMetrics, regime: Regime) -> String {
    let mk = &inst.market;
    let pair = &inst.display;
    match regime {
        Regime::TrendUp => format!(
            "{mk}は、{pair}は1時間足ではADXが{:.1}、終値がEMA200上に位置し、\
             EMA200の傾きも上向きで上昇トレンドが意識されやすい。\
             4時間足では20SMAやBB±2σ付近の押し目・戻り目が手掛かりとなり、\
             日足では200SMA/EMAと20SMAの並びが上向きバイアスを示しやすい。",
            m.adx
        ),
        Regime::TrendDown => format!(
            "{mk}は、{pair}は1時間足ではADXが{:.1}、終値がEMA200下に位置し、\
             EMA200の傾きも下向きで下降トレンドが意識されやすい。\
             4時間足では20SMAやBB±2σ付近での戻りの鈍さが意識されやすく、\
             日足では200SMA/EMAと20SMAの位置関係が下向きバイアスの目安となる。",
            m.adx
        ),
        Regime::Range => format!(
            "{mk}は、{pair}は1時間足でADXが{:.1}と低めで、BB幅{:.2}%も小さく、\
             短期20SMAの傾きも限定的でレンジ推移が意識されやすい。\
             4時間足ではBB±2σと20SMAの帯域が目先のレンジ境界となりやすく、\
             日足では200SMA/EMAと20SMAの位置関係を確認したい。",
            m.adx,
            m.bb_width_ratio * 100.0
        ),
    }
}

fn rep(s: &mut String, re: &Regex, to: &str) -> bool {
    let next = re.replace_all(s.as_str(), to).into_owned();
    let changed = next != *s;
    *s = next;
    changed
}

fn append_sentence(text: &str, sentence: &str) -> String {
    format!("{}。{}", text.trim_end().trim_end_matches('。'), sentence)
}

/// Align trend/range wording with the classified regime. Returns the notes of
/// every rewrite applied. Facts are never changed, only the framing.
pub fn enforce_regime_language(
    text: &str,
    regime: Regime,
    bank: &PhraseBank,
    subject: &str,
    date_key: &str,
) -> (String, Vec<&'static str>) {
    static RE_UP: OnceCell<Regex> = OnceCell::new();
    static RE_DOWN: OnceCell<Regex> = OnceCell::new();
    static RE_GENERIC: OnceCell<Regex> = OnceCell::new();
    static RE_RANGE_WORD: OnceCell<Regex> = OnceCell::new();
    static RE_RANGE_DRIFT: OnceCell<Regex> = OnceCell::new();
    let re_up = RE_UP.get_or_init(|| {
        Regex::new(r"上昇トレンド(?:が(?:続き|意識され)やすい|入り|基調)?").expect("trend-up regex")
    });
    let re_down = RE_DOWN.get_or_init(|| {
        Regex::new(r"下降トレンド(?:が(?:続き|意識され)やすい|入り|基調)?").expect("trend-down regex")
    });
    let re_generic =
        RE_GENERIC.get_or_init(|| Regex::new(r"(^|[^非])トレンドが出ている").expect("trend regex"));
    let re_range_word =
        RE_RANGE_WORD.get_or_init(|| Regex::new(r"(境界)?のレンジ(境界)?").expect("range regex"));
    let re_range_drift =
        RE_RANGE_DRIFT.get_or_init(|| Regex::new("レンジ推移").expect("range drift regex"));

    let mut s = text.to_string();
    let mut notes = Vec::new();
    let supplement = bank
        .select(&format!("regime.{}", regime.key()), subject, date_key)
        .map(str::to_string);

    match regime {
        Regime::Range => {
            if rep(&mut s, re_up, "上方向への明確なトレンドは確認しづらい") {
                notes.push("range: neutralized up-trend");
            }
            if rep(&mut s, re_down, "下方向への明確なトレンドは確認しづらい") {
                notes.push("range: neutralized down-trend");
            }
            if rep(&mut s, re_generic, "${1}方向性は限定的") {
                notes.push("range: neutralized generic trend");
            }
            if !s.contains("レンジ") && !s.contains("持ち合い") {
                if let Some(sent) = supplement {
                    s = append_sentence(&s, &sent);
                    notes.push("range: added range sentence");
                }
            }
        }
        Regime::TrendUp | Regime::TrendDown => {
            if rep(&mut s, re_range_drift, "方向性が出やすい地合い") {
                notes.push("trend: softened range drift");
            }
            let softened = re_range_word
                .replace_all(&s, |c: &Captures| {
                    if c.get(1).is_some() || c.get(2).is_some() {
                        c[0].to_string()
                    } else {
                        "の持ち合い帯域".to_string()
                    }
                })
                .into_owned();
            if softened != s {
                notes.push("trend: softened range word");
                s = softened;
            }
            let (a, b) = if regime == Regime::TrendUp {
                ("上向き", "上昇")
            } else {
                ("下向き", "下降")
            };
            if !s.contains(a) && !s.contains(b) {
                if let Some(sent) = supplement {
                    s = append_sentence(&s, &sent);
                    notes.push("trend: added bias sentence");
                }
            }
        }
    }
    (s, notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use crate::series::{normalize_bars, Bar, NoDataReason, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn usdjpy() -> Instrument {
        ReportConfig::builtin().instrument("USDJPY").unwrap().clone()
    }

    #[test]
    fn no_data_uses_static_template() {
        let seed = build_seed(
            &usdjpy(),
            &Normalized::NoData(NoDataReason::EmptyFeed),
            &RegimeThresholds::default(),
            &PhraseBank::builtin(),
            "2025-03-03",
        );
        assert_eq!(seed.origin, SeedOrigin::Fallback);
        assert!(seed.text.starts_with("為替市場は、ドル円は"));
        assert!(seed.regime().is_none());
    }

    #[test]
    fn rising_series_reads_as_trend_up() {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..300)
            .map(|i| {
                let c = 100.0 + i as f64 * 0.05;
                Bar {
                    ts: start + Duration::hours(i),
                    open: c - 0.03,
                    high: c + 0.02,
                    low: c - 0.05,
                    close: c,
                    volume: 0.0,
                }
            })
            .collect();
        let hourly = normalize_bars(bars, Timeframe::H1);
        let seed = build_seed(
            &usdjpy(),
            &hourly,
            &RegimeThresholds::default(),
            &PhraseBank::builtin(),
            "2025-03-03",
        );
        assert_eq!(seed.origin, SeedOrigin::Live);
        assert_eq!(seed.regime(), Some(Regime::TrendUp));
        assert!(seed.text.contains("ADXが"));
    }

    #[test]
    fn range_guard_neutralizes_trend_wording() {
        let bank = PhraseBank::builtin();
        let (s, notes) = enforce_regime_language(
            "ドル円は上昇トレンドが続きやすい。",
            Regime::Range,
            &bank,
            "USDJPY",
            "2025-03-03",
        );
        assert!(s.starts_with("ドル円は上方向への明確なトレンドは確認しづらい。"));
        assert!(s.contains("持ち合い"));
        assert_eq!(notes.len(), 2);

        let (t, _) = enforce_regime_language(
            "BB±2σがレンジ境界となり、20SMAのレンジ推移が続く。",
            Regime::TrendUp,
            &bank,
            "USDJPY",
            "2025-03-03",
        );
        assert!(t.contains("レンジ境界"));
        assert!(t.contains("方向性が出やすい地合い"));
        assert!(t.ends_with("上向きバイアスが意識されやすい。"));
    }
}
