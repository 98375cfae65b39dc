// src/regime.rs
//! # Regime Classifier
//! Labels the latest bar TrendUp / TrendDown / Range from an [`IndicatorFrame`].
//! Anything that does not clearly qualify as a trend is Range.

use crate::indicators::IndicatorFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENV_ADX_TREND: &str = "MARKET_BRIEF_ADX_TREND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendUp,
    TrendDown,
    Range,
}

impl Regime {
    /// Key used for phrase-bank categories (`commentary.trend_up`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Regime::TrendUp => "trend_up",
            Regime::TrendDown => "trend_down",
            Regime::Range => "range",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Why a Range label was given (diagnostics only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeBasis {
    Trend,
    Compressed,
    Default,
    Insufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub regime: Regime,
    pub basis: RegimeBasis,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    pub adx_trend: f64,
    pub bb_range_max: f64,
    pub slope_ema200_min: f64,
    pub slope_sma20_abs_max: f64,
    pub ema200_slope_lookback: usize,
    pub sma20_slope_lookback: usize,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            adx_trend: 22.0,
            bb_range_max: 0.012,
            slope_ema200_min: 0.0,
            slope_sma20_abs_max: 0.0006,
            ema200_slope_lookback: 20,
            sma20_slope_lookback: 10,
        }
    }
}

impl RegimeThresholds {
    /// Replace non-finite/negative values and zero lookbacks with defaults.
    /// Each replacement is logged, never raised.
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let fix = |name: &'static str, v: f64, dv: f64| -> f64 {
            if v.is_finite() && v >= 0.0 {
                v
            } else {
                tracing::warn!(threshold = name, value = v, default = dv, "threshold misconfigured; using default");
                dv
            }
        };
        let fix_n = |name: &'static str, v: usize, dv: usize| -> usize {
            if v >= 2 {
                v
            } else {
                tracing::warn!(threshold = name, value = v, default = dv, "threshold misconfigured; using default");
                dv
            }
        };
        Self {
            adx_trend: fix("adx_trend", self.adx_trend, d.adx_trend),
            bb_range_max: fix("bb_range_max", self.bb_range_max, d.bb_range_max),
            slope_ema200_min: fix("slope_ema200_min", self.slope_ema200_min, d.slope_ema200_min),
            slope_sma20_abs_max: fix(
                "slope_sma20_abs_max",
                self.slope_sma20_abs_max,
                d.slope_sma20_abs_max,
            ),
            ema200_slope_lookback: fix_n(
                "ema200_slope_lookback",
                self.ema200_slope_lookback,
                d.ema200_slope_lookback,
            ),
            sma20_slope_lookback: fix_n(
                "sma20_slope_lookback",
                self.sma20_slope_lookback,
                d.sma20_slope_lookback,
            ),
        }
    }

    /// `MARKET_BRIEF_ADX_TREND` wins over the configured value when it parses.
    pub fn with_env_override(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_ADX_TREND) {
            match raw.trim().parse::<f64>() {
                Ok(v) => self.adx_trend = v,
                Err(_) => tracing::warn!(value = %raw, "ignoring unparsable {}", ENV_ADX_TREND),
            }
        }
        self
    }
}

/// Snapshot of the latest row plus derived slopes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegimeMetrics {
    pub close: f64,
    pub ema200: f64,
    pub ema200_slope: f64,
    pub sma20: f64,
    pub sma20_slope: f64,
    pub bb_width_ratio: f64,
    pub adx: f64,
    pub atr_pct: f64,
    pub rsi: f64,
    pub warm: bool,
}

/// Relative change over `lookback` points ending at the last element.
fn slope(values: &[f64], lookback: usize) -> f64 {
    if lookback < 2 || values.len() < lookback {
        return 0.0;
    }
    let last = values[values.len() - 1];
    let base = values[values.len() - lookback];
    if base.abs() < f64::EPSILON || !base.is_finite() {
        0.0
    } else {
        (last - base) / base
    }
}

impl RegimeMetrics {
    pub fn from_frame(frame: &IndicatorFrame, th: &RegimeThresholds) -> Option<Self> {
        let i = frame.last_index()?;
        let mid = frame.bb_middle[i];
        let bb_width_ratio = if mid.abs() < f64::EPSILON {
            0.0
        } else {
            (frame.bb_upper[i] - frame.bb_lower[i]) / mid
        };
        let close = frame.close[i];
        let atr_pct = if close.abs() < f64::EPSILON {
            0.0
        } else {
            frame.atr14[i] / close
        };
        Some(Self {
            close,
            ema200: frame.ema200[i],
            ema200_slope: slope(&frame.ema200, th.ema200_slope_lookback),
            sma20: frame.sma20[i],
            sma20_slope: slope(&frame.sma20, th.sma20_slope_lookback),
            bb_width_ratio,
            adx: frame.adx14[i],
            atr_pct,
            rsi: frame.rsi14[i],
            warm: frame.is_warm(i),
        })
    }
}

pub fn classify(m: &RegimeMetrics, th: &RegimeThresholds) -> Classification {
    if !m.warm {
        return Classification {
            regime: Regime::Range,
            basis: RegimeBasis::Insufficient,
        };
    }
    let trending = m.adx >= th.adx_trend;
    if trending && m.close >= m.ema200 && m.ema200_slope > th.slope_ema200_min {
        return Classification {
            regime: Regime::TrendUp,
            basis: RegimeBasis::Trend,
        };
    }
    if trending && m.close <= m.ema200 && m.ema200_slope < -th.slope_ema200_min {
        return Classification {
            regime: Regime::TrendDown,
            basis: RegimeBasis::Trend,
        };
    }
    let basis = if m.bb_width_ratio <= th.bb_range_max && m.sma20_slope.abs() <= th.slope_sma20_abs_max {
        RegimeBasis::Compressed
    } else {
        RegimeBasis::Default
    };
    Classification {
        regime: Regime::Range,
        basis,
    }
}

/// Frame → metrics → label in one step. `None` when the frame is empty.
pub fn classify_frame(frame: &IndicatorFrame, th: &RegimeThresholds) -> Option<(Classification, RegimeMetrics)> {
    let m = RegimeMetrics::from_frame(frame, th)?;
    Some((classify(&m, th), m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(adx: f64, close: f64, ema200: f64, slope: f64) -> RegimeMetrics {
        RegimeMetrics {
            close,
            ema200,
            ema200_slope: slope,
            sma20: close,
            sma20_slope: 0.0,
            bb_width_ratio: 0.02,
            adx,
            atr_pct: 0.001,
            rsi: 50.0,
            warm: true,
        }
    }

    #[test]
    fn trend_needs_strength_side_and_slope() {
        let th = RegimeThresholds::default();
        assert_eq!(classify(&metrics(30.0, 101.0, 100.0, 0.001), &th).regime, Regime::TrendUp);
        assert_eq!(classify(&metrics(30.0, 99.0, 100.0, -0.001), &th).regime, Regime::TrendDown);
        // Strong but slope disagrees with side → under-claim.
        let c = classify(&metrics(30.0, 101.0, 100.0, -0.001), &th);
        assert_eq!((c.regime, c.basis), (Regime::Range, RegimeBasis::Default));
        // Weak ADX.
        assert_eq!(classify(&metrics(21.9, 101.0, 100.0, 0.01), &th).regime, Regime::Range);
    }

    #[test]
    fn cold_frame_is_range() {
        let mut m = metrics(40.0, 101.0, 100.0, 0.01);
        m.warm = false;
        assert_eq!(classify(&m, &RegimeThresholds::default()).basis, RegimeBasis::Insufficient);
    }

    #[test]
    fn sanitized_replaces_bad_values() {
        let th = RegimeThresholds {
            adx_trend: f64::NAN,
            bb_range_max: -1.0,
            sma20_slope_lookback: 0,
            ..RegimeThresholds::default()
        }
        .sanitized();
        assert_eq!(th, RegimeThresholds::default());
    }
}
