// src/indicators.rs
//! # Indicator Engine
//! Pure functions over a [`Series`]; every output is index-aligned with its input.
//!
//! SMA and Bollinger bands use a warm-up mean over however many samples exist,
//! so arrays are always fully defined. Smoothers are seeded from the first value.

use crate::series::{Bar, Series};

pub const SMA_FAST: usize = 20;
pub const SMA_SLOW: usize = 200;
pub const EMA_TREND: usize = 200;
pub const BB_PERIOD: usize = 20;
pub const BB_K: f64 = 2.0;
pub const RSI_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;

/// Simple moving average; the first `n - 1` points average the samples seen so far.
pub fn sma(values: &[f64], n: usize) -> Vec<f64> {
    let n = n.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= n {
            sum -= values[i - n];
        }
        let count = (i + 1).min(n);
        out.push(sum / count as f64);
    }
    out
}

/// Recursive smoother `y[i] = y[i-1] + alpha * (x[i] - y[i-1])`, seeded with `x[0]`.
pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => p + alpha * (v - p),
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Exponential moving average by span (`alpha = 2 / (span + 1)`).
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    ewm(values, 2.0 / (span.max(1) as f64 + 1.0))
}

/// Wilder smoothing (`alpha = 1 / n`).
pub fn wilder(values: &[f64], n: usize) -> Vec<f64> {
    ewm(values, 1.0 / n.max(1) as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger bands with population standard deviation (denominator = window size).
pub fn bollinger(values: &[f64], n: usize, k: f64) -> Bands {
    let n = n.max(1);
    let middle = sma(values, n);
    let mut upper = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let from = (i + 1).saturating_sub(n);
        let window = &values[from..=i];
        let mean = middle[i];
        let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window.len() as f64;
        let sd = var.max(0.0).sqrt();
        upper.push(mean + k * sd);
        lower.push(mean - k * sd);
    }
    Bands {
        upper,
        middle,
        lower,
    }
}

/// True range; the first bar has no previous close and uses `high - low`.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, b)| {
            let hl = b.high - b.low;
            match i.checked_sub(1).map(|j| bars[j].close) {
                Some(pc) => hl.max((b.high - pc).abs()).max((b.low - pc).abs()),
                None => hl,
            }
        })
        .collect()
}

pub fn atr(bars: &[Bar], n: usize) -> Vec<f64> {
    wilder(&true_range(bars), n)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den.abs() < f64::EPSILON || !den.is_finite() {
        0.0
    } else {
        num / den
    }
}

/// Average directional index with Wilder smoothing throughout.
pub fn adx(bars: &[Bar], n: usize) -> AdxResult {
    let len = bars.len();
    let mut plus_dm = vec![0.0; len];
    let mut minus_dm = vec![0.0; len];
    for i in 1..len {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let atr = atr(bars, n);
    let plus_s = wilder(&plus_dm, n);
    let minus_s = wilder(&minus_dm, n);

    let plus_di: Vec<f64> = (0..len).map(|i| 100.0 * safe_div(plus_s[i], atr[i])).collect();
    let minus_di: Vec<f64> = (0..len).map(|i| 100.0 * safe_div(minus_s[i], atr[i])).collect();
    let dx: Vec<f64> = (0..len)
        .map(|i| {
            100.0 * safe_div((plus_di[i] - minus_di[i]).abs(), plus_di[i] + minus_di[i])
        })
        .collect();

    AdxResult {
        adx: wilder(&dx, n),
        plus_di,
        minus_di,
    }
}

/// Relative strength index, clipped to `[0, 100]`. The first point is neutral (50).
pub fn rsi(values: &[f64], n: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut gains = Vec::with_capacity(values.len() - 1);
    let mut losses = Vec::with_capacity(values.len() - 1);
    for w in values.windows(2) {
        let d = w[1] - w[0];
        gains.push(d.max(0.0));
        losses.push((-d).max(0.0));
    }
    let avg_gain = wilder(&gains, n);
    let avg_loss = wilder(&losses, n);

    let mut out = Vec::with_capacity(values.len());
    out.push(50.0);
    for (g, l) in avg_gain.into_iter().zip(avg_loss) {
        let v = if l <= 0.0 {
            if g <= 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            100.0 - 100.0 / (1.0 + g / l)
        };
        out.push(if v.is_finite() { v.clamp(0.0, 100.0) } else { 50.0 });
    }
    out
}

/// Parallel indicator arrays for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub close: Vec<f64>,
    pub sma20: Vec<f64>,
    pub sma200: Vec<f64>,
    pub ema200: Vec<f64>,
    pub bb_upper: Vec<f64>,
    pub bb_middle: Vec<f64>,
    pub bb_lower: Vec<f64>,
    pub rsi14: Vec<f64>,
    pub adx14: Vec<f64>,
    pub atr14: Vec<f64>,
}

impl IndicatorFrame {
    pub fn compute(series: &Series) -> Self {
        let close = series.closes();
        let bands = bollinger(&close, BB_PERIOD, BB_K);
        Self {
            sma20: sma(&close, SMA_FAST),
            sma200: sma(&close, SMA_SLOW),
            ema200: ema(&close, EMA_TREND),
            bb_upper: bands.upper,
            bb_middle: bands.middle,
            bb_lower: bands.lower,
            rsi14: rsi(&close, RSI_PERIOD),
            adx14: adx(series.bars(), ADX_PERIOD).adx,
            atr14: atr(series.bars(), ADX_PERIOD),
            close,
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// ADX needs roughly two smoothing periods before it means anything.
    pub fn is_warm(&self, idx: usize) -> bool {
        idx + 1 >= 2 * ADX_PERIOD && idx < self.len()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }
}
