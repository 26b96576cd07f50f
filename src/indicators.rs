//! Indicator engine: moving averages, RSI, ATR and Bollinger-band width.
//!
//! Every function returns a series aligned to its input, with `f64::NAN`
//! before the indicator has accumulated a full window. Exponential averages
//! are seeded with the simple mean of the first window; RSI and ATR use the
//! Wilder smoothing convention.

use crate::{Period, Result, ScanError, Series};

// ============================================================
// PARAMETERS
// ============================================================

/// Lookback lengths for everything the scorer consumes
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndicatorParams {
    /// Slow trend average (close vs this decides trend eligibility)
    pub trend_len: Period,
    /// Fast average used for the correlation filter and the intraday trigger
    pub fast_len: Period,
    pub rsi_len: Period,
    pub atr_len: Period,
    /// Rolling volume mean used by the volume confirmation checks
    pub volume_len: Period,
    /// Rolling-low window defining the spring's support range
    pub range_len: Period,
    pub bb_len: Period,
    pub bb_mult: f64,
    /// Smoothing window applied to the band width for regime detection
    pub bb_ma_len: Period,
    /// Minimum separation between pivots of the same kind, in bars
    pub pivot_distance: Period,
    /// Bars a divergence stays active after detection
    pub divergence_window: Period,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            trend_len: Period::new_const(200),
            fast_len: Period::new_const(21),
            rsi_len: Period::new_const(14),
            atr_len: Period::new_const(14),
            volume_len: Period::new_const(20),
            range_len: Period::new_const(30),
            bb_len: Period::new_const(20),
            bb_mult: 2.0,
            bb_ma_len: Period::new_const(20),
            pivot_distance: Period::new_const(10),
            divergence_window: Period::new_const(10),
        }
    }
}

impl IndicatorParams {
    pub fn validate(&self) -> Result<()> {
        if !self.bb_mult.is_finite() || self.bb_mult <= 0.0 {
            return Err(ScanError::InvalidValue("bb_mult must be finite and > 0"));
        }
        Ok(())
    }
}

// ============================================================
// PRIMITIVES
// ============================================================

/// Exponential moving average, factor `2 / (len + 1)`, seeded with the SMA
/// of the first `len` values. NaN for indices `< len - 1`.
pub fn ema(values: &[f64], len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < len {
        return out;
    }

    let k = 2.0 / (len as f64 + 1.0);
    let seed: f64 = values[..len].iter().sum::<f64>() / len as f64;
    out[len - 1] = seed;
    for i in len..values.len() {
        out[i] = values[i] * k + out[i - 1] * (1.0 - k);
    }
    out
}

/// Relative Strength Index with Wilder smoothing. NaN for indices `< len`.
///
/// The initial average gain/loss is the simple mean of the first `len`
/// changes; subsequent bars use `avg = (avg * (len - 1) + x) / len`.
pub fn rsi(values: &[f64], len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < len + 1 {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=len {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= len as f64;
    avg_loss /= len as f64;
    out[len] = rsi_value(avg_gain, avg_loss);

    for i in (len + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (len as f64 - 1.0) + gain) / len as f64;
        avg_loss = (avg_loss * (len as f64 - 1.0) + loss) / len as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let total = avg_gain + avg_loss;
    if total <= 0.0 {
        // Flat window: no momentum either way
        50.0
    } else {
        100.0 * avg_gain / total
    }
}

/// Average True Range, Wilder-smoothed, seeded with the simple mean of the
/// first `len` true ranges. NaN for indices `< len - 1`.
pub fn atr(series: &Series, len: usize) -> Vec<f64> {
    let n = series.len();
    let mut out = vec![f64::NAN; n];
    if n < len {
        return out;
    }

    let tr: Vec<f64> = (0..n)
        .map(|i| {
            let c = &series[i];
            if i == 0 {
                c.range()
            } else {
                let prev_close = series[i - 1].close;
                c.range()
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs())
            }
        })
        .collect();

    let seed: f64 = tr[..len].iter().sum::<f64>() / len as f64;
    out[len - 1] = seed;
    for i in len..n {
        out[i] = (out[i - 1] * (len as f64 - 1.0) + tr[i]) / len as f64;
    }
    out
}

/// Simple rolling mean over a full window. NaN for indices `< len - 1` and
/// for any window still containing undefined input (e.g. the width series'
/// own warmup prefix).
pub fn rolling_mean(values: &[f64], len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < len {
        return out;
    }
    for i in (len - 1)..values.len() {
        let window = &values[i + 1 - len..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().sum::<f64>() / len as f64;
    }
    out
}

/// Rolling minimum over a full window. NaN for indices `< len - 1`.
pub fn rolling_min(values: &[f64], len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < len {
        return out;
    }
    for i in (len - 1)..values.len() {
        let window = &values[i + 1 - len..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().copied().fold(f64::INFINITY, f64::min);
    }
    out
}

/// Bollinger-band width `(upper - lower) / middle` using the population
/// standard deviation. NaN before a full window and when the middle band is
/// degenerate (~0), in which case the volatility regime cannot be read.
pub fn bollinger_width(values: &[f64], len: usize, mult: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < len {
        return out;
    }
    for i in (len - 1)..values.len() {
        let window = &values[i + 1 - len..=i];
        let mean = window.iter().sum::<f64>() / len as f64;
        if mean.abs() <= f64::EPSILON {
            continue;
        }
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len as f64;
        let sd = var.sqrt();
        out[i] = 2.0 * mult * sd / mean;
    }
    out
}

// ============================================================
// BUNDLE
// ============================================================

/// All daily-timeframe indicator series the setup scorer reads, aligned to
/// the source series index.
#[derive(Debug, Clone)]
pub struct Indicators {
    pub trend_ema: Vec<f64>,
    pub rsi: Vec<f64>,
    pub atr: Vec<f64>,
    pub volume_ma: Vec<f64>,
    pub range_low: Vec<f64>,
    pub bb_width: Vec<f64>,
    pub bb_width_ma: Vec<f64>,
}

impl Indicators {
    /// Compute the full bundle, refusing series shorter than `min_bars`
    /// rather than handing back silently-partial data.
    pub fn compute(series: &Series, params: &IndicatorParams, min_bars: usize) -> Result<Self> {
        params.validate()?;
        if series.len() < min_bars {
            return Err(ScanError::InsufficientHistory {
                need: min_bars,
                got: series.len(),
            });
        }

        let closes = series.closes();
        let lows = series.lows();
        let volumes = series.volumes();

        let bb_width = bollinger_width(&closes, params.bb_len.get(), params.bb_mult);
        let bb_width_ma = rolling_mean(&bb_width, params.bb_ma_len.get());

        Ok(Self {
            trend_ema: ema(&closes, params.trend_len.get()),
            rsi: rsi(&closes, params.rsi_len.get()),
            atr: atr(series, params.atr_len.get()),
            volume_ma: rolling_mean(&volumes, params.volume_len.get()),
            range_low: rolling_min(&lows, params.range_len.get()),
            bb_width,
            bb_width_ma,
        })
    }
}

// ============================================================
// TESTS
// ============================================================
