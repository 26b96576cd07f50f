//! Divergence analysis: disagreement between sequential price pivots and the
//! oscillator pivots that bracket them, flagged as fixed-length "active"
//! windows over the bar index.
//!
//! The scan is strictly backward-looking: a flag at bar *t* depends only on
//! pivots at indices `<= t`. Active windows from separate detections overlap
//! by pointwise OR; a later detection never clears an earlier flag.

use crate::pivots::{Pivot, PivotSet};

/// Per-bar divergence-active flags, aligned to the source series index
#[derive(Debug, Clone)]
pub struct DivergenceFlags {
    pub bullish: Vec<bool>,
    pub bearish: Vec<bool>,
}

impl DivergenceFlags {
    pub fn detect(len: usize, pivots: &PivotSet, window: usize) -> Self {
        Self {
            bullish: bullish_active(len, &pivots.price_lows, &pivots.rsi_lows, window),
            bearish: bearish_active(len, &pivots.price_highs, &pivots.rsi_highs, window),
        }
    }
}

/// Bullish divergence: price makes a lower low while the oscillator's
/// bracketing lows make a higher low. Marks `window` bars active starting at
/// the detection point.
pub fn bullish_active(
    len: usize,
    price_lows: &[Pivot],
    osc_lows: &[Pivot],
    window: usize,
) -> Vec<bool> {
    let mut flags = vec![false; len];
    for pair in price_lows.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if curr.value >= prev.value {
            continue;
        }
        let Some(osc_before) = osc_lows.iter().rev().find(|p| p.index < curr.index) else {
            continue;
        };
        let Some(osc_at) = osc_lows.iter().find(|p| p.index >= curr.index) else {
            continue;
        };
        if osc_at.value > osc_before.value {
            mark(&mut flags, curr.index.max(osc_at.index), window);
        }
    }
    flags
}

/// Bearish divergence: price makes a higher high while the oscillator's
/// bracketing highs make a lower high.
pub fn bearish_active(
    len: usize,
    price_highs: &[Pivot],
    osc_highs: &[Pivot],
    window: usize,
) -> Vec<bool> {
    let mut flags = vec![false; len];
    for pair in price_highs.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if curr.value <= prev.value {
            continue;
        }
        let Some(osc_before) = osc_highs.iter().rev().find(|p| p.index < curr.index) else {
            continue;
        };
        let Some(osc_at) = osc_highs.iter().find(|p| p.index >= curr.index) else {
            continue;
        };
        if osc_at.value < osc_before.value {
            mark(&mut flags, curr.index.max(osc_at.index), window);
        }
    }
    flags
}

/// Flag `window` bars starting at `start`. The window opens at the later of
/// the price pivot and its confirming oscillator pivot so no bar is flagged
/// before both are known.
fn mark(flags: &mut [bool], start: usize, window: usize) {
    let end = start.saturating_add(window).min(flags.len());
    for flag in &mut flags[start..end] {
        *flag = true;
    }
}

// ============================================================
// TESTS
// ============================================================
