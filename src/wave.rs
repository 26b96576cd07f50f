//! Advisory wave-structure annotation from pivot slopes.
//!
//! A coarse impulse/correction guess attached to reported results for
//! context. It never feeds the confluence score, and when the pivot
//! structure is too thin to read it stays an explicit low-confidence
//! [`WaveHint::Indeterminate`] rather than defaulting silently.

use crate::{pivots::PivotSet, Direction, WaveHint};

/// Compare the last two price-high and price-low pivots against the setup
/// direction: structure trending with the setup reads as an impulse, mixed
/// or opposing structure as a correction.
pub fn suggest_wave(pivots: &PivotSet, direction: Direction) -> WaveHint {
    let [.., high_a, high_b] = pivots.price_highs[..] else {
        return WaveHint::Indeterminate;
    };
    let [.., low_a, low_b] = pivots.price_lows[..] else {
        return WaveHint::Indeterminate;
    };

    let higher_highs = high_b.value > high_a.value;
    let higher_lows = low_b.value > low_a.value;

    match direction {
        Direction::Bullish => {
            if higher_highs && higher_lows {
                WaveHint::Impulse
            } else if higher_highs || higher_lows {
                WaveHint::Correction
            } else {
                WaveHint::Indeterminate
            }
        }
        Direction::Bearish => {
            if !higher_highs && !higher_lows {
                WaveHint::Impulse
            } else if !higher_highs || !higher_lows {
                WaveHint::Correction
            } else {
                WaveHint::Indeterminate
            }
        }
    }
}

// ============================================================
// TESTS
// ============================================================
