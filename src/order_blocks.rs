//! Order-block detection: a candle whose body opposes the breakout that
//! immediately follows it, treated as a supply/demand zone for later retests.
//!
//! Flags are recorded at the *origin* bar (the bar preceding the breakout),
//! so zone boundaries can be read straight from the flagged candle.

use crate::{Direction, Series};

/// Per-bar origin flags, aligned to the source series index
#[derive(Debug, Clone)]
pub struct OrderBlocks {
    pub bullish: Vec<bool>,
    pub bearish: Vec<bool>,
}

impl OrderBlocks {
    /// For every bar after the first: bar `i - 1` is a bullish block origin
    /// when its body is bearish and `close[i]` breaks above `high[i - 1]`;
    /// symmetric for bearish blocks.
    pub fn detect(series: &Series) -> Self {
        let n = series.len();
        let mut bullish = vec![false; n];
        let mut bearish = vec![false; n];

        for i in 1..n {
            let origin = &series[i - 1];
            let breakout = &series[i];
            if origin.is_bearish() && breakout.close > origin.high {
                bullish[i - 1] = true;
            }
            if origin.is_bullish() && breakout.close < origin.low {
                bearish[i - 1] = true;
            }
        }

        Self { bullish, bearish }
    }

    /// Most recent block origin of `direction` at index <= `index`
    pub fn last_at_or_before(&self, index: usize, direction: Direction) -> Option<usize> {
        let flags = match direction {
            Direction::Bullish => &self.bullish,
            Direction::Bearish => &self.bearish,
        };
        flags
            .iter()
            .take(index.saturating_add(1).min(flags.len()))
            .rposition(|&f| f)
    }

    /// Most recent block origin of `direction` strictly before `index`.
    /// A zone whose breakout bar is `index` itself is not retestable yet.
    pub fn last_before(&self, index: usize, direction: Direction) -> Option<usize> {
        index
            .checked_sub(1)
            .and_then(|i| self.last_at_or_before(i, direction))
    }
}

// ============================================================
// TESTS
// ============================================================
