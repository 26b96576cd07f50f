//! Setup scoring: volatility/trend/correlation gates followed by the
//! structural checks (spring, liquidity sweep, order-block retest with
//! divergence), each matched check contributing one confluence point.
//!
//! Evaluation is anchored on the second-to-last fully closed bar (the
//! "reference bar") and the bar before it (the "prior bar"). Primary
//! candidate selection and confluence scoring are two separate steps: the
//! primary is simply the first match in the fixed check order, while the
//! score counts every match.

use crate::{
    divergence::DivergenceFlags,
    indicators::{IndicatorParams, Indicators},
    order_blocks::OrderBlocks,
    pivots::PivotSet,
    Direction, Series, SetupKind,
};

// ============================================================
// CONFIGURATION
// ============================================================

/// Gate and structural-check toggles. One scorer serves every variant
/// (daily-only, spring-only, full multi-timeframe) instead of parallel
/// near-duplicate implementations.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScorerConfig {
    /// Require Bollinger width below its own moving average (non-explosive
    /// regime) before any structural check runs
    pub volatility_gate: bool,
    /// Require close vs the slow average to agree with the setup direction
    pub trend_gate: bool,
    /// Require the reference asset's trend to agree with buy-side setups
    pub correlation_gate: bool,
    pub spring: bool,
    pub liquidity_sweep: bool,
    pub order_block: bool,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            volatility_gate: true,
            trend_gate: true,
            correlation_gate: true,
            spring: true,
            liquidity_sweep: true,
            order_block: true,
        }
    }
}

impl ScorerConfig {
    /// Minimum daily bars required before evaluation is attempted, derived
    /// from the enabled gates and checks (201 for the full default scorer,
    /// 33 for a gate-free spring-only variant).
    pub fn min_bars(&self, params: &IndicatorParams) -> usize {
        // Reference bar, prior bar and the last (still-forming) bar
        let mut need = 3;
        if self.trend_gate {
            need = need.max(params.trend_len.get() + 1);
        }
        if self.volatility_gate {
            need = need.max(params.bb_len.get() + params.bb_ma_len.get());
        }
        if self.spring {
            // Support window ends one bar before the prior bar
            need = need.max(params.range_len.get() + 3);
        }
        if self.spring || self.liquidity_sweep {
            need = need.max(params.volume_len.get() + 1);
        }
        if self.spring || self.liquidity_sweep || self.order_block {
            // ATR backs every candidate's dynamic stop
            need = need.max(params.atr_len.get() + 1);
        }
        if self.order_block {
            need = need.max(params.rsi_len.get() + 2);
        }
        need
    }
}

/// Outcome of the correlation gate for one instrument, resolved by the
/// orchestrator before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// Gate disabled, or the instrument is the reference asset itself
    Bypass,
    /// Reference asset trend agrees with the buy direction
    Aligned,
    /// Reference asset trend disagrees
    NotAligned,
    /// Reference series missing: buy side fails closed, sell side proceeds
    Unavailable,
}

impl Correlation {
    #[inline]
    fn permits_buy(self) -> bool {
        matches!(self, Correlation::Bypass | Correlation::Aligned)
    }
}

// ============================================================
// CANDIDATES
// ============================================================

/// One matched structural check
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SetupCandidate {
    pub kind: SetupKind,
    /// Structure-derived stop level (prior low/high or zone boundary)
    pub stop_basis: f64,
    /// ATR at the reference bar
    pub atr: f64,
}

impl SetupCandidate {
    /// Stop basis widened by half an ATR in the adverse direction
    pub fn dynamic_stop(&self) -> f64 {
        match self.kind.direction() {
            Direction::Bullish => self.stop_basis - self.atr * 0.5,
            Direction::Bearish => self.stop_basis + self.atr * 0.5,
        }
    }
}

/// Scored instrument: every matched check plus the primary selection
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// All matches in fixed check order; never empty
    pub candidates: Vec<SetupCandidate>,
    /// Total confluence points across both sides
    pub score: u32,
    /// Index of the reference bar the assessment is anchored on
    pub reference_index: usize,
}

impl Assessment {
    /// First match in the fixed check order. Selection order is documented
    /// as the tie-break; it does not imply the primary scored highest.
    #[inline]
    pub fn primary(&self) -> &SetupCandidate {
        &self.candidates[0]
    }
}

// ============================================================
// SCORER
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    pub config: ScorerConfig,
    pub params: IndicatorParams,
}

impl Scorer {
    pub fn new(config: ScorerConfig, params: IndicatorParams) -> Self {
        Self { config, params }
    }

    /// Evaluate one instrument against the reference bar. `None` is the
    /// normal no-signal outcome, covering failed gates, degenerate
    /// indicators and simply no structural match.
    pub fn assess(
        &self,
        series: &Series,
        ind: &Indicators,
        pivots: &PivotSet,
        div: &DivergenceFlags,
        blocks: &OrderBlocks,
        correlation: Correlation,
    ) -> Option<Assessment> {
        let n = series.len();
        if n < 3 {
            return None;
        }
        let r = n - 2;
        let p = n - 3;

        // Gate 1: volatility regime must be non-explosive. A NaN width (too
        // little history, degenerate bands) fails the gate, so no structural
        // check is ever evaluated on unreadable volatility.
        if self.config.volatility_gate && !(ind.bb_width[r] < ind.bb_width_ma[r]) {
            return None;
        }

        // Gate 2: trend eligibility per side. NaN trend average fails both.
        let (mut buy_eligible, sell_eligible) = if self.config.trend_gate {
            let close = series[r].close;
            let trend = ind.trend_ema[r];
            (close > trend, close < trend)
        } else {
            (true, true)
        };

        // Gate 3: correlation, buy side only
        buy_eligible = buy_eligible && correlation.permits_buy();

        if !buy_eligible && !sell_eligible {
            return None;
        }

        let atr = ind.atr[r];
        if !atr.is_finite() {
            return None;
        }
        let volume_confirms = series[r].volume > ind.volume_ma[r];

        let mut candidates = Vec::new();
        let mut score = 0u32;

        // Check 1: spring (buy) - prior bar pierces the support range that
        // was in place before it, reference bar recovers above it on volume
        if self.config.spring && buy_eligible && p >= 1 {
            let support = ind.range_low[p - 1];
            if support.is_finite()
                && series[p].low < support
                && series[r].close > support
                && volume_confirms
            {
                score += 1;
                candidates.push(SetupCandidate {
                    kind: SetupKind::Spring,
                    stop_basis: series[p].low,
                    atr,
                });
            }
        }

        // Check 2: liquidity sweep (sell) - prior bar wicks above the most
        // recent swing high, reference bar closes back below it on volume
        if self.config.liquidity_sweep && sell_eligible {
            if let Some(swing) = pivots.last_high_before(p) {
                if series[p].high > swing.value
                    && series[r].close < swing.value
                    && volume_confirms
                {
                    score += 1;
                    candidates.push(SetupCandidate {
                        kind: SetupKind::LiquiditySweep,
                        stop_basis: series[p].high,
                        atr,
                    });
                }
            }
        }

        // Check 3: order-block retest with matching divergence. The zone
        // must be fully formed before the prior bar: origin <= p - 1, so
        // its breakout bar is at most p.
        if self.config.order_block && buy_eligible {
            if let Some(origin) = blocks.last_before(p, Direction::Bullish) {
                let zone = &series[origin];
                let tested = series[r].low >= zone.low && series[r].low <= zone.high;
                if tested && div.bullish[r] {
                    score += 1;
                    candidates.push(SetupCandidate {
                        kind: SetupKind::OrderBlockRetestBuy,
                        stop_basis: zone.low,
                        atr,
                    });
                }
            }
        }
        if self.config.order_block && sell_eligible {
            if let Some(origin) = blocks.last_before(p, Direction::Bearish) {
                let zone = &series[origin];
                let tested = series[r].high >= zone.low && series[r].high <= zone.high;
                if tested && div.bearish[r] {
                    score += 1;
                    candidates.push(SetupCandidate {
                        kind: SetupKind::OrderBlockRetestSell,
                        stop_basis: zone.high,
                        atr,
                    });
                }
            }
        }

        if candidates.is_empty() {
            return None;
        }
        Some(Assessment {
            candidates,
            score,
            reference_index: r,
        })
    }
}

// ============================================================
// TESTS
// ============================================================
