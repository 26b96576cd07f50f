//! # mtfscan - Multi-Timeframe Setup Scanner
//!
//! Scans daily OHLCV history for a small catalogue of technical setups
//! (accumulation springs, liquidity sweeps, order-block retests with momentum
//! divergence), scores their confluence, and optionally confirms candidates
//! against an intraday timeframe.
//!
//! The crate is pure computation: history arrives through the
//! [`scan::HistoryProvider`] trait and results leave as [`ScanResult`]
//! records grouped into a [`scan::ScanReport`]. Transport, templating and
//! scheduling are the caller's problem.
//!
//! ## Quick Start
//!
//! ```rust
//! use mtfscan::prelude::*;
//!
//! struct NoData;
//!
//! impl HistoryProvider for NoData {
//!     fn daily(&self, _symbol: &str) -> Option<Series> { None }
//!     fn intraday(&self, _symbol: &str, _days: u32, _interval: Interval) -> Option<Series> {
//!         None
//!     }
//! }
//!
//! let scanner = ScannerBuilder::new(NoData).build().unwrap();
//! let report = scanner.run(&["BTC-USD", "ETH-USD"]);
//! assert!(!report.has_signals());
//! ```

use chrono::{DateTime, NaiveDate, Utc};

pub mod divergence;
pub mod indicators;
pub mod order_blocks;
pub mod pivots;
pub mod scan;
pub mod scoring;
pub mod trigger;
pub mod wave;

pub mod prelude {
    pub use crate::{
        divergence::DivergenceFlags,
        indicators::{IndicatorParams, Indicators},
        order_blocks::OrderBlocks,
        pivots::{Pivot, PivotSet},
        scan::{
            HistoryProvider, Interval, Outcome, ScanReport, Scanner, ScannerBuilder, SkipReason,
        },
        scoring::{Assessment, Correlation, ScorerConfig, SetupCandidate},
        trigger::find_trigger,
        wave::suggest_wave,
        Candle, Direction, Period, Result, ScanError, ScanResult, Series, SetupKind, Status,
        Trigger, WaveHint,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors that can occur while preparing a series for evaluation
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient history: need {need} bars, got {got}")]
    InsufficientHistory { need: usize, got: usize },

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Out-of-order timestamp at index {index}")]
    OutOfOrder { index: usize },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Lookback length in bars (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ScanError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// CANDLES
// ============================================================

/// One OHLCV bar with its open timestamp
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Calendar date of the bar's open timestamp (UTC)
    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.ts.date_naive()
    }

    fn validate(&self, index: usize) -> Result<()> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::InvalidCandle {
                index,
                reason: "non-finite value in OHLCV",
            });
        }
        if self.high < self.low {
            return Err(ScanError::InvalidCandle {
                index,
                reason: "high < low",
            });
        }
        if self.volume < 0.0 {
            return Err(ScanError::InvalidCandle {
                index,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

/// Ordered, validated OHLCV history. Immutable once constructed.
///
/// Invariants: strictly increasing timestamps (no duplicates), every candle
/// finite with `high >= low`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Series(Vec<Candle>);

impl Series {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        for (i, c) in candles.iter().enumerate() {
            c.validate(i)?;
            if i > 0 && c.ts <= candles[i - 1].ts {
                return Err(ScanError::OutOfOrder { index: i });
            }
        }
        Ok(Self(candles))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.0.get(index)
    }

    #[inline]
    pub fn candles(&self) -> &[Candle] {
        &self.0
    }

    #[inline]
    pub fn last(&self) -> Option<&Candle> {
        self.0.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.volume).collect()
    }
}

impl std::ops::Index<usize> for Series {
    type Output = Candle;

    #[inline]
    fn index(&self, index: usize) -> &Candle {
        &self.0[index]
    }
}

// ============================================================
// SETUPS & RESULTS
// ============================================================

/// Direction of a setup. Scanner setups are never neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Structural setup catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SetupKind {
    /// Dip below a recent support range that recovers on volume (buy)
    Spring,
    /// Breach of a prior swing high that reverses on volume (sell)
    LiquiditySweep,
    /// Demand-zone retest with bullish momentum divergence (buy)
    OrderBlockRetestBuy,
    /// Supply-zone retest with bearish momentum divergence (sell)
    OrderBlockRetestSell,
}

impl SetupKind {
    #[inline]
    pub fn direction(self) -> Direction {
        match self {
            SetupKind::Spring | SetupKind::OrderBlockRetestBuy => Direction::Bullish,
            SetupKind::LiquiditySweep | SetupKind::OrderBlockRetestSell => Direction::Bearish,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SetupKind::Spring => "SPRING",
            SetupKind::LiquiditySweep => "LIQUIDITY_SWEEP",
            SetupKind::OrderBlockRetestBuy => "ORDER_BLOCK_BUY",
            SetupKind::OrderBlockRetestSell => "ORDER_BLOCK_SELL",
        }
    }
}

/// Terminal classification of a scored instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    /// Confluence score of exactly 1
    UnderObservation,
    /// Score >= 2, no intraday confirmation found (or confirmation disabled)
    AwaitingTrigger,
    /// Score >= 2 and an intraday moving-average cross confirmed the entry
    Confirmed,
}

/// Intraday confirmation: first qualifying moving-average cross of the day
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trigger {
    pub price: f64,
    pub at: DateTime<Utc>,
}

/// Advisory wave-structure hint. Never an input to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WaveHint {
    Impulse,
    Correction,
    /// Not enough pivot structure to call it either way
    Indeterminate,
}

/// One scored instrument, produced fresh per scan run and never persisted
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub kind: SetupKind,
    /// Confluence score: one point per matched structural check
    pub score: u32,
    pub setup_date: NaiveDate,
    /// Raw stop level derived from the primary setup's structure
    pub stop_basis: f64,
    /// Stop basis widened by half an ATR in the adverse direction
    pub dynamic_stop: f64,
    pub status: Status,
    pub trigger: Option<Trigger>,
    pub wave: Option<WaveHint>,
}

// ============================================================
// TESTS
// ============================================================
