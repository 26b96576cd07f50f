//! Scan orchestration: iterate a watchlist, evaluate each instrument through
//! the full pipeline (indicators, pivots, divergence, order blocks, scorer,
//! optional intraday trigger) and bucket the outcomes into a report.
//!
//! History arrives through [`HistoryProvider`]. A fetch that fails and a
//! fetch that returns nothing are the same thing to the core: no data, no
//! signal for that instrument, never an aborted scan.

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    divergence::DivergenceFlags,
    indicators::{ema, IndicatorParams, Indicators},
    order_blocks::OrderBlocks,
    pivots::PivotSet,
    scoring::{Correlation, Scorer, ScorerConfig},
    trigger::find_trigger,
    wave::suggest_wave,
    Direction, Result, ScanError, ScanResult, Series, Status, Trigger,
};

// ============================================================
// PROVIDER SEAM
// ============================================================

/// Intraday bar granularity for trigger confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Interval {
    M15,
    M30,
    H1,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
        }
    }
}

/// Time-series fetch capability, implemented by the surrounding I/O layer.
///
/// `None` covers both an empty response and a failed fetch; the scanner
/// treats them identically and has no retry of its own.
pub trait HistoryProvider: Send + Sync {
    /// Daily bars, ideally at least a year
    fn daily(&self, symbol: &str) -> Option<Series>;

    /// Recent intraday bars at the given granularity
    fn intraday(&self, symbol: &str, lookback_days: u32, interval: Interval) -> Option<Series>;
}

// ============================================================
// CORRELATION FILTER
// ============================================================

/// Reference-asset trend state, computed once per scan run and read-only
/// afterwards. Served to every other instrument through an as-of lookup.
#[derive(Debug, Clone)]
pub struct ReferenceTrend {
    rows: Vec<ReferenceRow>,
}

#[derive(Debug, Clone, Copy)]
struct ReferenceRow {
    ts: DateTime<Utc>,
    close: f64,
    fast_ema: f64,
}

impl ReferenceTrend {
    pub fn compute(series: &Series, fast_len: usize) -> Option<Self> {
        if series.is_empty() {
            return None;
        }
        let fast = ema(&series.closes(), fast_len);
        let rows = series
            .candles()
            .iter()
            .zip(fast)
            .map(|(c, fast_ema)| ReferenceRow {
                ts: c.ts,
                close: c.close,
                fast_ema,
            })
            .collect();
        Some(Self { rows })
    }

    /// Trend state at the most recent reference bar at or before `ts`.
    /// `None` when no such bar exists; an unseeded average reads as not
    /// bullish.
    pub fn bullish_asof(&self, ts: DateTime<Utc>) -> Option<bool> {
        let row = self.rows.iter().rev().find(|r| r.ts <= ts)?;
        Some(row.fast_ema.is_finite() && row.close > row.fast_ema)
    }
}

// ============================================================
// OUTCOMES & REPORT
// ============================================================

/// Why an instrument produced nothing this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SkipReason {
    /// Fetch failed or returned an empty series
    NoData,
    InsufficientHistory { need: usize, got: usize },
}

/// Per-instrument evaluation outcome. Every failure is local: nothing here
/// aborts the scan.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum Outcome {
    Signal(ScanResult),
    /// Ran to completion, no structural match - the normal quiet result
    NoCandidate,
    Skipped(SkipReason),
}

/// An instrument that could not be evaluated this run
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SkippedInstrument {
    pub symbol: String,
    pub reason: SkipReason,
}

/// Scan results bucketed by status, in watchlist order. A report with no
/// signals is still a successful scan; callers should say "no signals"
/// rather than staying silent.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ScanReport {
    pub confirmed: Vec<ScanResult>,
    pub awaiting_trigger: Vec<ScanResult>,
    pub under_observation: Vec<ScanResult>,
    /// Instruments that evaluated cleanly without a match
    pub no_candidate: Vec<String>,
    pub skipped: Vec<SkippedInstrument>,
}

impl ScanReport {
    pub fn has_signals(&self) -> bool {
        !self.confirmed.is_empty()
            || !self.awaiting_trigger.is_empty()
            || !self.under_observation.is_empty()
    }

    fn push(&mut self, symbol: &str, outcome: Outcome) {
        match outcome {
            Outcome::Signal(result) => match result.status {
                Status::Confirmed => self.confirmed.push(result),
                Status::AwaitingTrigger => self.awaiting_trigger.push(result),
                Status::UnderObservation => self.under_observation.push(result),
            },
            Outcome::NoCandidate => self.no_candidate.push(symbol.to_string()),
            Outcome::Skipped(reason) => self.skipped.push(SkippedInstrument {
                symbol: symbol.to_string(),
                reason,
            }),
        }
    }
}

// ============================================================
// SCANNER
// ============================================================

/// Watchlist scanner. Holds no cross-run state: every `run` starts with an
/// empty correlation cache and recomputes everything.
pub struct Scanner<P> {
    provider: P,
    scorer: Scorer,
    reference_symbol: String,
    confirm_intraday: bool,
    intraday_lookback_days: u32,
    interval: Interval,
}

impl<P: HistoryProvider> Scanner<P> {
    /// Access the underlying provider (instrumented test doubles read their
    /// counters back through this)
    pub fn provider_ref(&self) -> &P {
        &self.provider
    }

    /// Evaluate the watchlist sequentially, in order.
    pub fn run(&self, watchlist: &[&str]) -> ScanReport {
        let reference = self.load_reference();
        let outcomes: Vec<Outcome> = watchlist
            .iter()
            .map(|symbol| self.evaluate(symbol, reference.as_ref()))
            .collect();
        Self::bucket(watchlist, outcomes)
    }

    /// Evaluate instruments on the rayon pool. Instrument evaluations are
    /// independent, so the report is identical to [`Scanner::run`]'s:
    /// bucketing follows watchlist order, not completion order.
    pub fn run_parallel(&self, watchlist: &[&str]) -> ScanReport {
        let reference = self.load_reference();
        let outcomes: Vec<Outcome> = watchlist
            .par_iter()
            .map(|symbol| self.evaluate(symbol, reference.as_ref()))
            .collect();
        Self::bucket(watchlist, outcomes)
    }

    fn bucket(watchlist: &[&str], outcomes: Vec<Outcome>) -> ScanReport {
        let mut report = ScanReport::default();
        for (symbol, outcome) in watchlist.iter().zip(outcomes) {
            report.push(symbol, outcome);
        }
        report
    }

    /// Populate the correlation cache exactly once per run, before any
    /// dependent evaluation reads it.
    fn load_reference(&self) -> Option<ReferenceTrend> {
        if !self.scorer.config.correlation_gate {
            return None;
        }
        let series = self.provider.daily(&self.reference_symbol)?;
        let trend = ReferenceTrend::compute(&series, self.scorer.params.fast_len.get());
        if trend.is_none() {
            warn!(
                symbol = %self.reference_symbol,
                "reference series unavailable; buy-side evaluations will fail closed"
            );
        }
        trend
    }

    fn evaluate(&self, symbol: &str, reference: Option<&ReferenceTrend>) -> Outcome {
        let Some(series) = self.provider.daily(symbol) else {
            debug!(%symbol, "no daily history");
            return Outcome::Skipped(SkipReason::NoData);
        };
        if series.is_empty() {
            return Outcome::Skipped(SkipReason::NoData);
        }

        let min_bars = self.scorer.config.min_bars(&self.scorer.params);
        let ind = match Indicators::compute(&series, &self.scorer.params, min_bars) {
            Ok(ind) => ind,
            Err(ScanError::InsufficientHistory { need, got }) => {
                debug!(%symbol, need, got, "insufficient history");
                return Outcome::Skipped(SkipReason::InsufficientHistory { need, got });
            }
            Err(err) => {
                warn!(%symbol, %err, "indicator computation failed");
                return Outcome::Skipped(SkipReason::NoData);
            }
        };

        let distance = self.scorer.params.pivot_distance.get();
        let pivots = PivotSet::extract(&series, &ind.rsi, distance);
        let div = DivergenceFlags::detect(
            series.len(),
            &pivots,
            self.scorer.params.divergence_window.get(),
        );
        let blocks = OrderBlocks::detect(&series);

        let reference_index = series.len() - 2;
        let correlation = self.correlation_for(symbol, reference, series[reference_index].ts);

        let Some(assessment) = self
            .scorer
            .assess(&series, &ind, &pivots, &div, &blocks, correlation)
        else {
            debug!(%symbol, "no candidate");
            return Outcome::NoCandidate;
        };

        let primary = *assessment.primary();
        let direction = primary.kind.direction();

        let mut trigger = None;
        let status = if assessment.score == 1 {
            Status::UnderObservation
        } else {
            // The signal day is the most recent closed daily bar
            let signal_day = series[series.len() - 1].date();
            trigger = self.confirm(symbol, direction, signal_day);
            if trigger.is_some() {
                Status::Confirmed
            } else {
                Status::AwaitingTrigger
            }
        };

        let wave = (status != Status::UnderObservation).then(|| suggest_wave(&pivots, direction));

        debug!(
            %symbol,
            kind = primary.kind.as_str(),
            score = assessment.score,
            ?status,
            "setup found"
        );

        Outcome::Signal(ScanResult {
            symbol: symbol.to_string(),
            kind: primary.kind,
            score: assessment.score,
            setup_date: series[reference_index].date(),
            stop_basis: primary.stop_basis,
            dynamic_stop: primary.dynamic_stop(),
            status,
            trigger,
            wave,
        })
    }

    fn correlation_for(
        &self,
        symbol: &str,
        reference: Option<&ReferenceTrend>,
        asof: DateTime<Utc>,
    ) -> Correlation {
        if !self.scorer.config.correlation_gate || symbol == self.reference_symbol {
            return Correlation::Bypass;
        }
        match reference.and_then(|r| r.bullish_asof(asof)) {
            Some(true) => Correlation::Aligned,
            Some(false) => Correlation::NotAligned,
            None => Correlation::Unavailable,
        }
    }

    fn confirm(&self, symbol: &str, direction: Direction, day: NaiveDate) -> Option<Trigger> {
        if !self.confirm_intraday {
            return None;
        }
        let intraday = self
            .provider
            .intraday(symbol, self.intraday_lookback_days, self.interval)?;
        find_trigger(
            &intraday,
            direction,
            day,
            self.scorer.params.fast_len.get(),
        )
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`Scanner`] instances
pub struct ScannerBuilder<P> {
    provider: P,
    config: ScorerConfig,
    params: IndicatorParams,
    reference_symbol: String,
    confirm_intraday: bool,
    intraday_lookback_days: u32,
    interval: Interval,
}

impl<P: HistoryProvider> ScannerBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: ScorerConfig::default(),
            params: IndicatorParams::default(),
            reference_symbol: "BTC-USD".to_string(),
            confirm_intraday: true,
            intraday_lookback_days: 5,
            interval: Interval::H1,
        }
    }

    /// Symbol whose trend gates every other instrument's buy side
    pub fn reference_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.reference_symbol = symbol.into();
        self
    }

    pub fn config(mut self, config: ScorerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn params(mut self, params: IndicatorParams) -> Self {
        self.params = params;
        self
    }

    /// Enable/disable the intraday trigger lookup for score >= 2 candidates
    pub fn confirm_intraday(mut self, enable: bool) -> Self {
        self.confirm_intraday = enable;
        self
    }

    pub fn intraday_lookback_days(mut self, days: u32) -> Self {
        self.intraday_lookback_days = days;
        self
    }

    pub fn interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn build(self) -> Result<Scanner<P>> {
        self.params.validate()?;
        Ok(Scanner {
            provider: self.provider,
            scorer: Scorer::new(self.config, self.params),
            reference_symbol: self.reference_symbol,
            confirm_intraday: self.confirm_intraday,
            intraday_lookback_days: self.intraday_lookback_days,
            interval: self.interval,
        })
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;
    use chrono::TimeZone;

    struct Empty;

    impl HistoryProvider for Empty {
        fn daily(&self, _symbol: &str) -> Option<Series> {
            None
        }

        fn intraday(&self, _s: &str, _d: u32, _i: Interval) -> Option<Series> {
            None
        }
    }

    fn daily_series(closes: &[f64]) -> Series {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                ts: Utc.timestamp_opt(86_400 * i as i64, 0).unwrap(),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1000.0,
            })
            .collect();
        Series::new(candles).unwrap()
    }

    #[test]
    fn test_empty_provider_skips_everything() {
        let scanner = ScannerBuilder::new(Empty).build().unwrap();
        let report = scanner.run(&["AAA", "BBB"]);
        assert!(!report.has_signals());
        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::NoData));
    }

    #[test]
    fn test_short_history_is_reported_as_such() {
        struct Short;
        impl HistoryProvider for Short {
            fn daily(&self, _symbol: &str) -> Option<Series> {
                Some(daily_series(&[100.0; 50]))
            }
            fn intraday(&self, _s: &str, _d: u32, _i: Interval) -> Option<Series> {
                None
            }
        }
        let scanner = ScannerBuilder::new(Short).build().unwrap();
        let report = scanner.run(&["AAA"]);
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::InsufficientHistory { need: 201, got: 50 }
        );
    }

    #[test]
    fn test_reference_trend_asof() {
        let series = daily_series(&[
            100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0, 109.0,
        ]);
        let trend = ReferenceTrend::compute(&series, 3).unwrap();
        // Rising closes sit above the fast average once it seeds
        assert_eq!(trend.bullish_asof(series[9].ts), Some(true));
        // Before the first bar there is nothing to look up
        let before = series[0].ts - chrono::Duration::days(1);
        assert_eq!(trend.bullish_asof(before), None);
        // Unseeded average reads as not bullish
        assert_eq!(trend.bullish_asof(series[0].ts), Some(false));
    }

    #[test]
    fn test_reference_trend_asof_snaps_backward() {
        let series = daily_series(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let trend = ReferenceTrend::compute(&series, 3).unwrap();
        // A timestamp between bars resolves to the bar before it
        let between = series[4].ts + chrono::Duration::hours(6);
        assert_eq!(trend.bullish_asof(between), Some(true));
    }

    #[test]
    fn test_interval_strings() {
        assert_eq!(Interval::H1.as_str(), "1h");
        assert_eq!(Interval::M30.as_str(), "30m");
        assert_eq!(Interval::M15.as_str(), "15m");
    }
}
