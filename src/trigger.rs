//! Intraday trigger confirmation: the first moving-average cross of the
//! signal day, scanned forward in time with no look-ahead past the match.

use chrono::NaiveDate;

use crate::{indicators::ema, Direction, Series, Trigger};

/// Scan an intraday series for the first qualifying cross of its fast
/// moving average on `day`: close moving from below to above the average
/// for buy-side setups, above to below for sell-side.
///
/// The fast average is computed over the whole intraday series (so it is
/// seeded before the signal day opens), but only bar pairs inside `day` can
/// produce a trigger. Returns `None` when the series is empty, the average
/// never seeds, or no crossing occurs - a down-cross before any up-cross on
/// a buy candidate is "no trigger", never a false confirmation.
pub fn find_trigger(
    intraday: &Series,
    direction: Direction,
    day: NaiveDate,
    fast_len: usize,
) -> Option<Trigger> {
    if intraday.len() < 2 {
        return None;
    }
    let closes = intraday.closes();
    let fast = ema(&closes, fast_len);

    for i in 1..intraday.len() {
        let curr = &intraday[i];
        if curr.date() != day {
            continue;
        }
        let prev = &intraday[i - 1];
        let (prev_ma, curr_ma) = (fast[i - 1], fast[i]);
        if prev_ma.is_nan() || curr_ma.is_nan() {
            continue;
        }
        let crossed = match direction {
            Direction::Bullish => prev.close < prev_ma && curr.close > curr_ma,
            Direction::Bearish => prev.close > prev_ma && curr.close < curr_ma,
        };
        if crossed {
            return Some(Trigger {
                price: curr.close,
                at: curr.ts,
            });
        }
    }
    None
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;
    use chrono::{TimeZone, Utc};

    /// Hourly bars starting 2024-01-10 00:00 UTC with the given closes
    fn hourly(closes: &[f64]) -> Series {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                ts: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 100.0,
            })
            .collect();
        Series::new(candles).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    #[test]
    fn test_first_upcross_wins() {
        // Flat around 100, dip below the average, then two recoveries -
        // only the first cross is reported
        let closes = [100.0, 100.0, 100.0, 100.0, 97.0, 103.0, 99.0, 104.0];
        let series = hourly(&closes);
        let trigger = find_trigger(&series, Direction::Bullish, day(), 3).unwrap();
        assert_eq!(trigger.price, 103.0);
        assert_eq!(trigger.at, series[5].ts);
    }

    #[test]
    fn test_downcross_is_not_a_buy_trigger() {
        // Price stays below the falling average after a drop: no up-cross
        let closes = [100.0, 100.0, 100.0, 96.0, 94.0, 93.0, 92.0];
        let series = hourly(&closes);
        assert!(find_trigger(&series, Direction::Bullish, day(), 3).is_none());
    }

    #[test]
    fn test_sell_trigger_mirrors() {
        let closes = [100.0, 100.0, 100.0, 100.0, 103.0, 97.0];
        let series = hourly(&closes);
        let trigger = find_trigger(&series, Direction::Bearish, day(), 3).unwrap();
        assert_eq!(trigger.price, 97.0);
    }

    #[test]
    fn test_other_days_are_ignored() {
        let closes = [100.0, 100.0, 100.0, 100.0, 97.0, 103.0];
        let series = hourly(&closes);
        let other = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
        assert!(find_trigger(&series, Direction::Bullish, other, 3).is_none());
    }

    #[test]
    fn test_empty_and_unseeded_series() {
        assert!(find_trigger(&hourly(&[]), Direction::Bullish, day(), 3).is_none());
        // Too short for the average to seed
        assert!(find_trigger(&hourly(&[100.0, 101.0]), Direction::Bullish, day(), 3).is_none());
    }
}
