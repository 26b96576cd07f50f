//! Structural pivot extraction: local extrema with a minimum separation
//! distance, applied to price highs/lows and to the RSI series.

use crate::Series;

/// One local extremum in a numeric series
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Pivot {
    pub index: usize,
    pub value: f64,
}

/// Local maxima such that no two returned pivots are closer than `distance`
/// bars. When pivots compete within the distance window the higher one wins.
///
/// Series shorter than `2 * distance` produce no pivots. NaN entries (and
/// their neighbors) can never be pivots.
pub fn find_peaks(values: &[f64], distance: usize) -> Vec<Pivot> {
    if values.len() < 2 * distance {
        return Vec::new();
    }

    let mut candidates: Vec<Pivot> = Vec::new();
    for i in 1..values.len() - 1 {
        let (prev, v, next) = (values[i - 1], values[i], values[i + 1]);
        if v.is_nan() || prev.is_nan() || next.is_nan() {
            continue;
        }
        if v > prev && v > next {
            candidates.push(Pivot { index: i, value: v });
        }
    }

    // Higher peaks take priority; ties resolve to the earlier bar so the
    // result is fully deterministic.
    let mut by_height: Vec<usize> = (0..candidates.len()).collect();
    by_height.sort_by(|&a, &b| {
        candidates[b]
            .value
            .partial_cmp(&candidates[a].value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(candidates[a].index.cmp(&candidates[b].index))
    });

    let mut keep = vec![true; candidates.len()];
    for &i in &by_height {
        if !keep[i] {
            continue;
        }
        for (j, other) in candidates.iter().enumerate() {
            if j != i && keep[j] && candidates[i].index.abs_diff(other.index) < distance {
                keep[j] = false;
            }
        }
    }

    let mut kept: Vec<Pivot> = candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect();
    kept.sort_by_key(|p| p.index);
    kept
}

/// Local minima, via negation of [`find_peaks`]. Pivot values are reported
/// in the original (un-negated) scale.
pub fn find_troughs(values: &[f64], distance: usize) -> Vec<Pivot> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    find_peaks(&negated, distance)
        .into_iter()
        .map(|p| Pivot {
            index: p.index,
            value: -p.value,
        })
        .collect()
}

/// The four pivot families the divergence analyzer and scorer consume
#[derive(Debug, Clone)]
pub struct PivotSet {
    pub price_highs: Vec<Pivot>,
    pub price_lows: Vec<Pivot>,
    pub rsi_highs: Vec<Pivot>,
    pub rsi_lows: Vec<Pivot>,
}

impl PivotSet {
    pub fn extract(series: &Series, rsi: &[f64], distance: usize) -> Self {
        let highs = series.highs();
        let lows = series.lows();
        Self {
            price_highs: find_peaks(&highs, distance),
            price_lows: find_troughs(&lows, distance),
            rsi_highs: find_peaks(rsi, distance),
            rsi_lows: find_troughs(rsi, distance),
        }
    }

    /// Most recent price-high pivot strictly before `index`
    pub fn last_high_before(&self, index: usize) -> Option<&Pivot> {
        self.price_highs.iter().rev().find(|p| p.index < index)
    }
}

// ============================================================
// TESTS
// ============================================================
