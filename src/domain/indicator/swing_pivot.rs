//! Swing pivot high/low.
//!
//! A candidate bar is a pivot high when its high is strictly greater than every
//! other high within `lookback` bars on both sides (pivot low mirrors on lows).
//! The pivot is confirmed `lookback` bars after the candidate, and its level is
//! carried forward until a newer pivot of the same kind is confirmed.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

/// True when `bars[candidate]` has the unique highest high in its window.
/// Needs `lookback` bars on both sides.
pub fn is_pivot_high(bars: &[Bar], candidate: usize, lookback: usize) -> bool {
    is_unique_extremum(bars, candidate, lookback, |b| b.high, |c, o| c > o)
}

/// True when `bars[candidate]` has the unique lowest low in its window.
pub fn is_pivot_low(bars: &[Bar], candidate: usize, lookback: usize) -> bool {
    is_unique_extremum(bars, candidate, lookback, |b| b.low, |c, o| c < o)
}

fn is_unique_extremum(
    bars: &[Bar],
    candidate: usize,
    lookback: usize,
    field: impl Fn(&Bar) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> bool {
    if lookback == 0 || candidate < lookback || candidate + lookback >= bars.len() {
        return false;
    }
    let level = field(&bars[candidate]);
    (candidate - lookback..=candidate + lookback)
        .filter(|&j| j != candidate)
        .all(|j| beats(level, field(&bars[j])))
}

fn confirmed_levels(
    bars: &[Bar],
    lookback: usize,
    test: fn(&[Bar], usize, usize) -> bool,
    field: fn(&Bar) -> f64,
) -> Vec<f64> {
    let mut values = vec![f64::NAN; bars.len()];
    if lookback == 0 {
        return values;
    }

    let mut level = f64::NAN;
    for i in 0..bars.len() {
        if i >= 2 * lookback {
            let candidate = i - lookback;
            if test(bars, candidate, lookback) {
                level = field(&bars[candidate]);
            }
        }
        values[i] = level;
    }
    values
}

pub fn calculate_pivot_high(bars: &[Bar], lookback: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple(
        IndicatorType::PivotHigh { lookback },
        confirmed_levels(bars, lookback, is_pivot_high, |b| b.high),
    )
}

pub fn calculate_pivot_low(bars: &[Bar], lookback: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple(
        IndicatorType::PivotLow { lookback },
        confirmed_levels(bars, lookback, is_pivot_low, |b| b.low),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator_helpers::bars_from_closes;

    #[test]
    fn pivot_high_confirmed_after_lookback() {
        let bars = bars_from_closes(&[1.0, 2.0, 5.0, 3.0, 2.0, 1.0]);
        let series = calculate_pivot_high(&bars, 2);
        assert!(series.simple_at(3).is_nan());
        assert_eq!(series.simple_at(4), 5.0);
        assert_eq!(series.simple_at(5), 5.0);
    }

    #[test]
    fn pivot_low_mirrors_high() {
        let bars = bars_from_closes(&[5.0, 4.0, 1.0, 3.0, 4.0]);
        let series = calculate_pivot_low(&bars, 2);
        assert_eq!(series.simple_at(4), 1.0);
    }

    #[test]
    fn tied_extremum_is_not_a_pivot() {
        let bars = bars_from_closes(&[1.0, 5.0, 5.0, 2.0, 1.0, 0.0]);
        assert!(!is_pivot_high(&bars, 1, 1));
        assert!(!is_pivot_high(&bars, 2, 1));
        assert!(calculate_pivot_high(&bars, 1).values.iter().all(|v| !v.is_valid()));
    }

    #[test]
    fn level_is_superseded_by_newer_pivot() {
        let bars = bars_from_closes(&[1.0, 4.0, 1.0, 1.5, 3.0, 1.0, 0.5]);
        let series = calculate_pivot_high(&bars, 1);
        assert_eq!(series.simple_at(2), 4.0);
        assert_eq!(series.simple_at(4), 4.0);
        assert_eq!(series.simple_at(5), 3.0);
        assert_eq!(series.simple_at(6), 3.0);
    }

    #[test]
    fn lookback_zero_is_all_nan() {
        let bars = bars_from_closes(&[1.0, 3.0, 1.0]);
        let series = calculate_pivot_low(&bars, 0);
        assert_eq!(series.len(), 3);
        assert!(series.values.iter().all(|v| !v.is_valid()));
    }

    #[test]
    fn window_edges_are_not_candidates() {
        let bars = bars_from_closes(&[9.0, 1.0, 2.0]);
        assert!(!is_pivot_high(&bars, 0, 1));
        assert!(!is_pivot_high(&bars, 2, 1));
    }
}
