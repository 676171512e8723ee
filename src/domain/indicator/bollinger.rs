//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//! A flat window has zero width. Warmup: first (period-1) bars are `NaN`.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::{rolling_sma, rolling_stddev};
use crate::domain::ohlcv::{closes, Bar};

pub fn calculate_bollinger(bars: &[Bar], period: usize, std_dev: f64) -> IndicatorSeries {
    let prices = closes(bars);
    let middle = rolling_sma(&prices, period);
    let deviation = rolling_stddev(&prices, period);

    let values = middle
        .iter()
        .zip(&deviation)
        .map(|(&middle, &sd)| IndicatorValue::Bollinger {
            upper: middle + std_dev * sd,
            middle,
            lower: middle - std_dev * sd,
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger { period, std_dev },
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator_helpers::bars_from_closes;

    fn bands(value: &IndicatorValue) -> (f64, f64, f64) {
        match value {
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => (*upper, *middle, *lower),
            _ => panic!("Expected Bollinger value"),
        }
    }

    #[test]
    fn bollinger_warmup() {
        let series = calculate_bollinger(&bars_from_closes(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3, 2.0);
        assert!(!series.values[0].is_valid());
        assert!(!series.values[1].is_valid());
        assert!(series.values[2].is_valid());
        assert!(series.values[4].is_valid());
    }

    #[test]
    fn bollinger_constant_values() {
        let series = calculate_bollinger(&bars_from_closes(&[100.0; 5]), 3, 2.0);
        let (upper, middle, lower) = bands(&series.values[2]);
        assert!((middle - 100.0).abs() < f64::EPSILON);
        assert!((upper - 100.0).abs() < f64::EPSILON);
        assert!((lower - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_basic_calculation() {
        let series = calculate_bollinger(&bars_from_closes(&[10.0, 20.0, 30.0]), 3, 2.0);
        let (upper, middle, lower) = bands(&series.values[2]);

        let expected_middle: f64 = 20.0;
        let variance: f64 = (100.0 + 0.0 + 100.0) / 3.0;
        let stddev = variance.sqrt();
        assert!((middle - expected_middle).abs() < 1e-10);
        assert!((upper - (expected_middle + 2.0 * stddev)).abs() < 1e-10);
        assert!((lower - (expected_middle - 2.0 * stddev)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_symmetry() {
        let series = calculate_bollinger(&bars_from_closes(&[12.0, 15.0, 11.0, 19.0]), 4, 1.5);
        let (upper, middle, lower) = bands(&series.values[3]);
        assert!(((upper - middle) - (middle - lower)).abs() < 1e-10);
    }
}
