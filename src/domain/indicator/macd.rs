//! MACD (Moving Average Convergence Divergence).
//!
//! - line = EMA(fast) - EMA(slow)
//! - signal = EMA(line, signal_period), seeded once the line has enough values
//! - histogram = line - signal
//!
//! Warmup: the line is `NaN` until bar (slow-1); signal/histogram until
//! bar (slow + signal - 2).

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::ema_series;
use crate::domain::ohlcv::{closes, Bar};

pub fn calculate_macd(bars: &[Bar], fast: usize, slow: usize, signal: usize) -> IndicatorSeries {
    let prices = closes(bars);
    let fast_ema = ema_series(&prices, fast);
    let slow_ema = ema_series(&prices, slow);

    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&line, signal);

    let values = line
        .iter()
        .zip(&signal_line)
        .map(|(&line, &signal)| IndicatorValue::Macd {
            line,
            signal,
            histogram: line - signal,
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Macd { fast, slow, signal },
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator_helpers::bars_from_closes;

    fn unpack(value: &IndicatorValue) -> (f64, f64, f64) {
        match value {
            IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } => (*line, *signal, *histogram),
            _ => panic!("Expected Macd value"),
        }
    }

    #[test]
    fn macd_warmup_boundaries() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let series = calculate_macd(&bars_from_closes(&closes), 3, 6, 4);

        let (line, _, _) = unpack(&series.values[4]);
        assert!(line.is_nan());
        let (line, signal, _) = unpack(&series.values[5]);
        assert!(line.is_finite());
        assert!(signal.is_nan());
        // signal seeds at 5 + 4 - 1 = 8
        let (_, signal, hist) = unpack(&series.values[8]);
        assert!(signal.is_finite());
        assert!(hist.is_finite());
    }

    #[test]
    fn macd_line_is_ema_difference() {
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let bars = bars_from_closes(&closes);
        let series = calculate_macd(&bars, 5, 10, 3);
        let fast = ema_series(&closes, 5);
        let slow = ema_series(&closes, 10);
        for i in 9..30 {
            let (line, signal, hist) = unpack(&series.values[i]);
            assert!((line - (fast[i] - slow[i])).abs() < 1e-12);
            if signal.is_finite() {
                assert!((hist - (line - signal)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn macd_flat_prices_are_zero() {
        let series = calculate_macd(&bars_from_closes(&[100.0; 40]), 12, 26, 9);
        let (line, signal, hist) = unpack(&series.values[39]);
        assert!(line.abs() < 1e-12);
        assert!(signal.abs() < 1e-12);
        assert!(hist.abs() < 1e-12);
    }

    #[test]
    fn macd_rising_prices_positive_line() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = calculate_macd(&bars_from_closes(&closes), 12, 26, 9);
        let (line, _, _) = unpack(&series.values[59]);
        assert!(line > 0.0);
    }
}
