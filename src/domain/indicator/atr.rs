//! Average True Range with Wilder smoothing.
//!
//! TR[0] = high - low, then true range against the previous close.
//! Seed at bar (n-1) with the mean of the first n true ranges, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn atr_values(bars: &[Bar], period: usize) -> Vec<f64> {
    let mut results = vec![f64::NAN; bars.len()];
    if period == 0 || bars.len() < period {
        return results;
    }

    let tr_values: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let mut atr = tr_values[..period].iter().sum::<f64>() / period as f64;
    results[period - 1] = atr;
    for i in period..bars.len() {
        atr = (atr * (period - 1) as f64 + tr_values[i]) / period as f64;
        results[i] = atr;
    }

    results
}

pub fn calculate_atr(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple(IndicatorType::Atr { period }, atr_values(bars, period))
}
