//! Stochastic oscillator.
//!
//! raw %K = 100 × (C - LL) / (HH - LL) over `k_period` bars (0 when HH == LL),
//! %K = SMA(raw %K, k_smooth), %D = SMA(%K, d_period).

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::rolling_sma;
use crate::domain::ohlcv::Bar;

pub fn calculate_stochastic(
    bars: &[Bar],
    k_period: usize,
    k_smooth: usize,
    d_period: usize,
) -> IndicatorSeries {
    let mut raw_k = vec![f64::NAN; bars.len()];
    if k_period > 0 {
        for i in (k_period - 1)..bars.len() {
            let window = &bars[i + 1 - k_period..=i];
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let range = highest - lowest;
            raw_k[i] = if range > 0.0 {
                100.0 * (bars[i].close - lowest) / range
            } else {
                0.0
            };
        }
    }

    let k = rolling_sma(&raw_k, k_smooth.max(1));
    let d = rolling_sma(&k, d_period);

    IndicatorSeries {
        indicator_type: IndicatorType::Stochastic {
            k_period,
            k_smooth,
            d_period,
        },
        values: k
            .iter()
            .zip(&d)
            .map(|(&k, &d)| IndicatorValue::Stochastic { k, d })
            .collect(),
    }
}
