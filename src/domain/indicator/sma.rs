//! Simple Moving Average indicator.
//!
//! SMA[i] = mean(C[i-n+1..=i]). Warmup: first (n-1) bars are `NaN`.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::rolling_sma;
use crate::domain::ohlcv::{closes, Bar};

pub fn calculate_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple(
        IndicatorType::Sma { period },
        rolling_sma(&closes(bars), period),
    )
}
