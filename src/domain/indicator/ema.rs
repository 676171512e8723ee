//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are `NaN`.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::ema_series;
use crate::domain::ohlcv::{closes, Bar};

pub fn calculate_ema(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple(
        IndicatorType::Ema { period },
        ema_series(&closes(bars), period),
    )
}
