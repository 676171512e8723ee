//! Volume Weighted Average Price, anchored to each calendar day.
//!
//! VWAP = Σ(typical × volume) / Σ volume since the first bar of the day.
//! A day with no volume so far reports the bar's typical price.

use chrono::NaiveDate;

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_vwap(bars: &[Bar]) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut day: Option<NaiveDate> = None;
    let mut pv_sum = 0.0;
    let mut vol_sum = 0.0;

    for bar in bars {
        if day != Some(bar.date()) {
            day = Some(bar.date());
            pv_sum = 0.0;
            vol_sum = 0.0;
        }
        let typical = bar.typical_price();
        pv_sum += typical * bar.volume;
        vol_sum += bar.volume;
        values.push(if vol_sum > 0.0 { pv_sum / vol_sum } else { typical });
    }

    IndicatorSeries::from_simple(IndicatorType::Vwap, values)
}
