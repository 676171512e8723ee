//! Daily floor pivot points from the previous completed day's high, low and close.
//!
//! P = (H + L + C) / 3, R1 = 2P - L, S1 = 2P - H, R2 = P + (H - L),
//! S2 = P - (H - L), R3 = H + 2(P - L), S3 = L - 2(H - P).
//! Bars of the first day have no prior day and stay `NaN`.

use chrono::NaiveDate;

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

fn floor_pivots(high: f64, low: f64, close: f64) -> IndicatorValue {
    let pivot = (high + low + close) / 3.0;
    IndicatorValue::Pivot {
        pivot,
        r1: 2.0 * pivot - low,
        r2: pivot + (high - low),
        r3: high + 2.0 * (pivot - low),
        s1: 2.0 * pivot - high,
        s2: pivot - (high - low),
        s3: low - 2.0 * (high - pivot),
    }
}

fn empty_pivot() -> IndicatorValue {
    IndicatorValue::Pivot {
        pivot: f64::NAN,
        r1: f64::NAN,
        r2: f64::NAN,
        r3: f64::NAN,
        s1: f64::NAN,
        s2: f64::NAN,
        s3: f64::NAN,
    }
}

pub fn calculate_pivot_points(bars: &[Bar]) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut day: Option<NaiveDate> = None;
    let (mut high, mut low, mut close) = (f64::NAN, f64::NAN, f64::NAN);
    let mut current = empty_pivot();

    for bar in bars {
        match day {
            Some(d) if d == bar.date() => {
                high = high.max(bar.high);
                low = low.min(bar.low);
            }
            Some(_) => {
                current = floor_pivots(high, low, close);
                high = bar.high;
                low = bar.low;
            }
            None => {
                high = bar.high;
                low = bar.low;
            }
        }
        day = Some(bar.date());
        close = bar.close;
        values.push(current);
    }

    IndicatorSeries {
        indicator_type: IndicatorType::PivotPoints,
        values,
    }
}
