//! Average Directional Index with Wilder smoothing.
//!
//! +DM/-DM and TR are summed over the first n changes, then smoothed with
//! S = S - S/n + x. DI = 100 × S(DM) / S(TR), DX = 100 × |+DI - -DI| / (+DI + -DI),
//! zero denominators give 0. ADX seeds at bar (2n-1) with the mean of the first n
//! DX values and then follows ADX = (ADX_prev × (n-1) + DX) / n.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { 100.0 * num / den }
}

pub fn calculate_adx(bars: &[Bar], period: usize) -> IndicatorSeries {
    let n = bars.len();
    let mut adx = vec![f64::NAN; n];
    let mut plus_di = vec![f64::NAN; n];
    let mut minus_di = vec![f64::NAN; n];

    if period > 0 && n > period {
        let mut sm_tr = 0.0;
        let mut sm_plus = 0.0;
        let mut sm_minus = 0.0;
        let mut dx_sum = 0.0;
        let mut current_adx = f64::NAN;

        for i in 1..n {
            let up_move = bars[i].high - bars[i - 1].high;
            let down_move = bars[i - 1].low - bars[i].low;
            let plus_dm = if up_move > down_move && up_move > 0.0 {
                up_move
            } else {
                0.0
            };
            let minus_dm = if down_move > up_move && down_move > 0.0 {
                down_move
            } else {
                0.0
            };
            let tr = bars[i].true_range(bars[i - 1].close);

            if i <= period {
                sm_tr += tr;
                sm_plus += plus_dm;
                sm_minus += minus_dm;
                if i < period {
                    continue;
                }
            } else {
                let p = period as f64;
                sm_tr = sm_tr - sm_tr / p + tr;
                sm_plus = sm_plus - sm_plus / p + plus_dm;
                sm_minus = sm_minus - sm_minus / p + minus_dm;
            }

            let pdi = ratio(sm_plus, sm_tr);
            let mdi = ratio(sm_minus, sm_tr);
            plus_di[i] = pdi;
            minus_di[i] = mdi;
            let dx = ratio((pdi - mdi).abs(), pdi + mdi);

            let dx_count = i + 1 - period;
            if dx_count < period {
                dx_sum += dx;
            } else if dx_count == period {
                dx_sum += dx;
                current_adx = dx_sum / period as f64;
                adx[i] = current_adx;
            } else {
                current_adx = (current_adx * (period - 1) as f64 + dx) / period as f64;
                adx[i] = current_adx;
            }
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Adx { period },
        values: (0..n)
            .map(|i| IndicatorValue::Adx {
                adx: adx[i],
                plus_di: plus_di[i],
                minus_di: minus_di[i],
            })
            .collect(),
    }
}
