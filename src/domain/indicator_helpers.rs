//! Shared helper functions for indicator calculations.
//!
//! All helpers work on `f64` slices where `NaN` marks "no value yet" and
//! return vectors of the same length as their input.

/// Rolling simple mean. A window containing any `NaN` yields `NaN`.
pub fn rolling_sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;

    for i in 0..values.len() {
        let v = values[i];
        if v.is_finite() {
            sum += v;
        } else {
            nan_count += 1;
        }

        if i >= period {
            let old = values[i - period];
            if old.is_finite() {
                sum -= old;
            } else {
                nan_count -= 1;
            }
        }

        if i + 1 >= period && nan_count == 0 {
            out[i] = sum / period as f64;
        }
    }

    out
}

/// Exponential mean with k = 2/(n+1), seeded by the SMA of the first `period`
/// finite values. Leading `NaN`s are skipped so EMAs can be chained.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    let Some(start) = values.iter().position(|v| v.is_finite()) else {
        return out;
    };
    let seed_end = start + period - 1;
    if seed_end >= values.len() {
        return out;
    }

    let seed = values[start..=seed_end].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = seed;
    out[seed_end] = ema;
    for i in (seed_end + 1)..values.len() {
        if values[i].is_finite() {
            ema = values[i] * k + ema * (1.0 - k);
        }
        out[i] = ema;
    }

    out
}

/// Population standard deviation over a rolling window.
pub fn rolling_stddev(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / period as f64;
        out[i] = variance.sqrt();
    }

    out
}

#[cfg(test)]
pub(crate) fn bars_from_closes(closes: &[f64]) -> Vec<crate::domain::ohlcv::Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| crate::domain::ohlcv::Bar {
            timestamp: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Wavy intraday series: `count` bars spaced `minutes` apart from 2024-01-01 00:00.
#[cfg(test)]
pub(crate) fn intraday_bars(count: usize, minutes: i64) -> Vec<crate::domain::ohlcv::Bar> {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x / 5.0).sin() * 4.0 + x * 0.05;
            crate::domain::ohlcv::Bar {
                timestamp: start + chrono::Duration::minutes(minutes * i as i64),
                open: close - 0.3,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0 + (i % 7) as f64 * 100.0,
            }
        })
        .collect()
}
