//! Entry filters: session window, weekdays, ADX band and volatility band.
//!
//! Filters only gate new entries. A band whose indicator is still warming up
//! blocks entries.

use crate::domain::indicator::adx::calculate_adx;
use crate::domain::indicator::atr::atr_values;
use crate::domain::indicator::IndicatorValue;
use crate::domain::ohlcv::Bar;
use chrono::{Datelike, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionWindow {
    /// Half-open `[start, end)`; a window with `start > end` wraps past midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = time.num_seconds_from_midnight();
        let start = self.start.num_seconds_from_midnight();
        let end = self.end.num_seconds_from_midnight();
        if start <= end {
            (start..end).contains(&t) || start == end
        } else {
            t >= start || t < end
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxBand {
    pub period: usize,
    pub min: f64,
    pub max: f64,
}

/// ATR expressed as a percent of the close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityBand {
    pub period: usize,
    pub min_pct: f64,
    pub max_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub session: Option<SessionWindow>,
    pub weekdays: Option<Vec<Weekday>>,
    pub adx: Option<AdxBand>,
    pub volatility: Option<VolatilityBand>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        self.session.is_none()
            && self.weekdays.is_none()
            && self.adx.is_none()
            && self.volatility.is_none()
    }
}

/// Filters bound to a bar series, with band indicators precomputed.
#[derive(Debug, Clone)]
pub struct FilterSet {
    config: FilterConfig,
    adx: Vec<f64>,
    volatility: Vec<f64>,
}

impl FilterSet {
    pub fn new(config: &FilterConfig, bars: &[Bar]) -> Self {
        let adx = match &config.adx {
            Some(band) => calculate_adx(bars, band.period)
                .values
                .iter()
                .map(|v| match v {
                    IndicatorValue::Adx { adx, .. } => *adx,
                    _ => f64::NAN,
                })
                .collect(),
            None => Vec::new(),
        };
        let volatility = match &config.volatility {
            Some(band) => atr_values(bars, band.period)
                .iter()
                .zip(bars)
                .map(|(atr, bar)| {
                    if bar.close != 0.0 {
                        100.0 * atr / bar.close
                    } else {
                        f64::NAN
                    }
                })
                .collect(),
            None => Vec::new(),
        };
        FilterSet {
            config: config.clone(),
            adx,
            volatility,
        }
    }

    /// Whether a new entry may be opened at `bars[index]`.
    pub fn allows(&self, index: usize, bar: &Bar) -> bool {
        if let Some(session) = &self.config.session {
            if !session.contains(bar.timestamp.time()) {
                return false;
            }
        }
        if let Some(days) = &self.config.weekdays {
            if !days.contains(&bar.timestamp.weekday()) {
                return false;
            }
        }
        if let Some(band) = &self.config.adx {
            let adx = self.adx.get(index).copied().unwrap_or(f64::NAN);
            if !(adx >= band.min && adx <= band.max) {
                return false;
            }
        }
        if let Some(band) = &self.config.volatility {
            let pct = self.volatility.get(index).copied().unwrap_or(f64::NAN);
            if !(pct >= band.min_pct && pct <= band.max_pct) {
                return false;
            }
        }
        true
    }
}
