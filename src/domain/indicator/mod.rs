//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters
//! - `IndicatorSeries`: One value per bar, `NaN` channels until warm-up
//! - `IndicatorConfig`: An indicator declared by a strategy under an id

pub mod adr;
pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod pivot_points;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod swing_pivot;
pub mod vwap;

use crate::domain::ohlcv::Bar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    Adx {
        adx: f64,
        plus_di: f64,
        minus_di: f64,
    },
    Pivot {
        pivot: f64,
        r1: f64,
        r2: f64,
        r3: f64,
        s1: f64,
        s2: f64,
        s3: f64,
    },
}

impl IndicatorValue {
    /// True once the primary channel has left warm-up.
    pub fn is_valid(&self) -> bool {
        let primary = match self {
            IndicatorValue::Simple(v) => *v,
            IndicatorValue::Macd { line, .. } => *line,
            IndicatorValue::Stochastic { k, .. } => *k,
            IndicatorValue::Bollinger { middle, .. } => *middle,
            IndicatorValue::Adx { adx, .. } => *adx,
            IndicatorValue::Pivot { pivot, .. } => *pivot,
        };
        primary.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorType {
    Sma {
        period: usize,
    },
    Ema {
        period: usize,
    },
    Rsi {
        period: usize,
    },
    Atr {
        period: usize,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        std_dev: f64,
    },
    Stochastic {
        k_period: usize,
        k_smooth: usize,
        d_period: usize,
    },
    Adx {
        period: usize,
    },
    PivotHigh {
        lookback: usize,
    },
    PivotLow {
        lookback: usize,
    },
    Adr {
        period: usize,
    },
    Vwap,
    PivotPoints,
}

impl IndicatorType {
    /// Names accepted for the `type` key of a declared indicator.
    pub fn kind_names() -> &'static [&'static str] {
        &[
            "sma",
            "ema",
            "rsi",
            "atr",
            "macd",
            "bollinger",
            "stochastic",
            "adx",
            "pivot_high",
            "pivot_low",
            "adr",
            "vwap",
            "pivot_points",
        ]
    }

    /// Reject parameter sets that can never produce a value.
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, v: usize| {
            if v == 0 {
                Err(format!("{} must be at least 1", name))
            } else {
                Ok(())
            }
        };
        match *self {
            IndicatorType::Sma { period }
            | IndicatorType::Ema { period }
            | IndicatorType::Rsi { period }
            | IndicatorType::Atr { period }
            | IndicatorType::Adx { period }
            | IndicatorType::Adr { period } => positive("period", period),
            IndicatorType::PivotHigh { lookback } | IndicatorType::PivotLow { lookback } => {
                positive("lookback", lookback)
            }
            IndicatorType::Macd { fast, slow, signal } => {
                positive("fast", fast)?;
                positive("slow", slow)?;
                positive("signal", signal)?;
                if fast >= slow {
                    return Err("fast period must be shorter than slow".to_string());
                }
                Ok(())
            }
            IndicatorType::Bollinger { period, std_dev } => {
                positive("period", period)?;
                if !(std_dev > 0.0) {
                    return Err("std_dev must be positive".to_string());
                }
                Ok(())
            }
            IndicatorType::Stochastic {
                k_period,
                k_smooth,
                d_period,
            } => {
                positive("k_period", k_period)?;
                positive("k_smooth", k_smooth)?;
                positive("d_period", d_period)
            }
            IndicatorType::Vwap | IndicatorType::PivotPoints => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorValue>,
}

impl IndicatorSeries {
    pub fn from_simple(indicator_type: IndicatorType, values: Vec<f64>) -> Self {
        IndicatorSeries {
            indicator_type,
            values: values.into_iter().map(IndicatorValue::Simple).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Single-channel value at `index`, `NaN` when out of range or not simple.
    pub fn simple_at(&self, index: usize) -> f64 {
        match self.values.get(index) {
            Some(IndicatorValue::Simple(v)) => *v,
            _ => f64::NAN,
        }
    }
}

/// An indicator declared by a strategy, referenced by rules through `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub id: String,
    #[serde(flatten)]
    pub indicator_type: IndicatorType,
}

impl IndicatorConfig {
    pub fn new(id: &str, indicator_type: IndicatorType) -> Self {
        IndicatorConfig {
            id: id.to_string(),
            indicator_type,
        }
    }
}

/// Compute one indicator over the full bar slice.
pub fn calculate(bars: &[Bar], indicator_type: &IndicatorType) -> IndicatorSeries {
    match indicator_type {
        IndicatorType::Sma { period } => sma::calculate_sma(bars, *period),
        IndicatorType::Ema { period } => ema::calculate_ema(bars, *period),
        IndicatorType::Rsi { period } => rsi::calculate_rsi(bars, *period),
        IndicatorType::Atr { period } => atr::calculate_atr(bars, *period),
        IndicatorType::Macd { fast, slow, signal } => {
            macd::calculate_macd(bars, *fast, *slow, *signal)
        }
        IndicatorType::Bollinger { period, std_dev } => {
            bollinger::calculate_bollinger(bars, *period, *std_dev)
        }
        IndicatorType::Stochastic {
            k_period,
            k_smooth,
            d_period,
        } => stochastic::calculate_stochastic(bars, *k_period, *k_smooth, *d_period),
        IndicatorType::Adx { period } => adx::calculate_adx(bars, *period),
        IndicatorType::PivotHigh { lookback } => swing_pivot::calculate_pivot_high(bars, *lookback),
        IndicatorType::PivotLow { lookback } => swing_pivot::calculate_pivot_low(bars, *lookback),
        IndicatorType::Adr { period } => adr::calculate_adr(bars, *period),
        IndicatorType::Vwap => vwap::calculate_vwap(bars),
        IndicatorType::PivotPoints => pivot_points::calculate_pivot_points(bars),
    }
}

/// Compute every declared indicator, keyed by id.
pub fn compute_indicators(
    bars: &[Bar],
    configs: &[IndicatorConfig],
) -> HashMap<String, IndicatorSeries> {
    configs
        .iter()
        .map(|cfg| (cfg.id.clone(), calculate(bars, &cfg.indicator_type)))
        .collect()
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma { period } => write!(f, "SMA({})", period),
            IndicatorType::Ema { period } => write!(f, "EMA({})", period),
            IndicatorType::Rsi { period } => write!(f, "RSI({})", period),
            IndicatorType::Atr { period } => write!(f, "ATR({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger { period, std_dev } => {
                write!(f, "BOLLINGER({},{})", period, std_dev)
            }
            IndicatorType::Stochastic {
                k_period,
                k_smooth,
                d_period,
            } => write!(f, "STOCHASTIC({},{},{})", k_period, k_smooth, d_period),
            IndicatorType::Adx { period } => write!(f, "ADX({})", period),
            IndicatorType::PivotHigh { lookback } => write!(f, "PIVOT_HIGH({})", lookback),
            IndicatorType::PivotLow { lookback } => write!(f, "PIVOT_LOW({})", lookback),
            IndicatorType::Adr { period } => write!(f, "ADR({})", period),
            IndicatorType::Vwap => write!(f, "VWAP"),
            IndicatorType::PivotPoints => write!(f, "PIVOT_POINTS"),
        }
    }
}
