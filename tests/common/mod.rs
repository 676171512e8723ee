#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::io::Write;
use tradesim::domain::error::TradesimError;
pub use tradesim::domain::ohlcv::Bar;
use tradesim::domain::indicator::{IndicatorConfig, IndicatorType};
use tradesim::domain::rule::{ConditionRule, Operator};
use tradesim::domain::strategy::{RiskConfig, StopMethod, StrategyConfig, TargetMethod};
use tradesim::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TradesimError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TradesimError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, TradesimError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn day(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i as i64)
}

/// Daily bars opening at the previous close, with no wicks beyond the body.
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: day(i),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

/// 60 flat bars at 100, 60 bars up by 0.1, 80 bars down by 0.1.
pub fn trend_up_then_down() -> Vec<Bar> {
    let closes: Vec<f64> = (0..200)
        .map(|i| match i {
            0..60 => 100.0,
            60..120 => 100.0 + 0.1 * (i - 59) as f64,
            _ => 106.0 - 0.1 * (i - 119) as f64,
        })
        .collect();
    make_bars(&closes)
}

pub fn wave(count: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| 100.0 + (i as f64 / 4.0).sin() * 3.0 + (i as f64 / 17.0).cos() * 2.0)
        .collect();
    make_bars(&closes)
}

/// Long on SMA(fast) crossing above SMA(slow), 50-pip stop, 100-pip target.
pub fn sma_cross_strategy(fast: usize, slow: usize) -> StrategyConfig {
    StrategyConfig {
        name: "SMA Cross".into(),
        indicators: vec![
            IndicatorConfig::new("fast", IndicatorType::Sma { period: fast }),
            IndicatorConfig::new("slow", IndicatorType::Sma { period: slow }),
        ],
        entry_rules: vec![ConditionRule::new("fast", Operator::CrossesAbove, "slow")],
        exit_rules: vec![],
        risk: RiskConfig {
            pip_size: 0.01,
            stop_loss: StopMethod::Fixed { pips: 50.0 },
            take_profit: TargetMethod::Fixed { pips: 100.0 },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn write_temp_file(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn bars_to_csv(bars: &[Bar]) -> String {
    let mut csv = String::from("timestamp,open,high,low,close,volume\n");
    for bar in bars {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    csv
}
