//! Strategy configuration: indicators, rules, risk and filters.
//!
//! Everything here is plain serde data so a configuration can be cloned,
//! turned into a JSON tree, edited by path and read back.

use crate::domain::error::TradesimError;
use crate::domain::filters::FilterConfig;
use crate::domain::indicator::IndicatorConfig;
use crate::domain::rule::ConditionRule;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
    #[serde(default)]
    pub entry_rules: Vec<ConditionRule>,
    #[serde(default)]
    pub exit_rules: Vec<ConditionRule>,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub filters: FilterConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            name: "unnamed".into(),
            indicators: Vec::new(),
            entry_rules: Vec::new(),
            exit_rules: Vec::new(),
            risk: RiskConfig::default(),
            filters: FilterConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Structural checks: indicator ids and parameters, then risk settings.
    /// Rule sources are checked when the rules are compiled.
    pub fn validate(&self) -> Result<(), TradesimError> {
        let mut seen = std::collections::HashSet::new();
        for indicator in &self.indicators {
            if indicator.id.is_empty() || indicator.id.contains('.') {
                return Err(TradesimError::configuration(format!(
                    "invalid indicator id '{}'",
                    indicator.id
                )));
            }
            if !seen.insert(indicator.id.as_str()) {
                return Err(TradesimError::configuration(format!(
                    "duplicate indicator id '{}'",
                    indicator.id
                )));
            }
            indicator.indicator_type.validate().map_err(|reason| {
                TradesimError::configuration(format!("indicator '{}': {}", indicator.id, reason))
            })?;
        }
        self.risk.validate()
    }
}

/// Distance from entry to the protective stop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StopMethod {
    #[default]
    None,
    Fixed { pips: f64 },
    Atr { period: usize, multiplier: f64 },
    Adr { period: usize, percent: f64 },
    Percent { percent: f64 },
}

/// Distance from entry to a profit target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TargetMethod {
    #[default]
    None,
    Fixed { pips: f64 },
    Atr { period: usize, multiplier: f64 },
    Adr { period: usize, percent: f64 },
    Percent { percent: f64 },
    RiskReward { ratio: f64 },
}

fn method_args(text: &str) -> Result<(String, Vec<f64>), String> {
    let mut parts = text.split(':').map(str::trim);
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args = parts
        .map(|p| p.parse::<f64>().map_err(|_| format!("'{}' is not a number", p)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((name, args))
}

fn arity(name: &str, args: &[f64], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "'{}' takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        ))
    }
}

/// Whole, non-negative period argument; `14.7` or `-3` are rejected.
fn period_arg(value: f64) -> Result<usize, String> {
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as usize)
    } else {
        Err(format!("'{}' is not a whole number of bars", value))
    }
}

impl StopMethod {
    /// Parse `none`, `fixed:<pips>`, `atr:<period>:<mult>`, `adr:<period>:<pct>`
    /// or `percent:<pct>`.
    pub fn parse(text: &str) -> Result<StopMethod, String> {
        let (name, a) = method_args(text)?;
        match name.as_str() {
            "none" | "" => Ok(StopMethod::None),
            "fixed" => arity(&name, &a, 1).map(|_| StopMethod::Fixed { pips: a[0] }),
            "atr" => {
                arity(&name, &a, 2)?;
                Ok(StopMethod::Atr {
                    period: period_arg(a[0])?,
                    multiplier: a[1],
                })
            }
            "adr" => {
                arity(&name, &a, 2)?;
                Ok(StopMethod::Adr {
                    period: period_arg(a[0])?,
                    percent: a[1],
                })
            }
            "percent" => arity(&name, &a, 1).map(|_| StopMethod::Percent { percent: a[0] }),
            other => Err(format!("unknown stop method '{}'", other)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, StopMethod::None)
    }
}

impl TargetMethod {
    /// Same forms as [`StopMethod::parse`] plus `rr:<ratio>`.
    pub fn parse(text: &str) -> Result<TargetMethod, String> {
        let (name, a) = method_args(text)?;
        if name == "rr" || name == "risk_reward" {
            return arity(&name, &a, 1).map(|_| TargetMethod::RiskReward { ratio: a[0] });
        }
        Ok(match StopMethod::parse(text)? {
            StopMethod::None => TargetMethod::None,
            StopMethod::Fixed { pips } => TargetMethod::Fixed { pips },
            StopMethod::Atr { period, multiplier } => TargetMethod::Atr { period, multiplier },
            StopMethod::Adr { period, percent } => TargetMethod::Adr { period, percent },
            StopMethod::Percent { percent } => TargetMethod::Percent { percent },
        })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, TargetMethod::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Constant number of units per entry.
    Fixed { units: f64 },
    /// Risk this percent of the balance between entry and stop.
    RiskPercent { percent: f64 },
}

impl Default for PositionSizing {
    fn default() -> Self {
        PositionSizing::Fixed { units: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub distance: StopMethod,
    /// Profit in pips before the trail starts moving.
    #[serde(default)]
    pub activation_pips: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub initial_balance: f64,
    pub sizing: PositionSizing,
    pub max_open_trades: usize,
    pub pip_size: f64,
    pub contract_size: f64,
    pub stop_loss: StopMethod,
    pub take_profit: TargetMethod,
    pub take_profit_2: Option<TargetMethod>,
    /// Fraction of the size assigned to the first-target trade.
    pub lot_split: Option<f64>,
    pub breakeven_on_tp1: bool,
    pub trailing_stop: Option<TrailingStop>,
    pub close_on_reversal: bool,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            initial_balance: 10_000.0,
            sizing: PositionSizing::default(),
            max_open_trades: 1,
            pip_size: 0.0001,
            contract_size: 1.0,
            stop_loss: StopMethod::None,
            take_profit: TargetMethod::None,
            take_profit_2: None,
            lot_split: None,
            breakeven_on_tp1: false,
            trailing_stop: None,
            close_on_reversal: true,
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

impl RiskConfig {
    /// Account-level checks shared by every driver: balance, units and costs.
    pub fn validate_account(&self) -> Result<(), TradesimError> {
        let fail = |reason: &str| -> Result<(), TradesimError> {
            Err(TradesimError::configuration(reason.to_string()))
        };

        if !(self.initial_balance > 0.0) {
            return fail("initial balance must be positive");
        }
        if !(self.pip_size > 0.0) {
            return fail("pip size must be positive");
        }
        if !(self.contract_size > 0.0) {
            return fail("contract size must be positive");
        }
        if self.max_open_trades == 0 {
            return fail("max open trades must be at least 1");
        }
        if self.lot_split.is_some() && self.max_open_trades < 2 {
            return fail("lot split needs max open trades of at least 2");
        }
        if self.slippage_pct < 0.0 || self.commission_per_trade < 0.0 || self.commission_pct < 0.0 {
            return fail("costs must not be negative");
        }
        match self.sizing {
            PositionSizing::Fixed { units } if !(units > 0.0) => {
                fail("fixed position size must be positive")
            }
            PositionSizing::RiskPercent { percent } if !(percent > 0.0) => {
                fail("risk percent must be positive")
            }
            _ => Ok(()),
        }
    }

    /// Reject combinations the rule-driven engine cannot execute.
    pub fn validate(&self) -> Result<(), TradesimError> {
        let fail = |reason: &str| -> Result<(), TradesimError> {
            Err(TradesimError::configuration(reason.to_string()))
        };

        self.validate_account()?;
        if matches!(self.sizing, PositionSizing::RiskPercent { .. }) && self.stop_loss.is_none() {
            return fail("risk-percent sizing requires a stop-loss method");
        }

        let targets = std::iter::once(&self.take_profit).chain(self.take_profit_2.iter());
        for target in targets {
            if matches!(target, TargetMethod::RiskReward { .. }) && self.stop_loss.is_none() {
                return fail("risk:reward target requires a stop-loss method");
            }
            if let TargetMethod::Atr { period: 0, .. } | TargetMethod::Adr { period: 0, .. } =
                target
            {
                return fail("target period must be at least 1");
            }
        }
        if let StopMethod::Atr { period: 0, .. } | StopMethod::Adr { period: 0, .. } =
            self.stop_loss
        {
            return fail("stop period must be at least 1");
        }

        if let Some(fraction) = self.lot_split {
            if !(fraction > 0.0 && fraction < 1.0) {
                return fail("lot split must be between 0 and 1");
            }
            if self.take_profit_2.is_none() || self.take_profit.is_none() {
                return fail("lot split requires both take-profit targets");
            }
        }
        if let Some(trailing) = &self.trailing_stop {
            if trailing.distance.is_none() {
                return fail("trailing stop needs a distance method");
            }
        }
        Ok(())
    }
}
