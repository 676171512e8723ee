//! Typed configuration loaded from a `ConfigPort`.
//!
//! Sections:
//!
//! ```ini
//! [strategy]        name
//! [risk]            initial_balance, sizing, stop_loss, take_profit, ...
//! [filters]         session, days, adx, volatility
//! [indicator.<id>]  type plus that indicator's parameters
//! [entry.<n>]       left, operator, right, logic, direction
//! [exit.<n>]        same keys as entry rows
//! [structure]       type plus evaluator parameters
//! [walk_forward]    folds, train_pct, mode
//! [optimizer]       trials, method, objective, seed, holdout_pct, parallel
//! [param.<name>]    path, type, min, max, step, choices
//! ```
//!
//! Every parse failure names the section and key it came from. Section and
//! key names are case-insensitive, so indicator ids and the rule operands
//! that reference them are lower-cased.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use serde_json::{Map, Number, Value};

use crate::domain::error::TradesimError;
use crate::domain::filters::{AdxBand, FilterConfig, SessionWindow, VolatilityBand};
use crate::domain::indicator::{IndicatorConfig, IndicatorType};
use crate::domain::optimizer::space::{ParamKind, ParamSpec, ParamValue};
use crate::domain::optimizer::{Objective, OptimizerConfig, SearchMethod};
use crate::domain::rule::{ConditionRule, Logic, Operator, RuleDirection};
use crate::domain::strategy::{
    PositionSizing, RiskConfig, StopMethod, StrategyConfig, TargetMethod, TrailingStop,
};
use crate::domain::structure::StructureConfig;
use crate::domain::walk_forward::{WalkForwardConfig, WalkForwardMode};
use crate::ports::config_port::ConfigPort;

const STRATEGY: &str = "strategy";
const RISK: &str = "risk";
const FILTERS: &str = "filters";
const STRUCTURE: &str = "structure";
const WALK_FORWARD: &str = "walk_forward";
const OPTIMIZER: &str = "optimizer";

const INDICATOR_PREFIX: &str = "indicator.";
const ENTRY_PREFIX: &str = "entry.";
const EXIT_PREFIX: &str = "exit.";
const PARAM_PREFIX: &str = "param.";

/// Structure keys that always hold a list, even with a single value.
const LIST_KEYS: &[&str] = &["target_adr_pcts", "target_heights"];

pub fn load_strategy(config: &dyn ConfigPort) -> Result<StrategyConfig, TradesimError> {
    let strategy = StrategyConfig {
        name: require(config, STRATEGY, "name")?,
        indicators: load_indicators(config)?,
        entry_rules: load_rules(config, ENTRY_PREFIX)?,
        exit_rules: load_rules(config, EXIT_PREFIX)?,
        risk: load_risk(config)?,
        filters: load_filters(config)?,
    };
    strategy.validate()?;
    Ok(strategy)
}

/// `[risk]` over `RiskConfig::default()`. Only account-level checks run
/// here; the stop/target combination is checked by the driver that uses it.
pub fn load_risk(config: &dyn ConfigPort) -> Result<RiskConfig, TradesimError> {
    let defaults = RiskConfig::default();

    let trailing_stop = match parsed(config, RISK, "trailing_stop", StopMethod::parse)? {
        Some(distance) if !distance.is_none() => Some(TrailingStop {
            distance,
            activation_pips: number_or(config, RISK, "trailing_activation_pips", 0.0)?,
        }),
        _ => None,
    };

    let risk = RiskConfig {
        initial_balance: number_or(config, RISK, "initial_balance", defaults.initial_balance)?,
        sizing: parsed(config, RISK, "sizing", parse_sizing)?.unwrap_or(defaults.sizing),
        max_open_trades: number_or(config, RISK, "max_open_trades", defaults.max_open_trades)?,
        pip_size: number_or(config, RISK, "pip_size", defaults.pip_size)?,
        contract_size: number_or(config, RISK, "contract_size", defaults.contract_size)?,
        stop_loss: parsed(config, RISK, "stop_loss", StopMethod::parse)?
            .unwrap_or(defaults.stop_loss),
        take_profit: parsed(config, RISK, "take_profit", TargetMethod::parse)?
            .unwrap_or(defaults.take_profit),
        take_profit_2: parsed(config, RISK, "take_profit_2", TargetMethod::parse)?
            .filter(|method| !method.is_none()),
        lot_split: number(config, RISK, "lot_split")?,
        breakeven_on_tp1: flag(config, RISK, "breakeven_on_tp1", defaults.breakeven_on_tp1)?,
        trailing_stop,
        close_on_reversal: flag(config, RISK, "close_on_reversal", defaults.close_on_reversal)?,
        commission_per_trade: number_or(config, RISK, "commission_per_trade", 0.0)?,
        commission_pct: number_or(config, RISK, "commission_pct", 0.0)?,
        slippage_pct: number_or(config, RISK, "slippage_pct", 0.0)?,
    };
    risk.validate_account()?;
    Ok(risk)
}

pub fn load_filters(config: &dyn ConfigPort) -> Result<FilterConfig, TradesimError> {
    let session = parsed(config, FILTERS, "session", parse_session)?;
    let weekdays = parsed(config, FILTERS, "days", parse_weekdays)?;
    let adx = parsed(config, FILTERS, "adx", |text| {
        parse_band(text).map(|(period, min, max)| AdxBand { period, min, max })
    })?;
    let volatility = parsed(config, FILTERS, "volatility", |text| {
        parse_band(text).map(|(period, min_pct, max_pct)| VolatilityBand {
            period,
            min_pct,
            max_pct,
        })
    })?;
    Ok(FilterConfig {
        session,
        weekdays,
        adx,
        volatility,
    })
}

/// One indicator per `[indicator.<id>]` section.
pub fn load_indicators(config: &dyn ConfigPort) -> Result<Vec<IndicatorConfig>, TradesimError> {
    let mut indicators = Vec::new();
    for section in config.sections() {
        let Some(id) = section.strip_prefix(INDICATOR_PREFIX) else {
            continue;
        };
        require(config, &section, "type")?;
        let object = section_object(config, &section, &[])?;
        let kind: IndicatorType = serde_json::from_value(Value::Object(object))
            .map_err(|e| TradesimError::invalid(&section, "type", e.to_string()))?;
        kind.validate()
            .map_err(|reason| TradesimError::invalid(&section, "type", reason))?;
        indicators.push(IndicatorConfig::new(id, kind));
    }
    Ok(indicators)
}

/// Rows from `[<prefix><n>]` sections, ordered by `n`.
pub fn load_rules(
    config: &dyn ConfigPort,
    prefix: &str,
) -> Result<Vec<ConditionRule>, TradesimError> {
    let mut numbered = Vec::new();
    for section in config.sections() {
        let Some(suffix) = section.strip_prefix(prefix) else {
            continue;
        };
        let position: u32 = suffix.parse().map_err(|_| {
            TradesimError::invalid(&section, "section", "rule sections are numbered, e.g. entry.1")
        })?;
        numbered.push((position, load_rule(config, &section)?));
    }
    numbered.sort_by_key(|(position, _)| *position);
    Ok(numbered.into_iter().map(|(_, rule)| rule).collect())
}

fn load_rule(config: &dyn ConfigPort, section: &str) -> Result<ConditionRule, TradesimError> {
    let left = require(config, section, "left")?.to_ascii_lowercase();
    let right = require(config, section, "right")?.to_ascii_lowercase();
    let operator_text = require(config, section, "operator")?;
    let operator = Operator::parse(&operator_text).ok_or_else(|| {
        TradesimError::invalid(section, "operator", format!("unknown operator '{}'", operator_text))
    })?;

    let mut rule = ConditionRule::new(&left, operator, &right);
    if let Some(logic) = parsed(config, section, "logic", parse_logic)? {
        rule = rule.with_logic(logic);
    }
    if let Some(direction) = parsed(config, section, "direction", parse_direction)? {
        rule = rule.with_direction(direction);
    }
    Ok(rule)
}

/// `[structure]`, when present.
pub fn load_structure(config: &dyn ConfigPort) -> Result<Option<StructureConfig>, TradesimError> {
    if !config.has_section(STRUCTURE) {
        return Ok(None);
    }
    require(config, STRUCTURE, "type")?;
    let mut object = section_object(config, STRUCTURE, &["stop"])?;
    if let Some(stop) = parsed(config, STRUCTURE, "stop", parse_zone_stop)? {
        object.insert("stop".to_string(), stop);
    }
    let structure: StructureConfig = serde_json::from_value(Value::Object(object))
        .map_err(|e| TradesimError::invalid(STRUCTURE, "type", e.to_string()))?;
    Ok(Some(structure))
}

pub fn load_walk_forward(config: &dyn ConfigPort) -> Result<WalkForwardConfig, TradesimError> {
    let defaults = WalkForwardConfig::default();
    let walk_forward = WalkForwardConfig {
        n_folds: number_or(config, WALK_FORWARD, "folds", defaults.n_folds)?,
        train_pct: number_or(config, WALK_FORWARD, "train_pct", defaults.train_pct)?,
        mode: parsed(config, WALK_FORWARD, "mode", |text| {
            match text.to_ascii_lowercase().as_str() {
                "anchored" => Ok(WalkForwardMode::Anchored),
                "rolling" => Ok(WalkForwardMode::Rolling),
                other => Err(format!("unknown mode '{}'", other)),
            }
        })?
        .unwrap_or(defaults.mode),
    };
    if walk_forward.n_folds == 0 {
        return Err(TradesimError::invalid(WALK_FORWARD, "folds", "must be at least 1"));
    }
    if !(walk_forward.train_pct > 0.0 && walk_forward.train_pct < 1.0) {
        return Err(TradesimError::invalid(
            WALK_FORWARD,
            "train_pct",
            "must be between 0 and 1",
        ));
    }
    Ok(walk_forward)
}

pub fn load_optimizer(config: &dyn ConfigPort) -> Result<OptimizerConfig, TradesimError> {
    let defaults = OptimizerConfig::default();
    let optimizer = OptimizerConfig {
        method: parsed(config, OPTIMIZER, "method", |text| {
            SearchMethod::parse(text).ok_or_else(|| format!("unknown method '{}'", text))
        })?
        .unwrap_or(defaults.method),
        objective: parsed(config, OPTIMIZER, "objective", |text| {
            Objective::parse(text).ok_or_else(|| format!("unknown objective '{}'", text))
        })?
        .unwrap_or(defaults.objective),
        n_trials: number_or(config, OPTIMIZER, "trials", defaults.n_trials)?,
        seed: number(config, OPTIMIZER, "seed")?,
        holdout_pct: number(config, OPTIMIZER, "holdout_pct")?,
        parallel: flag(config, OPTIMIZER, "parallel", defaults.parallel)?,
    };
    if optimizer.n_trials == 0 {
        return Err(TradesimError::invalid(OPTIMIZER, "trials", "must be at least 1"));
    }
    if optimizer
        .holdout_pct
        .is_some_and(|pct| !(pct > 0.0 && pct < 1.0))
    {
        return Err(TradesimError::invalid(
            OPTIMIZER,
            "holdout_pct",
            "must be between 0 and 1",
        ));
    }
    Ok(optimizer)
}

/// One search dimension per `[param.<name>]` section.
pub fn load_param_specs(config: &dyn ConfigPort) -> Result<Vec<ParamSpec>, TradesimError> {
    let mut specs = Vec::new();
    for section in config.sections() {
        let Some(name) = section.strip_prefix(PARAM_PREFIX) else {
            continue;
        };
        let path = require(config, &section, "path")?;
        let kind_name = require(config, &section, "type")?.to_ascii_lowercase();
        let kind = match kind_name.as_str() {
            "int" => {
                let min: i64 = required_number(config, &section, "min")?;
                let max: i64 = required_number(config, &section, "max")?;
                let step: i64 = number_or(config, &section, "step", 1)?;
                if step < 1 {
                    return Err(TradesimError::invalid(&section, "step", "must be at least 1"));
                }
                if min > max {
                    return Err(TradesimError::invalid(&section, "max", "must not be below min"));
                }
                ParamKind::Int { min, max, step }
            }
            "float" => {
                let min: f64 = required_number(config, &section, "min")?;
                let max: f64 = required_number(config, &section, "max")?;
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return Err(TradesimError::invalid(
                        &section,
                        "max",
                        "bounds must be finite with min <= max",
                    ));
                }
                ParamKind::Float { min, max }
            }
            "categorical" => {
                let raw = require(config, &section, "choices")?;
                let choices: Vec<ParamValue> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|choice| !choice.is_empty())
                    .map(ParamValue::parse)
                    .collect();
                if choices.is_empty() {
                    return Err(TradesimError::invalid(&section, "choices", "no choices given"));
                }
                ParamKind::Categorical { choices }
            }
            other => {
                return Err(TradesimError::invalid(
                    &section,
                    "type",
                    format!("unknown parameter type '{}'", other),
                ));
            }
        };
        let spec = ParamSpec {
            name: name.to_string(),
            path,
            kind,
        };
        spec.validate()?;
        specs.push(spec);
    }
    Ok(specs)
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, TradesimError> {
    match config.get_string(section, key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(TradesimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Apply `parse` to a present, non-empty value.
fn parsed<T, E, F>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    parse: F,
) -> Result<Option<T>, TradesimError>
where
    E: Display,
    F: FnOnce(&str) -> Result<T, E>,
{
    match config.get_string(section, key) {
        Some(raw) if !raw.trim().is_empty() => parse(raw.trim())
            .map(Some)
            .map_err(|e| TradesimError::invalid(section, key, e.to_string())),
        _ => Ok(None),
    }
}

fn number<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, TradesimError>
where
    T: FromStr,
    T::Err: Display,
{
    parsed(config, section, key, |text| {
        text.parse::<T>()
            .map_err(|e| format!("'{}' is not a valid number ({})", text, e))
    })
}

fn number_or<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, TradesimError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(number(config, section, key)?.unwrap_or(default))
}

fn required_number<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, TradesimError>
where
    T: FromStr,
    T::Err: Display,
{
    number(config, section, key)?.ok_or_else(|| TradesimError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn flag(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, TradesimError> {
    Ok(parsed(config, section, key, |text| {
        match text.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(format!("'{}' is not a boolean", text)),
        }
    })?
    .unwrap_or(default))
}

/// A whole section as a JSON object, for serde-tagged configs. Keys listed
/// in `skip` are left for the caller.
fn section_object(
    config: &dyn ConfigPort,
    section: &str,
    skip: &[&str],
) -> Result<Map<String, Value>, TradesimError> {
    let mut object = Map::new();
    for key in config.keys(section) {
        if skip.contains(&key.as_str()) {
            continue;
        }
        let Some(raw) = config.get_string(section, &key) else {
            continue;
        };
        let value = if LIST_KEYS.contains(&key.as_str()) {
            Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(scalar)
                    .collect(),
            )
        } else {
            scalar(raw.trim())
        };
        object.insert(key, value);
    }
    Ok(object)
}

fn scalar(raw: &str) -> Value {
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Number(v.into());
    }
    if let Some(v) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(v);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_ascii_lowercase()),
    }
}

/// `fixed:<units>` or `risk:<percent>`.
fn parse_sizing(text: &str) -> Result<PositionSizing, String> {
    let (name, value) = text
        .split_once(':')
        .ok_or_else(|| format!("expected <method>:<value>, got '{}'", text))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    match name.trim().to_ascii_lowercase().as_str() {
        "fixed" | "units" => Ok(PositionSizing::Fixed { units: value }),
        "risk" | "risk_percent" => Ok(PositionSizing::RiskPercent { percent: value }),
        other => Err(format!("unknown sizing method '{}'", other)),
    }
}

/// `HH:MM-HH:MM`.
fn parse_session(text: &str) -> Result<SessionWindow, String> {
    let (start, end) = text
        .split_once('-')
        .ok_or_else(|| format!("expected HH:MM-HH:MM, got '{}'", text))?;
    let time = |part: &str| {
        NaiveTime::parse_from_str(part.trim(), "%H:%M")
            .map_err(|_| format!("'{}' is not a HH:MM time", part.trim()))
    };
    Ok(SessionWindow {
        start: time(start)?,
        end: time(end)?,
    })
}

fn parse_weekdays(text: &str) -> Result<Vec<Weekday>, String> {
    text.split(',')
        .map(str::trim)
        .filter(|day| !day.is_empty())
        .map(|day| {
            day.parse::<Weekday>()
                .map_err(|_| format!("'{}' is not a weekday", day))
        })
        .collect()
}

/// `period:min:max`.
fn parse_band(text: &str) -> Result<(usize, f64, f64), String> {
    let parts: Vec<&str> = text.split(':').map(str::trim).collect();
    let [period, min, max] = parts.as_slice() else {
        return Err(format!("expected period:min:max, got '{}'", text));
    };
    let period: usize = period
        .parse()
        .map_err(|_| format!("'{}' is not a period", period))?;
    let min: f64 = min.parse().map_err(|_| format!("'{}' is not a number", min))?;
    let max: f64 = max.parse().map_err(|_| format!("'{}' is not a number", max))?;
    if period == 0 || min > max {
        return Err(format!("'{}' needs a positive period and min <= max", text));
    }
    Ok((period, min, max))
}

fn parse_logic(text: &str) -> Result<Logic, String> {
    match text.to_ascii_lowercase().as_str() {
        "and" => Ok(Logic::And),
        "or" => Ok(Logic::Or),
        other => Err(format!("unknown logic '{}'", other)),
    }
}

fn parse_direction(text: &str) -> Result<RuleDirection, String> {
    match text.to_ascii_lowercase().as_str() {
        "long" => Ok(RuleDirection::Long),
        "short" => Ok(RuleDirection::Short),
        "both" => Ok(RuleDirection::Both),
        other => Err(format!("unknown direction '{}'", other)),
    }
}

/// `opposite_trigger`, `zone_boundary` or `fixed:<pips>`, as the tagged JSON
/// form of a zone stop.
fn parse_zone_stop(text: &str) -> Result<Value, String> {
    let lower = text.to_ascii_lowercase();
    let mut object = Map::new();
    match lower.split_once(':') {
        Some(("fixed", pips)) => {
            let pips: f64 = pips
                .trim()
                .parse()
                .map_err(|_| format!("'{}' is not a number", pips.trim()))?;
            object.insert("method".into(), Value::String("fixed".into()));
            object.insert(
                "pips".into(),
                Number::from_f64(pips)
                    .map(Value::Number)
                    .ok_or_else(|| format!("'{}' is not finite", pips))?,
            );
        }
        None if lower == "opposite_trigger" || lower == "zone_boundary" => {
            object.insert("method".into(), Value::String(lower.clone()));
        }
        _ => return Err(format!("unknown zone stop '{}'", text)),
    }
    Ok(Value::Object(object))
}
