//! Rule evaluation against bars and precomputed indicator series.
//!
//! # Evaluation Semantics
//!
//! - Sources resolve to `NaN` when missing or still warming up; every
//!   comparison involving `NaN` is false.
//! - `crosses_above`/`crosses_below` compare the sign of `left - right` on the
//!   previous and current bar and are false at bar 0.
//! - `==` is approximate (`|l - r| < 1e-9`).
//! - A list without any `or` row fires only when every row holds. Its
//!   direction comes from the first row's explicit direction, then the first
//!   explicit direction among the remaining rows, then the first row's operator.
//! - A list containing an `or` row is evaluated row by row; the first row that
//!   holds decides the direction (explicit, else from its operator).

use crate::domain::error::TradesimError;
use crate::domain::indicator::{IndicatorConfig, IndicatorSeries, IndicatorValue};
use crate::domain::ohlcv::Bar;
use crate::domain::position::TradeDirection;
use crate::domain::rule::{
    ConditionRule, IndicatorField, Logic, Operator, PriceField, RuleDirection, Source,
};
use std::collections::HashMap;

const EPSILON: f64 = 1e-9;

/// Indicator series keyed by the id the strategy declared them under.
pub type IndicatorMap = HashMap<String, IndicatorSeries>;

#[derive(Debug, Clone, PartialEq)]
struct CompiledRule {
    left: Source,
    operator: Operator,
    right: Source,
    logic: Logic,
    direction: Option<RuleDirection>,
}

/// A rule list with every source parsed and checked against the declared
/// indicators.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
    any_or: bool,
}

impl CompiledRules {
    pub fn compile(
        rules: &[ConditionRule],
        indicators: &[IndicatorConfig],
    ) -> Result<Self, TradesimError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    left: Source::parse(&rule.left, indicators)?,
                    operator: rule.operator,
                    right: Source::parse(&rule.right, indicators)?,
                    logic: rule.logic,
                    direction: rule.direction,
                })
            })
            .collect::<Result<Vec<_>, TradesimError>>()?;
        let any_or = rules.iter().any(|r| r.logic == Logic::Or);
        Ok(CompiledRules { rules, any_or })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Entry signal at `index`. An explicit `both` carries no side for an
    /// entry, so the operator decides.
    pub fn entry_signal(
        &self,
        bars: &[Bar],
        indicators: &IndicatorMap,
        index: usize,
    ) -> Option<TradeDirection> {
        let direction = self.fire(bars, indicators, index, |d| match d {
            Some(RuleDirection::Both) => None,
            other => other,
        })?;
        match direction {
            RuleDirection::Long => Some(TradeDirection::Long),
            RuleDirection::Short => Some(TradeDirection::Short),
            RuleDirection::Both => None,
        }
    }

    /// Exit signal at `index`; `both` closes every side.
    pub fn exit_signal(
        &self,
        bars: &[Bar],
        indicators: &IndicatorMap,
        index: usize,
    ) -> Option<RuleDirection> {
        self.fire(bars, indicators, index, |d| d)
    }

    fn fire(
        &self,
        bars: &[Bar],
        indicators: &IndicatorMap,
        index: usize,
        explicit: impl Fn(Option<RuleDirection>) -> Option<RuleDirection>,
    ) -> Option<RuleDirection> {
        let first = self.rules.first()?;
        if index >= bars.len() {
            return None;
        }

        if self.any_or {
            return self
                .rules
                .iter()
                .find(|rule| evaluate_rule(rule, bars, indicators, index))
                .map(|rule| {
                    explicit(rule.direction)
                        .unwrap_or_else(|| rule.operator.inferred_direction().into())
                });
        }

        if !self
            .rules
            .iter()
            .all(|rule| evaluate_rule(rule, bars, indicators, index))
        {
            return None;
        }

        explicit(first.direction)
            .or_else(|| self.rules[1..].iter().find_map(|r| explicit(r.direction)))
            .or_else(|| Some(first.operator.inferred_direction().into()))
    }
}

fn evaluate_rule(
    rule: &CompiledRule,
    bars: &[Bar],
    indicators: &IndicatorMap,
    index: usize,
) -> bool {
    let left = resolve(&rule.left, bars, indicators, index);
    let right = resolve(&rule.right, bars, indicators, index);

    match rule.operator {
        Operator::CrossesAbove | Operator::CrossesBelow => {
            if index == 0 {
                return false;
            }
            let prev_left = resolve(&rule.left, bars, indicators, index - 1);
            let prev_right = resolve(&rule.right, bars, indicators, index - 1);
            let prev = prev_left - prev_right;
            let curr = left - right;
            if !prev.is_finite() || !curr.is_finite() {
                return false;
            }
            if rule.operator == Operator::CrossesAbove {
                prev <= 0.0 && curr > 0.0
            } else {
                prev >= 0.0 && curr < 0.0
            }
        }
        Operator::Greater => left > right,
        Operator::Less => left < right,
        Operator::GreaterOrEqual => left >= right,
        Operator::LessOrEqual => left <= right,
        Operator::Equal => (left - right).abs() < EPSILON,
    }
}

/// Value of `source` at `bars[index]`, `NaN` when unavailable.
pub fn resolve(source: &Source, bars: &[Bar], indicators: &IndicatorMap, index: usize) -> f64 {
    match source {
        Source::Literal(v) => *v,
        Source::Price(field) => match bars.get(index) {
            Some(bar) => match field {
                PriceField::Open => bar.open,
                PriceField::High => bar.high,
                PriceField::Low => bar.low,
                PriceField::Close => bar.close,
                PriceField::Volume => bar.volume,
                PriceField::Typical => bar.typical_price(),
            },
            None => f64::NAN,
        },
        Source::Indicator { id, field } => indicators
            .get(id)
            .and_then(|series| series.values.get(index))
            .map_or(f64::NAN, |value| extract_field(value, *field)),
    }
}

fn extract_field(value: &IndicatorValue, field: IndicatorField) -> f64 {
    match (value, field) {
        (IndicatorValue::Simple(v), IndicatorField::Value) => *v,
        (IndicatorValue::Macd { line, .. }, IndicatorField::MacdLine) => *line,
        (IndicatorValue::Macd { signal, .. }, IndicatorField::MacdSignal) => *signal,
        (IndicatorValue::Macd { histogram, .. }, IndicatorField::MacdHistogram) => *histogram,
        (IndicatorValue::Stochastic { k, .. }, IndicatorField::StochasticK) => *k,
        (IndicatorValue::Stochastic { d, .. }, IndicatorField::StochasticD) => *d,
        (IndicatorValue::Bollinger { upper, .. }, IndicatorField::BollingerUpper) => *upper,
        (IndicatorValue::Bollinger { middle, .. }, IndicatorField::BollingerMiddle) => *middle,
        (IndicatorValue::Bollinger { lower, .. }, IndicatorField::BollingerLower) => *lower,
        (IndicatorValue::Adx { adx, .. }, IndicatorField::Adx) => *adx,
        (IndicatorValue::Adx { plus_di, .. }, IndicatorField::PlusDi) => *plus_di,
        (IndicatorValue::Adx { minus_di, .. }, IndicatorField::MinusDi) => *minus_di,
        (IndicatorValue::Pivot { pivot, .. }, IndicatorField::Pivot) => *pivot,
        (IndicatorValue::Pivot { r1, .. }, IndicatorField::R1) => *r1,
        (IndicatorValue::Pivot { r2, .. }, IndicatorField::R2) => *r2,
        (IndicatorValue::Pivot { r3, .. }, IndicatorField::R3) => *r3,
        (IndicatorValue::Pivot { s1, .. }, IndicatorField::S1) => *s1,
        (IndicatorValue::Pivot { s2, .. }, IndicatorField::S2) => *s2,
        (IndicatorValue::Pivot { s3, .. }, IndicatorField::S3) => *s3,
        _ => f64::NAN,
    }
}
