//! Condition rules and the sources they compare.
//!
//! A strategy states its entry and exit conditions as flat rows:
//! `left operator right`, chained with `and`/`or` and optionally pinned to a
//! trade direction. Sources are written as strings:
//! - price fields: `open`, `high`, `low`, `close`, `volume`, `typical`
//! - an indicator id (`fast`) or one of its channels (`macd.signal`, `bb.upper`)
//! - numeric literals (`70`, `-0.5`)

use crate::domain::error::TradesimError;
use crate::domain::indicator::{IndicatorConfig, IndicatorType};
use crate::domain::position::TradeDirection;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "crosses_above")]
    CrossesAbove,
    #[serde(rename = "crosses_below")]
    CrossesBelow,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl Operator {
    pub fn parse(text: &str) -> Option<Operator> {
        match text.trim().to_ascii_lowercase().as_str() {
            "crosses_above" => Some(Operator::CrossesAbove),
            "crosses_below" => Some(Operator::CrossesBelow),
            ">" => Some(Operator::Greater),
            "<" => Some(Operator::Less),
            ">=" => Some(Operator::GreaterOrEqual),
            "<=" => Some(Operator::LessOrEqual),
            "==" | "=" => Some(Operator::Equal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::CrossesAbove => "crosses_above",
            Operator::CrossesBelow => "crosses_below",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "==",
        }
    }

    /// Direction implied by the operator alone. `==` carries no sign and
    /// defaults to long.
    pub fn inferred_direction(&self) -> TradeDirection {
        match self {
            Operator::CrossesBelow | Operator::Less | Operator::LessOrEqual => {
                TradeDirection::Short
            }
            Operator::CrossesAbove
            | Operator::Greater
            | Operator::GreaterOrEqual
            | Operator::Equal => TradeDirection::Long,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDirection {
    Long,
    Short,
    Both,
}

impl RuleDirection {
    pub fn covers(&self, direction: TradeDirection) -> bool {
        match self {
            RuleDirection::Both => true,
            RuleDirection::Long => direction == TradeDirection::Long,
            RuleDirection::Short => direction == TradeDirection::Short,
        }
    }
}

impl From<TradeDirection> for RuleDirection {
    fn from(direction: TradeDirection) -> Self {
        match direction {
            TradeDirection::Long => RuleDirection::Long,
            TradeDirection::Short => RuleDirection::Short,
        }
    }
}

/// One `left operator right` row of an entry or exit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    #[serde(deserialize_with = "source_text")]
    pub left: String,
    pub operator: Operator,
    #[serde(deserialize_with = "source_text")]
    pub right: String,
    #[serde(default)]
    pub logic: Logic,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<RuleDirection>,
}

impl ConditionRule {
    pub fn new(left: &str, operator: Operator, right: &str) -> Self {
        ConditionRule {
            left: left.to_string(),
            operator,
            right: right.to_string(),
            logic: Logic::And,
            direction: None,
        }
    }

    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = logic;
        self
    }

    pub fn with_direction(mut self, direction: RuleDirection) -> Self {
        self.direction = Some(direction);
        self
    }
}

impl fmt::Display for ConditionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)
    }
}

// Sources may arrive as JSON numbers when a parameter search writes a threshold.
fn source_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
    Typical,
}

impl PriceField {
    pub fn parse(text: &str) -> Option<PriceField> {
        match text {
            "open" => Some(PriceField::Open),
            "high" => Some(PriceField::High),
            "low" => Some(PriceField::Low),
            "close" => Some(PriceField::Close),
            "volume" => Some(PriceField::Volume),
            "typical" => Some(PriceField::Typical),
            _ => None,
        }
    }
}

/// Which channel of an indicator value a source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorField {
    Value,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    StochasticK,
    StochasticD,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    Adx,
    PlusDi,
    MinusDi,
    Pivot,
    R1,
    R2,
    R3,
    S1,
    S2,
    S3,
}

impl IndicatorField {
    /// Channel `name` of `indicator_type`, or its primary channel when `None`.
    pub fn for_indicator(indicator_type: &IndicatorType, name: Option<&str>) -> Option<Self> {
        use IndicatorField::*;
        match indicator_type {
            IndicatorType::Macd { .. } => match name {
                None | Some("line") | Some("macd") => Some(MacdLine),
                Some("signal") => Some(MacdSignal),
                Some("histogram") | Some("hist") => Some(MacdHistogram),
                _ => None,
            },
            IndicatorType::Stochastic { .. } => match name {
                None | Some("k") => Some(StochasticK),
                Some("d") => Some(StochasticD),
                _ => None,
            },
            IndicatorType::Bollinger { .. } => match name {
                None | Some("middle") => Some(BollingerMiddle),
                Some("upper") => Some(BollingerUpper),
                Some("lower") => Some(BollingerLower),
                _ => None,
            },
            IndicatorType::Adx { .. } => match name {
                None | Some("adx") => Some(Adx),
                Some("plus_di") => Some(PlusDi),
                Some("minus_di") => Some(MinusDi),
                _ => None,
            },
            IndicatorType::PivotPoints => match name {
                None | Some("pivot") => Some(Pivot),
                Some("r1") => Some(R1),
                Some("r2") => Some(R2),
                Some("r3") => Some(R3),
                Some("s1") => Some(S1),
                Some("s2") => Some(S2),
                Some("s3") => Some(S3),
                _ => None,
            },
            _ => match name {
                None | Some("value") => Some(Value),
                _ => None,
            },
        }
    }
}

/// A parsed rule operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Price(PriceField),
    Indicator { id: String, field: IndicatorField },
    Literal(f64),
}

impl Source {
    /// Parse `text` against the strategy's declared indicators.
    pub fn parse(text: &str, indicators: &[IndicatorConfig]) -> Result<Source, TradesimError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TradesimError::configuration("empty rule source"));
        }
        if let Ok(value) = text.parse::<f64>() {
            if value.is_finite() {
                return Ok(Source::Literal(value));
            }
        }
        if let Some(field) = PriceField::parse(text) {
            return Ok(Source::Price(field));
        }

        let (id, channel) = match text.split_once('.') {
            Some((id, channel)) => (id, Some(channel)),
            None => (text, None),
        };
        let config = indicators.iter().find(|c| c.id == id).ok_or_else(|| {
            TradesimError::configuration(format!("rule references unknown indicator '{}'", id))
        })?;
        let field = IndicatorField::for_indicator(&config.indicator_type, channel).ok_or_else(|| {
            TradesimError::configuration(format!(
                "indicator '{}' ({}) has no channel '{}'",
                id,
                config.indicator_type,
                channel.unwrap_or_default()
            ))
        })?;

        Ok(Source::Indicator {
            id: id.to_string(),
            field,
        })
    }
}
