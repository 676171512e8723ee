//! Tunable parameters: their ranges and sampled values.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::domain::error::TradesimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Integers first, then floats, otherwise text.
    pub fn parse(raw: &str) -> ParamValue {
        let raw = raw.trim();
        if let Ok(v) = raw.parse::<i64>() {
            ParamValue::Int(v)
        } else if let Ok(v) = raw.parse::<f64>() {
            ParamValue::Float(v)
        } else {
            ParamValue::Text(raw.to_string())
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Int(v) => serde_json::Value::from(*v),
            ParamValue::Float(v) => serde_json::Value::from(*v),
            ParamValue::Text(v) => serde_json::Value::from(v.as_str()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// One candidate: parameter name to value.
pub type ParamSet = BTreeMap<String, ParamValue>;

fn default_step() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Int {
        min: i64,
        max: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
    Float {
        min: f64,
        max: f64,
    },
    Categorical {
        choices: Vec<ParamValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    /// Dotted path into the serialized strategy configuration.
    pub path: String,
    #[serde(flatten)]
    pub kind: ParamKind,
}

impl ParamSpec {
    pub fn int(name: &str, path: &str, min: i64, max: i64, step: i64) -> Self {
        ParamSpec {
            name: name.to_string(),
            path: path.to_string(),
            kind: ParamKind::Int { min, max, step },
        }
    }

    pub fn float(name: &str, path: &str, min: f64, max: f64) -> Self {
        ParamSpec {
            name: name.to_string(),
            path: path.to_string(),
            kind: ParamKind::Float { min, max },
        }
    }

    pub fn categorical(name: &str, path: &str, choices: Vec<ParamValue>) -> Self {
        ParamSpec {
            name: name.to_string(),
            path: path.to_string(),
            kind: ParamKind::Categorical { choices },
        }
    }

    pub fn validate(&self) -> Result<(), TradesimError> {
        let fail = |reason: &str| -> Result<(), TradesimError> {
            Err(TradesimError::configuration(format!(
                "parameter '{}': {}",
                self.name, reason
            )))
        };

        if self.name.is_empty() {
            return fail("name must not be empty");
        }
        if self.path.is_empty() {
            return fail("path must not be empty");
        }
        match &self.kind {
            ParamKind::Int { min, max, step } => {
                if min > max {
                    return fail("min exceeds max");
                }
                if *step < 1 {
                    return fail("step must be at least 1");
                }
            }
            ParamKind::Float { min, max } => {
                if !min.is_finite() || !max.is_finite() || min > max {
                    return fail("bounds must be finite with min <= max");
                }
            }
            ParamKind::Categorical { choices } => {
                if choices.is_empty() {
                    return fail("needs at least one choice");
                }
            }
        }
        Ok(())
    }

    /// `(min, max)` for numeric parameters.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match &self.kind {
            ParamKind::Int { min, max, .. } => Some((*min as f64, *max as f64)),
            ParamKind::Float { min, max } => Some((*min, *max)),
            ParamKind::Categorical { .. } => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.bounds().is_some()
    }

    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match &self.kind {
            ParamKind::Int { min, max, step } => {
                let step = (*step).max(1);
                let steps = (max - min) / step;
                ParamValue::Int(min + rng.gen_range(0..=steps) * step)
            }
            ParamKind::Float { min, max } => {
                if min >= max {
                    ParamValue::Float(*min)
                } else {
                    ParamValue::Float(rng.gen_range(*min..=*max))
                }
            }
            ParamKind::Categorical { choices } => choices
                .choose(rng)
                .cloned()
                .unwrap_or(ParamValue::Int(0)),
        }
    }

    /// Nearest legal value to a raw number: clamped, and snapped onto the
    /// step grid for integers. `None` for categoricals.
    pub fn snap(&self, raw: f64) -> Option<ParamValue> {
        match &self.kind {
            ParamKind::Int { min, max, step } => {
                let step = (*step).max(1);
                let raw = if raw.is_finite() { raw } else { *min as f64 };
                let k = ((raw - *min as f64) / step as f64).round() as i64;
                let last = (max - min) / step;
                Some(ParamValue::Int(min + k.clamp(0, last) * step))
            }
            ParamKind::Float { min, max } => {
                let raw = if raw.is_finite() { raw } else { *min };
                Some(ParamValue::Float(raw.clamp(*min, *max)))
            }
            ParamKind::Categorical { .. } => None,
        }
    }

    /// Whether `value` lies in the range (or among the choices).
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (&self.kind, value) {
            (ParamKind::Int { min, max, step }, ParamValue::Int(v)) => {
                v >= min && v <= max && (v - min) % (*step).max(1) == 0
            }
            (ParamKind::Float { min, max }, ParamValue::Float(v)) => v >= min && v <= max,
            (ParamKind::Categorical { choices }, v) => choices.contains(v),
            _ => false,
        }
    }
}

/// Uniform draw for every spec.
pub fn sample_set<R: Rng + ?Sized>(specs: &[ParamSpec], rng: &mut R) -> ParamSet {
    specs
        .iter()
        .map(|spec| (spec.name.clone(), spec.sample_uniform(rng)))
        .collect()
}
