//! Dotted paths into a serialized configuration tree.
//!
//! Segments walk maps by key and sequences either by index or by the element
//! whose `id` field equals the segment, so `indicators.fast.period` and
//! `indicators.0.period` reach the same value. Only existing locations can be
//! written; a path that does not resolve is a configuration error.

use serde_json::Value;

use super::space::{ParamSet, ParamSpec};
use crate::domain::error::TradesimError;
use crate::domain::strategy::StrategyConfig;

fn segments(path: &str) -> Result<Vec<&str>, TradesimError> {
    let parts: Vec<&str> = path.split('.').collect();
    if path.is_empty() || parts.iter().any(|s| s.is_empty()) {
        return Err(TradesimError::configuration(format!(
            "malformed parameter path '{}'",
            path
        )));
    }
    Ok(parts)
}

fn unresolved(path: &str, segment: &str) -> TradesimError {
    TradesimError::configuration(format!(
        "parameter path '{}' does not resolve at '{}'",
        path, segment
    ))
}

fn element_position(items: &[Value], segment: &str) -> Option<usize> {
    match segment.parse::<usize>() {
        Ok(index) if index < items.len() => Some(index),
        Ok(_) => None,
        Err(_) => items
            .iter()
            .position(|item| item.get("id").and_then(Value::as_str) == Some(segment)),
    }
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => element_position(items, segment).map(|i| &items[i]),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => {
            let index = element_position(items, segment)?;
            items.get_mut(index)
        }
        _ => None,
    }
}

pub fn get<'a>(root: &'a Value, path: &str) -> Result<&'a Value, TradesimError> {
    let mut node = root;
    for segment in segments(path)? {
        node = child(node, segment).ok_or_else(|| unresolved(path, segment))?;
    }
    Ok(node)
}

pub fn set(root: &mut Value, path: &str, value: Value) -> Result<(), TradesimError> {
    let mut node = root;
    for segment in segments(path)? {
        node = child_mut(node, segment).ok_or_else(|| unresolved(path, segment))?;
    }
    *node = value;
    Ok(())
}

/// Clone `base` with every value of `params` written at its spec's path.
pub fn apply_params(
    base: &StrategyConfig,
    specs: &[ParamSpec],
    params: &ParamSet,
) -> Result<StrategyConfig, TradesimError> {
    let mut tree = serde_json::to_value(base)
        .map_err(|e| TradesimError::configuration(format!("cannot serialize strategy: {}", e)))?;

    for spec in specs {
        if let Some(value) = params.get(&spec.name) {
            set(&mut tree, &spec.path, value.to_json())?;
        }
    }

    serde_json::from_value(tree).map_err(|e| {
        TradesimError::configuration(format!("parameters produce an invalid strategy: {}", e))
    })
}
