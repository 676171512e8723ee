//! Core domain types and logic.

pub mod ohlcv;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod indicator;
pub mod indicator_helpers;
pub mod rule;
pub mod rule_eval;
pub mod filters;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod structure;
pub mod walk_forward;
pub mod optimizer;
pub mod config_validation;
pub mod error;
