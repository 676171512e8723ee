//! Stateful breakout evaluators and the lifecycle driver that trades them.
//!
//! An evaluator is fed a growing bar slice and only ever looks at its newest
//! bar; everything it needs from older bars lives in its own state. One
//! instance serves one (symbol, strategy) pair.

pub mod pivot_break;
pub mod zone_break;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::backtest::BacktestResult;
use super::error::TradesimError;
use super::execution::{self, EntryLevels, RiskSeries};
use super::metrics::Metrics;
use super::ohlcv::Bar;
use super::portfolio::Portfolio;
use super::position::{ExitReason, TradeDirection};
use super::strategy::{PositionSizing, RiskConfig};

pub use pivot_break::{PivotBreakConfig, PivotBreakEvaluator};
pub use zone_break::{ZoneBreakConfig, ZoneBreakEvaluator, ZoneStop};

/// Break of structure in the prior direction, or a change of character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutKind {
    Continuation,
    Reversal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralSignal {
    pub timestamp: NaiveDateTime,
    pub direction: TradeDirection,
    pub entry: f64,
    pub stop_loss: f64,
    /// Nearest first.
    pub targets: Vec<f64>,
    pub kind: Option<BreakoutKind>,
}

pub trait StructuralEvaluator {
    /// Replay history into state without producing signals.
    fn warmup(&mut self, bars: &[Bar]);

    /// Process the newest bar of `bars`. A bar whose timestamp was already
    /// processed is ignored.
    fn evaluate(&mut self, bars: &[Bar]) -> Option<StructuralSignal>;

    /// Whether the newest bar would fire against `current`. Never mutates.
    fn would_fire_opposite(&self, bars: &[Bar], current: TradeDirection) -> bool;

    fn min_bars(&self) -> usize;
}

/// Evaluator selection as it appears in a strategy file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructureConfig {
    PivotBreak(PivotBreakConfig),
    ZoneBreak(ZoneBreakConfig),
}

impl StructureConfig {
    pub fn build(&self) -> Result<Box<dyn StructuralEvaluator>, TradesimError> {
        Ok(match self {
            StructureConfig::PivotBreak(config) => {
                Box::new(PivotBreakEvaluator::new(config.clone())?)
            }
            StructureConfig::ZoneBreak(config) => {
                Box::new(ZoneBreakEvaluator::new(config.clone())?)
            }
        })
    }
}

/// Trade an evaluator's signals through the shared exit/entry lifecycle.
///
/// The first `min_bars - 1` bars only warm the evaluator; the equity curve
/// covers the remaining bars.
pub fn run_structural_backtest<E>(
    evaluator: &mut E,
    bars: &[Bar],
    risk: &RiskConfig,
) -> Result<BacktestResult, TradesimError>
where
    E: StructuralEvaluator + ?Sized,
{
    risk.validate_account()?;
    let required = evaluator.min_bars().max(1);
    if bars.len() < required {
        return Err(TradesimError::InsufficientData {
            bars: bars.len(),
            required,
        });
    }

    let warm_end = required - 1;
    evaluator.warmup(&bars[..warm_end]);

    let series = RiskSeries::compute(bars, risk);
    let mut portfolio = Portfolio::new(risk.initial_balance);
    let last = bars.len() - 1;

    for index in warm_end..bars.len() {
        let bar = &bars[index];
        let window = &bars[..=index];

        execution::process_exits(&mut portfolio, risk, &series, index, bar, None);

        if index == last {
            execution::close_all(&mut portfolio, risk, index, bar, ExitReason::EndOfData);
        } else {
            if risk.close_on_reversal {
                for direction in [TradeDirection::Long, TradeDirection::Short] {
                    let holding = portfolio.open_trades.iter().any(|t| t.direction == direction);
                    if holding && evaluator.would_fire_opposite(window, direction) {
                        execution::close_direction(
                            &mut portfolio,
                            risk,
                            index,
                            bar,
                            direction,
                            ExitReason::Reversal,
                        );
                    }
                }
            }

            if let Some(signal) = evaluator.evaluate(window) {
                open_signal(&mut portfolio, risk, index, bar, &signal);
            }
        }

        portfolio.record_equity(bar.timestamp, bar.close);
    }

    let metrics = Metrics::compute(
        &portfolio.closed_trades,
        &portfolio.equity_curve,
        risk.initial_balance,
    );
    log::info!(
        "structural run: {} bars, {} trades, net {:.2}",
        bars.len() - warm_end,
        metrics.total_trades,
        metrics.net_profit
    );

    Ok(BacktestResult {
        strategy: "structural".to_string(),
        final_balance: portfolio.balance,
        trades: portfolio.closed_trades,
        equity_curve: portfolio.equity_curve,
        metrics,
        initial_balance: risk.initial_balance,
        bars_processed: bars.len() - warm_end,
    })
}

/// Lot split across the first two targets when configured, otherwise one
/// trade per target with the size shared equally. When the open-trade limit
/// cannot hold a trade per target, a single full-size trade takes the first
/// target.
fn open_signal(
    portfolio: &mut Portfolio,
    risk: &RiskConfig,
    index: usize,
    bar: &Bar,
    signal: &StructuralSignal,
) -> usize {
    let price = execution::apply_entry_slippage(signal.entry, signal.direction, risk.slippage_pct);
    let stop_loss = Some(signal.stop_loss);

    if risk.lot_split.is_some() && signal.targets.len() >= 2 {
        let levels = EntryLevels {
            stop_loss,
            take_profit: Some(signal.targets[0]),
            take_profit_2: Some(signal.targets[1]),
        };
        return execution::open_entry(portfolio, risk, index, bar, signal.direction, price, levels);
    }

    if signal.targets.is_empty() {
        let levels = EntryLevels {
            stop_loss,
            take_profit: None,
            take_profit_2: None,
        };
        return execution::open_entry(portfolio, risk, index, bar, signal.direction, price, levels);
    }

    if portfolio.open_count() + signal.targets.len() > risk.max_open_trades {
        log::debug!(
            "bar {}: {} targets exceed open-trade limit, trading the first only",
            index,
            signal.targets.len()
        );
        let levels = EntryLevels {
            stop_loss,
            take_profit: Some(signal.targets[0]),
            take_profit_2: None,
        };
        let single = RiskConfig {
            lot_split: None,
            ..risk.clone()
        };
        return execution::open_entry(portfolio, &single, index, bar, signal.direction, price, levels);
    }

    let share = 1.0 / signal.targets.len() as f64;
    let shared = RiskConfig {
        sizing: match risk.sizing {
            PositionSizing::Fixed { units } => PositionSizing::Fixed {
                units: units * share,
            },
            PositionSizing::RiskPercent { percent } => PositionSizing::RiskPercent {
                percent: percent * share,
            },
        },
        lot_split: None,
        ..risk.clone()
    };

    let mut opened = 0;
    for &target in &signal.targets {
        let levels = EntryLevels {
            stop_loss,
            take_profit: Some(target),
            take_profit_2: None,
        };
        opened +=
            execution::open_entry(portfolio, &shared, index, bar, signal.direction, price, levels);
    }
    opened
}
