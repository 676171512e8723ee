//! Bar-by-bar backtest engine.
//!
//! Per bar, in order: exits for open trades, then (unless this is the final
//! bar) filters and entry rules, then one equity point. Anything still open
//! on the final bar is closed at its close with `end_of_data`.

use serde::{Deserialize, Serialize};

use super::error::TradesimError;
use super::execution::{self, RiskSeries};
use super::filters::FilterSet;
use super::indicator::compute_indicators;
use super::metrics::Metrics;
use super::ohlcv::Bar;
use super::portfolio::{EquityPoint, Portfolio};
use super::position::{ExitReason, Trade};
use super::rule_eval::CompiledRules;
use super::strategy::StrategyConfig;

/// Bars required by a plain run unless overridden.
pub const DEFAULT_MIN_BARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestOptions {
    /// Fewest traded bars accepted by `run`/`run_range`.
    pub min_bars: usize,
    /// Starting balance override, used to carry balance between slices.
    pub initial_balance: Option<f64>,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        BacktestOptions {
            min_bars: DEFAULT_MIN_BARS,
            initial_balance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub bars_processed: usize,
}

/// A validated strategy with its rules compiled, ready to run on any bar slice.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: StrategyConfig,
    entry: CompiledRules,
    exit: CompiledRules,
    options: BacktestOptions,
}

impl BacktestEngine {
    pub fn new(config: &StrategyConfig) -> Result<Self, TradesimError> {
        config.validate()?;
        let entry = CompiledRules::compile(&config.entry_rules, &config.indicators)?;
        let exit = CompiledRules::compile(&config.exit_rules, &config.indicators)?;
        Ok(BacktestEngine {
            config: config.clone(),
            entry,
            exit,
            options: BacktestOptions::default(),
        })
    }

    pub fn with_options(mut self, options: BacktestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn run(&self, bars: &[Bar]) -> Result<BacktestResult, TradesimError> {
        self.run_range(bars, 0, bars.len())
    }

    /// Trade on `bars[start..end]`. Indicators are computed on `bars[..end]`
    /// so the bars before `start` serve as warm-up history.
    pub fn run_range(
        &self,
        bars: &[Bar],
        start: usize,
        end: usize,
    ) -> Result<BacktestResult, TradesimError> {
        let end = end.min(bars.len());
        let traded = end.saturating_sub(start);
        if traded < self.options.min_bars.max(1) {
            return Err(TradesimError::InsufficientData {
                bars: traded,
                required: self.options.min_bars.max(1),
            });
        }

        let history = &bars[..end];
        let risk = &self.config.risk;
        let indicators = compute_indicators(history, &self.config.indicators);
        let filters = FilterSet::new(&self.config.filters, history);
        let series = RiskSeries::compute(history, risk);

        let initial_balance = self.options.initial_balance.unwrap_or(risk.initial_balance);
        let mut portfolio = Portfolio::new(initial_balance);
        let last = end - 1;

        for index in start..end {
            let bar = &history[index];

            let exit_signal = self.exit.exit_signal(history, &indicators, index);
            execution::process_exits(&mut portfolio, risk, &series, index, bar, exit_signal);

            if index == last {
                execution::close_all(&mut portfolio, risk, index, bar, ExitReason::EndOfData);
            } else if filters.allows(index, bar) {
                if let Some(direction) = self.entry.entry_signal(history, &indicators, index) {
                    let opposite = direction.opposite();
                    if risk.close_on_reversal
                        && portfolio.open_trades.iter().any(|t| t.direction == opposite)
                    {
                        execution::close_direction(
                            &mut portfolio,
                            risk,
                            index,
                            bar,
                            opposite,
                            ExitReason::Reversal,
                        );
                    }

                    let price =
                        execution::apply_entry_slippage(bar.close, direction, risk.slippage_pct);
                    match series.entry_levels(risk, index, direction, price) {
                        Some(levels) => {
                            execution::open_entry(
                                &mut portfolio,
                                risk,
                                index,
                                bar,
                                direction,
                                price,
                                levels,
                            );
                        }
                        None => log::debug!(
                            "skipped {} signal on bar {}: stop/target not available",
                            direction,
                            index
                        ),
                    }
                }
            }

            portfolio.record_equity(bar.timestamp, bar.close);
        }

        let metrics = Metrics::compute(
            &portfolio.closed_trades,
            &portfolio.equity_curve,
            initial_balance,
        );
        log::info!(
            "{}: {} bars, {} trades, net {:.2}, final balance {:.2}",
            self.config.name,
            traded,
            metrics.total_trades,
            metrics.net_profit,
            portfolio.balance
        );

        Ok(BacktestResult {
            strategy: self.config.name.clone(),
            final_balance: portfolio.balance,
            trades: portfolio.closed_trades,
            equity_curve: portfolio.equity_curve,
            metrics,
            initial_balance,
            bars_processed: traded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::{IndicatorConfig, IndicatorType};
    use crate::domain::indicator_helpers::bars_from_closes;
    use crate::domain::position::TradeDirection;
    use crate::domain::rule::{ConditionRule, Operator, RuleDirection};
    use crate::domain::strategy::{RiskConfig, StopMethod, TargetMethod};

    fn strategy(entry: Vec<ConditionRule>, exit: Vec<ConditionRule>) -> StrategyConfig {
        StrategyConfig {
            name: "test".into(),
            indicators: vec![IndicatorConfig::new("sma", IndicatorType::Sma { period: 3 })],
            entry_rules: entry,
            exit_rules: exit,
            risk: RiskConfig {
                pip_size: 0.01,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn zigzag(count: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..count)
            .map(|i| 100.0 + ((i % 10) as f64 - 5.0).abs())
            .collect();
        bars_from_closes(&closes)
    }

    #[test]
    fn too_few_bars_is_insufficient_data() {
        let engine = BacktestEngine::new(&strategy(vec![], vec![])).unwrap();
        let err = engine.run(&zigzag(49)).unwrap_err();
        assert!(matches!(
            err,
            TradesimError::InsufficientData {
                bars: 49,
                required: 50
            }
        ));
    }

    #[test]
    fn unknown_indicator_fails_at_construction() {
        let config = strategy(
            vec![ConditionRule::new("close", Operator::Greater, "slow")],
            vec![],
        );
        assert!(matches!(
            BacktestEngine::new(&config),
            Err(TradesimError::Configuration { .. })
        ));
    }

    #[test]
    fn no_rules_gives_flat_equity() {
        let engine = BacktestEngine::new(&strategy(vec![], vec![])).unwrap();
        let result = engine.run(&zigzag(60)).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.len(), 60);
        assert!(result.equity_curve.iter().all(|p| p.equity == 10_000.0));
    }

    #[test]
    fn always_true_entry_closes_at_end_of_data() {
        let config = strategy(
            vec![ConditionRule::new("close", Operator::Greater, "0")],
            vec![],
        );
        let result = BacktestEngine::new(&config).unwrap().run(&zigzag(60)).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_bar, 0);
        assert_eq!(trade.exit_bar, Some(59));
        assert_eq!(trade.exit_reason, Some(ExitReason::EndOfData));
    }

    #[test]
    fn exit_rule_closes_matching_side() {
        let config = strategy(
            vec![ConditionRule::new("close", Operator::Greater, "0")],
            vec![ConditionRule::new("close", Operator::GreaterOrEqual, "105")
                .with_direction(RuleDirection::Long)],
        );
        let result = BacktestEngine::new(&config).unwrap().run(&zigzag(60)).unwrap();
        assert!(result.trades.len() > 1);
        let first = &result.trades[0];
        assert_eq!(first.exit_reason, Some(ExitReason::ExitSignal));
        assert_eq!(first.exit_price, Some(105.0));
        for trade in &result.trades {
            assert!(trade.exit_bar.unwrap() >= trade.entry_bar);
        }
    }

    #[test]
    fn reversal_closes_opposite_side() {
        let mut config = strategy(
            vec![
                ConditionRule::new("close", Operator::CrossesAbove, "sma")
                    .with_logic(crate::domain::rule::Logic::Or),
                ConditionRule::new("close", Operator::CrossesBelow, "sma"),
            ],
            vec![],
        );
        config.risk.max_open_trades = 1;
        let result = BacktestEngine::new(&config).unwrap().run(&zigzag(80)).unwrap();
        assert!(result
            .trades
            .iter()
            .any(|t| t.exit_reason == Some(ExitReason::Reversal)));
        let directions: Vec<TradeDirection> = result.trades.iter().map(|t| t.direction).collect();
        assert!(directions.contains(&TradeDirection::Long));
        assert!(directions.contains(&TradeDirection::Short));
    }

    #[test]
    fn run_range_warms_up_on_history() {
        let config = strategy(
            vec![ConditionRule::new("close", Operator::Greater, "sma")],
            vec![],
        );
        let engine = BacktestEngine::new(&config).unwrap().with_options(BacktestOptions {
            min_bars: 5,
            initial_balance: Some(5_000.0),
        });
        let bars = zigzag(60);
        let result = engine.run_range(&bars, 50, 60).unwrap();
        assert_eq!(result.equity_curve.len(), 10);
        assert_eq!(result.initial_balance, 5_000.0);
        assert!(result.trades.iter().all(|t| t.entry_bar >= 50));
    }

    #[test]
    fn fixed_stop_and_target_fill_at_level() {
        let mut config = strategy(
            vec![ConditionRule::new("close", Operator::Greater, "0")],
            vec![],
        );
        config.risk.stop_loss = StopMethod::Fixed { pips: 300.0 };
        config.risk.take_profit = TargetMethod::Fixed { pips: 300.0 };
        let result = BacktestEngine::new(&config).unwrap().run(&zigzag(60)).unwrap();
        let first = &result.trades[0];
        // entry at 105, zigzag falls to 100 first: stop at 102
        assert_eq!(first.exit_reason, Some(ExitReason::StopLoss));
        assert!((first.exit_price.unwrap() - 102.0).abs() < 1e-9);
    }

    #[test]
    fn adr_stop_skips_entries_until_warm() {
        use crate::domain::indicator::adr::calculate_adr;
        use crate::domain::indicator_helpers::intraday_bars;

        let mut config = strategy(
            vec![ConditionRule::new("close", Operator::Greater, "0")],
            vec![],
        );
        config.risk.stop_loss = StopMethod::Adr {
            period: 2,
            percent: 25.0,
        };
        let bars = intraday_bars(24 * 4, 60);
        let result = BacktestEngine::new(&config).unwrap().run(&bars).unwrap();

        let first = &result.trades[0];
        assert_eq!(first.entry_bar, 48);
        let adr = calculate_adr(&bars, 2).simple_at(48);
        let expected = first.entry_price - adr * 0.25;
        assert!((first.stop_loss.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn equity_length_matches_bars() {
        let config = strategy(
            vec![ConditionRule::new("close", Operator::CrossesAbove, "sma")],
            vec![],
        );
        let bars = zigzag(75);
        let result = BacktestEngine::new(&config).unwrap().run(&bars).unwrap();
        assert_eq!(result.equity_curve.len(), bars.len());
        assert_eq!(result.bars_processed, bars.len());
    }
}
