//! End-to-end runs of the engine, structural driver, walk-forward validator
//! and the INI/CSV shell.

mod common;

use common::*;
use tradesim::adapters::file_config_adapter::FileConfigAdapter;
use tradesim::cli;
use tradesim::domain::backtest::BacktestEngine;
use tradesim::domain::config_validation::load_strategy;
use tradesim::domain::error::TradesimError;
use tradesim::domain::metrics::PROFIT_FACTOR_SENTINEL;
use tradesim::domain::position::{ExitReason, TradeDirection};
use tradesim::domain::rule::{ConditionRule, Operator};
use tradesim::domain::strategy::{StopMethod, TargetMethod};
use tradesim::domain::structure::{PivotBreakConfig, PivotBreakEvaluator, run_structural_backtest};
use tradesim::domain::walk_forward::{
    WalkForwardConfig, WalkForwardMode, consistency_score, run_walk_forward,
};
use tradesim::ports::data_port::DataPort;

mod backtest_scenarios {
    use super::*;

    #[test]
    fn single_crossover_hits_take_profit() {
        let bars = trend_up_then_down();
        let result = BacktestEngine::new(&sma_cross_strategy(5, 20))
            .unwrap()
            .run(&bars)
            .unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.direction, TradeDirection::Long);
        assert_eq!(trade.entry_bar, 60);
        assert_eq!(trade.exit_reason, Some(ExitReason::TakeProfit));
        assert!((trade.exit_price.unwrap() - (trade.entry_price + 1.0)).abs() < 1e-9);
        assert!(trade.pnl > 0.0);
        assert_eq!(result.equity_curve.len(), bars.len());
    }

    #[test]
    fn only_winners_report_profit_factor_sentinel() {
        let result = BacktestEngine::new(&sma_cross_strategy(5, 20))
            .unwrap()
            .run(&trend_up_then_down())
            .unwrap();
        assert_eq!(result.metrics.losing_trades, 0);
        assert_eq!(result.metrics.profit_factor, PROFIT_FACTOR_SENTINEL);
    }

    #[test]
    fn runs_are_deterministic() {
        let bars = wave(300);
        let engine = BacktestEngine::new(&sma_cross_strategy(3, 12)).unwrap();
        let first = engine.run(&bars).unwrap();
        let second = engine.run(&bars).unwrap();
        assert!(!first.trades.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn unsatisfiable_entry_keeps_equity_flat() {
        let mut strategy = sma_cross_strategy(5, 20);
        strategy.entry_rules = vec![ConditionRule::new("close", Operator::Greater, "1000000")];
        let bars = wave(120);
        let result = BacktestEngine::new(&strategy).unwrap().run(&bars).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.len(), bars.len());
        assert!(
            result
                .equity_curve
                .iter()
                .all(|p| p.equity == strategy.risk.initial_balance)
        );
        assert_eq!(result.final_balance, strategy.risk.initial_balance);
    }

    #[test]
    fn second_target_outranks_first_and_stop_on_straddling_bar() {
        let mut bars = make_bars(&[100.0; 60]);
        bars[30].high = 103.0;
        bars[30].low = 99.0;

        let mut strategy = sma_cross_strategy(5, 20);
        strategy.entry_rules = vec![ConditionRule::new("close", Operator::Greater, "99")];
        strategy.risk.stop_loss = StopMethod::Fixed { pips: 50.0 };
        strategy.risk.take_profit = TargetMethod::RiskReward { ratio: 1.0 };
        strategy.risk.take_profit_2 = Some(TargetMethod::Fixed { pips: 200.0 });

        let result = BacktestEngine::new(&strategy).unwrap().run(&bars).unwrap();
        let first = &result.trades[0];
        assert_eq!(first.entry_bar, 0);
        assert_eq!(first.exit_bar, Some(30));
        assert_eq!(first.exit_reason, Some(ExitReason::TakeProfit2));
        assert!((first.exit_price.unwrap() - 102.0).abs() < 1e-9);
    }

    #[test]
    fn exits_never_precede_entries() {
        let mut strategy = sma_cross_strategy(3, 12);
        strategy.risk.max_open_trades = 3;
        strategy.exit_rules = vec![ConditionRule::new("fast", Operator::CrossesBelow, "slow")];
        let result = BacktestEngine::new(&strategy)
            .unwrap()
            .run(&wave(400))
            .unwrap();
        for trade in &result.trades {
            assert!(trade.exit_bar.unwrap() >= trade.entry_bar);
            assert!(trade.exit_time.unwrap() >= trade.entry_time);
        }
    }

    #[test]
    fn too_short_series_reports_counts() {
        let err = BacktestEngine::new(&sma_cross_strategy(5, 20))
            .unwrap()
            .run(&wave(30))
            .unwrap_err();
        assert!(matches!(
            err,
            TradesimError::InsufficientData {
                bars: 30,
                required: 50
            }
        ));
    }
}

mod structural {
    use super::*;

    #[test]
    fn pivot_break_lifecycle_on_wave() {
        let bars = wave(200);
        let mut evaluator = PivotBreakEvaluator::new(PivotBreakConfig {
            lookback: 3,
            adr_period: 5,
            ..Default::default()
        })
        .unwrap();
        let mut risk = sma_cross_strategy(5, 20).risk;
        risk.stop_loss = StopMethod::None;
        risk.take_profit = TargetMethod::None;

        let result = run_structural_backtest(&mut evaluator, &bars, &risk).unwrap();
        assert_eq!(result.equity_curve.len(), bars.len() - 6);
        for trade in &result.trades {
            assert!(trade.exit_bar.unwrap() >= trade.entry_bar);
            assert!(trade.stop_loss.is_some());
        }
    }

    #[test]
    fn pivot_break_needs_two_lookbacks_plus_one() {
        let mut evaluator = PivotBreakEvaluator::new(PivotBreakConfig {
            lookback: 5,
            ..Default::default()
        })
        .unwrap();
        let risk = sma_cross_strategy(5, 20).risk;
        let err = run_structural_backtest(&mut evaluator, &wave(10), &risk).unwrap_err();
        assert!(matches!(
            err,
            TradesimError::InsufficientData {
                bars: 10,
                required: 11
            }
        ));
    }
}

mod walk_forward {
    use super::*;

    #[test]
    fn folds_chain_balance_and_score_consistency() {
        let bars = wave(400);
        let config = WalkForwardConfig {
            n_folds: 4,
            train_pct: 0.7,
            mode: WalkForwardMode::Anchored,
        };
        let result = run_walk_forward(&sma_cross_strategy(3, 12), &bars, &config).unwrap();

        assert_eq!(result.folds.len(), 4);
        assert_eq!(
            result.consistency_score,
            consistency_score(result.positive_folds, 4)
        );
        let tested: usize = result
            .folds
            .iter()
            .map(|f| f.window.test_end - f.window.test_start)
            .sum();
        assert_eq!(result.equity_curve.len(), tested);
        for pair in result.folds.windows(2) {
            assert_eq!(pair[0].end_balance, pair[1].start_balance);
        }
        assert_eq!(
            result.final_balance,
            result.folds.last().unwrap().end_balance
        );
    }

    #[test]
    fn consistency_formula() {
        assert_eq!(consistency_score(3, 4), 75.0);
        assert_eq!(consistency_score(2, 3), 66.7);
        assert_eq!(consistency_score(0, 5), 0.0);
    }

    #[test]
    fn needs_two_hundred_bars() {
        let err = run_walk_forward(
            &sma_cross_strategy(3, 12),
            &wave(199),
            &WalkForwardConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TradesimError::InsufficientData {
                bars: 199,
                required: 200
            }
        ));
    }
}

mod shell {
    use super::*;

    const STRATEGY_INI: &str = r#"
[strategy]
name = INI Cross

[indicator.fast]
type = sma
period = 5

[indicator.slow]
type = sma
period = 20

[entry.1]
left = fast
operator = crosses_above
right = slow

[risk]
pip_size = 0.01
stop_loss = fixed:50
take_profit = fixed:100
"#;

    #[test]
    fn ini_strategy_matches_typed_strategy() {
        let adapter = FileConfigAdapter::from_string(STRATEGY_INI).unwrap();
        let loaded = load_strategy(&adapter).unwrap();
        let bars = trend_up_then_down();

        let from_ini = BacktestEngine::new(&loaded).unwrap().run(&bars).unwrap();
        let typed = BacktestEngine::new(&sma_cross_strategy(5, 20))
            .unwrap()
            .run(&bars)
            .unwrap();
        assert_eq!(from_ini.trades, typed.trades);
        assert_eq!(from_ini.strategy, "INI Cross");
    }

    #[test]
    fn configured_backtest_from_files() {
        let config_file = write_temp_file(STRATEGY_INI, ".ini");
        let data_file = write_temp_file(&bars_to_csv(&trend_up_then_down()), ".csv");

        let config = cli::load_config(config_file.path()).unwrap();
        let bars = cli::load_bars(data_file.path()).unwrap();
        assert_eq!(bars.len(), 200);

        let result = cli::run_configured_backtest(&config, &bars).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn configured_structural_backtest() {
        let ini = "[strategy]\nname = Pivots\n\n[structure]\ntype = pivot_break\nlookback = 3\nadr_period = 5\n\n[risk]\npip_size = 0.01\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let bars = wave(150);
        let result = cli::run_configured_backtest(&adapter, &bars).unwrap();
        assert_eq!(result.strategy, "Pivots");
        assert_eq!(result.equity_curve.len(), bars.len() - 6);
    }

    #[test]
    fn mock_data_port_feeds_engine() {
        let port = MockDataPort::new()
            .with_bars("EURUSD", trend_up_then_down())
            .with_error("GBPUSD", "feed offline");

        assert_eq!(port.list_symbols().unwrap(), vec!["EURUSD"]);
        let bars = port.fetch_bars("EURUSD").unwrap();
        let result = BacktestEngine::new(&sma_cross_strategy(5, 20))
            .unwrap()
            .run(&bars)
            .unwrap();
        assert_eq!(result.trades.len(), 1);

        assert!(matches!(
            port.fetch_bars("GBPUSD"),
            Err(TradesimError::Data { .. })
        ));
        let window = port.fetch_bars_between("EURUSD", day(10), day(19)).unwrap();
        assert_eq!(window.len(), 10);
    }
}
