//! Walk-forward validation.
//!
//! The series is cut into `n_folds` equal windows. Inside window `k` the first
//! `train_pct` share is the train slice (anchored mode stretches it back to
//! bar 0) and the rest is the out-of-sample test slice. Test slices run in
//! order with the balance carried from one to the next, so their equity
//! curves join into one continuous curve.

use serde::{Deserialize, Serialize};

use super::backtest::{BacktestEngine, BacktestOptions};
use super::error::TradesimError;
use super::metrics::Metrics;
use super::ohlcv::Bar;
use super::portfolio::EquityPoint;
use super::position::Trade;
use super::strategy::StrategyConfig;

pub const MIN_WALK_FORWARD_BARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkForwardMode {
    /// Train from bar 0 up to each test slice.
    #[default]
    Anchored,
    /// Train only inside the fold's own window.
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub n_folds: usize,
    /// Share of each fold window used for training, in `(0, 1)`.
    pub train_pct: f64,
    pub mode: WalkForwardMode,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig {
            n_folds: 5,
            train_pct: 0.7,
            mode: WalkForwardMode::Anchored,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.n_folds == 0 {
            return Err(TradesimError::configuration("n_folds must be at least 1"));
        }
        if !(self.train_pct > 0.0 && self.train_pct < 1.0) {
            return Err(TradesimError::configuration(
                "train_pct must be strictly between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Bar ranges of one fold, half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldWindow {
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub window: FoldWindow,
    /// In-sample metrics, kept for reference only.
    pub train: Option<Metrics>,
    pub test: Metrics,
    pub start_balance: f64,
    pub end_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub config: WalkForwardConfig,
    pub folds: Vec<FoldResult>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    /// Out-of-sample aggregate over every test slice.
    pub metrics: Metrics,
    pub positive_folds: usize,
    /// Percent of folds with positive out-of-sample net profit, one decimal.
    pub consistency_score: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
}

/// Fold windows for `len` bars.
pub fn fold_windows(len: usize, config: &WalkForwardConfig) -> Vec<FoldWindow> {
    let width = len / config.n_folds.max(1);
    let train_len = (config.train_pct * width as f64).floor() as usize;
    (0..config.n_folds)
        .map(|k| {
            let start = k * width;
            let test_start = start + train_len;
            FoldWindow {
                train_start: match config.mode {
                    WalkForwardMode::Anchored => 0,
                    WalkForwardMode::Rolling => start,
                },
                train_end: test_start,
                test_start,
                test_end: start + width,
            }
        })
        .collect()
}

pub fn consistency_score(positive_folds: usize, n_folds: usize) -> f64 {
    if n_folds == 0 {
        return 0.0;
    }
    (1000.0 * positive_folds as f64 / n_folds as f64).round() / 10.0
}

pub fn run_walk_forward(
    strategy: &StrategyConfig,
    bars: &[Bar],
    config: &WalkForwardConfig,
) -> Result<WalkForwardResult, TradesimError> {
    config.validate()?;
    if bars.len() < MIN_WALK_FORWARD_BARS {
        return Err(TradesimError::InsufficientData {
            bars: bars.len(),
            required: MIN_WALK_FORWARD_BARS,
        });
    }

    let engine = BacktestEngine::new(strategy)?;
    let initial_balance = strategy.risk.initial_balance;
    let mut balance = initial_balance;
    let mut folds = Vec::with_capacity(config.n_folds);
    let mut trades = Vec::new();
    let mut equity_curve = Vec::new();
    let mut positive_folds = 0;

    for (fold, window) in fold_windows(bars.len(), config).into_iter().enumerate() {
        let train = if window.train_end > window.train_start {
            let options = BacktestOptions {
                min_bars: 1,
                initial_balance: None,
            };
            match engine
                .clone()
                .with_options(options)
                .run_range(bars, window.train_start, window.train_end)
            {
                Ok(result) => Some(result.metrics),
                Err(err) => {
                    log::warn!("fold {}: train slice skipped: {}", fold, err);
                    None
                }
            }
        } else {
            None
        };

        if window.test_end <= window.test_start {
            log::warn!("fold {}: empty test slice", fold);
            folds.push(FoldResult {
                fold,
                window,
                train,
                test: Metrics {
                    final_balance: balance,
                    ..Metrics::default()
                },
                start_balance: balance,
                end_balance: balance,
            });
            continue;
        }

        let options = BacktestOptions {
            min_bars: 1,
            initial_balance: Some(balance),
        };
        let result = engine
            .clone()
            .with_options(options)
            .run_range(bars, window.test_start, window.test_end)?;

        if result.metrics.net_profit > 0.0 {
            positive_folds += 1;
        }
        log::info!(
            "fold {}: test bars {}..{}, {} trades, net {:.2}",
            fold,
            window.test_start,
            window.test_end,
            result.metrics.total_trades,
            result.metrics.net_profit
        );

        folds.push(FoldResult {
            fold,
            window,
            train,
            test: result.metrics,
            start_balance: balance,
            end_balance: result.final_balance,
        });
        balance = result.final_balance;
        trades.extend(result.trades);
        equity_curve.extend(result.equity_curve);
    }

    let metrics = Metrics::compute(&trades, &equity_curve, initial_balance);
    Ok(WalkForwardResult {
        config: *config,
        folds,
        trades,
        equity_curve,
        metrics,
        positive_folds,
        consistency_score: consistency_score(positive_folds, config.n_folds),
        initial_balance,
        final_balance: balance,
    })
}
