//! Performance statistics of a finished run.

use super::portfolio::EquityPoint;
use super::position::Trade;
use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Profit factor reported when there are wins but no losses.
pub const PROFIT_FACTOR_SENTINEL: f64 = 999.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction of trades with positive pnl, in `[0, 1]`.
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Sum of losing pnl as a positive number.
    pub gross_loss: f64,
    pub net_profit: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    /// Negative (or zero without losses).
    pub avg_loss: f64,
    pub largest_win: f64,
    /// Negative (or zero without losses).
    pub largest_loss: f64,
    pub expectancy: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub total_return_pct: f64,
    pub final_balance: f64,
}

impl Metrics {
    /// Single pass over closed trades (in closing order) and the equity curve.
    pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint], initial_balance: f64) -> Self {
        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut returns = Vec::with_capacity(trades.len());
        let mut running = initial_balance;

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                winning_trades += 1;
                gross_profit += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losing_trades += 1;
                gross_loss += -pnl;
                largest_loss = largest_loss.min(pnl);
            }
            if running > 0.0 {
                returns.push(pnl / running);
            }
            running += pnl;
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if winning_trades > 0 {
            PROFIT_FACTOR_SENTINEL
        } else {
            0.0
        };

        let avg_win = if winning_trades > 0 {
            gross_profit / winning_trades as f64
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            -gross_loss / losing_trades as f64
        } else {
            0.0
        };
        let expectancy = win_rate * avg_win + (1.0 - win_rate) * avg_loss;

        let net_profit = gross_profit - gross_loss;
        let final_balance = initial_balance + net_profit;
        let total_return_pct = if initial_balance > 0.0 {
            100.0 * net_profit / initial_balance
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = compute_drawdown(equity_curve, initial_balance);

        Metrics {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            gross_profit,
            gross_loss,
            net_profit,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            expectancy,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio: trade_sharpe(&returns),
            total_return_pct,
            final_balance,
        }
    }
}

/// Largest fall from a running equity peak, absolute and as percent of that peak.
pub fn compute_drawdown(equity_curve: &[EquityPoint], initial_balance: f64) -> (f64, f64) {
    let mut peak = initial_balance;
    let mut max_dd = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            continue;
        }
        let dd = peak - point.equity;
        if dd > max_dd {
            max_dd = dd;
        }
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max(100.0 * dd / peak);
        }
    }

    (max_dd, max_dd_pct)
}

/// Mean over sample standard deviation of per-trade returns, scaled by √252.
/// Zero with fewer than two returns or no dispersion.
pub fn trade_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();
    if stddev > f64::EPSILON && stddev.is_finite() {
        mean / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
