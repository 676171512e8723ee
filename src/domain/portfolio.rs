//! Balance, open trades and the equity curve of one simulation run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::position::{ExitReason, Trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub balance: f64,
    pub initial_balance: f64,
    pub open_trades: Vec<Trade>,
    pub closed_trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    next_id: usize,
}

impl Portfolio {
    pub fn new(initial_balance: f64) -> Self {
        Portfolio {
            balance: initial_balance,
            initial_balance,
            open_trades: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            next_id: 1,
        }
    }

    pub fn next_trade_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn open_count(&self) -> usize {
        self.open_trades.len()
    }

    pub fn add_trade(&mut self, trade: Trade) {
        self.open_trades.push(trade);
    }

    /// Close the open trade at `position`, book its pnl and return it.
    ///
    /// When a lot-split sibling is still open and the trade left by take
    /// profit, the sibling's stop moves to its entry price if `breakeven` is set.
    pub fn close_trade(
        &mut self,
        position: usize,
        bar: usize,
        time: NaiveDateTime,
        price: f64,
        reason: ExitReason,
        commission: f64,
        breakeven: bool,
    ) -> f64 {
        let mut trade = self.open_trades.remove(position);
        trade.close(bar, time, price, reason, commission);
        self.balance += trade.pnl;

        if breakeven && reason.is_take_profit() {
            if let Some(sibling_id) = trade.sibling {
                if let Some(sibling) = self.open_trades.iter_mut().find(|t| t.id == sibling_id) {
                    sibling.stop_loss = Some(sibling.entry_price);
                }
            }
        }

        log::debug!(
            "closed trade #{} {} at {:.5} ({:?}), pnl {:.2}",
            trade.id,
            trade.direction,
            price,
            reason,
            trade.pnl
        );
        let pnl = trade.pnl;
        self.closed_trades.push(trade);
        pnl
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.open_trades.iter().map(|t| t.unrealized_pnl(price)).sum()
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, price: f64) {
        let equity = self.balance + self.unrealized_pnl(price);
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }
}
