//! Trades opened and closed by the simulation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            TradeDirection::Long => 1.0,
            TradeDirection::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> TradeDirection {
        match self {
            TradeDirection::Long => TradeDirection::Short,
            TradeDirection::Short => TradeDirection::Long,
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Long => write!(f, "long"),
            TradeDirection::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    #[serde(rename = "take_profit_2")]
    TakeProfit2,
    StopLoss,
    ExitSignal,
    TrailingStop,
    Reversal,
    EndOfData,
}

impl ExitReason {
    pub fn is_take_profit(&self) -> bool {
        matches!(self, ExitReason::TakeProfit | ExitReason::TakeProfit2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: usize,
    pub direction: TradeDirection,
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub size: f64,
    pub contract_size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub take_profit_2: Option<f64>,
    pub trailing_active: bool,
    /// Id of the other half of a lot-split pair.
    pub sibling: Option<usize>,
    pub exit_bar: Option<usize>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub pnl: f64,
    pub commission: f64,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_reason.is_none()
    }

    /// Signed profit of moving from entry to `price`, before commission.
    pub fn price_pnl(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price) * self.size * self.contract_size
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.price_pnl(price)
    }

    /// True when the bar's range reached `level` on the profitable side.
    pub fn target_reached(&self, level: f64, high: f64, low: f64) -> bool {
        match self.direction {
            TradeDirection::Long => high >= level,
            TradeDirection::Short => low <= level,
        }
    }

    pub fn stop_reached(&self, high: f64, low: f64) -> bool {
        match (self.stop_loss, self.direction) {
            (Some(stop), TradeDirection::Long) => low <= stop,
            (Some(stop), TradeDirection::Short) => high >= stop,
            (None, _) => false,
        }
    }

    /// Finalize the trade. `commission` is the full round-trip charge.
    pub fn close(
        &mut self,
        bar: usize,
        time: NaiveDateTime,
        price: f64,
        reason: ExitReason,
        commission: f64,
    ) {
        self.exit_bar = Some(bar);
        self.exit_time = Some(time);
        self.exit_price = Some(price);
        self.exit_reason = Some(reason);
        self.commission = commission;
        self.pnl = self.price_pnl(price) - commission;
    }
}
