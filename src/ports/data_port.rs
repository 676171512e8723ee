//! Bar data access port.

use crate::domain::error::TradesimError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// All bars for `symbol`, oldest first, with unique timestamps.
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TradesimError>;

    fn list_symbols(&self) -> Result<Vec<String>, TradesimError>;

    /// Bars with `start <= timestamp <= end`.
    fn fetch_bars_between(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, TradesimError> {
        Ok(self
            .fetch_bars(symbol)?
            .into_iter()
            .filter(|bar| bar.timestamp >= start && bar.timestamp <= end)
            .collect())
    }
}
