//! Time-series source ports.

use crate::domain::error::TradeflowError;
use crate::domain::observation::{PricePoint, Trade};
use chrono::NaiveDateTime;

/// Read access to recorded trades.
pub trait TradeSource {
    /// The most recent trade across all tickers.
    fn latest_trade(&self) -> Result<Option<Trade>, TradeflowError>;

    /// Trades with `start <= timestamp <= end`, ordered by timestamp, then
    /// by arrival.
    fn trades_in_range(
        &self,
        ticker: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Trade>, TradeflowError>;
}

/// Read access to daily closing prices.
pub trait PriceHistorySource {
    /// The full price history for `ticker`, ordered by date.
    fn price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, TradeflowError>;
}
