//! Write-side ports: the aggregate store, the trade ledger and the trade
//! journal.

use crate::domain::aggregate::Aggregate;
use crate::domain::error::TradeflowError;
use crate::domain::observation::{PricePoint, StoredTrade, Trade};
use crate::ports::source_port::{PriceHistorySource, TradeSource};
use chrono::NaiveDate;

pub trait AggregateStore {
    /// Inserts `aggregate` unless a row with the same
    /// `(ticker, period_start, period_end)` exists. Returns whether a row was
    /// written; an existing row is left untouched.
    fn upsert_if_absent(&self, aggregate: &Aggregate) -> Result<bool, TradeflowError>;

    fn list_aggregates(&self, ticker: Option<&str>) -> Result<Vec<Aggregate>, TradeflowError>;
}

pub trait TradeLedger {
    /// Appends a trade and returns its assigned id.
    fn record_trade(&self, trade: &Trade) -> Result<i64, TradeflowError>;

    fn list_trades(&self) -> Result<Vec<StoredTrade>, TradeflowError>;
}

/// Secondary append-only record of trades, keyed by trade date.
pub trait TradeJournal {
    fn journal(&self, stored: &StoredTrade) -> Result<(), TradeflowError>;

    fn trades_on(&self, date: NaiveDate) -> Result<Vec<Trade>, TradeflowError>;
}

/// A SQL backend that serves every read and write port.
pub trait TradeStore:
    TradeSource + PriceHistorySource + AggregateStore + TradeLedger + Send + Sync
{
    fn initialize_schema(&self) -> Result<(), TradeflowError>;

    /// Loads closing prices, replacing any existing row for the same
    /// `(ticker, date)`. Returns the number of rows written.
    fn insert_prices(&self, prices: &[PricePoint]) -> Result<usize, TradeflowError>;
}
