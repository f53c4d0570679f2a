#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::cell::RefCell;
use tradeflow::domain::aggregate::Aggregate;
use tradeflow::domain::error::TradeflowError;
pub use tradeflow::domain::observation::{PricePoint, Trade, TradeSide};
use tradeflow::domain::observation::parse_timestamp;
use tradeflow::ports::source_port::{PriceHistorySource, TradeSource};
use tradeflow::ports::store_port::AggregateStore;

/// In-memory trade source. Trades are kept in arrival order.
pub struct MockTradeSource {
    pub trades: Vec<Trade>,
    pub error: Option<String>,
    pub range_calls: RefCell<usize>,
}

impl MockTradeSource {
    pub fn new() -> Self {
        Self {
            trades: Vec::new(),
            error: None,
            range_calls: RefCell::new(0),
        }
    }

    pub fn with_trades(mut self, trades: Vec<Trade>) -> Self {
        self.trades = trades;
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    fn check(&self) -> Result<(), TradeflowError> {
        match &self.error {
            Some(reason) => Err(TradeflowError::source_unavailable(reason)),
            None => Ok(()),
        }
    }
}

impl TradeSource for MockTradeSource {
    fn latest_trade(&self) -> Result<Option<Trade>, TradeflowError> {
        self.check()?;
        // max_by_key keeps the last maximum, so the latest arrival wins ties
        Ok(self.trades.iter().max_by_key(|t| t.timestamp).cloned())
    }

    fn trades_in_range(
        &self,
        ticker: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Trade>, TradeflowError> {
        self.check()?;
        *self.range_calls.borrow_mut() += 1;
        let mut trades: Vec<Trade> = self
            .trades
            .iter()
            .filter(|t| ticker.is_none_or(|tk| tk == t.ticker))
            .filter(|t| t.timestamp >= start && t.timestamp <= end)
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.timestamp);
        Ok(trades)
    }
}

/// Aggregate store keyed by `(ticker, period_start, period_end)`.
pub struct MockAggregateStore {
    pub rows: RefCell<Vec<Aggregate>>,
    pub attempts: RefCell<usize>,
    pub error: Option<String>,
}

impl MockAggregateStore {
    pub fn new() -> Self {
        Self {
            rows: RefCell::new(Vec::new()),
            attempts: RefCell::new(0),
            error: None,
        }
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }
}

impl AggregateStore for MockAggregateStore {
    fn upsert_if_absent(&self, aggregate: &Aggregate) -> Result<bool, TradeflowError> {
        *self.attempts.borrow_mut() += 1;
        if let Some(reason) = &self.error {
            return Err(TradeflowError::persistence_unavailable(reason));
        }
        let mut rows = self.rows.borrow_mut();
        let exists = rows.iter().any(|r| {
            r.ticker == aggregate.ticker
                && r.period_start == aggregate.period_start
                && r.period_end == aggregate.period_end
        });
        if !exists {
            rows.push(aggregate.clone());
        }
        Ok(!exists)
    }

    fn list_aggregates(&self, ticker: Option<&str>) -> Result<Vec<Aggregate>, TradeflowError> {
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|a| ticker.is_none_or(|t| t == a.ticker))
            .cloned()
            .collect())
    }
}

pub struct MockPriceSource {
    pub points: Vec<PricePoint>,
    pub calls: RefCell<usize>,
}

impl MockPriceSource {
    pub fn new(points: Vec<PricePoint>) -> Self {
        Self {
            points,
            calls: RefCell::new(0),
        }
    }
}

impl PriceHistorySource for MockPriceSource {
    fn price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, TradeflowError> {
        *self.calls.borrow_mut() += 1;
        Ok(self
            .points
            .iter()
            .filter(|p| p.ticker == ticker)
            .cloned()
            .collect())
    }
}

pub fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_trade(ticker: &str, price: f64, timestamp: &str) -> Trade {
    Trade {
        ticker: ticker.to_string(),
        price,
        quantity: 10,
        side: TradeSide::Buy,
        timestamp: ts(timestamp),
    }
}

/// One close per consecutive calendar day starting at `start`.
pub fn daily_series(ticker: &str, start: NaiveDate, closes: &[f64]) -> Vec<PricePoint> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close_price)| PricePoint {
            date: start + chrono::Duration::days(i as i64),
            ticker: ticker.to_string(),
            close_price,
        })
        .collect()
}
