//! Time-window arithmetic and per-ticker trade reduction shared by the
//! aggregator and the daily analysis.

use crate::domain::error::TradeflowError;
use crate::domain::observation::{Trade, format_timestamp};
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;

/// Default trailing aggregation interval.
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;

/// Upper bound on a configured window: one year.
pub const MAX_WINDOW_MINUTES: i64 = 525_600;

/// A closed interval `[start, end]`, optionally restricted to one ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub ticker: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// The window of length `length` ending at `end`, across all tickers.
    /// A start before the representable range is `InvalidInput`.
    pub fn trailing(end: NaiveDateTime, length: Duration) -> Result<Self, TradeflowError> {
        let start = end.checked_sub_signed(length).ok_or_else(|| {
            TradeflowError::invalid_input(format!(
                "window of {} minutes before {} is out of range",
                length.num_minutes(),
                format_timestamp(&end)
            ))
        })?;
        Ok(Self {
            ticker: None,
            start,
            end,
        })
    }

    pub fn contains(&self, trade: &Trade) -> bool {
        let ticker_matches = self
            .ticker
            .as_deref()
            .is_none_or(|t| t == trade.ticker);
        ticker_matches && trade.timestamp >= self.start && trade.timestamp <= self.end
    }
}

/// Per-ticker reduction of a set of trades.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerReduction {
    pub ticker: String,
    /// Unweighted arithmetic mean of trade prices.
    pub avg_price: f64,
    pub trade_count: i64,
    pub total_volume: i64,
}

/// Groups trades by ticker and reduces each group. Output is ordered by
/// ticker.
pub fn reduce_by_ticker<'a, I>(trades: I) -> Vec<TickerReduction>
where
    I: IntoIterator<Item = &'a Trade>,
{
    let mut groups: BTreeMap<&str, (f64, i64, i64)> = BTreeMap::new();
    for trade in trades {
        let entry = groups.entry(trade.ticker.as_str()).or_insert((0.0, 0, 0));
        entry.0 += trade.price;
        entry.1 += 1;
        entry.2 += trade.quantity;
    }

    groups
        .into_iter()
        .map(|(ticker, (price_sum, count, volume))| TickerReduction {
            ticker: ticker.to_string(),
            avg_price: price_sum / count as f64,
            trade_count: count,
            total_volume: volume,
        })
        .collect()
}
