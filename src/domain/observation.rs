//! Trade and price observations read from the time-series source.

use crate::domain::error::TradeflowError;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

/// Canonical ISO-8601 rendering used for persisted timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = TradeflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(TradeflowError::invalid_input(format!(
                "unknown trade side '{other}' (expected buy or sell)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub ticker: String,
    pub price: f64,
    pub quantity: i64,
    pub side: TradeSide,
    pub timestamp: NaiveDateTime,
}

impl Trade {
    /// Builds a trade from raw boundary values, rejecting anything the
    /// pipelines would otherwise have to second-guess.
    pub fn parse(
        ticker: &str,
        price: f64,
        quantity: i64,
        side: &str,
        timestamp: &str,
    ) -> Result<Self, TradeflowError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(TradeflowError::invalid_input("ticker must not be empty"));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(TradeflowError::invalid_input(format!(
                "price must be positive, got {price}"
            )));
        }
        if quantity < 0 {
            return Err(TradeflowError::invalid_input(format!(
                "quantity must be non-negative, got {quantity}"
            )));
        }
        Ok(Self {
            ticker,
            price,
            quantity,
            side: side.parse()?,
            timestamp: parse_timestamp(timestamp)?,
        })
    }
}

/// A trade as persisted by a ledger, with its assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrade {
    pub id: i64,
    pub trade: Trade,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub ticker: String,
    pub close_price: f64,
}

/// Parses an ISO-8601 timestamp. A trailing `Z` or numeric UTC offset is
/// accepted and converted to naive UTC.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, TradeflowError> {
    let trimmed = input.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }
    let naive = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(naive, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| {
            TradeflowError::invalid_input(format!(
                "invalid timestamp '{trimmed}' (expected ISO-8601, e.g. 2024-01-15T10:30:00)"
            ))
        })
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn parse_timestamp_variants() {
        assert_eq!(parse_timestamp("2024-01-15T10:30:00").unwrap(), ts(10, 30, 0));
        assert_eq!(parse_timestamp("2024-01-15T10:30:00Z").unwrap(), ts(10, 30, 0));
        assert_eq!(
            parse_timestamp("2024-01-15T12:30:00+02:00").unwrap(),
            ts(10, 30, 0)
        );
        assert_eq!(parse_timestamp("2024-01-15 10:30:00").unwrap(), ts(10, 30, 0));
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        match parse_timestamp("yesterday") {
            Err(TradeflowError::InvalidInput { reason }) => {
                assert!(reason.contains("yesterday"))
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn format_timestamp_omits_zero_fraction() {
        assert_eq!(format_timestamp(&ts(10, 30, 0)), "2024-01-15T10:30:00");
    }

    #[test]
    fn trade_side_round_trip() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!(" sell ".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("hold".parse::<TradeSide>().is_err());
        assert_eq!(TradeSide::Sell.to_string(), "sell");
    }

    #[test]
    fn trade_parse_normalises_ticker() {
        let trade = Trade::parse(" aapl ", 150.0, 10, "buy", "2024-01-15T10:30:00Z").unwrap();
        assert_eq!(trade.ticker, "AAPL");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.timestamp, ts(10, 30, 0));
    }

    #[test]
    fn trade_parse_rejects_bad_fields() {
        assert!(Trade::parse("", 1.0, 1, "buy", "2024-01-15T10:30:00").is_err());
        assert!(Trade::parse("AAPL", 0.0, 1, "buy", "2024-01-15T10:30:00").is_err());
        assert!(Trade::parse("AAPL", f64::NAN, 1, "buy", "2024-01-15T10:30:00").is_err());
        assert!(Trade::parse("AAPL", 1.0, -1, "buy", "2024-01-15T10:30:00").is_err());
        assert!(Trade::parse("AAPL", 1.0, 1, "short", "2024-01-15T10:30:00").is_err());
    }
}
