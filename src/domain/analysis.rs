//! Daily trade analysis: per-ticker volume and price summary for one
//! calendar day.

use crate::domain::error::TradeflowError;
use crate::domain::observation::{Trade, parse_timestamp};
use crate::domain::window::{Window, reduce_by_ticker};
use crate::ports::source_port::TradeSource;
use chrono::{NaiveDate, NaiveDateTime};

pub const TOP_TICKER_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct TickerSummary {
    pub ticker: String,
    pub volume: i64,
    /// Unweighted mean price, rounded to cents.
    pub avg_price: f64,
    pub trade_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAnalysis {
    pub date: NaiveDate,
    pub total_volume: i64,
    /// Volume-weighted mean of the per-ticker mean prices, rounded to cents.
    pub average_price: f64,
    pub trade_count: i64,
    /// Largest tickers by volume, at most [`TOP_TICKER_LIMIT`].
    pub top_tickers: Vec<TickerSummary>,
}

/// Accepts `YYYY-MM-DD`, `YYYYMMDD` or an ISO datetime.
pub fn parse_analysis_date(input: &str) -> Result<NaiveDate, TradeflowError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .or_else(|_| parse_timestamp(trimmed).map(|ts| ts.date()))
        .map_err(|_| {
            TradeflowError::invalid_input(format!(
                "invalid date '{trimmed}' (expected YYYY-MM-DD)"
            ))
        })
}

/// The closed window `00:00:00 ..= 23:59:59` of `date`.
pub fn day_window(date: NaiveDate) -> Window {
    let start = date.and_time(chrono::NaiveTime::MIN);
    let end: NaiveDateTime = start + chrono::Duration::seconds(86_399);
    Window {
        ticker: None,
        start,
        end,
    }
}

pub fn analyze_trades(date: NaiveDate, trades: &[Trade]) -> DailyAnalysis {
    let window = day_window(date);
    let reductions = reduce_by_ticker(trades.iter().filter(|t| window.contains(t)));

    let total_volume: i64 = reductions.iter().map(|r| r.total_volume).sum();
    let trade_count: i64 = reductions.iter().map(|r| r.trade_count).sum();
    let average_price = if total_volume > 0 {
        let weighted: f64 = reductions
            .iter()
            .map(|r| r.avg_price * r.total_volume as f64)
            .sum();
        round_cents(weighted / total_volume as f64)
    } else {
        0.0
    };

    let mut top_tickers: Vec<TickerSummary> = reductions
        .into_iter()
        .map(|r| TickerSummary {
            ticker: r.ticker,
            volume: r.total_volume,
            avg_price: round_cents(r.avg_price),
            trade_count: r.trade_count,
        })
        .collect();
    // stable: equal volumes keep ticker order
    top_tickers.sort_by(|a, b| b.volume.cmp(&a.volume));
    top_tickers.truncate(TOP_TICKER_LIMIT);

    DailyAnalysis {
        date,
        total_volume,
        average_price,
        trade_count,
        top_tickers,
    }
}

/// Analyses `date` using the trades the source holds for that day.
pub fn analyze_day(
    source: &dyn TradeSource,
    date: NaiveDate,
) -> Result<DailyAnalysis, TradeflowError> {
    let window = day_window(date);
    let trades = source.trades_in_range(None, window.start, window.end)?;
    Ok(analyze_trades(date, &trades))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
