//! Windowed aggregation with at-most-once persistence.
//!
//! Each invocation looks up the latest trade, builds the trailing window that
//! ends at its timestamp, reduces the window's trades per ticker and offers
//! the result to the aggregate store. The store's `(ticker, period_start,
//! period_end)` uniqueness is the only concurrency control: a second write of
//! the same window is dropped, never merged.

use crate::domain::error::TradeflowError;
use crate::domain::observation::format_timestamp;
use crate::domain::window::{DEFAULT_WINDOW_MINUTES, TickerReduction, Window, reduce_by_ticker};
use crate::ports::source_port::TradeSource;
use crate::ports::store_port::AggregateStore;
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info};

pub const DEFAULT_FALLBACK_TICKER: &str = "AAPL";

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub ticker: String,
    pub avg_price: f64,
    /// `None` only for the empty-source fallback, which is never stored.
    pub period_start: Option<NaiveDateTime>,
    pub period_end: Option<NaiveDateTime>,
    pub trade_count: i64,
}

impl Aggregate {
    /// Placeholder returned when the source holds no trades at all.
    pub fn empty_source(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            avg_price: 0.0,
            period_start: None,
            period_end: None,
            trade_count: 0,
        }
    }

    /// Placeholder stored when the window itself holds no trades.
    pub fn empty_window(ticker: &str, window: &Window) -> Self {
        Self {
            ticker: ticker.to_string(),
            avg_price: 0.0,
            period_start: Some(window.start),
            period_end: Some(window.end),
            trade_count: 0,
        }
    }

    fn from_reduction(reduction: TickerReduction, window: &Window) -> Self {
        Self {
            ticker: reduction.ticker,
            avg_price: reduction.avg_price,
            period_start: Some(window.start),
            period_end: Some(window.end),
            trade_count: reduction.trade_count,
        }
    }

    /// ISO-8601 start bound, or `""` when unknown.
    pub fn period_start_str(&self) -> String {
        format_period(self.period_start.as_ref())
    }

    pub fn period_end_str(&self) -> String {
        format_period(self.period_end.as_ref())
    }
}

pub fn format_period(bound: Option<&NaiveDateTime>) -> String {
    bound.map(format_timestamp).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub window: Duration,
    pub fallback_ticker: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: Duration::minutes(DEFAULT_WINDOW_MINUTES),
            fallback_ticker: DEFAULT_FALLBACK_TICKER.to_string(),
        }
    }
}

/// Aggregates the trailing window ending at the latest trade and stores one
/// representative aggregate: the lexicographically first ticker in the window.
pub fn compute_and_store_window_average(
    source: &dyn TradeSource,
    store: &dyn AggregateStore,
    config: &AggregatorConfig,
) -> Result<Aggregate, TradeflowError> {
    let Some(window) = latest_window(source, config)? else {
        return Ok(Aggregate::empty_source(&config.fallback_ticker));
    };
    aggregate_window(source, store, &window, config)
}

/// Like [`compute_and_store_window_average`] but stores one aggregate per
/// ticker present in the window.
pub fn compute_and_store_window_averages(
    source: &dyn TradeSource,
    store: &dyn AggregateStore,
    config: &AggregatorConfig,
) -> Result<Vec<Aggregate>, TradeflowError> {
    let Some(window) = latest_window(source, config)? else {
        return Ok(vec![Aggregate::empty_source(&config.fallback_ticker)]);
    };
    aggregate_window_all(source, store, &window, config)
}

/// Reduces an explicit window and stores the representative aggregate.
pub fn aggregate_window(
    source: &dyn TradeSource,
    store: &dyn AggregateStore,
    window: &Window,
    config: &AggregatorConfig,
) -> Result<Aggregate, TradeflowError> {
    let aggregate = reduce_window(source, window, config)?
        .into_iter()
        .next()
        .unwrap_or_else(|| Aggregate::empty_window(&config.fallback_ticker, window));
    persist(store, &aggregate)?;
    Ok(aggregate)
}

pub fn aggregate_window_all(
    source: &dyn TradeSource,
    store: &dyn AggregateStore,
    window: &Window,
    config: &AggregatorConfig,
) -> Result<Vec<Aggregate>, TradeflowError> {
    let mut aggregates = reduce_window(source, window, config)?;
    if aggregates.is_empty() {
        aggregates.push(Aggregate::empty_window(&config.fallback_ticker, window));
    }
    for aggregate in &aggregates {
        persist(store, aggregate)?;
    }
    Ok(aggregates)
}

fn latest_window(
    source: &dyn TradeSource,
    config: &AggregatorConfig,
) -> Result<Option<Window>, TradeflowError> {
    match source.latest_trade()? {
        Some(latest) => {
            let window = Window::trailing(latest.timestamp, config.window)?;
            debug!(
                start = %format_timestamp(&window.start),
                end = %format_timestamp(&window.end),
                "aggregation window from latest trade"
            );
            Ok(Some(window))
        }
        None => {
            debug!("no trades recorded, using fallback aggregate");
            Ok(None)
        }
    }
}

fn reduce_window(
    source: &dyn TradeSource,
    window: &Window,
    config: &AggregatorConfig,
) -> Result<Vec<Aggregate>, TradeflowError> {
    let trades = source.trades_in_range(window.ticker.as_deref(), window.start, window.end)?;
    debug!(count = trades.len(), "trades in window");

    let in_window = trades.iter().filter(|t| window.contains(t));
    let aggregates: Vec<Aggregate> = reduce_by_ticker(in_window)
        .into_iter()
        .map(|r| Aggregate::from_reduction(r, window))
        .collect();

    if aggregates.is_empty() {
        debug!(
            fallback_ticker = %config.fallback_ticker,
            "no trades in window, storing fallback aggregate"
        );
    }
    Ok(aggregates)
}

fn persist(store: &dyn AggregateStore, aggregate: &Aggregate) -> Result<(), TradeflowError> {
    let inserted = store.upsert_if_absent(aggregate)?;
    info!(
        ticker = %aggregate.ticker,
        avg_price = aggregate.avg_price,
        trade_count = aggregate.trade_count,
        period_start = %aggregate.period_start_str(),
        period_end = %aggregate.period_end_str(),
        inserted,
        "window aggregate upserted"
    );
    Ok(())
}
