//! Moving-average crossover backtest.
//!
//! Golden cross (short SMA moves from below to above the long SMA) emits a
//! buy, death cross emits a sell. After any signal, new signals are suppressed
//! until `cooldown_days` calendar days have passed.
//!
//! P/L sign convention: closing on a sell adds `price - entry`, but a buy that
//! finds a position still open (its sell was suppressed by the cooldown) adds
//! `entry - price`, as if that position had been short. This asymmetry is kept
//! as-is because changing it changes reported results. Positions still open at
//! the end of the series are not marked to market.

use crate::domain::error::TradeflowError;
use crate::domain::observation::PricePoint;
use crate::domain::rolling::simple_moving_average;
use crate::ports::source_port::PriceHistorySource;
use chrono::NaiveDate;
use std::fmt;
use tracing::debug;

pub const DEFAULT_SHORT_WINDOW: usize = 50;
pub const DEFAULT_LONG_WINDOW: usize = 200;
pub const DEFAULT_COOLDOWN_DAYS: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CrossoverConfig {
    pub short_window: usize,
    pub long_window: usize,
    pub cooldown_days: i64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            short_window: DEFAULT_SHORT_WINDOW,
            long_window: DEFAULT_LONG_WINDOW,
            cooldown_days: DEFAULT_COOLDOWN_DAYS,
        }
    }
}

impl CrossoverConfig {
    pub fn validate(&self) -> Result<(), TradeflowError> {
        if self.short_window == 0 {
            return Err(TradeflowError::invalid_input("short_window must be at least 1"));
        }
        if self.long_window <= self.short_window {
            return Err(TradeflowError::invalid_input(format!(
                "long_window ({}) must be greater than short_window ({})",
                self.long_window, self.short_window
            )));
        }
        if self.cooldown_days < 0 {
            return Err(TradeflowError::invalid_input("cooldown_days must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "buy"),
            SignalAction::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: SignalAction,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestResult {
    pub signals: Vec<Signal>,
    pub profit_loss: f64,
}

/// Runs the crossover scan over the `ticker` rows of `series`.
pub fn run_backtest(
    series: &[PricePoint],
    ticker: &str,
    config: &CrossoverConfig,
) -> Result<BacktestResult, TradeflowError> {
    config.validate()?;

    let mut rows: Vec<&PricePoint> = series.iter().filter(|p| p.ticker == ticker).collect();
    rows.sort_by_key(|p| p.date);

    if rows.len() < config.long_window {
        debug!(
            ticker,
            rows = rows.len(),
            long_window = config.long_window,
            "not enough price history for crossover scan"
        );
        return Ok(BacktestResult::default());
    }

    let closes: Vec<f64> = rows.iter().map(|p| p.close_price).collect();
    let sma_short = simple_moving_average(&closes, config.short_window);
    let sma_long = simple_moving_average(&closes, config.long_window);

    let mut result = BacktestResult::default();
    let mut position: Option<Signal> = None;
    let mut last_signal_date: Option<NaiveDate> = None;

    for i in config.long_window..rows.len() {
        let (Some(short_prev), Some(long_prev), Some(short_now), Some(long_now)) =
            (sma_short[i - 1], sma_long[i - 1], sma_short[i], sma_long[i])
        else {
            continue;
        };

        let date = rows[i].date;
        if let Some(last) = last_signal_date {
            if (date - last).num_days() < config.cooldown_days {
                continue;
            }
        }

        let price = closes[i];
        let action = if short_prev < long_prev && short_now > long_now {
            SignalAction::Buy
        } else if short_prev > long_prev && short_now < long_now {
            SignalAction::Sell
        } else {
            continue;
        };

        let signal = Signal {
            date,
            ticker: ticker.to_string(),
            action,
            price,
        };

        match action {
            SignalAction::Buy => {
                if let Some(entry) = position.take() {
                    result.profit_loss += entry.price - price;
                }
                position = Some(signal.clone());
            }
            SignalAction::Sell => {
                if let Some(entry) = position.take() {
                    result.profit_loss += price - entry.price;
                }
            }
        }

        debug!(%date, %action, price, "crossover signal");
        last_signal_date = Some(date);
        result.signals.push(signal);
    }

    debug!(
        ticker,
        signals = result.signals.len(),
        profit_loss = result.profit_loss,
        "backtest complete"
    );
    Ok(result)
}

/// Validates `config`, then loads `ticker`'s history from `source` and runs
/// the scan. Invalid parameters never reach the source.
pub fn backtest_from_source(
    source: &dyn PriceHistorySource,
    ticker: &str,
    config: &CrossoverConfig,
) -> Result<BacktestResult, TradeflowError> {
    config.validate()?;
    let series = source.price_history(ticker)?;
    run_backtest(&series, ticker, config)
}
