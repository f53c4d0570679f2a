//! Configuration validation.
//!
//! Validates config sections before a pipeline runs, so bad values surface as
//! `ConfigInvalid` instead of odd results.

use crate::domain::aggregate::DEFAULT_FALLBACK_TICKER;
use crate::domain::backtest::{DEFAULT_COOLDOWN_DAYS, DEFAULT_LONG_WINDOW, DEFAULT_SHORT_WINDOW};
use crate::domain::error::TradeflowError;
use crate::domain::window::{DEFAULT_WINDOW_MINUTES, MAX_WINDOW_MINUTES};
use crate::ports::config_port::ConfigPort;

pub fn validate_aggregator_config(config: &dyn ConfigPort) -> Result<(), TradeflowError> {
    validate_window_minutes(config)?;
    validate_fallback_ticker(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TradeflowError> {
    validate_windows(config)?;
    validate_cooldown(config)?;
    validate_ticker(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> TradeflowError {
    TradeflowError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_window_minutes(config: &dyn ConfigPort) -> Result<(), TradeflowError> {
    let minutes = config.get_int("aggregator", "window_minutes", DEFAULT_WINDOW_MINUTES);
    if minutes <= 0 {
        return Err(invalid(
            "aggregator",
            "window_minutes",
            "window_minutes must be positive",
        ));
    }
    if minutes > MAX_WINDOW_MINUTES {
        return Err(invalid(
            "aggregator",
            "window_minutes",
            "window_minutes must be at most one year (525600)",
        ));
    }
    Ok(())
}

fn validate_fallback_ticker(config: &dyn ConfigPort) -> Result<(), TradeflowError> {
    let ticker = config
        .get_string("aggregator", "fallback_ticker")
        .unwrap_or_else(|| DEFAULT_FALLBACK_TICKER.to_string());
    if ticker.trim().is_empty() {
        return Err(invalid(
            "aggregator",
            "fallback_ticker",
            "fallback_ticker must not be empty",
        ));
    }
    Ok(())
}

fn validate_windows(config: &dyn ConfigPort) -> Result<(), TradeflowError> {
    let short = config.get_int("backtest", "short_window", DEFAULT_SHORT_WINDOW as i64);
    let long = config.get_int("backtest", "long_window", DEFAULT_LONG_WINDOW as i64);
    if short < 1 {
        return Err(invalid(
            "backtest",
            "short_window",
            "short_window must be at least 1",
        ));
    }
    if long <= short {
        return Err(invalid(
            "backtest",
            "long_window",
            "long_window must be greater than short_window",
        ));
    }
    Ok(())
}

fn validate_cooldown(config: &dyn ConfigPort) -> Result<(), TradeflowError> {
    let days = config.get_int("backtest", "cooldown_days", DEFAULT_COOLDOWN_DAYS);
    if days < 0 {
        return Err(invalid(
            "backtest",
            "cooldown_days",
            "cooldown_days must be non-negative",
        ));
    }
    Ok(())
}

fn validate_ticker(config: &dyn ConfigPort) -> Result<(), TradeflowError> {
    if let Some(ticker) = config.get_string("backtest", "ticker") {
        if ticker.trim().is_empty() {
            return Err(invalid("backtest", "ticker", "ticker must not be empty"));
        }
    }
    Ok(())
}
