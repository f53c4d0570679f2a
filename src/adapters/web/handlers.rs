//! HTTP request handlers for the web adapter.
//!
//! Port calls are synchronous, so each handler moves its work onto the
//! blocking pool.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::aggregate::{Aggregate, compute_and_store_window_average};
use crate::domain::analysis::{
    DailyAnalysis, TickerSummary, analyze_day, analyze_trades, parse_analysis_date, round_cents,
};
use crate::domain::backtest::{BacktestResult, CrossoverConfig, Signal, backtest_from_source};
use crate::domain::error::TradeflowError;
use crate::domain::ingest::record_trade;
use crate::domain::observation::{DATE_FORMAT, StoredTrade, Trade, format_timestamp};
use crate::ports::store_port::TradeJournal;

use super::{AppState, WebError};

async fn blocking<T, F>(work: F) -> Result<T, WebError>
where
    F: FnOnce() -> Result<T, TradeflowError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| WebError::internal(format!("worker failed: {e}")))?
        .map_err(WebError::from)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregateDto {
    pub ticker: String,
    pub avg_price: f64,
    pub period_start: String,
    pub period_end: String,
    pub trade_count: i64,
}

impl From<&Aggregate> for AggregateDto {
    fn from(a: &Aggregate) -> Self {
        Self {
            ticker: a.ticker.clone(),
            avg_price: a.avg_price,
            period_start: a.period_start_str(),
            period_end: a.period_end_str(),
            trade_count: a.trade_count,
        }
    }
}

/// Runs the windowed aggregator once and returns the aggregate it produced.
pub async fn compute_averages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AggregateDto>>, WebError> {
    let aggregate = blocking(move || {
        compute_and_store_window_average(&*state.trades, &*state.aggregates, &state.aggregator)
    })
    .await?;
    Ok(Json(vec![AggregateDto::from(&aggregate)]))
}

#[derive(Debug, Default, Deserialize)]
pub struct AveragesQuery {
    pub ticker: Option<String>,
}

pub async fn list_averages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AveragesQuery>,
) -> Result<Json<Vec<AggregateDto>>, WebError> {
    let ticker = query.ticker.map(|t| t.trim().to_uppercase());
    let aggregates =
        blocking(move || state.aggregates.list_aggregates(ticker.as_deref())).await?;
    Ok(Json(aggregates.iter().map(AggregateDto::from).collect()))
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    pub ticker: Option<String>,
    pub short_window: Option<usize>,
    pub long_window: Option<usize>,
    pub cooldown_days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignalDto {
    pub date: String,
    pub ticker: String,
    pub action: String,
    pub price: f64,
}

impl From<&Signal> for SignalDto {
    fn from(s: &Signal) -> Self {
        Self {
            date: s.date.format(DATE_FORMAT).to_string(),
            ticker: s.ticker.clone(),
            action: s.action.to_string(),
            price: s.price,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub ticker: String,
    pub signals: Vec<SignalDto>,
    pub profit_loss: f64,
}

impl SimulateResponse {
    fn new(ticker: String, result: &BacktestResult) -> Self {
        Self {
            ticker,
            signals: result.signals.iter().map(SignalDto::from).collect(),
            profit_loss: round_cents(result.profit_loss),
        }
    }
}

/// Runs the crossover backtest. The body is optional; omitted fields fall
/// back to the server's configured defaults.
pub async fn simulate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SimulateResponse>, WebError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SimulateRequest::default()
    } else {
        let Json(request) = Json::<SimulateRequest>::from_bytes(&body)?;
        request
    };

    let ticker = request
        .ticker
        .map(|t| t.trim().to_uppercase())
        .unwrap_or_else(|| state.default_ticker.clone());
    let config = CrossoverConfig {
        short_window: request.short_window.unwrap_or(state.crossover.short_window),
        long_window: request.long_window.unwrap_or(state.crossover.long_window),
        cooldown_days: request.cooldown_days.unwrap_or(state.crossover.cooldown_days),
    };

    let worker_ticker = ticker.clone();
    let result = blocking(move || {
        backtest_from_source(&*state.prices, &worker_ticker, &config)
    })
    .await?;
    Ok(Json(SimulateResponse::new(ticker, &result)))
}

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub ticker: String,
    pub price: f64,
    pub quantity: i64,
    pub trade_type: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TradeDto {
    pub id: i64,
    pub ticker: String,
    pub price: f64,
    pub quantity: i64,
    pub trade_type: String,
    pub timestamp: String,
}

impl From<&StoredTrade> for TradeDto {
    fn from(s: &StoredTrade) -> Self {
        Self {
            id: s.id,
            ticker: s.trade.ticker.clone(),
            price: s.trade.price,
            quantity: s.trade.quantity,
            trade_type: s.trade.side.as_str().to_string(),
            timestamp: format_timestamp(&s.trade.timestamp),
        }
    }
}

pub async fn create_trade(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TradeDto>), WebError> {
    let Json(req) = payload?;
    let trade = Trade::parse(
        &req.ticker,
        req.price,
        req.quantity,
        &req.trade_type,
        &req.timestamp,
    )?;

    let stored = blocking(move || {
        let journal = state.journal.as_deref().map(|j| j as &dyn TradeJournal);
        record_trade(&*state.ledger, journal, trade)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(TradeDto::from(&stored))))
}

pub async fn list_trades(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TradeDto>>, WebError> {
    let trades = blocking(move || state.ledger.list_trades()).await?;
    Ok(Json(trades.iter().map(TradeDto::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub date: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TickerSummaryDto {
    pub ticker: String,
    pub volume: i64,
    pub avg_price: f64,
    pub trade_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyAnalysisDto {
    pub date: String,
    pub total_volume: i64,
    pub average_price: f64,
    pub trade_count: i64,
    pub top_tickers: Vec<TickerSummaryDto>,
}

impl From<&TickerSummary> for TickerSummaryDto {
    fn from(t: &TickerSummary) -> Self {
        Self {
            ticker: t.ticker.clone(),
            volume: t.volume,
            avg_price: t.avg_price,
            trade_count: t.trade_count,
        }
    }
}

impl From<&DailyAnalysis> for DailyAnalysisDto {
    fn from(a: &DailyAnalysis) -> Self {
        Self {
            date: a.date.format(DATE_FORMAT).to_string(),
            total_volume: a.total_volume,
            average_price: a.average_price,
            trade_count: a.trade_count,
            top_tickers: a.top_tickers.iter().map(TickerSummaryDto::from).collect(),
        }
    }
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<DailyAnalysisDto>, WebError> {
    let Json(req) = payload?;
    let date = parse_analysis_date(&req.date)?;
    let analysis = blocking(move || analyze_day(&*state.trades, date)).await?;
    Ok(Json(DailyAnalysisDto::from(&analysis)))
}

/// Same summary as [`analyze`], read from the CSV trade archive.
pub async fn analyze_archive(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<DailyAnalysisDto>, WebError> {
    let Json(req) = payload?;
    let date = parse_analysis_date(&req.date)?;
    let Some(journal) = state.journal.clone() else {
        return Err(TradeflowError::ConfigMissing {
            section: "archive".into(),
            key: "path".into(),
        }
        .into());
    };
    let trades = blocking(move || journal.trades_on(date)).await?;
    Ok(Json(DailyAnalysisDto::from(&analyze_trades(date, &trades))))
}

pub async fn not_found() -> WebError {
    WebError::not_found("not found")
}
