//! JSON HTTP surface over the aggregation, backtest and ingestion pipelines.

mod error;
mod handlers;

pub use error::WebError;
pub use handlers::*;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domain::aggregate::AggregatorConfig;
use crate::domain::backtest::CrossoverConfig;
use crate::ports::source_port::{PriceHistorySource, TradeSource};
use crate::ports::store_port::{AggregateStore, TradeJournal, TradeLedger, TradeStore};

const FRONTEND_ORIGIN: &str = "http://localhost:3000";

pub struct AppState {
    pub trades: Arc<dyn TradeSource + Send + Sync>,
    pub ledger: Arc<dyn TradeLedger + Send + Sync>,
    pub aggregates: Arc<dyn AggregateStore + Send + Sync>,
    pub prices: Arc<dyn PriceHistorySource + Send + Sync>,
    pub journal: Option<Arc<dyn TradeJournal + Send + Sync>>,
    pub aggregator: AggregatorConfig,
    pub crossover: CrossoverConfig,
    pub default_ticker: String,
}

impl AppState {
    /// State where one backend serves every port.
    pub fn from_store<S: TradeStore + 'static>(
        store: Arc<S>,
        crossover: CrossoverConfig,
        default_ticker: impl Into<String>,
    ) -> Self {
        Self {
            trades: store.clone(),
            ledger: store.clone(),
            aggregates: store.clone(),
            prices: store,
            journal: None,
            aggregator: AggregatorConfig::default(),
            crossover,
            default_ticker: default_ticker.into(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn TradeJournal + Send + Sync>) -> Self {
        self.journal = Some(journal);
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static(FRONTEND_ORIGIN))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/averages", get(handlers::compute_averages))
        .route("/averages/history", get(handlers::list_averages))
        .route("/simulate", post(handlers::simulate))
        .route("/trades", get(handlers::list_trades).post(handlers::create_trade))
        .route("/analyze", post(handlers::analyze))
        .route("/analyze/archive", post(handlers::analyze_archive))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
