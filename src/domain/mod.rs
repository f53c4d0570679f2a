//! Core domain types and pipelines.

pub mod observation;
pub mod window;
pub mod rolling;
pub mod aggregate;
pub mod backtest;
pub mod analysis;
pub mod ingest;
pub mod config_validation;
pub mod error;
