//! CLI integration tests.
//!
//! Tests cover:
//! - Config parsing (build_aggregator_config, build_crossover_config)
//! - Ticker and archive resolution
//! - Config loading from INI files on disk
//! - End-to-end command runs against a SQLite file

mod common;

use chrono::Duration;
use clap::Parser;
use std::io::Write;
use tradeflow::adapters::file_config_adapter::FileConfigAdapter;
use tradeflow::cli;
use tradeflow::domain::error::TradeflowError;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const VALID_INI: &str = r#"
[sqlite]
path = /tmp/tradeflow.db
pool_size = 2

[aggregator]
window_minutes = 15
fallback_ticker = msft

[backtest]
ticker = GOOGL
short_window = 20
long_window = 100
cooldown_days = 3

[archive]
path = /tmp/tradeflow-archive
"#;

mod config_loading {
    use super::*;

    #[test]
    fn aggregator_config_from_ini() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_aggregator_config(&adapter).unwrap();
        assert_eq!(config.window, Duration::minutes(15));
        assert_eq!(config.fallback_ticker, "MSFT");
    }

    #[test]
    fn aggregator_config_defaults() {
        let adapter = FileConfigAdapter::from_string("[aggregator]\n").unwrap();
        let config = cli::build_aggregator_config(&adapter).unwrap();
        assert_eq!(config.window, Duration::minutes(5));
        assert_eq!(config.fallback_ticker, "AAPL");
    }

    #[test]
    fn aggregator_config_rejects_zero_window() {
        let adapter =
            FileConfigAdapter::from_string("[aggregator]\nwindow_minutes = 0\n").unwrap();
        assert!(matches!(
            cli::build_aggregator_config(&adapter),
            Err(TradeflowError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn aggregator_config_rejects_window_beyond_a_year() {
        let adapter = FileConfigAdapter::from_string(
            "[aggregator]\nwindow_minutes = 99999999999999\n",
        )
        .unwrap();
        assert!(matches!(
            cli::build_aggregator_config(&adapter),
            Err(TradeflowError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn crossover_config_from_ini() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_crossover_config(&adapter).unwrap();
        assert_eq!(config.short_window, 20);
        assert_eq!(config.long_window, 100);
        assert_eq!(config.cooldown_days, 3);
    }

    #[test]
    fn crossover_config_defaults() {
        let adapter = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        let config = cli::build_crossover_config(&adapter).unwrap();
        assert_eq!(config.short_window, 50);
        assert_eq!(config.long_window, 200);
        assert_eq!(config.cooldown_days, 5);
    }

    #[test]
    fn crossover_config_rejects_inverted_windows() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\nshort_window = 200\nlong_window = 50\n",
        )
        .unwrap();
        match cli::build_crossover_config(&adapter) {
            Err(TradeflowError::ConfigInvalid { section, key, .. }) => {
                assert_eq!(section, "backtest");
                assert_eq!(key, "long_window");
            }
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn ticker_resolution_order() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        assert_eq!(cli::resolve_ticker(&adapter, Some(" tsla ")), "TSLA");
        assert_eq!(cli::resolve_ticker(&adapter, None), "GOOGL");

        let empty = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        assert_eq!(cli::resolve_ticker(&empty, None), "AAPL");
    }

    #[test]
    fn archive_only_when_configured() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let archive = cli::archive_from_config(&adapter).unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            archive.day_path(day),
            std::path::PathBuf::from("/tmp/tradeflow-archive/2024/01/15/trades.csv")
        );

        let empty = FileConfigAdapter::from_string("[sqlite]\npath = x.db\n").unwrap();
        assert!(cli::archive_from_config(&empty).is_none());
    }

    #[test]
    fn load_config_from_disk() {
        let file = write_temp_ini(VALID_INI);
        let adapter = cli::load_config(file.path()).unwrap();
        assert_eq!(
            cli::build_crossover_config(&adapter).unwrap().long_window,
            100
        );
    }

    #[test]
    fn load_config_missing_file() {
        let err = cli::load_config(std::path::Path::new("/nonexistent/tradeflow.ini"))
            .err()
            .unwrap();
        assert!(matches!(err, TradeflowError::ConfigParse { .. }));
    }
}

mod scheduled_aggregation {
    use super::*;
    use crate::common::*;
    use tradeflow::domain::aggregate::AggregatorConfig;

    fn source() -> MockTradeSource {
        MockTradeSource::new().with_trades(vec![
            make_trade("AAPL", 100.0, "2024-01-15T10:00:00"),
            make_trade("AAPL", 102.0, "2024-01-15T10:05:00"),
        ])
    }

    #[test]
    fn one_shot_tick_returns_store_failure() {
        let store = MockAggregateStore::new().with_error("database is locked");
        let err = cli::aggregate_tick(&source(), &store, &AggregatorConfig::default(), false, false)
            .unwrap_err();
        assert!(matches!(err, TradeflowError::PersistenceUnavailable { .. }));
        assert_eq!(*store.attempts.borrow(), 1);
    }

    #[test]
    fn scheduled_tick_swallows_store_failure() {
        let store = MockAggregateStore::new().with_error("database is locked");
        let aggregates =
            cli::aggregate_tick(&source(), &store, &AggregatorConfig::default(), false, true)
                .unwrap();
        assert!(aggregates.is_empty());
        assert_eq!(*store.attempts.borrow(), 1);
    }

    #[test]
    fn scheduled_tick_swallows_source_failure() {
        let source = MockTradeSource::new().with_error("connection refused");
        let store = MockAggregateStore::new();
        let aggregates =
            cli::aggregate_tick(&source, &store, &AggregatorConfig::default(), true, true).unwrap();
        assert!(aggregates.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn scheduled_ticks_keep_one_row_per_window() {
        let source = source();
        let store = MockAggregateStore::new();
        for _ in 0..3 {
            let aggregates =
                cli::aggregate_tick(&source, &store, &AggregatorConfig::default(), false, true)
                    .unwrap();
            assert_eq!(aggregates.len(), 1);
            assert_eq!(aggregates[0].avg_price, 101.0);
        }
        assert_eq!(store.len(), 1);
    }
}

#[cfg(feature = "sqlite")]
mod end_to_end {
    use super::*;
    use crate::common::*;
    use tempfile::TempDir;
    use tradeflow::adapters::sqlite_adapter::SqliteAdapter;
    use tradeflow::ports::store_port::{AggregateStore, TradeLedger};

    fn ini_for(dir: &TempDir) -> tempfile::NamedTempFile {
        write_temp_ini(&format!(
            "[sqlite]\npath = {}\n\n[archive]\npath = {}\n",
            dir.path().join("trades.db").display(),
            dir.path().join("archive").display()
        ))
    }

    fn run(args: &[&str]) {
        let cli = cli::Cli::parse_from(std::iter::once("tradeflow").chain(args.iter().copied()));
        let _ = cli::run(cli);
    }

    #[test]
    fn record_then_aggregate() {
        let dir = TempDir::new().unwrap();
        let ini = ini_for(&dir);
        let config = ini.path().to_str().unwrap();

        for (price, at) in [("100", "2024-01-15T10:00:00Z"), ("102", "2024-01-15T10:05:00Z")] {
            run(&[
                "record-trade",
                "--config",
                config,
                "--ticker",
                "aapl",
                "--price",
                price,
                "--quantity",
                "10",
                "--side",
                "buy",
                "--timestamp",
                at,
            ]);
        }
        run(&["aggregate", "--config", config]);
        run(&["aggregate", "--config", config]);

        let store = SqliteAdapter::open(dir.path().join("trades.db"), 1).unwrap();
        assert_eq!(store.list_trades().unwrap().len(), 2);

        let rows = store.list_aggregates(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "AAPL");
        assert_eq!(rows[0].avg_price, 101.0);
        assert_eq!(rows[0].period_start, Some(ts("2024-01-15T10:00:00")));

        assert!(dir.path().join("archive/2024/01/15/trades.csv").exists());
    }

    #[test]
    fn rejected_trade_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let ini = ini_for(&dir);
        let config = ini.path().to_str().unwrap();

        run(&[
            "record-trade",
            "--config",
            config,
            "--ticker",
            "AAPL",
            "--price=-5",
            "--quantity",
            "10",
            "--side",
            "buy",
            "--timestamp",
            "2024-01-15T10:00:00Z",
        ]);

        let store = SqliteAdapter::open(dir.path().join("trades.db"), 1).unwrap();
        assert!(store.list_trades().unwrap().is_empty());
    }
}
