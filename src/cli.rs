//! CLI definition and dispatch.

use chrono::Duration;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

use crate::adapters::csv_adapter::{CsvPriceHistory, TradeArchive};
use crate::adapters::file_config_adapter::FileConfigAdapter;
#[cfg(feature = "postgres")]
use crate::adapters::postgres_adapter::PostgresAdapter;
#[cfg(feature = "sqlite")]
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::aggregate::{
    Aggregate, AggregatorConfig, DEFAULT_FALLBACK_TICKER, compute_and_store_window_average,
    compute_and_store_window_averages,
};
use crate::domain::analysis::{DailyAnalysis, analyze_day, analyze_trades, parse_analysis_date};
use crate::domain::backtest::{
    BacktestResult, CrossoverConfig, DEFAULT_COOLDOWN_DAYS, DEFAULT_LONG_WINDOW,
    DEFAULT_SHORT_WINDOW, backtest_from_source,
};
use crate::domain::config_validation::{validate_aggregator_config, validate_backtest_config};
use crate::domain::error::TradeflowError;
use crate::domain::ingest::record_trade;
use crate::domain::observation::{DATE_FORMAT, Trade, format_timestamp};
use crate::domain::window::DEFAULT_WINDOW_MINUTES;
use crate::ports::config_port::ConfigPort;
use crate::ports::source_port::{PriceHistorySource, TradeSource};
use crate::ports::store_port::{AggregateStore, TradeJournal, TradeStore};

#[derive(Parser, Debug)]
#[command(name = "tradeflow", about = "Windowed trade aggregation and crossover backtesting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Aggregate the trailing window ending at the latest trade
    Aggregate {
        #[arg(short, long)]
        config: PathBuf,
        /// Store one aggregate per ticker instead of the representative one
        #[arg(long)]
        all_tickers: bool,
        /// Repeat every N seconds until interrupted
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Run the moving-average crossover backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
        #[arg(long)]
        short_window: Option<usize>,
        #[arg(long)]
        long_window: Option<usize>,
        #[arg(long)]
        cooldown_days: Option<i64>,
        /// Read prices from a date,ticker,close_price CSV instead of the store
        #[arg(long)]
        prices: Option<PathBuf>,
    },
    /// Record a single trade
    RecordTrade {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        quantity: i64,
        /// buy or sell
        #[arg(long)]
        side: String,
        /// ISO-8601 timestamp, e.g. 2024-01-15T10:30:00Z
        #[arg(long)]
        timestamp: String,
    },
    /// Load daily closes from a date,ticker,close_price CSV into the store
    ImportPrices {
        #[arg(short, long)]
        config: PathBuf,
        file: PathBuf,
    },
    /// Summarise one day of trades
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        /// YYYY-MM-DD, YYYYMMDD or an ISO datetime
        #[arg(long)]
        date: String,
        /// Read the day from the CSV archive instead of the store
        #[arg(long)]
        archive: bool,
    },
    /// List recorded trades
    Trades {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Start the JSON web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Command {
    fn config_path(&self) -> &Path {
        match self {
            Command::Aggregate { config, .. }
            | Command::Backtest { config, .. }
            | Command::RecordTrade { config, .. }
            | Command::ImportPrices { config, .. }
            | Command::Analyze { config, .. }
            | Command::Trades { config }
            | Command::Serve { config } => config,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TradeflowError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

fn execute(command: Command) -> Result<(), TradeflowError> {
    let config = load_config(command.config_path())?;

    // commands that never touch the SQL store
    match &command {
        Command::Backtest {
            ticker,
            short_window,
            long_window,
            cooldown_days,
            prices,
            ..
        } => {
            let csv_path = prices
                .clone()
                .or_else(|| config.get_string("backtest", "prices_csv").map(PathBuf::from));
            if let Some(path) = csv_path {
                let crossover = crossover_with_overrides(
                    &config,
                    *short_window,
                    *long_window,
                    *cooldown_days,
                )?;
                let ticker = resolve_ticker(&config, ticker.as_deref());
                eprintln!("Reading prices from {}", path.display());
                return run_backtest(&CsvPriceHistory::new(path), &ticker, &crossover);
            }
        }
        Command::Analyze {
            date,
            archive: true,
            ..
        } => {
            let archive = archive_from_config(&config).ok_or_else(|| {
                TradeflowError::ConfigMissing {
                    section: "archive".into(),
                    key: "path".into(),
                }
            })?;
            let date = parse_analysis_date(date)?;
            let analysis = analyze_trades(date, &archive.trades_on(date)?);
            print_analysis(&analysis);
            return Ok(());
        }
        _ => {}
    }

    match open_backend(&config)? {
        #[cfg(feature = "sqlite")]
        Backend::Sqlite(store) => execute_with_store(&config, store, command),
        #[cfg(feature = "postgres")]
        Backend::Postgres(store) => execute_with_store(&config, store, command),
    }
}

enum Backend {
    #[cfg(feature = "sqlite")]
    Sqlite(Arc<SqliteAdapter>),
    #[cfg(feature = "postgres")]
    Postgres(Arc<PostgresAdapter>),
}

/// Postgres when `[postgres] connection_string` is set and the feature is
/// enabled, SQLite otherwise.
fn open_backend(config: &dyn ConfigPort) -> Result<Backend, TradeflowError> {
    #[cfg(feature = "postgres")]
    {
        if config.get_string("postgres", "connection_string").is_some() {
            let store = PostgresAdapter::from_config(config)?;
            store.initialize_schema()?;
            return Ok(Backend::Postgres(Arc::new(store)));
        }
    }
    open_default_backend(config)
}

#[cfg(feature = "sqlite")]
fn open_default_backend(config: &dyn ConfigPort) -> Result<Backend, TradeflowError> {
    let store = SqliteAdapter::from_config(config)?;
    store.initialize_schema()?;
    Ok(Backend::Sqlite(Arc::new(store)))
}

#[cfg(not(feature = "sqlite"))]
fn open_default_backend(_config: &dyn ConfigPort) -> Result<Backend, TradeflowError> {
    Err(TradeflowError::ConfigMissing {
        section: "postgres".into(),
        key: "connection_string".into(),
    })
}

fn execute_with_store<S: TradeStore + 'static>(
    config: &FileConfigAdapter,
    store: Arc<S>,
    command: Command,
) -> Result<(), TradeflowError> {
    match command {
        Command::Aggregate {
            all_tickers,
            interval_secs,
            ..
        } => run_aggregate(config, &*store, all_tickers, interval_secs),
        Command::Backtest {
            ticker,
            short_window,
            long_window,
            cooldown_days,
            ..
        } => {
            let crossover =
                crossover_with_overrides(config, short_window, long_window, cooldown_days)?;
            let ticker = resolve_ticker(config, ticker.as_deref());
            run_backtest(&*store, &ticker, &crossover)
        }
        Command::RecordTrade {
            ticker,
            price,
            quantity,
            side,
            timestamp,
            ..
        } => {
            let trade = Trade::parse(&ticker, price, quantity, &side, &timestamp)?;
            let archive = archive_from_config(config);
            let journal = archive.as_ref().map(|a| a as &dyn TradeJournal);
            let stored = record_trade(&*store, journal, trade)?;
            println!("{}", stored.id);
            Ok(())
        }
        Command::ImportPrices { file, .. } => {
            let points = CsvPriceHistory::new(&file).read_all()?;
            let written = store.insert_prices(&points)?;
            eprintln!("Imported {} prices from {}", written, file.display());
            Ok(())
        }
        Command::Analyze { date, .. } => {
            let date = parse_analysis_date(&date)?;
            print_analysis(&analyze_day(&*store, date)?);
            Ok(())
        }
        Command::Trades { .. } => {
            for stored in store.list_trades()? {
                let t = &stored.trade;
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    stored.id,
                    format_timestamp(&t.timestamp),
                    t.ticker,
                    t.side,
                    t.quantity,
                    t.price
                );
            }
            Ok(())
        }
        Command::Serve { .. } => run_serve(config, store),
    }
}

fn run_aggregate<S: TradeStore>(
    config: &dyn ConfigPort,
    store: &S,
    all_tickers: bool,
    interval_secs: Option<u64>,
) -> Result<(), TradeflowError> {
    let aggregator = build_aggregator_config(config)?;
    let scheduled = interval_secs.is_some();

    loop {
        aggregate_tick(store, store, &aggregator, all_tickers, scheduled)?
            .iter()
            .for_each(print_aggregate);

        let Some(secs) = interval_secs else {
            return Ok(());
        };
        std::thread::sleep(std::time::Duration::from_secs(secs));
    }
}

/// One aggregation run. In scheduled mode a failure is logged and reported
/// and the tick yields no aggregates, so the loop keeps going; otherwise the
/// error is returned.
pub fn aggregate_tick(
    source: &dyn TradeSource,
    store: &dyn AggregateStore,
    aggregator: &AggregatorConfig,
    all_tickers: bool,
    scheduled: bool,
) -> Result<Vec<Aggregate>, TradeflowError> {
    let outcome = if all_tickers {
        compute_and_store_window_averages(source, store, aggregator)
    } else {
        compute_and_store_window_average(source, store, aggregator).map(|a| vec![a])
    };

    match outcome {
        Err(e) if scheduled => {
            warn!(error = %e, "scheduled aggregation failed");
            eprintln!("error: {e}");
            Ok(Vec::new())
        }
        other => other,
    }
}

fn run_backtest(
    source: &dyn PriceHistorySource,
    ticker: &str,
    crossover: &CrossoverConfig,
) -> Result<(), TradeflowError> {
    eprintln!(
        "Backtesting {} (short {}, long {}, cooldown {} days)",
        ticker, crossover.short_window, crossover.long_window, crossover.cooldown_days
    );
    let result = backtest_from_source(source, ticker, crossover)?;
    print_backtest(&result);
    Ok(())
}

#[cfg(any(feature = "web-sqlite", feature = "web-postgres"))]
fn run_serve<S: TradeStore + 'static>(
    config: &FileConfigAdapter,
    store: Arc<S>,
) -> Result<(), TradeflowError> {
    use crate::adapters::web::{AppState, build_router};
    use std::net::SocketAddr;

    let listen = config
        .get_string("web", "listen")
        .unwrap_or_else(|| "127.0.0.1:3000".to_string());
    let addr: SocketAddr = listen.parse().map_err(|e| TradeflowError::ConfigInvalid {
        section: "web".into(),
        key: "listen".into(),
        reason: format!("{listen}: {e}"),
    })?;

    let crossover = build_crossover_config(config)?;
    let aggregator = build_aggregator_config(config)?;
    let mut state = AppState::from_store(store, crossover, resolve_ticker(config, None))
        .with_aggregator(aggregator);
    if let Some(archive) = archive_from_config(config) {
        state = state.with_journal(Arc::new(archive));
    }
    let router = build_router(state);

    eprintln!("Starting web server on {}", addr);
    tokio::runtime::Runtime::new()?.block_on(async {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await
    })?;
    Ok(())
}

#[cfg(not(any(feature = "web-sqlite", feature = "web-postgres")))]
fn run_serve<S: TradeStore + 'static>(
    _config: &FileConfigAdapter,
    _store: Arc<S>,
) -> Result<(), TradeflowError> {
    Err(TradeflowError::invalid_input(
        "the web feature is required for serve",
    ))
}

pub fn build_aggregator_config(
    config: &dyn ConfigPort,
) -> Result<AggregatorConfig, TradeflowError> {
    validate_aggregator_config(config)?;
    let minutes = config.get_int("aggregator", "window_minutes", DEFAULT_WINDOW_MINUTES);
    let fallback_ticker = config
        .get_string("aggregator", "fallback_ticker")
        .map(|t| t.to_uppercase())
        .unwrap_or_else(|| DEFAULT_FALLBACK_TICKER.to_string());
    Ok(AggregatorConfig {
        window: Duration::minutes(minutes),
        fallback_ticker,
    })
}

pub fn build_crossover_config(config: &dyn ConfigPort) -> Result<CrossoverConfig, TradeflowError> {
    validate_backtest_config(config)?;
    // validated above: both windows are positive
    let short_window =
        config.get_int("backtest", "short_window", DEFAULT_SHORT_WINDOW as i64) as usize;
    let long_window =
        config.get_int("backtest", "long_window", DEFAULT_LONG_WINDOW as i64) as usize;
    Ok(CrossoverConfig {
        short_window,
        long_window,
        cooldown_days: config.get_int("backtest", "cooldown_days", DEFAULT_COOLDOWN_DAYS),
    })
}

fn crossover_with_overrides(
    config: &dyn ConfigPort,
    short_window: Option<usize>,
    long_window: Option<usize>,
    cooldown_days: Option<i64>,
) -> Result<CrossoverConfig, TradeflowError> {
    let base = build_crossover_config(config)?;
    Ok(CrossoverConfig {
        short_window: short_window.unwrap_or(base.short_window),
        long_window: long_window.unwrap_or(base.long_window),
        cooldown_days: cooldown_days.unwrap_or(base.cooldown_days),
    })
}

/// The `--ticker` flag, then `[backtest] ticker`, then AAPL.
pub fn resolve_ticker(config: &dyn ConfigPort, flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .or_else(|| config.get_string("backtest", "ticker"))
        .unwrap_or_else(|| DEFAULT_FALLBACK_TICKER.to_string())
        .trim()
        .to_uppercase()
}

pub fn archive_from_config(config: &dyn ConfigPort) -> Option<TradeArchive> {
    config.get_string("archive", "path").map(TradeArchive::new)
}

fn print_aggregate(aggregate: &Aggregate) {
    println!(
        "{}\tavg_price={:.2}\ttrade_count={}\tperiod={}..{}",
        aggregate.ticker,
        aggregate.avg_price,
        aggregate.trade_count,
        aggregate.period_start_str(),
        aggregate.period_end_str()
    );
}

fn print_backtest(result: &BacktestResult) {
    for signal in &result.signals {
        println!(
            "{}\t{}\t{}\t{:.2}",
            signal.date.format(DATE_FORMAT),
            signal.action,
            signal.ticker,
            signal.price
        );
    }
    eprintln!("Signals:     {}", result.signals.len());
    println!("Profit/Loss: {:.2}", result.profit_loss);
}

fn print_analysis(analysis: &DailyAnalysis) {
    println!("Date:          {}", analysis.date.format(DATE_FORMAT));
    println!("Trades:        {}", analysis.trade_count);
    println!("Total Volume:  {}", analysis.total_volume);
    println!("Average Price: {:.2}", analysis.average_price);
    if !analysis.top_tickers.is_empty() {
        println!("\nTop Tickers:");
        for t in &analysis.top_tickers {
            println!(
                "  {:<8} volume={:<10} avg_price={:.2} trades={}",
                t.ticker, t.volume, t.avg_price, t.trade_count
            );
        }
    }
}
