//! CSV file adapters: a price-history source and the daily trade archive.

use crate::domain::error::TradeflowError;
use crate::domain::observation::{
    DATE_FORMAT, PricePoint, StoredTrade, Trade, format_timestamp, parse_timestamp,
};
use crate::ports::source_port::PriceHistorySource;
use crate::ports::store_port::TradeJournal;
use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

const ARCHIVE_HEADER: [&str; 6] = ["id", "ticker", "price", "quantity", "trade_type", "timestamp"];

/// Daily closes read from a single `date,ticker,close_price` file.
pub struct CsvPriceHistory {
    path: PathBuf,
}

impl CsvPriceHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Every row in the file, in file order.
    pub fn read_all(&self) -> Result<Vec<PricePoint>, TradeflowError> {
        let mut rdr = csv::Reader::from_path(&self.path).map_err(|e| {
            TradeflowError::source_unavailable(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut points = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;
            points.push(price_from_record(&record, line + 2)?);
        }
        debug!(path = %self.path.display(), rows = points.len(), "loaded price csv");
        Ok(points)
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    name: &str,
    line: usize,
) -> Result<&'r str, TradeflowError> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| TradeflowError::invalid_input(format!("line {line}: missing {name} column")))
}

fn price_from_record(record: &csv::StringRecord, line: usize) -> Result<PricePoint, TradeflowError> {
    let date_str = field(record, 0, "date", line)?;
    let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|e| {
        TradeflowError::invalid_input(format!("line {line}: invalid date '{date_str}': {e}"))
    })?;

    let ticker = field(record, 1, "ticker", line)?.to_uppercase();
    if ticker.is_empty() {
        return Err(TradeflowError::invalid_input(format!("line {line}: empty ticker")));
    }

    let close_str = field(record, 2, "close_price", line)?;
    let close_price: f64 = close_str.parse().map_err(|e| {
        TradeflowError::invalid_input(format!(
            "line {line}: invalid close_price '{close_str}': {e}"
        ))
    })?;

    Ok(PricePoint {
        date,
        ticker,
        close_price,
    })
}

impl PriceHistorySource for CsvPriceHistory {
    fn price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, TradeflowError> {
        let mut points: Vec<PricePoint> = self
            .read_all()?
            .into_iter()
            .filter(|p| p.ticker == ticker)
            .collect();
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

/// Append-only CSV archive of recorded trades, one file per day at
/// `<root>/YYYY/MM/DD/trades.csv`.
pub struct TradeArchive {
    root: PathBuf,
}

impl TradeArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(date.format("%d").to_string())
            .join("trades.csv")
    }

    /// Appends `stored` to the file for its trade date, writing the header
    /// when the file is new.
    pub fn append(&self, stored: &StoredTrade) -> Result<PathBuf, TradeflowError> {
        let path = self.day_path(stored.trade.timestamp.date());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut wtr = csv::Writer::from_writer(file);
        if is_new {
            wtr.write_record(ARCHIVE_HEADER)?;
        }

        let t = &stored.trade;
        wtr.write_record([
            stored.id.to_string(),
            t.ticker.clone(),
            t.price.to_string(),
            t.quantity.to_string(),
            t.side.as_str().to_string(),
            format_timestamp(&t.timestamp),
        ])?;
        wtr.flush()?;

        debug!(id = stored.id, path = %path.display(), "archived trade");
        Ok(path)
    }
}

impl TradeJournal for TradeArchive {
    fn journal(&self, stored: &StoredTrade) -> Result<(), TradeflowError> {
        self.append(stored).map(|_| ())
    }

    /// A day with no archive file has no trades.
    fn trades_on(&self, date: NaiveDate) -> Result<Vec<Trade>, TradeflowError> {
        let path = self.day_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_archive(&path)
    }
}

fn read_archive(path: &Path) -> Result<Vec<Trade>, TradeflowError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut trades = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let line = line + 2;
        let price: f64 = field(&record, 2, "price", line)?.parse().map_err(|e| {
            TradeflowError::invalid_input(format!("line {line}: invalid price: {e}"))
        })?;
        let quantity: i64 = field(&record, 3, "quantity", line)?.parse().map_err(|e| {
            TradeflowError::invalid_input(format!("line {line}: invalid quantity: {e}"))
        })?;

        trades.push(Trade {
            ticker: field(&record, 1, "ticker", line)?.to_string(),
            price,
            quantity,
            side: field(&record, 4, "trade_type", line)?.parse()?,
            timestamp: parse_timestamp(field(&record, 5, "timestamp", line)?)?,
        });
    }
    Ok(trades)
}
