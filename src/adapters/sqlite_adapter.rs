//! SQLite adapter: trade ledger, price history and aggregate store.

use crate::domain::aggregate::Aggregate;
use crate::domain::error::TradeflowError;
use crate::domain::observation::{
    DATE_FORMAT, PricePoint, StoredTrade, TIMESTAMP_FORMAT, Trade, TradeSide, format_timestamp,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::source_port::{PriceHistorySource, TradeSource};
use crate::ports::store_port::{AggregateStore, TradeLedger, TradeStore};
use chrono::{NaiveDate, NaiveDateTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Row, params};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL,
        price REAL NOT NULL,
        quantity INTEGER NOT NULL,
        trade_type TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp);
    CREATE INDEX IF NOT EXISTS idx_trades_ticker ON trades(ticker);
    CREATE TABLE IF NOT EXISTS averages (
        ticker TEXT NOT NULL,
        avg_price REAL NOT NULL,
        period_start TEXT NOT NULL,
        period_end TEXT NOT NULL,
        trade_count INTEGER NOT NULL,
        PRIMARY KEY (ticker, period_start, period_end)
    );
    CREATE TABLE IF NOT EXISTS prices (
        ticker TEXT NOT NULL,
        date TEXT NOT NULL,
        close_price REAL NOT NULL,
        PRIMARY KEY (ticker, date)
    );";

type Conn = PooledConnection<SqliteConnectionManager>;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradeflowError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TradeflowError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        Self::open(db_path, pool_size)
    }

    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, TradeflowError> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| TradeflowError::source_unavailable(e))?;

        Ok(Self { pool })
    }

    /// A private in-memory database. The pool holds a single connection so
    /// every caller sees the same database.
    pub fn in_memory() -> Result<Self, TradeflowError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| TradeflowError::source_unavailable(e))?;

        Ok(Self { pool })
    }

    fn source_conn(&self) -> Result<Conn, TradeflowError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| TradeflowError::source_unavailable(e))
    }

    fn store_conn(&self) -> Result<Conn, TradeflowError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| TradeflowError::persistence_unavailable(e))
    }

    fn query_trades(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<StoredTrade>, TradeflowError> {
        let conn = self.source_conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e: rusqlite::Error| TradeflowError::source_unavailable(e))?;

        let rows = stmt
            .query_map(args, trade_from_row)
            .map_err(|e: rusqlite::Error| TradeflowError::source_unavailable(e))?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(|e: rusqlite::Error| TradeflowError::source_unavailable(e))?);
        }
        Ok(trades)
    }
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_stored_timestamp(column: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| conversion_error(column, e))
}

fn parse_stored_period(column: usize, raw: &str) -> rusqlite::Result<Option<NaiveDateTime>> {
    if raw.is_empty() {
        Ok(None)
    } else {
        parse_stored_timestamp(column, raw).map(Some)
    }
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<StoredTrade> {
    let side: String = row.get(4)?;
    let side = match side.as_str() {
        "buy" => TradeSide::Buy,
        "sell" => TradeSide::Sell,
        _ => {
            return Err(rusqlite::Error::InvalidColumnType(
                4,
                "trade_type".into(),
                rusqlite::types::Type::Text,
            ));
        }
    };
    let timestamp: String = row.get(5)?;
    Ok(StoredTrade {
        id: row.get(0)?,
        trade: Trade {
            ticker: row.get(1)?,
            price: row.get(2)?,
            quantity: row.get(3)?,
            side,
            timestamp: parse_stored_timestamp(5, &timestamp)?,
        },
    })
}

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<Aggregate> {
    let start: String = row.get(2)?;
    let end: String = row.get(3)?;
    Ok(Aggregate {
        ticker: row.get(0)?,
        avg_price: row.get(1)?,
        period_start: parse_stored_period(2, &start)?,
        period_end: parse_stored_period(3, &end)?,
        trade_count: row.get(4)?,
    })
}

impl TradeSource for SqliteAdapter {
    fn latest_trade(&self) -> Result<Option<Trade>, TradeflowError> {
        let trades = self.query_trades(
            "SELECT id, ticker, price, quantity, trade_type, timestamp
             FROM trades ORDER BY timestamp DESC, id DESC LIMIT 1",
            &[],
        )?;
        Ok(trades.into_iter().next().map(|t| t.trade))
    }

    fn trades_in_range(
        &self,
        ticker: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Trade>, TradeflowError> {
        let start_str = format_timestamp(&start);
        let end_str = format_timestamp(&end);
        let trades = match ticker {
            Some(t) => self.query_trades(
                "SELECT id, ticker, price, quantity, trade_type, timestamp
                 FROM trades
                 WHERE ticker = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp ASC, id ASC",
                &[&t, &start_str, &end_str],
            )?,
            None => self.query_trades(
                "SELECT id, ticker, price, quantity, trade_type, timestamp
                 FROM trades
                 WHERE timestamp >= ?1 AND timestamp <= ?2
                 ORDER BY timestamp ASC, id ASC",
                &[&start_str, &end_str],
            )?,
        };
        debug!(count = trades.len(), start = %start_str, end = %end_str, "sqlite trades_in_range");
        Ok(trades.into_iter().map(|t| t.trade).collect())
    }
}

impl PriceHistorySource for SqliteAdapter {
    fn price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, TradeflowError> {
        let conn = self.source_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, ticker, close_price FROM prices
                 WHERE ticker = ?1 ORDER BY date ASC",
            )
            .map_err(|e: rusqlite::Error| TradeflowError::source_unavailable(e))?;

        let rows = stmt
            .query_map(params![ticker], |row| {
                let date_str: String = row.get(0)?;
                let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
                    .map_err(|e| conversion_error(0, e))?;
                Ok(PricePoint {
                    date,
                    ticker: row.get(1)?,
                    close_price: row.get(2)?,
                })
            })
            .map_err(|e: rusqlite::Error| TradeflowError::source_unavailable(e))?;

        let mut points = Vec::new();
        for row in rows {
            points.push(row.map_err(|e: rusqlite::Error| TradeflowError::source_unavailable(e))?);
        }
        Ok(points)
    }
}

impl AggregateStore for SqliteAdapter {
    fn upsert_if_absent(&self, aggregate: &Aggregate) -> Result<bool, TradeflowError> {
        let conn = self.store_conn()?;
        let changed = conn
            .execute(
                "INSERT INTO averages (ticker, avg_price, period_start, period_end, trade_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (ticker, period_start, period_end) DO NOTHING",
                params![
                    aggregate.ticker,
                    aggregate.avg_price,
                    aggregate.period_start_str(),
                    aggregate.period_end_str(),
                    aggregate.trade_count
                ],
            )
            .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;
        Ok(changed == 1)
    }

    fn list_aggregates(&self, ticker: Option<&str>) -> Result<Vec<Aggregate>, TradeflowError> {
        let conn = self.store_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, avg_price, period_start, period_end, trade_count
                 FROM averages
                 WHERE ?1 IS NULL OR ticker = ?1
                 ORDER BY period_end ASC, ticker ASC",
            )
            .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;

        let rows = stmt
            .query_map(params![ticker], aggregate_from_row)
            .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;

        let mut aggregates = Vec::new();
        for row in rows {
            aggregates
                .push(row.map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?);
        }
        Ok(aggregates)
    }
}

impl TradeLedger for SqliteAdapter {
    fn record_trade(&self, trade: &Trade) -> Result<i64, TradeflowError> {
        let conn = self.store_conn()?;
        conn.execute(
            "INSERT INTO trades (ticker, price, quantity, trade_type, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                trade.ticker,
                trade.price,
                trade.quantity,
                trade.side.as_str(),
                format_timestamp(&trade.timestamp)
            ],
        )
        .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;
        Ok(conn.last_insert_rowid())
    }

    fn list_trades(&self) -> Result<Vec<StoredTrade>, TradeflowError> {
        self.query_trades(
            "SELECT id, ticker, price, quantity, trade_type, timestamp
             FROM trades ORDER BY timestamp ASC, id ASC",
            &[],
        )
    }
}

impl TradeStore for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), TradeflowError> {
        let conn = self.store_conn()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;
        Ok(())
    }

    fn insert_prices(&self, prices: &[PricePoint]) -> Result<usize, TradeflowError> {
        let mut conn = self.store_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;

        for point in prices {
            tx.execute(
                "INSERT OR REPLACE INTO prices (ticker, date, close_price) VALUES (?1, ?2, ?3)",
                params![
                    point.ticker,
                    point.date.format(DATE_FORMAT).to_string(),
                    point.close_price
                ],
            )
            .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| TradeflowError::persistence_unavailable(e))?;
        Ok(prices.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
    }

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn trade(ticker: &str, price: f64, at: NaiveDateTime) -> Trade {
        Trade {
            ticker: ticker.to_string(),
            price,
            quantity: 10,
            side: TradeSide::Buy,
            timestamp: at,
        }
    }

    fn aggregate(avg_price: f64) -> Aggregate {
        Aggregate {
            ticker: "AAPL".into(),
            avg_price,
            period_start: Some(ts(10, 0)),
            period_end: Some(ts(10, 5)),
            trade_count: 2,
        }
    }

    #[test]
    fn from_config_missing_path() {
        match SqliteAdapter::from_config(&EmptyConfig) {
            Err(TradeflowError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let adapter = adapter();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn latest_trade_empty() {
        assert!(adapter().latest_trade().unwrap().is_none());
    }

    #[test]
    fn record_and_fetch_latest() {
        let adapter = adapter();
        let first = adapter.record_trade(&trade("AAPL", 150.0, ts(10, 0))).unwrap();
        let second = adapter.record_trade(&trade("MSFT", 380.0, ts(10, 5))).unwrap();
        adapter.record_trade(&trade("GOOGL", 2800.0, ts(9, 0))).unwrap();
        assert!(second > first);

        let latest = adapter.latest_trade().unwrap().unwrap();
        assert_eq!(latest.ticker, "MSFT");
        assert_eq!(latest.timestamp, ts(10, 5));
    }

    #[test]
    fn latest_trade_ties_prefer_last_arrival() {
        let adapter = adapter();
        adapter.record_trade(&trade("AAPL", 150.0, ts(10, 0))).unwrap();
        adapter.record_trade(&trade("MSFT", 380.0, ts(10, 0))).unwrap();
        assert_eq!(adapter.latest_trade().unwrap().unwrap().ticker, "MSFT");
    }

    #[test]
    fn trades_in_range_is_inclusive_and_ordered() {
        let adapter = adapter();
        adapter.record_trade(&trade("AAPL", 3.0, ts(10, 5))).unwrap();
        adapter.record_trade(&trade("AAPL", 1.0, ts(10, 0))).unwrap();
        adapter.record_trade(&trade("MSFT", 2.0, ts(10, 3))).unwrap();
        adapter.record_trade(&trade("AAPL", 9.0, ts(10, 6))).unwrap();

        let all = adapter.trades_in_range(None, ts(10, 0), ts(10, 5)).unwrap();
        let prices: Vec<f64> = all.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);

        let aapl = adapter
            .trades_in_range(Some("AAPL"), ts(10, 0), ts(10, 5))
            .unwrap();
        assert_eq!(aapl.len(), 2);
    }

    #[test]
    fn upsert_if_absent_keeps_first_write() {
        let adapter = adapter();
        assert!(adapter.upsert_if_absent(&aggregate(101.0)).unwrap());
        assert!(!adapter.upsert_if_absent(&aggregate(999.0)).unwrap());

        let stored = adapter.list_aggregates(None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].avg_price, 101.0);
        assert_eq!(stored[0].period_start, Some(ts(10, 0)));
    }

    #[test]
    fn upsert_distinguishes_windows_and_tickers() {
        let adapter = adapter();
        let mut other_window = aggregate(1.0);
        other_window.period_end = Some(ts(10, 6));
        let mut other_ticker = aggregate(1.0);
        other_ticker.ticker = "MSFT".into();

        assert!(adapter.upsert_if_absent(&aggregate(1.0)).unwrap());
        assert!(adapter.upsert_if_absent(&other_window).unwrap());
        assert!(adapter.upsert_if_absent(&other_ticker).unwrap());
        assert_eq!(adapter.list_aggregates(None).unwrap().len(), 3);
        assert_eq!(adapter.list_aggregates(Some("MSFT")).unwrap().len(), 1);
    }

    #[test]
    fn price_history_round_trip() {
        let adapter = adapter();
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let points = vec![
            PricePoint { date: d(2), ticker: "AAPL".into(), close_price: 151.0 },
            PricePoint { date: d(1), ticker: "AAPL".into(), close_price: 150.0 },
            PricePoint { date: d(1), ticker: "MSFT".into(), close_price: 380.0 },
        ];
        assert_eq!(adapter.insert_prices(&points).unwrap(), 3);

        let history = adapter.price_history("AAPL").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, d(1));
        assert_eq!(history[1].close_price, 151.0);
        assert!(adapter.price_history("TSLA").unwrap().is_empty());
    }

    #[test]
    fn list_trades_returns_ids() {
        let adapter = adapter();
        let id = adapter.record_trade(&trade("AAPL", 150.0, ts(10, 0))).unwrap();
        let trades = adapter.list_trades().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, id);
        assert_eq!(trades[0].trade.side, TradeSide::Buy);
    }

    #[test]
    fn queries_fail_as_source_unavailable_without_schema() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        assert!(matches!(
            adapter.latest_trade(),
            Err(TradeflowError::SourceUnavailable { .. })
        ));
        assert!(matches!(
            adapter.upsert_if_absent(&aggregate(1.0)),
            Err(TradeflowError::PersistenceUnavailable { .. })
        ));
    }
}
