//! PostgreSQL adapter: same ports as the SQLite adapter, over an r2d2 pool.

use crate::domain::aggregate::Aggregate;
use crate::domain::error::TradeflowError;
use crate::domain::observation::{PricePoint, StoredTrade, TIMESTAMP_FORMAT, Trade, TradeSide};
use crate::ports::config_port::ConfigPort;
use crate::ports::source_port::{PriceHistorySource, TradeSource};
use crate::ports::store_port::{AggregateStore, TradeLedger, TradeStore};
use chrono::{NaiveDate, NaiveDateTime};
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS trades (
        id BIGSERIAL PRIMARY KEY,
        ticker TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        quantity BIGINT NOT NULL,
        trade_type TEXT NOT NULL,
        timestamp TIMESTAMP NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp);
    CREATE TABLE IF NOT EXISTS averages (
        ticker TEXT NOT NULL,
        avg_price DOUBLE PRECISION NOT NULL,
        period_start TEXT NOT NULL,
        period_end TEXT NOT NULL,
        trade_count BIGINT NOT NULL,
        PRIMARY KEY (ticker, period_start, period_end)
    );
    CREATE TABLE IF NOT EXISTS prices (
        ticker TEXT NOT NULL,
        date DATE NOT NULL,
        close_price DOUBLE PRECISION NOT NULL,
        PRIMARY KEY (ticker, date)
    );";

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradeflowError> {
        // [postgres] connection_string first, [database] conninfo as a fallback
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| TradeflowError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config: postgres::Config =
            connection_string
                .parse()
                .map_err(|e: postgres::Error| TradeflowError::ConfigInvalid {
                    section: "postgres".into(),
                    key: "connection_string".into(),
                    reason: e.to_string(),
                })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(|e: r2d2::Error| TradeflowError::source_unavailable(e))?;

        Ok(Self { pool })
    }

    fn source_conn(&self) -> Result<PooledConnection<Manager>, TradeflowError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| TradeflowError::source_unavailable(e))
    }

    fn store_conn(&self) -> Result<PooledConnection<Manager>, TradeflowError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| TradeflowError::persistence_unavailable(e))
    }

    fn query_trades(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<StoredTrade>, TradeflowError> {
        let rows = self
            .source_conn()?
            .query(query, params)
            .map_err(|e| TradeflowError::source_unavailable(e))?;
        rows.iter().map(trade_from_row).collect()
    }
}

fn trade_from_row(row: &Row) -> Result<StoredTrade, TradeflowError> {
    let side: String = row.get(4);
    let side: TradeSide = side
        .parse()
        .map_err(|_| TradeflowError::source_unavailable(format!("bad trade_type '{side}'")))?;
    Ok(StoredTrade {
        id: row.get(0),
        trade: Trade {
            ticker: row.get(1),
            price: row.get(2),
            quantity: row.get(3),
            side,
            timestamp: row.get(5),
        },
    })
}

fn parse_period(raw: &str) -> Result<Option<NaiveDateTime>, TradeflowError> {
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(Some)
        .map_err(|e| TradeflowError::persistence_unavailable(format!("bad period '{raw}': {e}")))
}

const TRADE_COLUMNS: &str = "id, ticker, price, quantity, trade_type, timestamp";

impl TradeSource for PostgresAdapter {
    fn latest_trade(&self) -> Result<Option<Trade>, TradeflowError> {
        let query =
            format!("SELECT {TRADE_COLUMNS} FROM trades ORDER BY timestamp DESC, id DESC LIMIT 1");
        let trades = self.query_trades(&query, &[])?;
        Ok(trades.into_iter().next().map(|t| t.trade))
    }

    fn trades_in_range(
        &self,
        ticker: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Trade>, TradeflowError> {
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades \
             WHERE ($1::TEXT IS NULL OR ticker = $1) AND timestamp >= $2 AND timestamp <= $3 \
             ORDER BY timestamp ASC, id ASC"
        );
        let trades = self.query_trades(&query, &[&ticker, &start, &end])?;
        debug!(count = trades.len(), "postgres trades_in_range");
        Ok(trades.into_iter().map(|t| t.trade).collect())
    }
}

impl PriceHistorySource for PostgresAdapter {
    fn price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, TradeflowError> {
        let rows = self
            .source_conn()?
            .query(
                "SELECT date, ticker, close_price FROM prices WHERE ticker = $1 ORDER BY date ASC",
                &[&ticker],
            )
            .map_err(|e| TradeflowError::source_unavailable(e))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let date: NaiveDate = row.get(0);
                PricePoint {
                    date,
                    ticker: row.get(1),
                    close_price: row.get(2),
                }
            })
            .collect())
    }
}

impl AggregateStore for PostgresAdapter {
    fn upsert_if_absent(&self, aggregate: &Aggregate) -> Result<bool, TradeflowError> {
        let changed = self
            .store_conn()?
            .execute(
                "INSERT INTO averages (ticker, avg_price, period_start, period_end, trade_count)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (ticker, period_start, period_end) DO NOTHING",
                &[
                    &aggregate.ticker,
                    &aggregate.avg_price,
                    &aggregate.period_start_str(),
                    &aggregate.period_end_str(),
                    &aggregate.trade_count,
                ],
            )
            .map_err(|e| TradeflowError::persistence_unavailable(e))?;
        Ok(changed == 1)
    }

    fn list_aggregates(&self, ticker: Option<&str>) -> Result<Vec<Aggregate>, TradeflowError> {
        let rows = self
            .store_conn()?
            .query(
                "SELECT ticker, avg_price, period_start, period_end, trade_count
                 FROM averages
                 WHERE ($1::TEXT IS NULL OR ticker = $1)
                 ORDER BY period_end ASC, ticker ASC",
                &[&ticker],
            )
            .map_err(|e| TradeflowError::persistence_unavailable(e))?;

        rows.iter()
            .map(|row| {
                let start: String = row.get(2);
                let end: String = row.get(3);
                Ok(Aggregate {
                    ticker: row.get(0),
                    avg_price: row.get(1),
                    period_start: parse_period(&start)?,
                    period_end: parse_period(&end)?,
                    trade_count: row.get(4),
                })
            })
            .collect()
    }
}

impl TradeLedger for PostgresAdapter {
    fn record_trade(&self, trade: &Trade) -> Result<i64, TradeflowError> {
        let row = self
            .store_conn()?
            .query_one(
                "INSERT INTO trades (ticker, price, quantity, trade_type, timestamp)
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
                &[
                    &trade.ticker,
                    &trade.price,
                    &trade.quantity,
                    &trade.side.as_str(),
                    &trade.timestamp,
                ],
            )
            .map_err(|e| TradeflowError::persistence_unavailable(e))?;
        Ok(row.get(0))
    }

    fn list_trades(&self) -> Result<Vec<StoredTrade>, TradeflowError> {
        let query = format!("SELECT {TRADE_COLUMNS} FROM trades ORDER BY timestamp ASC, id ASC");
        self.query_trades(&query, &[])
    }
}

impl TradeStore for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), TradeflowError> {
        self.store_conn()?
            .batch_execute(SCHEMA)
            .map_err(|e| TradeflowError::persistence_unavailable(e))
    }

    fn insert_prices(&self, prices: &[PricePoint]) -> Result<usize, TradeflowError> {
        let mut conn = self.store_conn()?;
        let mut tx = conn
            .transaction()
            .map_err(|e| TradeflowError::persistence_unavailable(e))?;

        for point in prices {
            tx.execute(
                "INSERT INTO prices (ticker, date, close_price) VALUES ($1, $2, $3)
                 ON CONFLICT (ticker, date) DO UPDATE SET close_price = EXCLUDED.close_price",
                &[&point.ticker, &point.date, &point.close_price],
            )
            .map_err(|e| TradeflowError::persistence_unavailable(e))?;
        }

        tx.commit()
            .map_err(|e| TradeflowError::persistence_unavailable(e))?;
        Ok(prices.len())
    }
}
