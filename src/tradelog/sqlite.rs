//! SQLite-backed trade log.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::StorageError;
use crate::market::Venue;

use super::{parse_field, OpenClose, PositionRecord, TradeLog};

/// Durable trade log stored in a single SQLite file.
pub struct SqliteTradeLog {
    conn: Mutex<Connection>,
}

impl SqliteTradeLog {
    /// Open (or create) the log at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory log; used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trade_log (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                venue TEXT NOT NULL,
                side TEXT NOT NULL,
                open_close TEXT NOT NULL,
                size_usd TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                leverage TEXT NOT NULL,
                entry_timestamp INTEGER NOT NULL,
                close_timestamp INTEGER
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trade_log_venue_status
             ON trade_log(venue, open_close)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trade_log_symbol_status
             ON trade_log(symbol, open_close)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn rows_to_records(
        rows: Vec<(String, String, String, String, String, String, String, String, i64, Option<i64>)>,
    ) -> Result<Vec<PositionRecord>, StorageError> {
        rows.into_iter()
            .map(
                |(
                    id,
                    symbol,
                    venue,
                    side,
                    open_close,
                    size_usd,
                    entry_price,
                    leverage,
                    entry_ts,
                    close_ts,
                )| {
                    Ok(PositionRecord {
                        id,
                        symbol,
                        venue: parse_field("venue", &venue)?,
                        side: parse_field("side", &side)?,
                        open_close: parse_field("open_close", &open_close)?,
                        size_usd: parse_field("size_usd", &size_usd)?,
                        entry_price: parse_field("entry_price", &entry_price)?,
                        leverage: parse_field("leverage", &leverage)?,
                        entry_timestamp: OffsetDateTime::from_unix_timestamp(entry_ts)
                            .map_err(|e| {
                                StorageError::MalformedRow(format!("entry_timestamp: {e}"))
                            })?,
                        close_timestamp: close_ts
                            .map(OffsetDateTime::from_unix_timestamp)
                            .transpose()
                            .map_err(|e| {
                                StorageError::MalformedRow(format!("close_timestamp: {e}"))
                            })?,
                    })
                },
            )
            .collect()
    }

    fn select(
        &self,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<PositionRecord>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT id, symbol, venue, side, open_close, size_usd, entry_price, leverage,
                    entry_timestamp, close_timestamp
             FROM trade_log WHERE {where_clause} ORDER BY entry_timestamp ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Self::rows_to_records(rows)
    }
}

impl TradeLog for SqliteTradeLog {
    fn append(&self, record: &PositionRecord) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO trade_log
                (id, symbol, venue, side, open_close, size_usd, entry_price, leverage,
                 entry_timestamp, close_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.symbol,
                record.venue.to_string(),
                record.side.to_string(),
                record.open_close.to_string(),
                record.size_usd.to_string(),
                record.entry_price.to_string(),
                record.leverage.to_string(),
                record.entry_timestamp.unix_timestamp(),
                record.close_timestamp.map(|t| t.unix_timestamp()),
            ],
        )?;
        debug!(id = %record.id, venue = %record.venue, "trade record appended");
        Ok(())
    }

    fn query(&self, venue: Venue, status: OpenClose) -> Result<Vec<PositionRecord>, StorageError> {
        self.select(
            "venue = ?1 AND open_close = ?2",
            &[&venue.to_string(), &status.to_string()],
        )
    }

    fn open_for_symbol(&self, symbol: &str) -> Result<Vec<PositionRecord>, StorageError> {
        self.select(
            "symbol = ?1 AND open_close = ?2",
            &[&symbol, &OpenClose::Open.to_string()],
        )
    }

    fn update_close(&self, id: &str, closed_at: OffsetDateTime) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE trade_log SET open_close = ?1, close_timestamp = ?2 WHERE id = ?3",
            params![
                OpenClose::Closed.to_string(),
                closed_at.unix_timestamp(),
                id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RecordNotFound(id.to_string()));
        }
        debug!(id, "trade record closed");
        Ok(())
    }
}
