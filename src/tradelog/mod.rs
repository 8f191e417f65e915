//! Append-only trade log: the single source of truth for "what is open".
//!
//! The ExecutionOrchestrator is the sole writer; everything else reads.
//! Discipline: append or update one row per leg, never partial-row writes,
//! and never delete (the log doubles as the audit trail).

mod sqlite;

pub use sqlite::SqliteTradeLog;

use std::str::FromStr;
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::market::{Side, Venue};

/// Whether a recorded position is still open.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum OpenClose {
    /// Position is live on the venue.
    Open,
    /// Position has been closed.
    Closed,
}

/// One leg of a hedged pair, as recorded in the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Unique record id.
    pub id: String,
    /// Symbol traded.
    pub symbol: String,
    /// Venue the leg sits on.
    pub venue: Venue,
    /// Leg direction.
    pub side: Side,
    /// Open/closed status.
    pub open_close: OpenClose,
    /// Notional size in USD.
    pub size_usd: Decimal,
    /// Fill price at entry.
    pub entry_price: Decimal,
    /// Leverage at entry.
    pub leverage: Decimal,
    /// When the leg was opened.
    #[serde(with = "time::serde::rfc3339")]
    pub entry_timestamp: OffsetDateTime,
    /// When the leg was closed, if it has been.
    #[serde(with = "time::serde::rfc3339::option")]
    pub close_timestamp: Option<OffsetDateTime>,
}

impl PositionRecord {
    /// Create an Open record for a freshly filled leg.
    pub fn open(
        symbol: &str,
        venue: Venue,
        side: Side,
        size_usd: Decimal,
        entry_price: Decimal,
        leverage: Decimal,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: format!("{venue}-{symbol}-{}", now.unix_timestamp_nanos()),
            symbol: symbol.to_string(),
            venue,
            side,
            open_close: OpenClose::Open,
            size_usd,
            entry_price,
            leverage,
            entry_timestamp: now,
            close_timestamp: None,
        }
    }
}

/// Persistent trade log contract.
pub trait TradeLog: Send + Sync {
    /// Append one record. Never overwrites.
    fn append(&self, record: &PositionRecord) -> Result<(), StorageError>;

    /// Records for a venue filtered by status, oldest first.
    fn query(&self, venue: Venue, status: OpenClose) -> Result<Vec<PositionRecord>, StorageError>;

    /// Open records for a symbol across all venues, oldest first.
    fn open_for_symbol(&self, symbol: &str) -> Result<Vec<PositionRecord>, StorageError>;

    /// Mark a record Closed with the given close time.
    fn update_close(&self, id: &str, closed_at: OffsetDateTime) -> Result<(), StorageError>;
}

/// In-memory trade log for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryTradeLog {
    rows: Mutex<Vec<PositionRecord>>,
}

impl MemoryTradeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, in append order.
    pub fn all(&self) -> Vec<PositionRecord> {
        self.rows.lock().unwrap().clone()
    }
}

impl TradeLog for MemoryTradeLog {
    fn append(&self, record: &PositionRecord) -> Result<(), StorageError> {
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn query(&self, venue: Venue, status: OpenClose) -> Result<Vec<PositionRecord>, StorageError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.venue == venue && r.open_close == status)
            .cloned()
            .collect())
    }

    fn open_for_symbol(&self, symbol: &str) -> Result<Vec<PositionRecord>, StorageError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.symbol == symbol && r.open_close == OpenClose::Open)
            .cloned()
            .collect())
    }

    fn update_close(&self, id: &str, closed_at: OffsetDateTime) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))?;
        row.open_close = OpenClose::Closed;
        row.close_timestamp = Some(closed_at);
        Ok(())
    }
}

pub(crate) fn parse_field<T: FromStr>(field: &str, raw: &str) -> Result<T, StorageError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StorageError::MalformedRow(format!("{field} {raw:?}: {e}")))
}
