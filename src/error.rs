//! Unified error types for the arbitrage engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::market::Venue;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market directory error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Funding model error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Venue adapter error.
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    /// Trade execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Trade log storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Pricing service error.
    #[error("pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market directory errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// The (venue, symbol) pair is not tracked by the directory.
    #[error("no market params for {symbol} on {venue}")]
    NotFound {
        /// Venue queried.
        venue: Venue,
        /// Symbol queried.
        symbol: String,
    },

    /// The persisted market cache could not be decoded.
    #[error("corrupt market cache at {path}: {reason}")]
    CorruptCache {
        /// Cache file path.
        path: String,
        /// Decode failure detail.
        reason: String,
    },
}

/// Funding model input errors. A model failure excludes that venue for
/// that symbol for the current cycle; it never aborts the whole scan.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    /// A divisor in the projection formula is zero.
    #[error("division by zero: {quantity} is zero")]
    DivisionByZero {
        /// Which market parameter was zero.
        quantity: &'static str,
    },

    /// A market parameter is outside its valid domain.
    #[error("invalid model input: {0}")]
    InvalidInput(String),
}

/// Venue adapter errors.
#[derive(Error, Debug)]
pub enum VenueError {
    /// Transient network or API failure. Retry next cycle; do not assume
    /// position state changed.
    #[error("{venue} unavailable: {reason}")]
    Unavailable {
        /// Venue that failed.
        venue: Venue,
        /// Failure detail.
        reason: String,
    },

    /// The call did not complete within its deadline. Treated as a venue
    /// failure, not a crash.
    #[error("{venue} timed out after {timeout_ms}ms")]
    Timeout {
        /// Venue that timed out.
        venue: Venue,
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The adapter does not implement this operation (e.g. authenticated
    /// endpoints on a read-only adapter).
    #[error("{venue} does not support {operation}")]
    Unsupported {
        /// Venue queried.
        venue: Venue,
        /// Operation name.
        operation: &'static str,
    },

    /// No adapter registered for the venue.
    #[error("no adapter registered for {venue}")]
    NotRegistered {
        /// Venue requested.
        venue: Venue,
    },
}

/// Two-leg trade execution errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A venue already has an open position; opening a second before
    /// closing the first is rejected.
    #[error("position already open on {venue} for {symbol}")]
    AlreadyOpen {
        /// Venue with the open position.
        venue: Venue,
        /// Symbol of the open position.
        symbol: String,
    },

    /// Combined collateral across both venues is too low for the trade.
    #[error("insufficient collateral: need {required}, have {available}")]
    InsufficientCollateral {
        /// Required collateral in USD.
        required: Decimal,
        /// Available collateral in USD.
        available: Decimal,
    },

    /// One leg of a two-leg operation failed and the other landed.
    #[error("partial execution on {symbol}: {detail}")]
    PartialExecutionFailure {
        /// Symbol being traded.
        symbol: String,
        /// Which leg landed / failed.
        detail: String,
    },

    /// Liquidation distance breached the safety threshold and the
    /// urgent close itself failed. Unreconciled risk; operator required.
    #[error(
        "risk threshold breach on {venue}: {distance_pct}% from liquidation \
         (threshold {threshold_pct}%), close failed: {reason}"
    )]
    RiskThresholdBreach {
        /// Venue carrying the at-risk position.
        venue: Venue,
        /// Current distance to liquidation.
        distance_pct: Decimal,
        /// Configured safety threshold.
        threshold_pct: Decimal,
        /// Why the urgent close failed.
        reason: String,
    },
}

/// Trade log storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be decoded into its domain type.
    #[error("malformed row: {0}")]
    MalformedRow(String),

    /// No record with the given id.
    #[error("no trade record with id {0}")]
    RecordNotFound(String),
}

/// Pricing service errors.
#[derive(Error, Debug)]
pub enum PricingError {
    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape.
    #[error("malformed pricing response: {0}")]
    Malformed(String),

    /// Price for the asset is missing from the response.
    #[error("no price available for {0}")]
    PriceUnavailable(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
