//! Venue adapter contracts.
//!
//! The engine core never talks to a venue API directly; it goes through
//! these two narrow traits. Read adapters serve market parameters, open
//! interest, mark prices, and position state; trade adapters place and
//! close orders. Venue-specific signing and encoding live behind the
//! adapters and are out of scope here.

pub mod bybit;
pub mod mock;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::VenueError;
use crate::market::{MarketParams, OpenInterestSnapshot, Side, Venue};

/// Venue-reported state of an open position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    /// Symbol of the position.
    pub symbol: String,
    /// Direction of the position.
    pub side: Side,
    /// Notional size in USD.
    pub size_usd: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Leverage applied by the venue.
    pub leverage: Decimal,
}

/// Result of an order placement or close.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    /// Whether the order landed.
    pub success: bool,
    /// Filled notional in USD.
    pub filled_size_usd: Decimal,
    /// Fill price reported by the venue.
    pub fill_price: Decimal,
    /// Venue-native order identifier.
    pub order_id: String,
}

/// Read-side venue contract.
#[async_trait]
pub trait VenueReader: Send + Sync {
    /// Which venue this adapter serves.
    fn venue(&self) -> Venue;

    /// Market parameters for a symbol.
    async fn get_market_params(&self, symbol: &str) -> Result<MarketParams, VenueError>;

    /// Current long/short open interest for a symbol.
    async fn get_open_interest(&self, symbol: &str)
        -> Result<OpenInterestSnapshot, VenueError>;

    /// Venue-side position state, if any.
    async fn get_position(&self, symbol: &str) -> Result<Option<PositionState>, VenueError>;

    /// Current mark price for a symbol.
    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, VenueError>;
}

/// Trade-side venue contract.
#[async_trait]
pub trait VenueTrader: Send + Sync {
    /// Which venue this adapter serves.
    fn venue(&self) -> Venue;

    /// Place a market order for the given notional.
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        size_usd: Decimal,
    ) -> Result<OrderResult, VenueError>;

    /// Close the open position on this venue for the symbol.
    async fn close_position(&self, symbol: &str) -> Result<OrderResult, VenueError>;

    /// Set account leverage for a symbol before trading it.
    async fn set_leverage(&self, symbol: &str, leverage: Decimal) -> Result<(), VenueError>;

    /// Free collateral available for new positions, in USD.
    async fn get_collateral(&self) -> Result<Decimal, VenueError>;
}

/// Registered adapters, keyed by venue.
#[derive(Clone, Default)]
pub struct VenueRegistry {
    readers: HashMap<Venue, Arc<dyn VenueReader>>,
    traders: HashMap<Venue, Arc<dyn VenueTrader>>,
}

impl VenueRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read adapter.
    pub fn add_reader(&mut self, reader: Arc<dyn VenueReader>) {
        self.readers.insert(reader.venue(), reader);
    }

    /// Register a trade adapter.
    pub fn add_trader(&mut self, trader: Arc<dyn VenueTrader>) {
        self.traders.insert(trader.venue(), trader);
    }

    /// Read adapter for a venue.
    pub fn reader(&self, venue: Venue) -> Result<Arc<dyn VenueReader>, VenueError> {
        self.readers
            .get(&venue)
            .cloned()
            .ok_or(VenueError::NotRegistered { venue })
    }

    /// Trade adapter for a venue.
    pub fn trader(&self, venue: Venue) -> Result<Arc<dyn VenueTrader>, VenueError> {
        self.traders
            .get(&venue)
            .cloned()
            .ok_or(VenueError::NotRegistered { venue })
    }

    /// All registered read adapters.
    pub fn readers(&self) -> &HashMap<Venue, Arc<dyn VenueReader>> {
        &self.readers
    }

    /// Venues with a registered read adapter.
    pub fn venues(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.readers.keys().copied().collect();
        venues.sort();
        venues
    }
}

impl std::fmt::Debug for VenueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueRegistry")
            .field("readers", &self.readers.keys().collect::<Vec<_>>())
            .field("traders", &self.traders.keys().collect::<Vec<_>>())
            .finish()
    }
}
