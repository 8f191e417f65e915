//! Mock venue adapter for unit tests and dry-run mode.
//!
//! Implements both the read and trade contracts against in-memory state,
//! with failure and latency knobs so tests can exercise the degraded
//! paths without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::VenueError;
use crate::market::{FundingProfile, MarketParams, OpenInterestSnapshot, Side, Venue};

use super::{OrderResult, PositionState, VenueReader, VenueTrader};

/// Configuration for mock venue behavior.
#[derive(Debug, Clone)]
pub struct MockVenueConfig {
    /// Fail all read calls with `Unavailable`.
    pub fail_reads: bool,
    /// Fail order placement.
    pub fail_orders: bool,
    /// Fail position closes.
    pub fail_close: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
    /// Collateral reported by `get_collateral`.
    pub collateral: Decimal,
}

impl Default for MockVenueConfig {
    fn default() -> Self {
        Self {
            fail_reads: false,
            fail_orders: false,
            fail_close: false,
            latency_ms: 0,
            collateral: dec!(10_000),
        }
    }
}

/// An order the mock accepted, kept for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    /// Symbol traded.
    pub symbol: String,
    /// Order direction.
    pub side: Side,
    /// Notional in USD.
    pub size_usd: Decimal,
}

/// Mock venue implementing both adapter contracts.
#[derive(Debug, Clone)]
pub struct MockVenue {
    venue: Venue,
    config: Arc<Mutex<MockVenueConfig>>,
    params: Arc<Mutex<HashMap<String, MarketParams>>>,
    open_interest: Arc<Mutex<HashMap<String, OpenInterestSnapshot>>>,
    mark_prices: Arc<Mutex<HashMap<String, Decimal>>>,
    positions: Arc<Mutex<HashMap<String, PositionState>>>,
    orders: Arc<Mutex<Vec<PlacedOrder>>>,
    next_order_id: Arc<AtomicU64>,
}

impl MockVenue {
    /// Create an empty mock for the given venue.
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            config: Arc::new(Mutex::new(MockVenueConfig::default())),
            params: Arc::new(Mutex::new(HashMap::new())),
            open_interest: Arc::new(Mutex::new(HashMap::new())),
            mark_prices: Arc::new(Mutex::new(HashMap::new())),
            positions: Arc::new(Mutex::new(HashMap::new())),
            orders: Arc::new(Mutex::new(Vec::new())),
            next_order_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a mock seeded with plausible parameters for the symbols,
    /// shaped like the venue's real funding profile.
    pub fn with_defaults(venue: Venue, symbols: &[String]) -> Self {
        let mock = Self::new(venue);
        for symbol in symbols {
            let profile = match venue {
                Venue::Synthetix => FundingProfile::Velocity {
                    max_funding_velocity: dec!(9),
                    skew_scale: dec!(1_000_000),
                },
                Venue::Gmx => FundingProfile::Factor {
                    funding_factor_per_second: dec!(0.00000001),
                    optimal_utilization: dec!(0.75),
                    base_borrowing_factor: dec!(0.0000001),
                    pool_amount_usd: dec!(10_000_000),
                },
                Venue::Bybit => FundingProfile::Factor {
                    // ~0.01% per 8h expressed per second.
                    funding_factor_per_second: dec!(0.0000000035),
                    optimal_utilization: Decimal::ONE,
                    base_borrowing_factor: Decimal::ZERO,
                    pool_amount_usd: dec!(1_000_000_000),
                },
            };
            let (maker_fee, taker_fee) = match venue {
                Venue::Synthetix => (dec!(0.0002), dec!(0.0006)),
                Venue::Gmx => (dec!(0.0005), dec!(0.0007)),
                Venue::Bybit => (dec!(0.0002), dec!(0.00055)),
            };
            mock.set_params(MarketParams {
                symbol: symbol.clone(),
                venue,
                market_id: format!("{venue}-{symbol}"),
                profile,
                maker_fee,
                taker_fee,
            });
            mock.set_open_interest(symbol, dec!(1_200_000), dec!(1_000_000));
            let mark = match symbol.as_str() {
                "BTC" => dec!(60_000),
                "ETH" => dec!(3_000),
                _ => dec!(100),
            };
            mock.set_mark_price(symbol, mark);
        }
        mock
    }

    /// Set market parameters for a symbol.
    pub fn set_params(&self, params: MarketParams) {
        self.params
            .lock()
            .unwrap()
            .insert(params.symbol.clone(), params);
    }

    /// Set open interest for a symbol.
    pub fn set_open_interest(&self, symbol: &str, long_usd: Decimal, short_usd: Decimal) {
        self.open_interest.lock().unwrap().insert(
            symbol.to_string(),
            OpenInterestSnapshot {
                venue: self.venue,
                symbol: symbol.to_string(),
                long_usd,
                short_usd,
            },
        );
    }

    /// Set the mark price for a symbol.
    pub fn set_mark_price(&self, symbol: &str, price: Decimal) {
        self.mark_prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), price);
    }

    /// Seed a venue-side position directly.
    pub fn seed_position(&self, state: PositionState) {
        self.positions
            .lock()
            .unwrap()
            .insert(state.symbol.clone(), state);
    }

    /// Toggle read failures.
    pub fn set_fail_reads(&self, fail: bool) {
        self.config.lock().unwrap().fail_reads = fail;
    }

    /// Toggle order placement failures.
    pub fn set_fail_orders(&self, fail: bool) {
        self.config.lock().unwrap().fail_orders = fail;
    }

    /// Toggle close failures.
    pub fn set_fail_close(&self, fail: bool) {
        self.config.lock().unwrap().fail_close = fail;
    }

    /// Set reported collateral.
    pub fn set_collateral(&self, collateral: Decimal) {
        self.config.lock().unwrap().collateral = collateral;
    }

    /// Orders accepted so far.
    pub fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().unwrap().clone()
    }

    async fn simulate_latency(&self) {
        let latency_ms = self.config.lock().unwrap().latency_ms;
        if latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency_ms)).await;
        }
    }

    fn unavailable(&self, reason: &str) -> VenueError {
        VenueError::Unavailable {
            venue: self.venue,
            reason: reason.to_string(),
        }
    }

    fn mark_or_default(&self, symbol: &str) -> Decimal {
        self.mark_prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ONE)
    }
}

#[async_trait]
impl VenueReader for MockVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn get_market_params(&self, symbol: &str) -> Result<MarketParams, VenueError> {
        self.simulate_latency().await;
        if self.config.lock().unwrap().fail_reads {
            return Err(self.unavailable("mock read failure"));
        }
        self.params
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| self.unavailable(&format!("no params for {symbol}")))
    }

    async fn get_open_interest(
        &self,
        symbol: &str,
    ) -> Result<OpenInterestSnapshot, VenueError> {
        self.simulate_latency().await;
        if self.config.lock().unwrap().fail_reads {
            return Err(self.unavailable("mock read failure"));
        }
        self.open_interest
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| self.unavailable(&format!("no open interest for {symbol}")))
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<PositionState>, VenueError> {
        self.simulate_latency().await;
        if self.config.lock().unwrap().fail_reads {
            return Err(self.unavailable("mock read failure"));
        }
        Ok(self.positions.lock().unwrap().get(symbol).cloned())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, VenueError> {
        self.simulate_latency().await;
        if self.config.lock().unwrap().fail_reads {
            return Err(self.unavailable("mock read failure"));
        }
        self.mark_prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| self.unavailable(&format!("no mark price for {symbol}")))
    }
}

#[async_trait]
impl VenueTrader for MockVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        size_usd: Decimal,
    ) -> Result<OrderResult, VenueError> {
        self.simulate_latency().await;
        if self.config.lock().unwrap().fail_orders {
            return Err(self.unavailable("mock order failure"));
        }

        let fill_price = self.mark_or_default(symbol);
        self.orders.lock().unwrap().push(PlacedOrder {
            symbol: symbol.to_string(),
            side,
            size_usd,
        });
        self.positions.lock().unwrap().insert(
            symbol.to_string(),
            PositionState {
                symbol: symbol.to_string(),
                side,
                size_usd,
                entry_price: fill_price,
                leverage: Decimal::TWO,
            },
        );

        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        Ok(OrderResult {
            success: true,
            filled_size_usd: size_usd,
            fill_price,
            order_id: format!("{}-{id}", self.venue),
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderResult, VenueError> {
        self.simulate_latency().await;
        if self.config.lock().unwrap().fail_close {
            return Err(self.unavailable("mock close failure"));
        }

        let closed = self.positions.lock().unwrap().remove(symbol);
        let size = closed.map(|p| p.size_usd).unwrap_or(Decimal::ZERO);
        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        Ok(OrderResult {
            success: true,
            filled_size_usd: size,
            fill_price: self.mark_or_default(symbol),
            order_id: format!("{}-{id}", self.venue),
        })
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: Decimal) -> Result<(), VenueError> {
        self.simulate_latency().await;
        Ok(())
    }

    async fn get_collateral(&self) -> Result<Decimal, VenueError> {
        self.simulate_latency().await;
        let config = self.config.lock().unwrap();
        if config.fail_reads {
            return Err(self.unavailable("mock read failure"));
        }
        Ok(config.collateral)
    }
}
