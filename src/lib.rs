//! Cross-venue perpetual-futures funding-rate arbitrage engine.
//!
//! Watches funding rates and skew-derived fee schedules across derivatives
//! venues, opens an offsetting long/short pair when the expected funding
//! carry clears transaction and slippage costs, and keeps re-evaluating
//! whether to hold, rebalance, or close.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Market parameter directory and shared types
//! - [`funding`]: Funding fee projection models
//! - [`venue`]: Venue adapter contracts, mock and ByBit implementations
//! - [`tradelog`]: Persistent trade log (source of truth for open state)
//! - [`position`]: Position monitoring and liquidation distance
//! - [`scanner`]: Cross-venue opportunity scanning and ranking
//! - [`execution`]: Two-leg execution with compensating rollback
//! - [`controller`]: Top-level control loop
//! - [`pricing`]: Spot and gas price lookups
//! - [`events`]: Lifecycle event bus
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod execution;
pub mod funding;
pub mod market;
pub mod metrics;
pub mod position;
pub mod pricing;
pub mod scanner;
pub mod tradelog;
pub mod utils;
pub mod venue;

pub use config::Config;
pub use error::{BotError, Result};
