//! Application configuration loaded from environment variables.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Universe ===
    /// Comma-separated list of tracked symbols (e.g. "ETH,BTC,SOL").
    #[serde(default = "default_symbols")]
    pub tracked_symbols: String,

    // === Trading Parameters ===
    /// Notional size per leg in USD.
    #[serde(default = "default_trade_size")]
    pub trade_size_usd: Decimal,

    /// Minimum net carry (after execution costs) required to open, in USD
    /// per funding period. Guards against churn trades that lose to fees.
    #[serde(default = "default_min_margin")]
    pub min_net_margin_usd: Decimal,

    /// Funding period used for projections, in hours.
    #[serde(default = "default_funding_period")]
    pub funding_period_hours: u64,

    /// Leverage applied on every venue before trading.
    #[serde(default = "default_leverage")]
    pub trade_leverage: Decimal,

    /// Collateral safety margin (1.2 = require 20% extra).
    #[serde(default = "default_collateral_margin")]
    pub collateral_margin: Decimal,

    /// Slippage allowance per leg in basis points of notional.
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,

    /// Gas units assumed per on-chain order for cost estimation.
    #[serde(default = "default_gas_units")]
    pub gas_units_per_order: u64,

    // === Risk ===
    /// Minimum allowable distance to liquidation, in percent. Below this
    /// the controller closes the pair before doing anything else.
    #[serde(default = "default_liq_safety")]
    pub liquidation_safety_pct: Decimal,

    /// Hysteresis band for the carry-reversal close, in USD per period.
    /// The pair closes only once carry is more negative than this band.
    #[serde(default = "default_hysteresis")]
    pub carry_close_hysteresis_usd: Decimal,

    // === Scheduling ===
    /// Control loop period in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Refresh the market directory every N cycles.
    #[serde(default = "default_refresh_every")]
    pub refresh_every_cycles: u64,

    // === Persistence ===
    /// Durable market parameter cache (JSON).
    #[serde(default = "default_market_cache")]
    pub market_cache_path: String,

    /// SQLite trade log path.
    #[serde(default = "default_trade_log")]
    pub trade_log_path: String,

    // === Pricing Service ===
    /// CoinGecko simple-price base URL.
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,

    /// Optional CoinGecko API key.
    #[serde(default)]
    pub coingecko_api_key: Option<String>,

    /// JSON-RPC endpoint for gas price lookups.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// HTTP timeout for venue and pricing calls, in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    // === Operation Modes ===
    /// Simulation mode (mock venues, no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Collateral seeded on each simulated venue.
    #[serde(default = "default_sim_collateral")]
    pub sim_collateral: Decimal,

    // === Observability ===
    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_symbols() -> String {
    "ETH,BTC".to_string()
}

fn default_trade_size() -> Decimal {
    Decimal::new(500, 0) // $500 per leg
}

fn default_min_margin() -> Decimal {
    Decimal::ONE // $1 per period
}

fn default_funding_period() -> u64 {
    8
}

fn default_leverage() -> Decimal {
    Decimal::TWO
}

fn default_collateral_margin() -> Decimal {
    Decimal::new(12, 1) // 1.2
}

fn default_slippage_bps() -> Decimal {
    Decimal::new(5, 0)
}

fn default_gas_units() -> u64 {
    2_500_000
}

fn default_liq_safety() -> Decimal {
    Decimal::new(5, 0) // 5%
}

fn default_hysteresis() -> Decimal {
    Decimal::new(5, 1) // $0.50
}

fn default_poll_interval() -> u64 {
    300
}

fn default_refresh_every() -> u64 {
    12
}

fn default_market_cache() -> String {
    "markets.json".to_string()
}

fn default_trade_log() -> String {
    "trades.db".to_string()
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_rpc_url() -> String {
    "https://mainnet.base.org".to_string()
}

fn default_http_timeout() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_sim_collateral() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_metrics_port() -> u16 {
    9000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Tracked symbols as a normalized list.
    pub fn symbols(&self) -> Vec<String> {
        self.tracked_symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Funding period in seconds.
    pub fn funding_period_secs(&self) -> u64 {
        self.funding_period_hours * 3600
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbols().is_empty() {
            return Err("TRACKED_SYMBOLS must name at least one symbol".to_string());
        }

        if self.trade_size_usd <= Decimal::ZERO {
            return Err("TRADE_SIZE_USD must be positive".to_string());
        }

        if self.trade_leverage < Decimal::ONE {
            return Err("TRADE_LEVERAGE must be at least 1".to_string());
        }

        if self.min_net_margin_usd < Decimal::ZERO {
            return Err("MIN_NET_MARGIN_USD must not be negative".to_string());
        }

        if self.liquidation_safety_pct <= Decimal::ZERO {
            return Err("LIQUIDATION_SAFETY_PCT must be positive".to_string());
        }

        if self.funding_period_hours == 0 {
            return Err("FUNDING_PERIOD_HOURS must be positive".to_string());
        }

        if self.poll_interval_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be positive".to_string());
        }

        if self.refresh_every_cycles == 0 {
            return Err("REFRESH_EVERY_CYCLES must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_config() -> Config {
        Config {
            tracked_symbols: default_symbols(),
            trade_size_usd: default_trade_size(),
            min_net_margin_usd: default_min_margin(),
            funding_period_hours: default_funding_period(),
            trade_leverage: default_leverage(),
            collateral_margin: default_collateral_margin(),
            slippage_bps: default_slippage_bps(),
            gas_units_per_order: default_gas_units(),
            liquidation_safety_pct: default_liq_safety(),
            carry_close_hysteresis_usd: default_hysteresis(),
            poll_interval_secs: default_poll_interval(),
            refresh_every_cycles: default_refresh_every(),
            market_cache_path: default_market_cache(),
            trade_log_path: default_trade_log(),
            coingecko_url: default_coingecko_url(),
            coingecko_api_key: None,
            rpc_url: default_rpc_url(),
            http_timeout_ms: default_http_timeout(),
            dry_run: true,
            sim_collateral: default_sim_collateral(),
            metrics_port: default_metrics_port(),
            rust_log: default_log_level(),
        }
    }

    #[test]
    fn default_values_are_sensible() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbols(), vec!["ETH", "BTC"]);
        assert_eq!(config.funding_period_secs(), 8 * 3600);
    }

    #[test]
    fn symbols_are_normalized() {
        let config = Config {
            tracked_symbols: " eth, btc ,sol,".to_string(),
            ..test_config()
        };
        assert_eq!(config.symbols(), vec!["ETH", "BTC", "SOL"]);
    }

    #[test]
    fn validate_rejects_empty_universe() {
        let config = Config {
            tracked_symbols: " , ".to_string(),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_nonpositive_trade_size() {
        let config = Config {
            trade_size_usd: dec!(0),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_sub_one_leverage() {
        let config = Config {
            trade_leverage: dec!(0.5),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }
}
