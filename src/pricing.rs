//! Spot price and gas price lookups for cost estimation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::debug;

use crate::error::PricingError;

/// CoinGecko ids for tracked symbols.
static ASSET_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("btc", "bitcoin"),
        ("eth", "ethereum"),
        ("snx", "havven"),
        ("sol", "solana"),
        ("wif", "dogwifcoin"),
        ("w", "wormhole"),
        ("ena", "ethena"),
        ("doge", "dogecoin"),
        ("pepe", "pepe"),
        ("arb", "arbitrum"),
        ("bnb", "binancecoin"),
    ])
});

/// Resolve a ticker symbol to its pricing-service asset id.
pub fn full_asset_name(symbol: &str) -> String {
    let lower = symbol.to_lowercase();
    ASSET_NAMES
        .get(lower.as_str())
        .map(|s| s.to_string())
        .unwrap_or(lower)
}

/// USD cost of one on-chain transaction.
pub fn transaction_cost_usd(
    gas_units: u64,
    gas_price_gwei: Decimal,
    eth_price_usd: Decimal,
) -> Decimal {
    let gas_cost_eth =
        gas_price_gwei * Decimal::from(gas_units) / Decimal::from(1_000_000_000u64);
    gas_cost_eth * eth_price_usd
}

/// Pricing service contract.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Spot price of an asset in USD, `None` when the service has no
    /// quote for it.
    async fn get_spot_price(&self, symbol: &str) -> Result<Option<Decimal>, PricingError>;

    /// Current gas price in gwei.
    async fn get_gas_price_gwei(&self) -> Result<Decimal, PricingError>;
}

/// HTTP pricing service: CoinGecko for spot, JSON-RPC for gas.
#[derive(Debug, Clone)]
pub struct HttpPriceFeed {
    http: reqwest::Client,
    coingecko_url: String,
    api_key: Option<String>,
    rpc_url: String,
}

impl HttpPriceFeed {
    /// Create the feed with an HTTP timeout in milliseconds.
    pub fn new(
        coingecko_url: impl Into<String>,
        api_key: Option<String>,
        rpc_url: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("failed to create HTTP client");
        Self {
            http,
            coingecko_url: coingecko_url.into(),
            api_key,
            rpc_url: rpc_url.into(),
        }
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn get_spot_price(&self, symbol: &str) -> Result<Option<Decimal>, PricingError> {
        let asset = full_asset_name(symbol);
        let mut url = format!(
            "{}/simple/price?ids={asset}&vs_currencies=usd",
            self.coingecko_url
        );
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&x_cg_demo_api_key={key}"));
        }

        let body: HashMap<String, HashMap<String, Decimal>> =
            self.http.get(&url).send().await?.json().await?;

        let price = body.get(&asset).and_then(|quotes| quotes.get("usd")).copied();
        debug!(symbol, asset, ?price, "spot price fetched");
        Ok(price)
    }

    async fn get_gas_price_gwei(&self) -> Result<Decimal, PricingError> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": "eth_gasPrice",
            "params": [],
            "id": 1,
        });

        let body: serde_json::Value = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        let hex = body
            .get("result")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PricingError::Malformed("eth_gasPrice: no result".to_string()))?;

        let wei = u128::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| PricingError::Malformed(format!("eth_gasPrice {hex:?}: {e}")))?;

        // wei -> gwei is a fixed 10^-9 scale.
        Ok(Decimal::from_i128_with_scale(wei as i128, 9))
    }
}

/// Fixed-price feed for tests and simulation.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceFeed {
    prices: HashMap<String, Decimal>,
    gas_gwei: Decimal,
}

impl StaticPriceFeed {
    /// Create a feed with the given gas price.
    pub fn new(gas_gwei: Decimal) -> Self {
        Self {
            prices: HashMap::new(),
            gas_gwei,
        }
    }

    /// Set the spot price for a symbol.
    pub fn set_price(&mut self, symbol: &str, price: Decimal) {
        self.prices.insert(symbol.to_uppercase(), price);
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn get_spot_price(&self, symbol: &str) -> Result<Option<Decimal>, PricingError> {
        Ok(self.prices.get(&symbol.to_uppercase()).copied())
    }

    async fn get_gas_price_gwei(&self) -> Result<Decimal, PricingError> {
        Ok(self.gas_gwei)
    }
}
