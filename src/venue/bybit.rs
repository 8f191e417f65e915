//! ByBit public read adapter.
//!
//! Uses only unauthenticated v5 market-data endpoints, so it can feed the
//! directory and scanner without credentials. Account state requires
//! signed endpoints, which live outside the engine; `get_position`
//! reports `Unsupported` accordingly.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::error::VenueError;
use crate::market::{FundingProfile, MarketParams, OpenInterestSnapshot, Venue};

use super::{PositionState, VenueReader};

/// Seconds in ByBit's 8-hour funding interval.
const FUNDING_INTERVAL_SECS: u64 = 8 * 3600;

/// Standard linear-perp fee tiers.
const MAKER_FEE: Decimal = dec!(0.0002);
const TAKER_FEE: Decimal = dec!(0.00055);

/// ByBit v5 public market-data client.
#[derive(Debug, Clone)]
pub struct BybitReader {
    http: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<TickersResult>,
}

#[derive(Debug, Deserialize)]
struct TickersResult {
    list: Vec<Ticker>,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    symbol: String,
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "openInterestValue")]
    open_interest_value: String,
}

impl BybitReader {
    /// Create a reader against the production API.
    pub fn new(timeout_ms: u64) -> Self {
        Self::with_base_url("https://api.bybit.com", timeout_ms)
    }

    /// Create a reader against a custom base URL (testnet, test server).
    pub fn with_base_url(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .connect_timeout(Duration::from_millis(timeout_ms.min(2000)))
            .build()
            .expect("failed to create HTTP client");
        Self {
            http,
            base_url: base_url.into(),
            timeout_ms,
        }
    }

    /// Venue-native contract name for a tracked symbol.
    fn contract(symbol: &str) -> String {
        format!("{}USDT", symbol.to_uppercase())
    }

    fn unavailable(&self, reason: impl Into<String>) -> VenueError {
        VenueError::Unavailable {
            venue: Venue::Bybit,
            reason: reason.into(),
        }
    }

    fn map_http(&self, e: reqwest::Error) -> VenueError {
        if e.is_timeout() {
            VenueError::Timeout {
                venue: Venue::Bybit,
                timeout_ms: self.timeout_ms,
            }
        } else {
            self.unavailable(e.to_string())
        }
    }

    fn parse_decimal(&self, field: &str, raw: &str) -> Result<Decimal, VenueError> {
        Decimal::from_str(raw)
            .map_err(|e| self.unavailable(format!("malformed {field} {raw:?}: {e}")))
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, VenueError> {
        let contract = Self::contract(symbol);
        let url = format!(
            "{}/v5/market/tickers?category=linear&symbol={contract}",
            self.base_url
        );

        let response: TickersResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_http(e))?
            .json()
            .await
            .map_err(|e| self.map_http(e))?;

        if response.ret_code != 0 {
            return Err(self.unavailable(format!(
                "tickers retCode {}: {}",
                response.ret_code, response.ret_msg
            )));
        }

        let ticker = response
            .result
            .and_then(|r| r.list.into_iter().find(|t| t.symbol == contract))
            .ok_or_else(|| self.unavailable(format!("no ticker for {contract}")))?;

        debug!(symbol, funding_rate = %ticker.funding_rate, "fetched ByBit ticker");
        Ok(ticker)
    }
}

#[async_trait]
impl VenueReader for BybitReader {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    async fn get_market_params(&self, symbol: &str) -> Result<MarketParams, VenueError> {
        let ticker = self.fetch_ticker(symbol).await?;
        let rate_per_interval = self.parse_decimal("fundingRate", &ticker.funding_rate)?;
        let funding_factor_per_second =
            rate_per_interval / Decimal::from(FUNDING_INTERVAL_SECS);

        Ok(MarketParams {
            symbol: symbol.to_uppercase(),
            venue: Venue::Bybit,
            market_id: ticker.symbol,
            profile: FundingProfile::Factor {
                funding_factor_per_second,
                // Reported funding already prices utilization; no add-on.
                optimal_utilization: Decimal::ONE,
                base_borrowing_factor: Decimal::ZERO,
                pool_amount_usd: dec!(1_000_000_000),
            },
            maker_fee: MAKER_FEE,
            taker_fee: TAKER_FEE,
        })
    }

    async fn get_open_interest(
        &self,
        symbol: &str,
    ) -> Result<OpenInterestSnapshot, VenueError> {
        let ticker = self.fetch_ticker(symbol).await?;
        let total = self.parse_decimal("openInterestValue", &ticker.open_interest_value)?;

        // A matched book carries equal long and short notional; the public
        // API exposes only the total, so skew is zero by construction.
        let half = total / Decimal::TWO;
        Ok(OpenInterestSnapshot {
            venue: Venue::Bybit,
            symbol: symbol.to_uppercase(),
            long_usd: half,
            short_usd: half,
        })
    }

    async fn get_position(&self, _symbol: &str) -> Result<Option<PositionState>, VenueError> {
        Err(VenueError::Unsupported {
            venue: Venue::Bybit,
            operation: "get_position (requires signed endpoints)",
        })
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, VenueError> {
        let ticker = self.fetch_ticker(symbol).await?;
        self.parse_decimal("markPrice", &ticker.mark_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_name_is_usdt_linear() {
        assert_eq!(BybitReader::contract("eth"), "ETHUSDT");
        assert_eq!(BybitReader::contract("BTC"), "BTCUSDT");
    }

    #[test]
    fn tickers_response_parses() {
        let raw = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "linear",
                "list": [{
                    "symbol": "ETHUSDT",
                    "fundingRate": "0.0001",
                    "markPrice": "3000.50",
                    "openInterestValue": "250000000.00"
                }]
            }
        }"#;

        let response: TickersResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.ret_code, 0);
        let ticker = &response.result.unwrap().list[0];
        assert_eq!(ticker.symbol, "ETHUSDT");
        assert_eq!(ticker.funding_rate, "0.0001");
    }

    #[test]
    fn position_reads_are_unsupported() {
        let reader = BybitReader::with_base_url("http://localhost:1", 100);
        let err = tokio_test::block_on(reader.get_position("ETH")).unwrap_err();
        assert!(matches!(err, VenueError::Unsupported { .. }));
    }
}
