//! Cross-venue opportunity scanning and ranking.
//!
//! The scan is read-only and side-effect-free: it snapshots open interest,
//! projects funding on every venue, prices both orientations of every
//! venue pair, and keeps only candidates whose carry clears execution
//! costs by the configured margin. That margin check is what prevents
//! churn trades that lose money to fees.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::funding::{self, FundingProjection};
use crate::market::{MarketDirectory, MarketParams, OpenInterestSnapshot, Side, Venue, VenueKind};
use crate::pricing::{transaction_cost_usd, PriceFeed};
use crate::venue::VenueRegistry;

/// Scanner tuning parameters.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Notional per leg in USD.
    pub trade_size_usd: Decimal,
    /// Minimum net carry required to emit an opportunity, in USD per
    /// period.
    pub min_net_margin_usd: Decimal,
    /// Funding period for projections, in seconds.
    pub period_seconds: u64,
    /// Slippage allowance per leg in basis points.
    pub slippage_bps: Decimal,
    /// Gas units assumed per on-chain order.
    pub gas_units_per_order: u64,
}

/// A ranked cross-venue funding opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    /// Symbol to trade.
    pub symbol: String,
    /// Venue for the long leg.
    pub long_venue: Venue,
    /// Venue for the short leg.
    pub short_venue: Venue,
    /// Carry net of execution costs, in USD per period.
    pub expected_net_carry_usd: Decimal,
    /// Carry before execution costs, in USD per period.
    pub gross_carry_usd: Decimal,
    /// Estimated entry cost: fees + gas + slippage, in USD.
    pub estimated_execution_cost_usd: Decimal,
    /// Notional per leg in USD.
    pub trade_size_usd: Decimal,
    /// Funding period the carry covers, in seconds.
    pub period_seconds: u64,
}

/// Funding projections for both sides on one venue, plus the inputs that
/// produced them. One scan cycle's view of a venue.
struct VenueQuote {
    params: MarketParams,
    oi: OpenInterestSnapshot,
    long: FundingProjection,
    short: FundingProjection,
}

/// Ranks candidate long/short pairs across venues by net expected carry.
pub struct OpportunityScanner {
    directory: Arc<MarketDirectory>,
    registry: VenueRegistry,
    pricing: Arc<dyn PriceFeed>,
    config: ScanConfig,
}

impl OpportunityScanner {
    /// Create a scanner over the given directory, adapters, and pricing.
    pub fn new(
        directory: Arc<MarketDirectory>,
        registry: VenueRegistry,
        pricing: Arc<dyn PriceFeed>,
        config: ScanConfig,
    ) -> Self {
        Self {
            directory,
            registry,
            pricing,
            config,
        }
    }

    /// Scan all symbols and return opportunities ordered best-first:
    /// descending net carry, ties broken by lower execution cost.
    #[instrument(skip(self, symbols), fields(symbols = symbols.len()))]
    pub async fn scan(&self, symbols: &[String]) -> Vec<Opportunity> {
        let gas_cost_per_order = self.gas_cost_per_order().await;

        let mut opportunities = Vec::new();
        for symbol in symbols {
            opportunities.extend(self.scan_symbol(symbol, gas_cost_per_order).await);
        }

        opportunities.sort_by(cmp_opportunities);
        opportunities
    }

    /// USD gas cost of one on-chain order, `None` when pricing is down.
    async fn gas_cost_per_order(&self) -> Option<Decimal> {
        let needs_gas = self
            .registry
            .venues()
            .iter()
            .any(|v| v.kind() == VenueKind::OnChain);
        if !needs_gas {
            return Some(Decimal::ZERO);
        }

        let gas_gwei = match self.pricing.get_gas_price_gwei().await {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "gas price unavailable; skipping on-chain pairs this cycle");
                return None;
            }
        };
        let eth_usd = match self.pricing.get_spot_price("ETH").await {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!("no ETH spot price; skipping on-chain pairs this cycle");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "spot price unavailable; skipping on-chain pairs this cycle");
                return None;
            }
        };

        Some(transaction_cost_usd(
            self.config.gas_units_per_order,
            gas_gwei,
            eth_usd,
        ))
    }

    /// Quote every venue for a symbol, then price both orientations of
    /// every venue pair.
    async fn scan_symbol(
        &self,
        symbol: &str,
        gas_cost_per_order: Option<Decimal>,
    ) -> Vec<Opportunity> {
        let quotes = self.quote_venues(symbol).await;
        if quotes.len() < 2 {
            debug!(symbol, venues = quotes.len(), "not enough venues to pair");
            return Vec::new();
        }

        let venues: Vec<Venue> = quotes.keys().copied().collect();
        let mut out = Vec::new();
        for &long_venue in &venues {
            for &short_venue in &venues {
                if long_venue == short_venue {
                    continue;
                }
                if let Some(opportunity) = self.score_pair(
                    symbol,
                    &quotes[&long_venue],
                    &quotes[&short_venue],
                    gas_cost_per_order,
                ) {
                    out.push(opportunity);
                }
            }
        }
        out
    }

    /// Snapshot open interest and project funding on every venue that has
    /// parameters for the symbol. Venues that fail are excluded from this
    /// cycle only.
    async fn quote_venues(&self, symbol: &str) -> HashMap<Venue, VenueQuote> {
        let futures = self.registry.readers().values().map(|reader| {
            let reader = Arc::clone(reader);
            let symbol = symbol.to_string();
            async move {
                let venue = reader.venue();
                let oi = reader.get_open_interest(&symbol).await;
                (venue, oi)
            }
        });

        let mut quotes = HashMap::new();
        for (venue, oi) in join_all(futures).await {
            let oi = match oi {
                Ok(oi) => oi,
                Err(e) => {
                    warn!(%venue, symbol, error = %e, "open interest unavailable; venue excluded");
                    continue;
                }
            };
            let params = match self.directory.get(venue, symbol) {
                Ok(p) => p,
                Err(e) => {
                    debug!(%venue, symbol, error = %e, "no market params; venue excluded");
                    continue;
                }
            };

            let long = funding::project(
                &params,
                Side::Long,
                &oi,
                self.config.trade_size_usd,
                self.config.period_seconds,
            );
            let short = funding::project(
                &params,
                Side::Short,
                &oi,
                self.config.trade_size_usd,
                self.config.period_seconds,
            );
            match (long, short) {
                (Ok(long), Ok(short)) => {
                    quotes.insert(
                        venue,
                        VenueQuote {
                            params,
                            oi,
                            long,
                            short,
                        },
                    );
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(%venue, symbol, error = %e, "projection failed; venue excluded");
                }
            }
        }
        quotes
    }

    /// Price one orientation of a venue pair. Emits only when net carry
    /// clears the configured margin.
    fn score_pair(
        &self,
        symbol: &str,
        long: &VenueQuote,
        short: &VenueQuote,
        gas_cost_per_order: Option<Decimal>,
    ) -> Option<Opportunity> {
        let size = self.config.trade_size_usd;
        let gross_carry_usd = funding::pair_carry_usd(&long.long, &short.short, size);

        let on_chain_legs = [&long.params.venue, &short.params.venue]
            .iter()
            .filter(|v| v.kind() == VenueKind::OnChain)
            .count();
        let gas_cost = match (on_chain_legs, gas_cost_per_order) {
            (0, _) => Decimal::ZERO,
            (n, Some(per_order)) => per_order * Decimal::from(n as u64),
            (_, None) => return None,
        };

        let fee_cost = long.params.entry_fee_rate(Side::Long, long.oi.skew()) * size
            + short.params.entry_fee_rate(Side::Short, short.oi.skew()) * size;
        let slippage_cost =
            self.config.slippage_bps / Decimal::from(10_000u64) * size * Decimal::TWO;
        let estimated_execution_cost_usd = fee_cost + gas_cost + slippage_cost;

        let expected_net_carry_usd = gross_carry_usd - estimated_execution_cost_usd;
        if expected_net_carry_usd < self.config.min_net_margin_usd {
            return None;
        }

        debug!(
            symbol,
            long_venue = %long.params.venue,
            short_venue = %short.params.venue,
            gross = %gross_carry_usd,
            cost = %estimated_execution_cost_usd,
            net = %expected_net_carry_usd,
            "opportunity candidate"
        );

        Some(Opportunity {
            symbol: symbol.to_string(),
            long_venue: long.params.venue,
            short_venue: short.params.venue,
            expected_net_carry_usd,
            gross_carry_usd,
            estimated_execution_cost_usd,
            trade_size_usd: size,
            period_seconds: self.config.period_seconds,
        })
    }
}

/// Best-first ordering: descending net carry, then ascending cost.
pub(crate) fn cmp_opportunities(a: &Opportunity, b: &Opportunity) -> Ordering {
    b.expected_net_carry_usd
        .cmp(&a.expected_net_carry_usd)
        .then(
            a.estimated_execution_cost_usd
                .cmp(&b.estimated_execution_cost_usd),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FundingProfile;
    use crate::pricing::StaticPriceFeed;
    use crate::venue::mock::MockVenue;
    use crate::venue::VenueReader;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const PERIOD_8H: u64 = 8 * 3600;

    fn factor_params(venue: Venue, rate_per_period: Decimal) -> MarketParams {
        MarketParams {
            symbol: "ETH".to_string(),
            venue,
            market_id: format!("{venue}-ETH"),
            profile: FundingProfile::Factor {
                funding_factor_per_second: rate_per_period / Decimal::from(PERIOD_8H),
                optimal_utilization: Decimal::ONE,
                base_borrowing_factor: Decimal::ZERO,
                pool_amount_usd: dec!(1_000_000_000),
            },
            maker_fee: dec!(0.00001),
            taker_fee: dec!(0.00001),
        }
    }

    fn scanner_with(
        params: Vec<MarketParams>,
        mocks: Vec<Arc<MockVenue>>,
        config: ScanConfig,
    ) -> OpportunityScanner {
        let directory = Arc::new(MarketDirectory::new());
        directory.replace(params);

        let mut registry = VenueRegistry::new();
        for mock in mocks {
            registry.add_reader(mock as Arc<dyn VenueReader>);
        }

        let mut pricing = StaticPriceFeed::new(dec!(1));
        pricing.set_price("ETH", dec!(3000));

        OpportunityScanner::new(directory, registry, Arc::new(pricing), config)
    }

    fn test_config() -> ScanConfig {
        ScanConfig {
            trade_size_usd: dec!(10_000),
            min_net_margin_usd: dec!(1),
            period_seconds: PERIOD_8H,
            slippage_bps: dec!(0),
            gas_units_per_order: 100_000,
        }
    }

    /// Venue1 longs pay 0.01%/8h, venue2 longs receive 0.02%/8h: the best
    /// pair is long on venue2, short on venue1.
    #[tokio::test]
    async fn proposes_long_on_receiving_venue_short_on_paying_venue() {
        // Positive skew on GMX: longs dominate and pay.
        let gmx = Arc::new(MockVenue::new(Venue::Gmx));
        gmx.set_open_interest("ETH", dec!(2_000_000), dec!(1_000_000));
        // Negative skew on ByBit: shorts dominate and pay; longs receive.
        let bybit = Arc::new(MockVenue::new(Venue::Bybit));
        bybit.set_open_interest("ETH", dec!(1_000_000), dec!(2_000_000));

        let scanner = scanner_with(
            vec![
                factor_params(Venue::Gmx, dec!(0.0001)),
                factor_params(Venue::Bybit, dec!(0.0002)),
            ],
            vec![gmx, bybit],
            test_config(),
        );

        let opportunities = scanner.scan(&["ETH".to_string()]).await;
        assert!(!opportunities.is_empty());

        let best = &opportunities[0];
        assert_eq!(best.long_venue, Venue::Bybit);
        assert_eq!(best.short_venue, Venue::Gmx);
        // Long receives ~0.02% and short receives ~0.01% on $10k: ~$3 gross.
        assert!(best.gross_carry_usd > dec!(2.9) && best.gross_carry_usd < dec!(3.1));
        assert!(best.expected_net_carry_usd >= dec!(1));
    }

    /// Every emitted opportunity clears the margin threshold.
    #[tokio::test]
    async fn below_margin_candidates_are_suppressed() {
        let gmx = Arc::new(MockVenue::new(Venue::Gmx));
        gmx.set_open_interest("ETH", dec!(2_000_000), dec!(1_000_000));
        let bybit = Arc::new(MockVenue::new(Venue::Bybit));
        bybit.set_open_interest("ETH", dec!(1_000_000), dec!(2_000_000));

        let mut config = test_config();
        config.min_net_margin_usd = dec!(100); // far above the ~$3 carry

        let scanner = scanner_with(
            vec![
                factor_params(Venue::Gmx, dec!(0.0001)),
                factor_params(Venue::Bybit, dec!(0.0002)),
            ],
            vec![gmx, bybit],
            config,
        );

        assert!(scanner.scan(&["ETH".to_string()]).await.is_empty());
    }

    /// A venue with broken parameters is excluded; the scan continues.
    #[tokio::test]
    async fn division_by_zero_excludes_venue_not_scan() {
        let synthetix = Arc::new(MockVenue::new(Venue::Synthetix));
        synthetix.set_open_interest("ETH", dec!(500_000), dec!(400_000));
        let gmx = Arc::new(MockVenue::new(Venue::Gmx));
        gmx.set_open_interest("ETH", dec!(2_000_000), dec!(1_000_000));
        let bybit = Arc::new(MockVenue::new(Venue::Bybit));
        bybit.set_open_interest("ETH", dec!(1_000_000), dec!(2_000_000));

        let broken = MarketParams {
            symbol: "ETH".to_string(),
            venue: Venue::Synthetix,
            market_id: "100".to_string(),
            profile: FundingProfile::Velocity {
                max_funding_velocity: dec!(9),
                skew_scale: Decimal::ZERO,
            },
            maker_fee: dec!(0.0002),
            taker_fee: dec!(0.0006),
        };

        let scanner = scanner_with(
            vec![
                broken,
                factor_params(Venue::Gmx, dec!(0.0001)),
                factor_params(Venue::Bybit, dec!(0.0002)),
            ],
            vec![synthetix, gmx, bybit],
            test_config(),
        );

        let opportunities = scanner.scan(&["ETH".to_string()]).await;
        assert!(!opportunities.is_empty());
        for opp in &opportunities {
            assert_ne!(opp.long_venue, Venue::Synthetix);
            assert_ne!(opp.short_venue, Venue::Synthetix);
            assert_ne!(opp.long_venue, opp.short_venue);
        }
    }

    #[test]
    fn ordering_prefers_net_carry_then_cost() {
        let base = Opportunity {
            symbol: "ETH".to_string(),
            long_venue: Venue::Bybit,
            short_venue: Venue::Gmx,
            expected_net_carry_usd: dec!(3),
            gross_carry_usd: dec!(5),
            estimated_execution_cost_usd: dec!(2),
            trade_size_usd: dec!(10_000),
            period_seconds: PERIOD_8H,
        };
        let richer = Opportunity {
            expected_net_carry_usd: dec!(4),
            ..base.clone()
        };
        let cheaper_tie = Opportunity {
            estimated_execution_cost_usd: dec!(1),
            ..base.clone()
        };

        let mut opportunities = vec![base.clone(), richer.clone(), cheaper_tie.clone()];
        opportunities.sort_by(cmp_opportunities);

        assert_eq!(opportunities[0], richer);
        assert_eq!(opportunities[1], cheaper_tie);
        assert_eq!(opportunities[2], base);
    }
}
