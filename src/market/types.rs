//! Core market types shared across the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A derivatives venue the engine trades on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// On-chain synthetic-asset protocol (skew-scaled funding velocity).
    #[strum(to_string = "Synthetix", serialize = "synthetix")]
    Synthetix,
    /// On-chain perp DEX (per-second funding factor plus borrowing curve).
    #[strum(to_string = "GMX", serialize = "gmx", serialize = "Gmx")]
    Gmx,
    /// Centralized exchange (reported funding factor, no borrowing).
    #[strum(to_string = "ByBit", serialize = "bybit", serialize = "Bybit")]
    Bybit,
}

/// Broad venue class, used for gas costing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueKind {
    /// Settles on-chain; every order pays gas.
    OnChain,
    /// Off-chain order matching; no gas.
    Centralized,
}

impl Venue {
    /// All venues the engine knows about.
    pub const ALL: [Venue; 3] = [Venue::Synthetix, Venue::Gmx, Venue::Bybit];

    /// Venue class for execution cost estimation.
    pub fn kind(&self) -> VenueKind {
        match self {
            Venue::Synthetix | Venue::Gmx => VenueKind::OnChain,
            Venue::Bybit => VenueKind::Centralized,
        }
    }
}

/// Direction of one leg of a hedged pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Long leg.
    #[strum(to_string = "Long", serialize = "long")]
    #[default]
    Long,
    /// Short leg.
    #[strum(to_string = "Short", serialize = "short")]
    Short,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Apply direction to a notional size: longs add to skew, shorts
    /// subtract from it.
    pub fn signed(&self, size: Decimal) -> Decimal {
        match self {
            Side::Long => size,
            Side::Short => -size,
        }
    }
}

/// How a venue accrues funding on open positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "profile", rename_all = "snake_case")]
pub enum FundingProfile {
    /// Funding rate drifts at a velocity proportional to skew.
    Velocity {
        /// Maximum funding velocity per day at full skew scale.
        max_funding_velocity: Decimal,
        /// Skew normalization constant. Zero is rejected by the model.
        skew_scale: Decimal,
    },
    /// Explicit per-second funding factor, with a utilization-based
    /// borrowing add-on above the optimal threshold.
    Factor {
        /// Funding rate per second paid by the dominant side.
        funding_factor_per_second: Decimal,
        /// Utilization below which borrowing is free.
        optimal_utilization: Decimal,
        /// Linear slope of the borrowing rate above optimal, per second.
        base_borrowing_factor: Decimal,
        /// Pool depth backing the market in USD. Zero is rejected.
        pool_amount_usd: Decimal,
    },
}

/// Immutable per-symbol market parameter snapshot for one venue.
///
/// Replaced wholesale on each directory refresh; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketParams {
    /// Symbol (e.g. "ETH").
    pub symbol: String,
    /// Venue the parameters belong to.
    pub venue: Venue,
    /// Venue-native market identifier.
    pub market_id: String,
    /// Funding accrual profile.
    pub profile: FundingProfile,
    /// Maker fee as a fraction of notional.
    pub maker_fee: Decimal,
    /// Taker fee as a fraction of notional.
    pub taker_fee: Decimal,
}

impl MarketParams {
    /// Entry fee rate for a leg, picked by skew sign at decision time.
    ///
    /// An order that reduces skew is a maker; one that increases it is a
    /// taker. Decision-time skew is authoritative; any shift before fill
    /// is accounted as slippage by the scanner.
    pub fn entry_fee_rate(&self, side: Side, skew: Decimal) -> Decimal {
        let reduces_skew = match side {
            Side::Long => skew < Decimal::ZERO,
            Side::Short => skew > Decimal::ZERO,
        };
        if reduces_skew {
            self.maker_fee
        } else {
            self.taker_fee
        }
    }
}

/// Open interest on one venue, captured atomically per scan cycle.
///
/// Used only within a single scan pass; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenInterestSnapshot {
    /// Venue observed.
    pub venue: Venue,
    /// Symbol observed.
    pub symbol: String,
    /// Long open interest in USD.
    pub long_usd: Decimal,
    /// Short open interest in USD.
    pub short_usd: Decimal,
}

impl OpenInterestSnapshot {
    /// Signed imbalance: positive when longs dominate.
    pub fn skew(&self) -> Decimal {
        self.long_usd - self.short_usd
    }

    /// Open interest on one side.
    pub fn side_usd(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_usd,
            Side::Short => self.short_usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn side_opposite_works() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn side_signed_size() {
        assert_eq!(Side::Long.signed(dec!(100)), dec!(100));
        assert_eq!(Side::Short.signed(dec!(100)), dec!(-100));
    }

    #[test]
    fn venue_from_string_works() {
        use std::str::FromStr;
        assert_eq!(Venue::from_str("synthetix").unwrap(), Venue::Synthetix);
        assert_eq!(Venue::from_str("GMX").unwrap(), Venue::Gmx);
        assert_eq!(Venue::from_str("bybit").unwrap(), Venue::Bybit);
    }

    #[test]
    fn venue_kinds() {
        assert_eq!(Venue::Synthetix.kind(), VenueKind::OnChain);
        assert_eq!(Venue::Gmx.kind(), VenueKind::OnChain);
        assert_eq!(Venue::Bybit.kind(), VenueKind::Centralized);
    }

    #[test]
    fn skew_is_long_minus_short() {
        let oi = OpenInterestSnapshot {
            venue: Venue::Synthetix,
            symbol: "ETH".to_string(),
            long_usd: dec!(1_500_000),
            short_usd: dec!(1_000_000),
        };
        assert_eq!(oi.skew(), dec!(500_000));
        assert_eq!(oi.side_usd(Side::Long), dec!(1_500_000));
        assert_eq!(oi.side_usd(Side::Short), dec!(1_000_000));
    }

    #[test]
    fn entry_fee_follows_skew_sign() {
        let params = MarketParams {
            symbol: "ETH".to_string(),
            venue: Venue::Synthetix,
            market_id: "100".to_string(),
            profile: FundingProfile::Velocity {
                max_funding_velocity: dec!(9),
                skew_scale: dec!(1_000_000),
            },
            maker_fee: dec!(0.0002),
            taker_fee: dec!(0.0006),
        };

        // Long into positive skew increases it: taker.
        assert_eq!(params.entry_fee_rate(Side::Long, dec!(100)), dec!(0.0006));
        // Long into negative skew reduces it: maker.
        assert_eq!(params.entry_fee_rate(Side::Long, dec!(-100)), dec!(0.0002));
        // Short into positive skew reduces it: maker.
        assert_eq!(params.entry_fee_rate(Side::Short, dec!(100)), dec!(0.0002));
        // Short into negative skew increases it: taker.
        assert_eq!(params.entry_fee_rate(Side::Short, dec!(-100)), dec!(0.0006));
    }
}
