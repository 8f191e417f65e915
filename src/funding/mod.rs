//! Funding fee projection models.
//!
//! Two venue profiles are supported:
//!
//! - **Velocity**: the funding rate drifts at `c = max_funding_velocity /
//!   skew_scale` per unit of skew. The projected rate for a period is
//!   `c * (current_skew + hypothetical_trade)`, normalized from the daily
//!   velocity to the requested period. Longs pay when skew is positive.
//! - **Factor**: an explicit per-second funding factor paid by the dominant
//!   side, plus a borrowing component that is zero below the optimal
//!   utilization threshold and grows linearly above it.
//!
//! Sign convention everywhere: positive fee rate = the side pays, negative
//! = the side receives.

use rust_decimal::Decimal;

use crate::error::ModelError;
use crate::market::{FundingProfile, MarketParams, OpenInterestSnapshot, Side, Venue};

/// Seconds in one day, the native period of funding velocity.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Projected funding fee per unit notional over a period.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingProjection {
    /// Venue projected.
    pub venue: Venue,
    /// Symbol projected.
    pub symbol: String,
    /// Side the projection applies to.
    pub side: Side,
    /// Period the rate covers, in seconds.
    pub period_seconds: u64,
    /// Fee rate as a fraction of notional. Positive = side pays.
    pub fee_rate: Decimal,
}

/// Project the funding fee rate for one side of a prospective trade.
///
/// `trade_size_usd` is the hypothetical notional about to be added; it
/// shifts skew (velocity profile) and utilization (factor profile) so the
/// projection prices the book as it would look after the fill.
pub fn project(
    params: &MarketParams,
    side: Side,
    oi: &OpenInterestSnapshot,
    trade_size_usd: Decimal,
    period_seconds: u64,
) -> Result<FundingProjection, ModelError> {
    if period_seconds == 0 {
        return Err(ModelError::InvalidInput(
            "period_seconds must be positive".to_string(),
        ));
    }
    if trade_size_usd < Decimal::ZERO {
        return Err(ModelError::InvalidInput(format!(
            "trade size must not be negative, got {trade_size_usd}"
        )));
    }

    let fee_rate = match &params.profile {
        FundingProfile::Velocity {
            max_funding_velocity,
            skew_scale,
        } => velocity_rate(
            *max_funding_velocity,
            *skew_scale,
            oi.skew(),
            side,
            trade_size_usd,
            period_seconds,
        )?,
        FundingProfile::Factor {
            funding_factor_per_second,
            optimal_utilization,
            base_borrowing_factor,
            pool_amount_usd,
        } => factor_rate(
            *funding_factor_per_second,
            *optimal_utilization,
            *base_borrowing_factor,
            *pool_amount_usd,
            oi,
            side,
            trade_size_usd,
            period_seconds,
        )?,
    };

    Ok(FundingProjection {
        venue: params.venue,
        symbol: params.symbol.clone(),
        side,
        period_seconds,
        fee_rate,
    })
}

fn velocity_rate(
    max_funding_velocity: Decimal,
    skew_scale: Decimal,
    current_skew: Decimal,
    side: Side,
    trade_size_usd: Decimal,
    period_seconds: u64,
) -> Result<Decimal, ModelError> {
    if skew_scale.is_zero() {
        return Err(ModelError::DivisionByZero {
            quantity: "skew_scale",
        });
    }

    let c = max_funding_velocity / skew_scale;
    let new_skew = current_skew + side.signed(trade_size_usd);
    // Velocity is expressed per day; normalize to the requested period.
    let daily_rate = c * new_skew;
    let rate = daily_rate * Decimal::from(period_seconds) / Decimal::from(SECONDS_PER_DAY);

    // Positive resulting skew means longs dominate: the long pays, the
    // short receives the mirror amount.
    Ok(match side {
        Side::Long => rate,
        Side::Short => -rate,
    })
}

#[allow(clippy::too_many_arguments)]
fn factor_rate(
    funding_factor_per_second: Decimal,
    optimal_utilization: Decimal,
    base_borrowing_factor: Decimal,
    pool_amount_usd: Decimal,
    oi: &OpenInterestSnapshot,
    side: Side,
    trade_size_usd: Decimal,
    period_seconds: u64,
) -> Result<Decimal, ModelError> {
    if pool_amount_usd.is_zero() {
        return Err(ModelError::DivisionByZero {
            quantity: "pool_amount_usd",
        });
    }

    let period = Decimal::from(period_seconds);
    let funding = funding_factor_per_second * period;

    // The dominant side pays funding; the other side receives it.
    let longs_pay = oi.skew() >= Decimal::ZERO;
    let funding_component = match (side, longs_pay) {
        (Side::Long, true) | (Side::Short, false) => funding,
        _ => -funding,
    };

    // Borrowing is paid on the side's own open interest regardless of
    // funding direction. Free below optimal utilization, linear above.
    let side_oi = oi.side_usd(side) + trade_size_usd;
    let utilization = side_oi / pool_amount_usd;
    let borrow = if utilization > optimal_utilization {
        base_borrowing_factor * (utilization - optimal_utilization) * period
    } else {
        Decimal::ZERO
    };

    Ok(funding_component + borrow)
}

/// Net carry in USD per period for a hedged long/short pair.
///
/// Both legs' fee rates follow the pays-positive convention, so the pair
/// earns when their sum is negative.
pub fn pair_carry_usd(
    long: &FundingProjection,
    short: &FundingProjection,
    trade_size_usd: Decimal,
) -> Decimal {
    -(long.fee_rate + short.fee_rate) * trade_size_usd
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn velocity_params(skew_scale: Decimal) -> MarketParams {
        MarketParams {
            symbol: "ETH".to_string(),
            venue: Venue::Synthetix,
            market_id: "100".to_string(),
            profile: FundingProfile::Velocity {
                max_funding_velocity: dec!(8.64),
                skew_scale,
            },
            maker_fee: dec!(0.0002),
            taker_fee: dec!(0.0006),
        }
    }

    fn factor_params(pool_amount_usd: Decimal) -> MarketParams {
        MarketParams {
            symbol: "ETH".to_string(),
            venue: Venue::Gmx,
            market_id: "eth-usd".to_string(),
            profile: FundingProfile::Factor {
                funding_factor_per_second: dec!(0.00000001),
                optimal_utilization: dec!(0.75),
                base_borrowing_factor: dec!(0.0000001),
                pool_amount_usd,
            },
            maker_fee: dec!(0.0005),
            taker_fee: dec!(0.0007),
        }
    }

    fn oi(long_usd: Decimal, short_usd: Decimal) -> OpenInterestSnapshot {
        OpenInterestSnapshot {
            venue: Venue::Synthetix,
            symbol: "ETH".to_string(),
            long_usd,
            short_usd,
        }
    }

    #[test]
    fn zero_skew_scale_is_division_by_zero() {
        let params = velocity_params(dec!(0));
        let err = project(&params, Side::Long, &oi(dec!(100), dec!(0)), dec!(10), 3600)
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::DivisionByZero {
                quantity: "skew_scale"
            }
        );
    }

    #[test]
    fn zero_pool_amount_is_division_by_zero() {
        let params = factor_params(dec!(0));
        let err = project(&params, Side::Long, &oi(dec!(100), dec!(0)), dec!(10), 3600)
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::DivisionByZero {
                quantity: "pool_amount_usd"
            }
        );
    }

    #[test]
    fn long_pays_when_skew_positive() {
        let params = velocity_params(dec!(1_000_000));
        // c = 8.64 / 1_000_000 per day; skew after trade = 100_500.
        // Daily rate = 0.0000086400 * 100_500; over 86_400s it is unchanged.
        let projection = project(
            &params,
            Side::Long,
            &oi(dec!(600_000), dec!(500_000)),
            dec!(500),
            SECONDS_PER_DAY,
        )
        .unwrap();
        assert!(projection.fee_rate > Decimal::ZERO);
        assert_eq!(projection.fee_rate.round_dp(8), dec!(0.86832));
    }

    #[test]
    fn short_receives_when_skew_positive() {
        let params = velocity_params(dec!(1_000_000));
        let long = project(
            &params,
            Side::Long,
            &oi(dec!(600_000), dec!(500_000)),
            dec!(0),
            SECONDS_PER_DAY,
        )
        .unwrap();
        let short = project(
            &params,
            Side::Short,
            &oi(dec!(600_000), dec!(500_000)),
            dec!(0),
            SECONDS_PER_DAY,
        )
        .unwrap();
        // With no hypothetical size the two legs are exact mirrors.
        assert_eq!(short.fee_rate, -long.fee_rate);
        assert!(short.fee_rate < Decimal::ZERO);
    }

    #[test]
    fn velocity_rate_scales_with_period() {
        let params = velocity_params(dec!(1_000_000));
        let day = project(&params, Side::Long, &oi(dec!(200), dec!(0)), dec!(0), SECONDS_PER_DAY)
            .unwrap();
        let eight_hours =
            project(&params, Side::Long, &oi(dec!(200), dec!(0)), dec!(0), 8 * 3600).unwrap();
        assert_eq!(eight_hours.fee_rate * dec!(3), day.fee_rate);
    }

    #[test]
    fn factor_dominant_side_pays() {
        let params = factor_params(dec!(10_000_000));
        let snapshot = oi(dec!(2_000_000), dec!(1_000_000));

        let long = project(&params, Side::Long, &snapshot, dec!(0), 8 * 3600).unwrap();
        let short = project(&params, Side::Short, &snapshot, dec!(0), 8 * 3600).unwrap();

        // Longs dominate: the long pays funding, the short receives it.
        assert!(long.fee_rate > Decimal::ZERO);
        assert!(short.fee_rate < Decimal::ZERO);
    }

    #[test]
    fn borrowing_is_free_below_optimal_utilization() {
        let params = factor_params(dec!(10_000_000));
        // Short OI 1M on a 10M pool: 10% utilization, well below 75%.
        let snapshot = oi(dec!(2_000_000), dec!(1_000_000));
        let short = project(&params, Side::Short, &snapshot, dec!(0), 8 * 3600).unwrap();

        let funding = dec!(0.00000001) * Decimal::from(8 * 3600u64);
        // Pure funding receipt, no borrow component.
        assert_eq!(short.fee_rate, -funding);
    }

    #[test]
    fn borrowing_grows_linearly_above_optimal() {
        let params = factor_params(dec!(1_000_000));
        // Long OI 900k on a 1M pool: 90% utilization, 15 points above optimal.
        let snapshot = oi(dec!(900_000), dec!(100_000));
        let long = project(&params, Side::Long, &snapshot, dec!(0), 3600).unwrap();

        let period = Decimal::from(3600u64);
        let funding = dec!(0.00000001) * period;
        let borrow = dec!(0.0000001) * (dec!(0.9) - dec!(0.75)) * period;
        assert_eq!(long.fee_rate, funding + borrow);
    }

    #[test]
    fn pair_carry_is_positive_when_both_legs_receive() {
        let long = FundingProjection {
            venue: Venue::Gmx,
            symbol: "ETH".to_string(),
            side: Side::Long,
            period_seconds: 8 * 3600,
            fee_rate: dec!(-0.0002), // long receives
        };
        let short = FundingProjection {
            venue: Venue::Synthetix,
            symbol: "ETH".to_string(),
            side: Side::Short,
            period_seconds: 8 * 3600,
            fee_rate: dec!(-0.0001), // short receives
        };
        assert_eq!(pair_carry_usd(&long, &short, dec!(10_000)), dec!(3));
    }

    #[test]
    fn pair_carry_is_negative_when_fees_dominate() {
        let long = FundingProjection {
            venue: Venue::Gmx,
            symbol: "ETH".to_string(),
            side: Side::Long,
            period_seconds: 8 * 3600,
            fee_rate: dec!(0.0003),
        };
        let short = FundingProjection {
            venue: Venue::Synthetix,
            symbol: "ETH".to_string(),
            side: Side::Short,
            period_seconds: 8 * 3600,
            fee_rate: dec!(-0.0001),
        };
        assert_eq!(pair_carry_usd(&long, &short, dec!(10_000)), dec!(-2));
    }
}
