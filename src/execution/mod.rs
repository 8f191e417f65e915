//! Two-leg trade execution with compensating rollback.
//!
//! Per-pair state machine:
//!
//! ```text
//! Pending -> LongLegFilled -> BothFilled                  (success)
//! Pending -> LongLegFilled -> CompensatingClose -> Reverted (rolled back)
//! Pending -> Failed                                        (nothing landed)
//! ```
//!
//! A failed compensating close is the one state the engine cannot resolve
//! alone: retrying blindly risks duplicate positions, so it surfaces a
//! manual-intervention alert and leaves the landed leg recorded as open.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use crate::error::{BotError, ExecutionError};
use crate::events::{EventBus, EventKind};
use crate::market::{Side, Venue};
use crate::metrics;
use crate::scanner::Opportunity;
use crate::tradelog::{OpenClose, PositionRecord, TradeLog};
use crate::venue::{VenueRegistry, VenueTrader};

/// Outcome of opening a hedged pair.
#[derive(Debug)]
pub enum TradeOutcome {
    /// Both legs filled; the pair is live.
    BothFilled {
        /// Long leg record.
        long: PositionRecord,
        /// Short leg record.
        short: PositionRecord,
    },
    /// Short leg failed and the long leg was closed out cleanly.
    Reverted {
        /// Symbol traded.
        symbol: String,
        /// Why the short leg failed.
        reason: String,
    },
    /// Nothing landed; no state was written.
    Failed {
        /// Symbol traded.
        symbol: String,
        /// Why the open failed.
        reason: String,
    },
    /// Short leg failed and the compensating close also failed. The
    /// landed leg stays open in the log until an operator reconciles it.
    CompensationFailed {
        /// The leg that landed and could not be closed.
        landed: PositionRecord,
        /// Why the compensating close failed.
        reason: String,
    },
}

/// Outcome of closing a pair.
#[derive(Debug, PartialEq)]
pub enum CloseOutcome {
    /// All open legs for the symbol were closed.
    Closed {
        /// Number of legs closed.
        legs: usize,
    },
    /// The log had nothing open for the symbol.
    NothingOpen,
}

/// Opens and closes hedged pairs, keeping the trade log consistent with
/// venue state. Sole writer of the trade log.
pub struct ExecutionOrchestrator {
    registry: VenueRegistry,
    log: Arc<dyn TradeLog>,
    events: EventBus,
    // One order in flight per venue at a time.
    venue_locks: DashMap<Venue, Arc<Mutex<()>>>,
    leverage: Decimal,
    collateral_margin: Decimal,
}

impl ExecutionOrchestrator {
    /// Create an orchestrator over the given adapters and log.
    pub fn new(
        registry: VenueRegistry,
        log: Arc<dyn TradeLog>,
        events: EventBus,
        leverage: Decimal,
        collateral_margin: Decimal,
    ) -> Self {
        Self {
            registry,
            log,
            events,
            venue_locks: DashMap::new(),
            leverage,
            collateral_margin,
        }
    }

    /// Acquire the execution locks for both venues in canonical order so
    /// two overlapping pairs cannot deadlock.
    async fn lock_venues(&self, a: Venue, b: Venue) -> Vec<OwnedMutexGuard<()>> {
        let mut venues = vec![a, b];
        venues.sort();
        venues.dedup();

        let mut guards = Vec::with_capacity(venues.len());
        for venue in venues {
            let lock = self
                .venue_locks
                .entry(venue)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    fn ensure_no_open_position(&self, venue: Venue) -> Result<(), BotError> {
        let open = self.log.query(venue, OpenClose::Open)?;
        if let Some(existing) = open.first() {
            return Err(ExecutionError::AlreadyOpen {
                venue,
                symbol: existing.symbol.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn ensure_collateral(
        &self,
        trader: &Arc<dyn VenueTrader>,
        size_usd: Decimal,
    ) -> Result<(), BotError> {
        let required = size_usd / self.leverage * self.collateral_margin;
        let available = trader.get_collateral().await?;
        if available < required {
            return Err(ExecutionError::InsufficientCollateral {
                required,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn record_leg(
        &self,
        symbol: &str,
        venue: Venue,
        side: Side,
        filled_size_usd: Decimal,
        fill_price: Decimal,
    ) -> Result<PositionRecord, BotError> {
        let record = PositionRecord::open(
            symbol,
            venue,
            side,
            filled_size_usd,
            fill_price,
            self.leverage,
        );
        self.log.append(&record)?;
        self.events.publish(
            EventKind::TradeLogged,
            json!({ "id": record.id, "venue": venue.to_string(), "side": side.to_string() }),
        );
        Ok(record)
    }

    /// Open the long leg on one venue and the short leg on another.
    #[instrument(skip(self, opportunity), fields(
        symbol = %opportunity.symbol,
        long_venue = %opportunity.long_venue,
        short_venue = %opportunity.short_venue,
    ))]
    pub async fn open_pair(&self, opportunity: &Opportunity) -> Result<TradeOutcome, BotError> {
        let symbol = &opportunity.symbol;
        let size = opportunity.trade_size_usd;
        let long_trader = self.registry.trader(opportunity.long_venue)?;
        let short_trader = self.registry.trader(opportunity.short_venue)?;

        let _guards = self
            .lock_venues(opportunity.long_venue, opportunity.short_venue)
            .await;

        // One open position per venue, enforced before anything is placed.
        self.ensure_no_open_position(opportunity.long_venue)?;
        self.ensure_no_open_position(opportunity.short_venue)?;

        self.ensure_collateral(&long_trader, size).await?;
        self.ensure_collateral(&short_trader, size).await?;

        for (trader, venue) in [
            (&long_trader, opportunity.long_venue),
            (&short_trader, opportunity.short_venue),
        ] {
            if let Err(e) = trader.set_leverage(symbol, self.leverage).await {
                warn!(%venue, error = %e, "leverage setup failed; aborting open");
                return Ok(TradeOutcome::Failed {
                    symbol: symbol.clone(),
                    reason: format!("set_leverage on {venue}: {e}"),
                });
            }
        }

        // State: Pending -> place the long leg first.
        let long_fill = match long_trader.place_order(symbol, Side::Long, size).await {
            Ok(result) if result.success => result,
            Ok(result) => {
                metrics::inc_orders_failed();
                return Ok(TradeOutcome::Failed {
                    symbol: symbol.clone(),
                    reason: format!("long leg not filled (order {})", result.order_id),
                });
            }
            Err(e) => {
                metrics::inc_orders_failed();
                return Ok(TradeOutcome::Failed {
                    symbol: symbol.clone(),
                    reason: format!("long leg on {}: {e}", opportunity.long_venue),
                });
            }
        };

        // State: LongLegFilled. The log now owns the landed leg.
        let long_record = self.record_leg(
            symbol,
            opportunity.long_venue,
            Side::Long,
            long_fill.filled_size_usd,
            long_fill.fill_price,
        )?;
        info!(id = %long_record.id, "long leg filled");

        match short_trader.place_order(symbol, Side::Short, size).await {
            Ok(result) if result.success => {
                let short_record = self.record_leg(
                    symbol,
                    opportunity.short_venue,
                    Side::Short,
                    result.filled_size_usd,
                    result.fill_price,
                )?;
                info!(id = %short_record.id, "short leg filled; pair open");
                metrics::inc_pairs_opened();
                self.events.publish(
                    EventKind::PositionOpened,
                    json!({
                        "symbol": symbol,
                        "long_id": long_record.id,
                        "short_id": short_record.id,
                        "net_carry_usd": opportunity.expected_net_carry_usd.to_string(),
                    }),
                );
                Ok(TradeOutcome::BothFilled {
                    long: long_record,
                    short: short_record,
                })
            }
            short_failure => {
                let reason = match short_failure {
                    Ok(result) => format!("short leg not filled (order {})", result.order_id),
                    Err(e) => format!("short leg on {}: {e}", opportunity.short_venue),
                };
                warn!(reason, "short leg failed; compensating close of long leg");
                self.compensate(&long_trader, long_record, symbol, reason)
                    .await
            }
        }
    }

    /// State: CompensatingClose. Close the landed long leg; on failure,
    /// escalate instead of retrying.
    async fn compensate(
        &self,
        long_trader: &Arc<dyn VenueTrader>,
        long_record: PositionRecord,
        symbol: &str,
        reason: String,
    ) -> Result<TradeOutcome, BotError> {
        match long_trader.close_position(symbol).await {
            Ok(result) if result.success => {
                self.log
                    .update_close(&long_record.id, OffsetDateTime::now_utc())?;
                metrics::inc_pairs_reverted();
                self.events.publish(
                    EventKind::PositionClosed,
                    json!({ "symbol": symbol, "ids": [long_record.id], "reverted": true }),
                );
                info!("long leg closed; pair reverted");
                Ok(TradeOutcome::Reverted {
                    symbol: symbol.to_string(),
                    reason,
                })
            }
            close_failure => {
                let close_reason = match close_failure {
                    Ok(result) => format!("close not filled (order {})", result.order_id),
                    Err(e) => e.to_string(),
                };
                metrics::inc_compensation_failures();
                error!(
                    id = %long_record.id,
                    venue = %long_record.venue,
                    close_reason,
                    "MANUAL INTERVENTION REQUIRED: compensating close failed; \
                     one leg remains open"
                );
                Ok(TradeOutcome::CompensationFailed {
                    landed: long_record,
                    reason: format!("{reason}; compensating close: {close_reason}"),
                })
            }
        }
    }

    /// Close every open leg for a symbol.
    ///
    /// Partial failure is flagged as `PartialExecutionFailure`, never
    /// silently retried: legs that did close are marked Closed, the rest
    /// stay Open for the operator.
    #[instrument(skip(self))]
    pub async fn close_pair(&self, symbol: &str) -> Result<CloseOutcome, BotError> {
        let open = self.log.open_for_symbol(symbol)?;
        if open.is_empty() {
            return Ok(CloseOutcome::NothingOpen);
        }

        let venues: Vec<Venue> = open.iter().map(|r| r.venue).collect();
        let _guards = match venues.as_slice() {
            [a] => self.lock_venues(*a, *a).await,
            [a, b, ..] => self.lock_venues(*a, *b).await,
            [] => unreachable!("open is non-empty"),
        };

        let mut closed = 0usize;
        let mut failures = Vec::new();
        for record in &open {
            let trader = self.registry.trader(record.venue)?;
            match trader.close_position(symbol).await {
                Ok(result) if result.success => {
                    self.log
                        .update_close(&record.id, OffsetDateTime::now_utc())?;
                    closed += 1;
                }
                Ok(result) => {
                    failures.push(format!(
                        "{}: close not filled (order {})",
                        record.venue, result.order_id
                    ));
                }
                Err(e) => failures.push(format!("{}: {e}", record.venue)),
            }
        }

        if failures.is_empty() {
            metrics::inc_pairs_closed();
            self.events.publish(
                EventKind::PositionClosed,
                json!({
                    "symbol": symbol,
                    "ids": open.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
                    "reverted": false,
                }),
            );
            info!(legs = closed, "pair closed");
            Ok(CloseOutcome::Closed { legs: closed })
        } else {
            error!(closed, failed = failures.len(), "partial close; not retrying");
            Err(ExecutionError::PartialExecutionFailure {
                symbol: symbol.to_string(),
                detail: format!("closed {closed}/{} legs; failed: {}", open.len(), failures.join("; ")),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tradelog::MemoryTradeLog;
    use crate::venue::mock::MockVenue;
    use crate::venue::{VenueReader, VenueTrader};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn opportunity(long_venue: Venue, short_venue: Venue) -> Opportunity {
        Opportunity {
            symbol: "ETH".to_string(),
            long_venue,
            short_venue,
            expected_net_carry_usd: dec!(2.5),
            gross_carry_usd: dec!(3),
            estimated_execution_cost_usd: dec!(0.5),
            trade_size_usd: dec!(500),
            period_seconds: 8 * 3600,
        }
    }

    fn setup() -> (
        ExecutionOrchestrator,
        Arc<MockVenue>,
        Arc<MockVenue>,
        Arc<MemoryTradeLog>,
    ) {
        let symbols = vec!["ETH".to_string()];
        let gmx = Arc::new(MockVenue::with_defaults(Venue::Gmx, &symbols));
        let bybit = Arc::new(MockVenue::with_defaults(Venue::Bybit, &symbols));
        let log = Arc::new(MemoryTradeLog::new());

        let mut registry = VenueRegistry::new();
        registry.add_reader(gmx.clone() as Arc<dyn VenueReader>);
        registry.add_reader(bybit.clone() as Arc<dyn VenueReader>);
        registry.add_trader(gmx.clone() as Arc<dyn VenueTrader>);
        registry.add_trader(bybit.clone() as Arc<dyn VenueTrader>);

        let orchestrator = ExecutionOrchestrator::new(
            registry,
            log.clone() as Arc<dyn TradeLog>,
            EventBus::default(),
            dec!(2),
            dec!(1.2),
        );
        (orchestrator, gmx, bybit, log)
    }

    #[tokio::test]
    async fn both_legs_fill_and_are_recorded() {
        let (orchestrator, _gmx, _bybit, log) = setup();

        let outcome = orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap();

        let TradeOutcome::BothFilled { long, short } = outcome else {
            panic!("expected BothFilled, got {outcome:?}");
        };
        assert_eq!(long.venue, Venue::Gmx);
        assert_eq!(long.side, Side::Long);
        assert_eq!(short.venue, Venue::Bybit);
        assert_eq!(short.side, Side::Short);
        assert_eq!(log.open_for_symbol("ETH").unwrap().len(), 2);
    }

    /// Short leg fails, compensating close succeeds: Reverted, no open
    /// records remain.
    #[tokio::test]
    async fn short_failure_reverts_long_leg() {
        let (orchestrator, _gmx, bybit, log) = setup();
        bybit.set_fail_orders(true);

        let outcome = orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap();

        assert!(matches!(outcome, TradeOutcome::Reverted { .. }));
        assert!(log.open_for_symbol("ETH").unwrap().is_empty());
        // The long leg is kept as an audit record, marked Closed.
        assert_eq!(log.query(Venue::Gmx, OpenClose::Closed).unwrap().len(), 1);
    }

    /// Short leg fails and the close fails too: the landed leg stays open
    /// and the outcome demands manual intervention.
    #[tokio::test]
    async fn compensation_failure_leaves_leg_open() {
        let (orchestrator, gmx, bybit, log) = setup();
        bybit.set_fail_orders(true);
        gmx.set_fail_close(true);

        let outcome = orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap();

        let TradeOutcome::CompensationFailed { landed, .. } = outcome else {
            panic!("expected CompensationFailed, got {outcome:?}");
        };
        assert_eq!(landed.venue, Venue::Gmx);
        assert_eq!(log.open_for_symbol("ETH").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn long_failure_writes_nothing() {
        let (orchestrator, gmx, _bybit, log) = setup();
        gmx.set_fail_orders(true);

        let outcome = orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap();

        assert!(matches!(outcome, TradeOutcome::Failed { .. }));
        assert!(log.all().is_empty());
    }

    #[tokio::test]
    async fn second_open_on_same_venue_is_rejected() {
        let (orchestrator, _gmx, _bybit, log) = setup();
        log.append(&PositionRecord::open(
            "BTC",
            Venue::Gmx,
            Side::Long,
            dec!(500),
            dec!(60_000),
            dec!(2),
        ))
        .unwrap();

        let err = orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BotError::Execution(ExecutionError::AlreadyOpen { .. })
        ));
        // Only the seeded record exists; nothing was placed.
        assert_eq!(log.all().len(), 1);
    }

    #[tokio::test]
    async fn insufficient_collateral_is_rejected_before_any_order() {
        let (orchestrator, gmx, _bybit, log) = setup();
        gmx.set_collateral(dec!(1));

        let err = orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BotError::Execution(ExecutionError::InsufficientCollateral { .. })
        ));
        assert!(log.all().is_empty());
        assert!(gmx.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn close_pair_closes_both_legs() {
        let (orchestrator, _gmx, _bybit, log) = setup();
        orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap();

        let outcome = orchestrator.close_pair("ETH").await.unwrap();

        assert_eq!(outcome, CloseOutcome::Closed { legs: 2 });
        assert!(log.open_for_symbol("ETH").unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_pair_flags_partial_failure() {
        let (orchestrator, _gmx, bybit, log) = setup();
        orchestrator
            .open_pair(&opportunity(Venue::Gmx, Venue::Bybit))
            .await
            .unwrap();
        bybit.set_fail_close(true);

        let err = orchestrator.close_pair("ETH").await.unwrap_err();

        assert!(matches!(
            err,
            BotError::Execution(ExecutionError::PartialExecutionFailure { .. })
        ));
        // The leg that closed is recorded Closed; the other stays Open.
        let still_open = log.open_for_symbol("ETH").unwrap();
        assert_eq!(still_open.len(), 1);
        assert_eq!(still_open[0].venue, Venue::Bybit);
    }

    #[tokio::test]
    async fn close_pair_with_nothing_open_is_a_noop() {
        let (orchestrator, _gmx, _bybit, _log) = setup();
        let outcome = orchestrator.close_pair("ETH").await.unwrap();
        assert_eq!(outcome, CloseOutcome::NothingOpen);
    }
}
