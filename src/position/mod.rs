//! Per-venue position monitoring and liquidation-distance checks.
//!
//! The trade log is the canonical answer to "is a position open"; the
//! monitor reconciles it against venue-reported state and flags the
//! result stale when the venue cannot be reached, so a dead adapter is
//! never mistaken for a flat book.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{BotError, ModelError, VenueError};
use crate::funding::{self, FundingProjection};
use crate::market::{MarketDirectory, Side, Venue};
use crate::tradelog::{OpenClose, PositionRecord, TradeLog};
use crate::venue::VenueRegistry;

/// Distance to forced liquidation, recomputed every monitor cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationRisk {
    /// Record the risk belongs to.
    pub position_id: String,
    /// Percentage move in mark price before liquidation.
    pub distance_pct: Decimal,
}

/// An open position as seen by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredPosition {
    /// The trade log record.
    pub record: PositionRecord,
    /// True when the venue could not confirm the record this cycle.
    pub stale: bool,
}

/// Reads open positions and computes liquidation risk per venue.
pub struct PositionMonitor {
    registry: VenueRegistry,
    log: Arc<dyn TradeLog>,
    directory: Arc<MarketDirectory>,
    last_known: Mutex<HashMap<Venue, PositionRecord>>,
    safety_threshold_pct: Decimal,
}

impl PositionMonitor {
    /// Create a monitor over the given adapters, log, and directory.
    pub fn new(
        registry: VenueRegistry,
        log: Arc<dyn TradeLog>,
        directory: Arc<MarketDirectory>,
        safety_threshold_pct: Decimal,
    ) -> Self {
        Self {
            registry,
            log,
            directory,
            last_known: Mutex::new(HashMap::new()),
            safety_threshold_pct,
        }
    }

    /// Configured liquidation safety threshold in percent.
    pub fn safety_threshold_pct(&self) -> Decimal {
        self.safety_threshold_pct
    }

    /// Most recent Open record for a venue, reconciled against the venue.
    ///
    /// Venue unreachable does not hide the position: the last-known record
    /// comes back flagged stale instead of `None`.
    pub async fn get_open_position(
        &self,
        venue: Venue,
    ) -> Result<Option<MonitoredPosition>, BotError> {
        let open = self.log.query(venue, OpenClose::Open)?;
        let Some(record) = open.into_iter().max_by_key(|r| r.entry_timestamp) else {
            return Ok(None);
        };

        self.last_known
            .lock()
            .unwrap()
            .insert(venue, record.clone());

        let reader = self.registry.reader(venue)?;
        let stale = match reader.get_position(&record.symbol).await {
            Ok(Some(_)) => false,
            Ok(None) => {
                warn!(
                    %venue,
                    symbol = %record.symbol,
                    "trade log says open but venue reports no position"
                );
                false
            }
            // Read-only adapters cannot confirm account state; the log
            // remains authoritative.
            Err(VenueError::Unsupported { .. }) => {
                debug!(%venue, "position confirmation unsupported; trusting trade log");
                false
            }
            Err(e) => {
                warn!(%venue, error = %e, "venue unreachable; returning last-known record as stale");
                true
            }
        };

        Ok(Some(MonitoredPosition { record, stale }))
    }

    /// Percentage distance between mark price and the liquidation price.
    pub async fn liquidation_distance(
        &self,
        record: &PositionRecord,
    ) -> Result<Decimal, BotError> {
        if record.leverage <= Decimal::ZERO {
            return Err(ModelError::InvalidInput(format!(
                "leverage must be positive, got {}",
                record.leverage
            ))
            .into());
        }

        let reader = self.registry.reader(record.venue)?;
        let mark = reader.get_mark_price(&record.symbol).await?;
        if mark.is_zero() {
            return Err(ModelError::DivisionByZero {
                quantity: "mark_price",
            }
            .into());
        }

        let margin_fraction = Decimal::ONE / record.leverage;
        let liquidation_price = match record.side {
            Side::Long => record.entry_price * (Decimal::ONE - margin_fraction),
            Side::Short => record.entry_price * (Decimal::ONE + margin_fraction),
        };

        let distance_pct = ((mark - liquidation_price) / mark).abs() * Decimal::ONE_HUNDRED;
        Ok(distance_pct)
    }

    /// Urgent-close check: `Some` when the position sits inside the
    /// safety threshold.
    pub async fn liquidation_check(
        &self,
        record: &PositionRecord,
    ) -> Result<Option<LiquidationRisk>, BotError> {
        let distance_pct = self.liquidation_distance(record).await?;
        if distance_pct < self.safety_threshold_pct {
            warn!(
                id = %record.id,
                venue = %record.venue,
                %distance_pct,
                threshold_pct = %self.safety_threshold_pct,
                "liquidation risk detected"
            );
            return Ok(Some(LiquidationRisk {
                position_id: record.id.clone(),
                distance_pct,
            }));
        }
        Ok(None)
    }

    /// Current funding accrual for an open record's side over one period.
    pub async fn current_funding(
        &self,
        record: &PositionRecord,
        period_seconds: u64,
    ) -> Result<FundingProjection, BotError> {
        let params = self.directory.get(record.venue, &record.symbol)?;
        let reader = self.registry.reader(record.venue)?;
        let oi = reader.get_open_interest(&record.symbol).await?;
        // Size zero: the position is already in the book.
        let projection = funding::project(&params, record.side, &oi, Decimal::ZERO, period_seconds)?;
        Ok(projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Venue;
    use crate::tradelog::MemoryTradeLog;
    use crate::venue::mock::MockVenue;
    use crate::venue::{PositionState, VenueReader, VenueTrader};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn setup(venue: Venue) -> (PositionMonitor, Arc<MockVenue>, Arc<MemoryTradeLog>) {
        let mock = Arc::new(MockVenue::with_defaults(venue, &["ETH".to_string()]));
        let log = Arc::new(MemoryTradeLog::new());
        let mut registry = VenueRegistry::new();
        registry.add_reader(mock.clone() as Arc<dyn VenueReader>);
        registry.add_trader(mock.clone() as Arc<dyn VenueTrader>);
        let directory = Arc::new(MarketDirectory::new());
        let monitor = PositionMonitor::new(
            registry,
            log.clone() as Arc<dyn TradeLog>,
            directory,
            dec!(5),
        );
        (monitor, mock, log)
    }

    fn open_record(venue: Venue, entry_price: Decimal, leverage: Decimal) -> PositionRecord {
        PositionRecord::open("ETH", venue, Side::Long, dec!(500), entry_price, leverage)
    }

    #[tokio::test]
    async fn no_open_record_means_none() {
        let (monitor, _, _) = setup(Venue::Synthetix);
        assert!(monitor
            .get_open_position(Venue::Synthetix)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn open_record_is_returned_fresh_when_venue_confirms() {
        let (monitor, mock, log) = setup(Venue::Synthetix);
        let record = open_record(Venue::Synthetix, dec!(3000), dec!(2));
        log.append(&record).unwrap();
        mock.seed_position(PositionState {
            symbol: "ETH".to_string(),
            side: Side::Long,
            size_usd: dec!(500),
            entry_price: dec!(3000),
            leverage: dec!(2),
        });

        let monitored = monitor
            .get_open_position(Venue::Synthetix)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(monitored.record.id, record.id);
        assert!(!monitored.stale);
    }

    #[tokio::test]
    async fn unreachable_venue_returns_stale_record() {
        let (monitor, mock, log) = setup(Venue::Synthetix);
        let record = open_record(Venue::Synthetix, dec!(3000), dec!(2));
        log.append(&record).unwrap();
        mock.set_fail_reads(true);

        let monitored = monitor
            .get_open_position(Venue::Synthetix)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(monitored.record.id, record.id);
        assert!(monitored.stale);
    }

    #[tokio::test]
    async fn liquidation_distance_from_entry_and_leverage() {
        let (monitor, mock, _) = setup(Venue::Synthetix);
        // Long at 3000 with 2x: liquidation at 1500. Mark 3000 -> 50%.
        mock.set_mark_price("ETH", dec!(3000));
        let record = open_record(Venue::Synthetix, dec!(3000), dec!(2));

        let distance = monitor.liquidation_distance(&record).await.unwrap();
        assert_eq!(distance, dec!(50));
    }

    #[tokio::test]
    async fn urgent_close_when_inside_threshold() {
        let (monitor, mock, _) = setup(Venue::Synthetix);
        // Long at 3000 with 10x: liquidation at 2700. Mark 2783.5 puts the
        // distance at 3%, inside the 5% threshold.
        mock.set_mark_price("ETH", dec!(2783.505154639175257731958763));
        let record = open_record(Venue::Synthetix, dec!(3000), dec!(10));

        let risk = monitor.liquidation_check(&record).await.unwrap().unwrap();
        assert_eq!(risk.position_id, record.id);
        assert!(risk.distance_pct < dec!(5));
        assert_eq!(risk.distance_pct.round_dp(2), dec!(3.00));
    }

    #[tokio::test]
    async fn safe_distance_yields_no_signal() {
        let (monitor, mock, _) = setup(Venue::Synthetix);
        mock.set_mark_price("ETH", dec!(3000));
        let record = open_record(Venue::Synthetix, dec!(3000), dec!(2));

        assert!(monitor.liquidation_check(&record).await.unwrap().is_none());
    }
}
