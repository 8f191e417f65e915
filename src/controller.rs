//! Top-level control loop.
//!
//! Cycle order is a hard guarantee: liquidation risk is evaluated before
//! any new opportunity is executed, so risk reduction always preempts new
//! risk-taking. Stale venue data freezes trading for the cycle rather
//! than letting a false "nothing open" read place an opposing trade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::{BotError, ExecutionError, Result};
use crate::events::{EventBus, EventKind};
use crate::execution::{ExecutionOrchestrator, TradeOutcome};
use crate::market::{MarketDirectory, Venue};
use crate::metrics;
use crate::position::{MonitoredPosition, PositionMonitor};
use crate::pricing::PriceFeed;
use crate::scanner::{OpportunityScanner, ScanConfig};
use crate::tradelog::{PositionRecord, TradeLog};
use crate::utils::shutdown_signal;
use crate::venue::VenueRegistry;

/// What one control cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A position breached the liquidation safety threshold and the pair
    /// was closed before anything else ran.
    UrgentClosed {
        /// Venue that breached.
        venue: Venue,
        /// Symbol closed.
        symbol: String,
    },
    /// An open pair's carry turned negative beyond the hysteresis band.
    ClosedNegativeCarry {
        /// Symbol closed.
        symbol: String,
        /// Carry at close, in USD per period.
        carry_usd: Decimal,
    },
    /// A new pair was opened.
    Opened {
        /// Symbol opened.
        symbol: String,
        /// Expected net carry, in USD per period.
        net_carry_usd: Decimal,
    },
    /// Open positions were kept as-is.
    Held,
    /// Nothing open, nothing worth opening.
    Idle,
}

/// Wires the directory, monitor, scanner, and orchestrator into one loop.
pub struct ArbitrageController {
    config: Config,
    symbols: Vec<String>,
    directory: Arc<MarketDirectory>,
    registry: VenueRegistry,
    monitor: PositionMonitor,
    scanner: OpportunityScanner,
    orchestrator: ExecutionOrchestrator,
    events: EventBus,
    cycles: u64,
}

impl ArbitrageController {
    /// Build the controller and its components from configuration.
    pub fn new(
        config: Config,
        registry: VenueRegistry,
        directory: Arc<MarketDirectory>,
        log: Arc<dyn TradeLog>,
        pricing: Arc<dyn PriceFeed>,
        events: EventBus,
    ) -> Self {
        let monitor = PositionMonitor::new(
            registry.clone(),
            Arc::clone(&log),
            Arc::clone(&directory),
            config.liquidation_safety_pct,
        );
        let scanner = OpportunityScanner::new(
            Arc::clone(&directory),
            registry.clone(),
            pricing,
            ScanConfig {
                trade_size_usd: config.trade_size_usd,
                min_net_margin_usd: config.min_net_margin_usd,
                period_seconds: config.funding_period_secs(),
                slippage_bps: config.slippage_bps,
                gas_units_per_order: config.gas_units_per_order,
            },
        );
        let orchestrator = ExecutionOrchestrator::new(
            registry.clone(),
            log,
            events.clone(),
            config.trade_leverage,
            config.collateral_margin,
        );
        let symbols = config.symbols();
        Self {
            config,
            symbols,
            directory,
            registry,
            monitor,
            scanner,
            orchestrator,
            events,
            cycles: 0,
        }
    }

    /// Run one cycle: refresh, risk checks, carry re-evaluation, scan.
    #[instrument(skip(self), fields(cycle = self.cycles))]
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let _timer = metrics::timer_cycle();
        metrics::inc_cycles();

        if self.cycles % self.config.refresh_every_cycles == 0 {
            let refreshed = self
                .directory
                .refresh(self.registry.readers(), &self.symbols)
                .await;
            if refreshed > 0 {
                if let Err(e) = self.directory.persist(&self.config.market_cache_path) {
                    warn!(error = %e, "failed to persist market cache");
                }
            }
        }
        self.cycles += 1;

        // Risk pass first; an urgent close short-circuits the cycle.
        let (open_positions, any_stale) = match self.risk_pass().await? {
            RiskPass::UrgentClosed { venue, symbol } => {
                return Ok(CycleOutcome::UrgentClosed { venue, symbol });
            }
            RiskPass::Surveyed {
                open_positions,
                any_stale,
            } => (open_positions, any_stale),
        };

        if !open_positions.is_empty() {
            if any_stale {
                warn!("venue data stale; holding positions and skipping new trades");
                return Ok(CycleOutcome::Held);
            }
            return self.reevaluate_carry(&open_positions).await;
        }

        if any_stale {
            // A stale read must never look like "no position open".
            warn!("venue data stale with no confirmed positions; skipping scan");
            return Ok(CycleOutcome::Held);
        }

        self.scan_and_open().await
    }

    /// Check every venue's open position for liquidation risk.
    async fn risk_pass(&self) -> Result<RiskPass> {
        let mut open_positions = Vec::new();
        let mut any_stale = false;

        for venue in self.registry.venues() {
            let monitored = match self.monitor.get_open_position(venue).await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%venue, error = %e, "monitor read failed; treating venue as stale");
                    any_stale = true;
                    continue;
                }
            };

            if monitored.stale {
                any_stale = true;
                open_positions.push(monitored);
                continue;
            }

            match self.monitor.liquidation_check(&monitored.record).await {
                Ok(Some(risk)) => {
                    metrics::inc_urgent_closes();
                    let symbol = monitored.record.symbol.clone();
                    self.events.publish(
                        EventKind::CloseAllPositions,
                        json!({
                            "symbol": symbol,
                            "position_id": risk.position_id,
                            "distance_pct": risk.distance_pct.to_string(),
                        }),
                    );
                    return match self.orchestrator.close_pair(&symbol).await {
                        Ok(_) => Ok(RiskPass::UrgentClosed { venue, symbol }),
                        // A failed urgent close is unreconciled risk.
                        Err(e) => Err(ExecutionError::RiskThresholdBreach {
                            venue,
                            distance_pct: risk.distance_pct,
                            threshold_pct: self.monitor.safety_threshold_pct(),
                            reason: e.to_string(),
                        }
                        .into()),
                    };
                }
                Ok(None) => open_positions.push(monitored),
                Err(e) => {
                    warn!(%venue, error = %e, "liquidation check failed; holding");
                    any_stale = true;
                    open_positions.push(monitored);
                }
            }
        }

        Ok(RiskPass::Surveyed {
            open_positions,
            any_stale,
        })
    }

    /// Recompute current carry for each open pair; close once it turns
    /// negative beyond the hysteresis band.
    async fn reevaluate_carry(
        &self,
        open_positions: &[MonitoredPosition],
    ) -> Result<CycleOutcome> {
        let mut by_symbol: HashMap<&str, Vec<&PositionRecord>> = HashMap::new();
        for monitored in open_positions {
            by_symbol
                .entry(monitored.record.symbol.as_str())
                .or_default()
                .push(&monitored.record);
        }

        let period = self.config.funding_period_secs();
        for (symbol, records) in by_symbol {
            let mut carry_usd = Decimal::ZERO;
            let mut complete = true;
            for &record in &records {
                match self.monitor.current_funding(record, period).await {
                    // Pays-positive convention: receipts add to carry.
                    Ok(projection) => carry_usd += -projection.fee_rate * record.size_usd,
                    Err(e) => {
                        warn!(symbol, id = %record.id, error = %e, "carry recompute failed; holding");
                        complete = false;
                    }
                }
            }

            if complete && carry_usd < -self.config.carry_close_hysteresis_usd {
                info!(symbol, %carry_usd, "carry turned negative; closing pair");
                self.orchestrator.close_pair(symbol).await?;
                return Ok(CycleOutcome::ClosedNegativeCarry {
                    symbol: symbol.to_string(),
                    carry_usd,
                });
            }
        }

        Ok(CycleOutcome::Held)
    }

    /// Scan the universe and open the top opportunity if one clears.
    async fn scan_and_open(&self) -> Result<CycleOutcome> {
        let scan_started = std::time::Instant::now();
        let opportunities = self.scanner.scan(&self.symbols).await;
        metrics::record_scan_latency(scan_started);

        let Some(top) = opportunities.into_iter().next() else {
            return Ok(CycleOutcome::Idle);
        };

        metrics::inc_opportunities_detected();
        self.events.publish(
            EventKind::OpportunityFound,
            json!({
                "symbol": top.symbol,
                "long_venue": top.long_venue.to_string(),
                "short_venue": top.short_venue.to_string(),
                "net_carry_usd": top.expected_net_carry_usd.to_string(),
                "cost_usd": top.estimated_execution_cost_usd.to_string(),
            }),
        );
        info!(
            symbol = %top.symbol,
            long_venue = %top.long_venue,
            short_venue = %top.short_venue,
            net_carry_usd = %top.expected_net_carry_usd,
            "executing top opportunity"
        );

        match self.orchestrator.open_pair(&top).await? {
            TradeOutcome::BothFilled { .. } => Ok(CycleOutcome::Opened {
                symbol: top.symbol,
                net_carry_usd: top.expected_net_carry_usd,
            }),
            outcome => {
                warn!(?outcome, "open did not complete");
                Ok(CycleOutcome::Idle)
            }
        }
    }

    /// Run the loop until shutdown. Cycle errors degrade to the next
    /// cycle; they never kill the loop.
    pub async fn run(mut self) -> Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            symbols = ?self.symbols,
            period_secs = self.config.poll_interval_secs,
            "arbitrage controller started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_cycle().await {
                        Ok(outcome) => info!(?outcome, "cycle complete"),
                        Err(e @ BotError::Execution(ExecutionError::RiskThresholdBreach { .. })) => {
                            error!(error = %e, "OPERATOR ACTION REQUIRED");
                        }
                        Err(e) => error!(error = %e, "cycle failed; retrying next tick"),
                    }
                }
                _ = shutdown_signal() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        if let Err(e) = self.directory.persist(&self.config.market_cache_path) {
            warn!(error = %e, "failed to persist market cache on shutdown");
        }
        Ok(())
    }
}

enum RiskPass {
    UrgentClosed {
        venue: Venue,
        symbol: String,
    },
    Surveyed {
        open_positions: Vec<MonitoredPosition>,
        any_stale: bool,
    },
}
