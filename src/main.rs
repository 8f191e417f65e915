//! Funding-rate arbitrage engine entry point.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use funding_arb::config::Config;
use funding_arb::controller::ArbitrageController;
use funding_arb::events::EventBus;
use funding_arb::market::{MarketDirectory, Venue};
use funding_arb::metrics;
use funding_arb::pricing::{HttpPriceFeed, PriceFeed, StaticPriceFeed};
use funding_arb::scanner::{OpportunityScanner, ScanConfig};
use funding_arb::tradelog::{MemoryTradeLog, SqliteTradeLog, TradeLog};
use funding_arb::venue::bybit::BybitReader;
use funding_arb::venue::mock::MockVenue;
use funding_arb::venue::{VenueReader, VenueRegistry, VenueTrader};

/// Cross-venue funding-rate arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "funding-arb")]
#[command(about = "Funding-rate arbitrage across perp venues")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control loop (default).
    Run {
        /// Pull ByBit market data from the live public API.
        #[arg(long)]
        live_data: bool,
    },

    /// Run one scan pass and print ranked opportunities.
    Scan {
        /// Pull ByBit market data from the live public API.
        #[arg(long)]
        live_data: bool,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Refresh the market parameter cache and persist it.
    RefreshCache {
        /// Pull ByBit market data from the live public API.
        #[arg(long)]
        live_data: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("funding_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Scan { live_data }) => cmd_scan(live_data).await,
        Some(Command::RefreshCache { live_data }) => cmd_refresh_cache(live_data).await,
        Some(Command::Run { live_data }) => cmd_run(live_data).await,
        None => cmd_run(false).await,
    }
}

/// Build the adapter registry. Trading always goes through simulated
/// venues; `live_data` swaps in the real ByBit public reader.
fn build_registry(config: &Config, live_data: bool) -> VenueRegistry {
    let symbols = config.symbols();
    let mut registry = VenueRegistry::new();

    for venue in Venue::ALL {
        let mock = Arc::new(MockVenue::with_defaults(venue, &symbols));
        mock.set_collateral(config.sim_collateral);
        if !(live_data && venue == Venue::Bybit) {
            registry.add_reader(mock.clone() as Arc<dyn VenueReader>);
        }
        registry.add_trader(mock as Arc<dyn VenueTrader>);
    }

    if live_data {
        registry.add_reader(Arc::new(BybitReader::new(config.http_timeout_ms)));
    }

    registry
}

fn build_pricing(config: &Config, live_data: bool) -> Arc<dyn PriceFeed> {
    if live_data {
        Arc::new(HttpPriceFeed::new(
            config.coingecko_url.clone(),
            config.coingecko_api_key.clone(),
            config.rpc_url.clone(),
            config.http_timeout_ms,
        ))
    } else {
        let mut feed = StaticPriceFeed::new(rust_decimal_macros::dec!(0.05));
        feed.set_price("ETH", rust_decimal_macros::dec!(3000));
        feed.set_price("BTC", rust_decimal_macros::dec!(60000));
        Arc::new(feed)
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

fn cmd_check_config() -> anyhow::Result<()> {
    let config = load_config()?;

    println!("Configuration OK");
    println!("  Symbols:            {}", config.symbols().join(", "));
    println!("  Trade size:         ${} per leg", config.trade_size_usd);
    println!("  Min net margin:     ${} per period", config.min_net_margin_usd);
    println!("  Funding period:     {}h", config.funding_period_hours);
    println!("  Leverage:           {}x", config.trade_leverage);
    println!("  Liq. safety:        {}%", config.liquidation_safety_pct);
    println!("  Close hysteresis:   ${}", config.carry_close_hysteresis_usd);
    println!("  Poll interval:      {}s", config.poll_interval_secs);
    println!("  Market cache:       {}", config.market_cache_path);
    println!("  Trade log:          {}", config.trade_log_path);
    println!("  Mode:               {}", if config.dry_run { "SIMULATION" } else { "LIVE" });
    Ok(())
}

async fn cmd_scan(live_data: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    let registry = build_registry(&config, live_data);
    let pricing = build_pricing(&config, live_data);

    let directory = Arc::new(MarketDirectory::new());
    if directory.load(&config.market_cache_path) == 0 {
        info!("cache empty; refreshing from venues");
        directory.refresh(registry.readers(), &config.symbols()).await;
    }

    let scanner = OpportunityScanner::new(
        Arc::clone(&directory),
        registry,
        pricing,
        ScanConfig {
            trade_size_usd: config.trade_size_usd,
            min_net_margin_usd: config.min_net_margin_usd,
            period_seconds: config.funding_period_secs(),
            slippage_bps: config.slippage_bps,
            gas_units_per_order: config.gas_units_per_order,
        },
    );

    let opportunities = scanner.scan(&config.symbols()).await;
    if opportunities.is_empty() {
        println!("No opportunities clear the ${} margin.", config.min_net_margin_usd);
        return Ok(());
    }

    println!(
        "{:<6} {:<12} {:<12} {:>12} {:>10} {:>10}",
        "SYMBOL", "LONG", "SHORT", "NET/PERIOD", "GROSS", "COST"
    );
    for opp in &opportunities {
        println!(
            "{:<6} {:<12} {:<12} {:>12} {:>10} {:>10}",
            opp.symbol,
            opp.long_venue.to_string(),
            opp.short_venue.to_string(),
            format!("${}", opp.expected_net_carry_usd.round_dp(4)),
            format!("${}", opp.gross_carry_usd.round_dp(4)),
            format!("${}", opp.estimated_execution_cost_usd.round_dp(4)),
        );
    }
    Ok(())
}

async fn cmd_refresh_cache(live_data: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    let registry = build_registry(&config, live_data);

    let directory = Arc::new(MarketDirectory::new());
    let refreshed = directory.refresh(registry.readers(), &config.symbols()).await;
    directory.persist(&config.market_cache_path)?;

    println!(
        "Refreshed {refreshed} market entries into {}",
        config.market_cache_path
    );
    Ok(())
}

async fn cmd_run(live_data: bool) -> anyhow::Result<()> {
    let config = load_config()?;

    info!(
        mode = if config.dry_run { "SIMULATION" } else { "LIVE" },
        symbols = %config.symbols().join(","),
        "starting funding-rate arbitrage engine"
    );

    // Prometheus exporter serves scrapes on its own listener.
    let metrics_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    if let Err(e) = PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
    {
        warn!(error = %e, "metrics exporter not started");
    } else {
        info!(%metrics_addr, "metrics exporter listening");
    }

    let registry = build_registry(&config, live_data);
    let pricing = build_pricing(&config, live_data);

    let directory = Arc::new(MarketDirectory::new());
    directory.load(&config.market_cache_path);

    let log: Arc<dyn TradeLog> = if config.dry_run {
        Arc::new(MemoryTradeLog::new())
    } else {
        Arc::new(SqliteTradeLog::open(&config.trade_log_path)?)
    };

    let events = EventBus::default();
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            info!(kind = %event.kind, payload = %event.payload, "event");
        }
    });

    let controller =
        ArbitrageController::new(config, registry, directory, log, pricing, events);
    controller.run().await?;

    info!("engine stopped");
    Ok(())
}
