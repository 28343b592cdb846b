//! Fleet Monitor
//!
//! Periodically collects every configured host, classifies it and serves the
//! latest report over HTTP.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fleet_monitor::api::{self, Telemetry};
use fleet_monitor::gateway::{IpInfoClient, JsonRpcClient, PrometheusClient};
use fleet_monitor::{Controller, CycleReport, FleetState, GeoMode, HostCollector, HostStatus, MonitorConfig};

/// Fleet Monitor - health and gas price statistics for nodes and validators
#[derive(Parser, Debug)]
#[command(name = "fleet-monitor")]
#[command(author = "KratOs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Health monitor for nodes, validators and reference RPC endpoints", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "fleet-monitor.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds between collection cycles
    #[arg(short, long)]
    interval: Option<u64>,

    /// HTTP API port
    #[arg(long)]
    api_port: Option<u16>,

    /// ipinfo.io access token
    #[arg(long, env = "IPINFO_TOKEN")]
    geo_token: Option<String>,

    /// Run a single cycle, print the report as JSON and exit
    #[arg(long)]
    once: bool,

    /// Write the default configuration to --config and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    info!("🛰️  Fleet Monitor v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        MonitorConfig::default().save(&args.config)?;
        info!("📝 Default configuration written to {:?}", args.config);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        MonitorConfig::load(&args.config)?
    } else {
        warn!("Config file {:?} not found, using defaults", args.config);
        MonitorConfig::default()
    };

    // Override config with CLI args
    let mut config = config.with_geo_token(args.geo_token);
    if let Some(interval) = args.interval {
        config = config.with_poll_interval(interval);
    }
    if let Some(port) = args.api_port {
        config = config.with_api_port(port);
    }

    config.validate()?;

    info!("⚙️  Configuration:");
    info!("   Poll interval: {}s", config.poll_interval_secs);
    info!("   Call timeout: {}s", config.call_timeout_secs);
    info!("   Rate window: {} samples", config.rate_window);
    info!(
        "   Endpoints: {} rpc, {} nodes, {} validators",
        config.rpc.len(),
        config.nodes.len(),
        config.validators.len()
    );
    info!("   Geolocation: {:?}", config.geolocation.mode);

    // Gateways
    let timeout = config.call_timeout();
    let mut collector = HostCollector::new(
        Arc::new(JsonRpcClient::new(timeout)?),
        Arc::new(PrometheusClient::new(timeout)?),
    )
    .with_call_timeout(timeout)
    .with_window_size(config.rate_window);

    if config.geolocation.mode != GeoMode::Disabled {
        let geo = IpInfoClient::new(config.geolocation.token.clone(), timeout)?;
        collector = collector.with_geolocation(Arc::new(geo), config.geolocation.mode);
    }

    let state = Arc::new(RwLock::new(FleetState::new(config.active_tables())));
    let telemetry = Arc::new(Telemetry::new());
    let controller = Controller::from_config(&config, collector, state.clone(), telemetry.clone())?;

    if args.once {
        let report = controller.run_cycle(&CancellationToken::new()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if config.enable_api {
        let port = config.api_port;
        let (fleet, telemetry) = (state.clone(), telemetry.clone());
        tokio::spawn(async move {
            if let Err(e) = api::run_api_server(port, fleet, telemetry).await {
                error!("HTTP API exited: {}", e);
            }
        });
    }

    // Cancel in-flight calls on Ctrl+C
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutdown signal received");
            signal.cancel();
        }
    });

    info!("✅ Monitor started");
    info!("   Press Ctrl+C to shutdown gracefully");

    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                match controller.run_cycle(&shutdown).await {
                    Ok(report) => log_report(&report),
                    Err(e) if shutdown.is_cancelled() => warn!("Cycle interrupted: {}", e),
                    Err(e) => error!("❌ Cycle failed: {}", e),
                }
            }
        }
    }

    info!("👋 Fleet Monitor shutting down");
    Ok(())
}

fn log_report(report: &CycleReport) {
    for (table, hosts) in &report.tables {
        info!(
            "📊 {}: {}/{} hosts healthy ({} green, {} yellow, {} red), {} failed",
            table,
            hosts.healthy(),
            hosts.hosts.len(),
            hosts.count(HostStatus::Green),
            hosts.count(HostStatus::Yellow),
            hosts.count(HostStatus::Red),
            hosts.errors.len()
        );
    }

    if let Some(gas) = &report.gas {
        info!(
            "⛽ Gas price: reference {}, estimated next {}, stake-weighted mean {}, median {}",
            report
                .reference_gas_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string()),
            gas.estimated_next,
            gas.stake_weighted_mean,
            gas.median
        );
    }

    if let Some(epoch) = &report.epoch {
        info!(
            "⏳ Epoch {} ends in {}m",
            epoch.epoch,
            epoch.time_to_next_epoch.num_minutes()
        );
    }
}
