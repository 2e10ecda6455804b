//! Cadence CLI entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use alloy_primitives::Address;
use cadence_api::{EngineConfig, LoyaltyConfig, MeterEvent, MeteringConfig, SettlementConfig};
use cadence_ledger::{MemoryCatalog, MemoryLedger};
use cadence_node::{Engine, EngineBuilder};
use cadence_primitives::{ContentId, TrackInfo};
use cadence_settlement::{InProcessSettlement, SettlementClient};

/// Cadence - metered streaming payment node
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub logs: LogArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Logging configuration.
#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// Log filter directives; RUST_LOG takes precedence when set.
    #[arg(long = "log.filter", default_value = "info")]
    pub filter: String,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a cadence node.
    Node(NodeArgs),
    /// Stream one dev session end to end and print the accounting.
    Demo(DemoArgs),
}

/// Engine tuning, shared by the subcommands.
#[derive(Debug, clap::Args)]
pub struct EngineArgs {
    /// Metering tick period in milliseconds.
    #[arg(long = "metering.tick-ms", default_value_t = 1_000)]
    pub tick_ms: u64,

    /// Timeout for channel peer calls in milliseconds.
    #[arg(long = "channel.timeout-ms", default_value_t = 800)]
    pub channel_timeout_ms: u64,

    /// Attempt ceiling for transient settlement failures.
    #[arg(long = "settlement.max-attempts", default_value_t = 5)]
    pub settle_max_attempts: u32,

    /// Credits from one creator that earn a loyalty grant.
    #[arg(long = "loyalty.threshold", default_value_t = 100)]
    pub loyalty_threshold: u64,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            metering: MeteringConfig {
                tick_period: Duration::from_millis(self.tick_ms),
                channel_call_timeout: Duration::from_millis(self.channel_timeout_ms),
            },
            settlement: SettlementConfig {
                max_attempts: self.settle_max_attempts,
                ..Default::default()
            },
            loyalty: LoyaltyConfig {
                threshold: self.loyalty_threshold,
            },
        }
    }
}

/// Arguments for the 'node' command.
#[derive(Debug, clap::Args)]
pub struct NodeArgs {
    /// Engine tuning.
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Settle against the in-process dev executor. Without this (or a
    /// real settlement service wired by the embedding layer), consuming
    /// sessions end up disputed.
    #[arg(long = "dev.settlement", default_value_t = false)]
    pub dev_settlement: bool,
}

/// Arguments for the 'demo' command.
#[derive(Debug, clap::Args)]
pub struct DemoArgs {
    /// Engine tuning.
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Credits to fund the demo listener with.
    #[arg(long, default_value_t = 8)]
    pub credits: u64,

    /// Seconds to stream before requesting stop.
    #[arg(long, default_value_t = 5)]
    pub seconds: u64,
}

/// Parse arguments, initialize tracing, dispatch.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.logs.filter)?;

    match cli.command {
        Commands::Node(args) => run_node(args).await,
        Commands::Demo(args) => run_demo(args).await,
    }
}

fn init_tracing(filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter)?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn dev_engine(
    config: EngineConfig,
    settlement: SettlementClient,
) -> (Engine<MemoryLedger, MemoryCatalog>, Arc<MemoryCatalog>) {
    let ledger = Arc::new(MemoryLedger::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let engine = EngineBuilder::new(ledger, Arc::clone(&catalog))
        .with_settlement(settlement)
        .with_config(config)
        .build();
    (engine, catalog)
}

async fn run_node(args: NodeArgs) -> Result<()> {
    let settlement = if args.dev_settlement {
        SettlementClient::Service(Arc::new(InProcessSettlement::new()))
    } else {
        warn!("no settlement service configured; consuming sessions will dispute");
        SettlementClient::Unconfigured
    };

    let (engine, _catalog) = dev_engine(args.engine.config(), settlement);

    info!("cadence node running; press ctrl-c to drain and exit");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    engine.shutdown().await;
    Ok(())
}

async fn run_demo(args: DemoArgs) -> Result<()> {
    let listener = Address::from([0x11u8; 20]);
    let creator = Address::from([0x22u8; 20]);
    let content = ContentId::from([0x33u8; 32]);

    let settlement = SettlementClient::Service(Arc::new(InProcessSettlement::new()));
    let (engine, catalog) = dev_engine(args.engine.config(), settlement);
    catalog.insert_track(TrackInfo {
        content_id: content,
        creator_id: creator,
        title: "demo track".into(),
        restricted: Vec::new(),
    });

    let balance = engine.deposit(listener, args.credits);
    info!(%listener, balance, "listener funded");

    let (session, mut events) = engine.start(listener, content)?;
    info!(session = %session.session_id, "streaming");

    while let Some(event) = events.recv().await {
        match event {
            MeterEvent::Progress {
                seconds_played,
                credits_remaining,
                ..
            } => {
                info!(seconds_played, credits_remaining, "tick");
                if seconds_played >= args.seconds {
                    break;
                }
            }
            MeterEvent::Exhausted => {
                info!("balance exhausted, auto-closing");
                break;
            }
        }
    }

    match engine.stop(session.session_id, listener).await {
        Ok(receipt) => info!(
            credits = receipt.credits_consumed,
            status = %receipt.status,
            "stopped"
        ),
        // Exhaustion already owns the close; the result poll below sees it.
        Err(e) => info!(reason = %e, "stop not needed"),
    }

    let result = loop {
        let result = engine.settle_result(session.session_id)?;
        if result.status.is_terminal() {
            break result;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    info!(
        status = %result.status,
        credits = result.credits_consumed,
        tx = ?result.settlement_tx,
        "settled"
    );
    if let Some(grant) = result.loyalty_grant {
        info!(name = %grant.name, total = grant.total_at_grant, "loyalty grant");
    }
    for entry in engine.earnings(creator) {
        info!(
            session = %entry.session_id,
            credits = entry.credits_paid,
            seconds = entry.duration_seconds,
            "creator earning"
        );
    }

    engine.shutdown().await;
    Ok(())
}
