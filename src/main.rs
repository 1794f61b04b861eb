//! Chain orchestrator CLI.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──┐
//!   environment ──┴─▶ ConnectionManager ──▶ Connection ──▶ ContractBinding
//!                                                               │
//!                              ┌────────────────────────────────┤
//!                              ▼                                ▼
//!                       EventSubscriber                   RetryExecutor
//!                     (blocks + events)                 (reads + writes)
//!                              │
//!                              ▼
//!                       handlers (logged)
//!
//!   ConnectionSupervisor (optional) rebuilds the session on transport loss
//! ```

use alloy::dyn_abi::DynSolValue;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chain_orchestrator::chain::ConnectionManager;
use chain_orchestrator::config::{load_config, EnvSnapshot, OrchestratorConfig};
use chain_orchestrator::events::{EventKind, HandlerError, SubscriptionRegistry};
use chain_orchestrator::lifecycle::signals::wait_for_signal;
use chain_orchestrator::observability::{logging, metrics};
use chain_orchestrator::ChainService;

#[derive(Parser)]
#[command(name = "chain-orchestrator")]
#[command(about = "Blockchain connection and event orchestrator", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network to use, overriding the config file
    #[arg(short, long)]
    network: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to blocks and contract events until interrupted
    Run,
    /// Print the current block height
    BlockNumber,
    /// Perform a read-only contract call
    Call {
        /// Function name
        function: String,
        /// Arguments, coerced to the function's parameter types
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => OrchestratorConfig::default(),
    };
    if let Some(network) = cli.network {
        config.network = network;
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        network = %config.network,
        "chain-orchestrator starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let command = cli.command.unwrap_or(Commands::Run);
    let manager = ConnectionManager::new(config.connection.clone());
    let env = EnvSnapshot::from_process();
    let service = match command {
        Commands::Run => {
            ChainService::initialize_with_subscriptions(config, &env, manager, subscribe_all).await?
        }
        _ => ChainService::initialize_with(config, &env, manager).await?,
    };

    let result = match command {
        Commands::Run => {
            wait_for_signal().await;
            Ok(())
        }
        Commands::BlockNumber => service.block_number().await.map(|height| {
            println!("{}", height);
        }),
        Commands::Call { function, args } => call(&service, &function, &args).await,
    };

    service.shutdown().await;
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Log every block and every marketplace event the interface declares.
fn subscribe_all(registry: &SubscriptionRegistry) -> chain_orchestrator::ServiceResult<()> {
    registry.subscribe_blocks(|height| async move {
        tracing::info!(block = height, "New block");
        Ok::<(), HandlerError>(())
    });

    for kind in EventKind::ALL {
        if !registry.interface().declares_event(kind.name(), kind.signature_hash()) {
            continue;
        }
        registry.subscribe_event(kind, |event| async move {
            let record = serde_json::to_string(&event)?;
            tracing::info!(event = event.kind().name(), %record, "Marketplace event");
            Ok::<(), HandlerError>(())
        })?;
    }
    Ok(())
}

async fn call(
    service: &ChainService,
    function: &str,
    args: &[String],
) -> chain_orchestrator::ServiceResult<()> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let call = service.contract().function_with_strings(function, &args)?;

    let outputs = service
        .executor()
        .execute(|| {
            let call = call.clone();
            async move { call.call().await }
        })
        .await?;

    for value in &outputs {
        println!("{}", render(value));
    }
    Ok(())
}

fn render(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(a) => a.to_checksum(None),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Tuple(items) | DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let inner: Vec<String> = items.iter().map(render).collect();
            format!("({})", inner.join(", "))
        }
        other => format!("{:?}", other),
    }
}
