// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZK-MEV Protection Node
//!
//! Entry point for the `zkmev-node` binary. Parses CLI arguments, initializes
//! logging and metrics, wires the protection service and MEV monitor to a
//! devnet protector contract, and serves the HTTP API.
//!
//! The binary supports four subcommands:
//!
//! - `setup`   — run the circuit setup and write the key files
//! - `run`     — start the node
//! - `demo`    — in-process walkthrough of protect, reveal and detection
//! - `version` — print build version information

mod api;
mod cli;
mod config;
mod demo;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use zkmev_contracts::{LocalLedger, MevProtector};
use zkmev_protocol::alert::{Alert, AlertSink, BroadcastAlertSink, MultiSink, TracingAlertSink};
use zkmev_protocol::detector::{BroadcastFeed, JsonlAuditSink, MevDetector};
use zkmev_protocol::ledger::Ledger;
use zkmev_protocol::protection::ProtectionService;
use zkmev_protocol::zkp::{Groth16Backend, Groth16Verifier};

use cli::{Commands, ZkMevNodeCli};
use config::NodeConfig;
use metrics::NodeMetrics;

/// Buffer for pending transactions and blocks pushed through `/ingest`.
const FEED_CHANNEL_CAPACITY: usize = 1024;

const PROVING_KEY_FILE: &str = "proving.key";
const VERIFYING_KEY_FILE: &str = "verifying.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ZkMevNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);

    match cli.command {
        Commands::Setup(args) => setup_keys(args).await,
        Commands::Run(args) => run_node(args).await,
        Commands::Demo(args) => demo::run(args.seed).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs the circuit setup and writes both key files into `args.out_dir`.
async fn setup_keys(args: cli::SetupArgs) -> Result<()> {
    let pk_path = args.out_dir.join(PROVING_KEY_FILE);
    let vk_path = args.out_dir.join(VERIFYING_KEY_FILE);
    if !args.force && (pk_path.exists() || vk_path.exists()) {
        bail!(
            "key files already exist in {} (pass --force to overwrite)",
            args.out_dir.display()
        );
    }
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create key directory: {}", args.out_dir.display()))?;

    tracing::info!(out_dir = %args.out_dir.display(), "running circuit setup");
    let backend = tokio::task::spawn_blocking(|| Groth16Backend::setup(&mut rand::rngs::OsRng))
        .await
        .context("setup task panicked")??;
    backend.write_keys(&pk_path, &vk_path)?;

    let fingerprint = verifier_fingerprint(&backend.verifier())?;
    tracing::info!(
        proving_key = %pk_path.display(),
        verifying_key = %vk_path.display(),
        %fingerprint,
        "keys written"
    );

    println!("Circuit setup complete.");
    println!("  Proving key    : {}", pk_path.display());
    println!("  Verifying key  : {}", vk_path.display());
    println!("  VK fingerprint : {}", fingerprint);
    Ok(())
}

/// keccak256 over the serialized verifying key, hex encoded.
fn verifier_fingerprint(verifier: &Groth16Verifier) -> Result<String> {
    let bytes = verifier.to_bytes()?;
    Ok(hex::encode(ethers_core::utils::keccak256(bytes)))
}

/// Loads configured keys, or runs a throwaway setup when none are configured.
async fn load_backend(config: &NodeConfig) -> Result<Arc<Groth16Backend>> {
    let backend = match (&config.keys.proving_key, &config.keys.verifying_key) {
        (Some(pk), Some(vk)) => {
            let (pk, vk) = (pk.clone(), vk.clone());
            tokio::task::spawn_blocking(move || Groth16Backend::load(&pk, &vk))
                .await
                .context("key loading task panicked")??
        }
        _ => {
            tracing::warn!("no [keys] configured, running an ephemeral circuit setup");
            tokio::task::spawn_blocking(|| Groth16Backend::setup(&mut rand::rngs::OsRng))
                .await
                .context("setup task panicked")??
        }
    };
    Ok(Arc::new(backend))
}

fn load_config(args: &cli::RunArgs) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(port) = args.api_port {
        config.api.port = port;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.port = port;
    }
    if args.no_auto_reveal {
        config.auto_reveal = false;
    }
    config.validate()?;
    Ok(config)
}

/// Starts the full node: devnet contract, protection service, MEV monitor,
/// API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    tracing::info!(
        network = %config.network,
        api_port = config.api.port,
        metrics_port = config.metrics.port,
        auto_reveal = config.auto_reveal,
        "starting zkmev-node"
    );

    // --- Proving system ---
    let backend = load_backend(&config).await?;
    tracing::info!(fingerprint = %verifier_fingerprint(&backend.verifier())?, "proving system ready");

    // --- Devnet ledger ---
    let contract = Arc::new(RwLock::new(
        MevProtector::new(config.devnet.owner, Arc::new(backend.verifier())).with_delays(
            config.protection.min_delay_blocks,
            config.protection.max_delay_blocks,
        ),
    ));
    let ledger: Arc<dyn Ledger> = Arc::new(LocalLedger::new(contract.clone(), config.devnet.account));

    // --- Metrics and alerts ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let broadcast_alerts = Arc::new(BroadcastAlertSink::new(config.audit.alert_channel_capacity));
    let alerts: Arc<dyn AlertSink> = Arc::new(
        MultiSink::new()
            .with(Arc::new(TracingAlertSink))
            .with(node_metrics.clone())
            .with(broadcast_alerts.clone()),
    );

    // --- Protection service ---
    let service = Arc::new(ProtectionService::new(
        backend,
        ledger.clone(),
        alerts.clone(),
        config.protection.clone(),
    )?);
    if config.auto_reveal {
        service.start_auto_reveal();
    }

    // --- MEV monitor ---
    let mut detector = MevDetector::new(config.detector.clone(), alerts)?;
    if let Some(path) = &config.audit.path {
        let sink = JsonlAuditSink::open(path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;
        tracing::info!(path = %path.display(), "MEV audit log enabled");
        detector = detector.with_audit_sink(Arc::new(sink));
    }
    let detector = Arc::new(detector);
    let feed = Arc::new(BroadcastFeed::new(FEED_CHANNEL_CAPACITY));
    detector.start_monitoring(feed.as_ref());

    // --- Background tasks ---
    let block_clock = tokio::spawn(run_block_clock(
        contract.clone(),
        service.clone(),
        node_metrics.clone(),
        config.devnet.block_time_ms,
    ));
    let reporter = tokio::spawn(report_confirmed_mev(
        broadcast_alerts.subscribe(),
        contract,
        config.devnet.account,
    ));

    // --- API server ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: config.network.clone(),
        service: service.clone(),
        ledger,
        detector: detector.clone(),
        feed,
        metrics: node_metrics.clone(),
    };
    let api_router = api::create_router(app_state);
    let api_addr = config.api_addr()?;
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(node_metrics);
    let metrics_addr = config.metrics_addr()?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, stopping");
        }
    }

    block_clock.abort();
    service.shutdown().await;
    detector.stop_monitoring().await;
    reporter.abort();
    tracing::info!("zkmev-node stopped");
    Ok(())
}

/// Mines one devnet block every `block_time_ms` and refreshes the gauges.
async fn run_block_clock(
    contract: Arc<RwLock<MevProtector>>,
    service: Arc<ProtectionService>,
    metrics: metrics::SharedMetrics,
    block_time_ms: u64,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(block_time_ms));
    interval.tick().await;
    loop {
        interval.tick().await;
        let height = contract.write().mine(1);
        metrics.block_height.set(height as i64);
        metrics.tracked_commitments.set(service.store().len() as i64);
        tracing::debug!(height, "block mined");
    }
}

/// Files every block-level MEV event with the contract's on-ledger record.
async fn report_confirmed_mev(
    mut alerts: broadcast::Receiver<Alert>,
    contract: Arc<RwLock<MevProtector>>,
    reporter: ethers_core::types::Address,
) {
    loop {
        match alerts.recv().await {
            Ok(Alert::MevDetected(event)) => {
                let Some(block_number) = event.block_number else {
                    continue;
                };
                let receipt = contract.write().report_mev(
                    reporter,
                    block_number,
                    event.attacker,
                    event.estimated_profit,
                );
                tracing::debug!(
                    kind = %event.kind,
                    block = block_number,
                    tx = ?receipt.tx_hash,
                    "MEV reported to contract"
                );
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "MEV reporter lagged behind alerts");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("zkmev-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_defaults() {
        let args = cli::RunArgs {
            config: None,
            api_port: Some(18_000),
            metrics_port: None,
            no_auto_reveal: true,
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.api.port, 18_000);
        assert_eq!(config.metrics.port, config::DEFAULT_METRICS_PORT);
        assert!(!config.auto_reveal);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = cli::RunArgs {
            config: Some("/nonexistent/zkmev.toml".into()),
            api_port: None,
            metrics_port: None,
            no_auto_reveal: false,
        };
        assert!(load_config(&args).is_err());
    }
}
