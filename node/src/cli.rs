//! # CLI Interface
//!
//! Defines the command-line argument structure for `zkmev-node` using
//! `clap` derive. Four subcommands: `setup`, `run`, `demo` and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// ZK-MEV protection node.
///
/// Runs a devnet protector contract, the commit-reveal protection service
/// and the MEV monitor, and serves the HTTP API and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "zkmev-node",
    about = "ZK-MEV commit-reveal protection node",
    version,
    propagate_version = true
)]
pub struct ZkMevNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "ZKMEV_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the circuit setup and write the proving and verifying keys.
    Setup(SetupArgs),
    /// Start the node.
    Run(RunArgs),
    /// Walk through protect, reveal and detection against an in-process
    /// devnet, then exit.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `setup` subcommand.
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Directory the key files are written into. Created if missing.
    #[arg(long, short = 'o', env = "ZKMEV_KEYS_DIR", default_value = "keys")]
    pub out_dir: PathBuf,

    /// Overwrite existing key files.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML). Defaults apply when
    /// omitted.
    #[arg(long, short = 'c', env = "ZKMEV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the REST API. Overrides the config file.
    #[arg(long, env = "ZKMEV_API_PORT")]
    pub api_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint. Overrides the config file.
    #[arg(long, env = "ZKMEV_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Do not start the automatic reveal loop.
    #[arg(long)]
    pub no_auto_reveal: bool,
}

/// Arguments for the `demo` subcommand.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Seed for the throwaway circuit setup.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
