//! Subscriber setup for `zkmev-node`.
//!
//! Logs go to stderr; stdout carries the `setup` key fingerprints and the
//! `demo` walkthrough. Commitment hashes and MEV findings are logged as
//! fields, so `json` output can be filtered on `commitment` or `kind`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Directives used when `RUST_LOG` is unset. The scheduler and detector log
/// per tick and per block at `debug`.
pub const DEFAULT_FILTER: &str =
    "zkmev_node=info,zkmev_protocol=info,zkmev_contracts=info,tower_http=info";

/// `--log-format` / `ZKMEV_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Colored, with source locations.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// `RUST_LOG` if it parses, `default_filter` otherwise.
fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

fn output_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = fmt::layer().with_writer(std::io::stderr).with_target(true);
    match format {
        LogFormat::Pretty => base.with_file(true).with_line_number(true).boxed(),
        LogFormat::Json => base.json().with_current_span(false).boxed(),
    }
}

/// Install the global subscriber. Only the first call in a process wins.
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let installed = tracing_subscriber::registry()
        .with(output_layer(format))
        .with(filter(default_filter))
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(?format, "logging initialized");
    }
}
