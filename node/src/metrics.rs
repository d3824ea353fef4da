//! # Prometheus Metrics
//!
//! Exposes operational metrics for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `zkmev` prefix. Alert-driven counters are fed by implementing
//! [`AlertSink`], so the node plugs its metrics in next to the log sink.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use zkmev_protocol::alert::{Alert, AlertSink};

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc` internally) so it can be
/// shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Commitments accepted by the ledger.
    pub commitments_submitted_total: IntCounter,
    /// Reveals confirmed by the ledger.
    pub reveals_total: IntCounter,
    /// Reveals that failed fatally.
    pub reveal_failures_total: IntCounter,
    /// Commitments whose window closed before reveal.
    pub commitments_expired_total: IntCounter,
    /// MEV events by kind.
    pub mev_events_total: IntCounterVec,
    /// Pending transactions flagged suspicious.
    pub suspicious_transactions_total: IntCounter,
    /// Latest devnet block.
    pub block_height: IntGauge,
    /// Commitments currently held by the store.
    pub tracked_commitments: IntGauge,
    /// Time spent proving, per protect request.
    pub proof_generation_seconds: Histogram,
}

fn register<C: prometheus::core::Collector + Clone + 'static>(
    registry: &Registry,
    collector: C,
) -> prometheus::Result<C> {
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("zkmev".into()), None)?;

        let commitments_submitted_total = register(
            &registry,
            IntCounter::new(
                "commitments_submitted_total",
                "Commitments accepted by the ledger",
            )?,
        )?;
        let reveals_total = register(
            &registry,
            IntCounter::new("reveals_total", "Reveals confirmed by the ledger")?,
        )?;
        let reveal_failures_total = register(
            &registry,
            IntCounter::new("reveal_failures_total", "Reveals that failed fatally")?,
        )?;
        let commitments_expired_total = register(
            &registry,
            IntCounter::new(
                "commitments_expired_total",
                "Commitments whose reveal window closed",
            )?,
        )?;
        let mev_events_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("mev_events_total", "Detected MEV events by kind"),
                &["kind"],
            )?,
        )?;
        let suspicious_transactions_total = register(
            &registry,
            IntCounter::new(
                "suspicious_transactions_total",
                "Pending transactions flagged suspicious",
            )?,
        )?;
        let block_height = register(
            &registry,
            IntGauge::new("block_height", "Latest block of the devnet ledger")?,
        )?;
        let tracked_commitments = register(
            &registry,
            IntGauge::new("tracked_commitments", "Commitments held by the store")?,
        )?;
        let proof_generation_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new(
                    "proof_generation_seconds",
                    "Proof generation latency in seconds",
                )
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            )?,
        )?;

        Ok(Self {
            registry,
            commitments_submitted_total,
            reveals_total,
            reveal_failures_total,
            commitments_expired_total,
            mev_events_total,
            suspicious_transactions_total,
            block_height,
            tracked_commitments,
            proof_generation_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl AlertSink for NodeMetrics {
    fn publish(&self, alert: Alert) {
        match alert {
            Alert::MevDetected(event) => {
                self.mev_events_total
                    .with_label_values(&[&event.kind.to_string()])
                    .inc();
            }
            Alert::SuspiciousTransaction { .. } => self.suspicious_transactions_total.inc(),
            Alert::CommitmentRevealed { .. } => self.reveals_total.inc(),
            Alert::RevealFailed { .. } => self.reveal_failures_total.inc(),
            Alert::CommitmentExpired { .. } => self.commitments_expired_total.inc(),
        }
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
