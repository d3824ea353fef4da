//! Alerting sink shared by the reveal scheduler and the MEV detector.
//!
//! Scheduler-time failures have nobody waiting on a `Result`, so they end up
//! here. So does every MEV finding. Sinks must not block: they are called
//! from the scheduler tick and the detector aggregation loop.

use std::sync::Arc;

use ethers_core::types::{Address, H256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::detector::{MevEvent, TxTag};
use crate::encoding::FieldElement;

/// Something worth telling an operator about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    MevDetected(MevEvent),
    SuspiciousTransaction {
        tx_hash: H256,
        from: Address,
        tags: Vec<TxTag>,
    },
    CommitmentRevealed {
        hash: FieldElement,
        tx_hash: H256,
        height: u64,
    },
    RevealFailed {
        hash: FieldElement,
        reason: String,
        attempts: u32,
    },
    CommitmentExpired {
        hash: FieldElement,
        submitted_at: u64,
        height: u64,
    },
}

/// Destination for alerts.
pub trait AlertSink: Send + Sync {
    fn publish(&self, alert: Alert);
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Logs every alert through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn publish(&self, alert: Alert) {
        match alert {
            Alert::MevDetected(event) => warn!(
                kind = %event.kind,
                attacker = ?event.attacker,
                victim = ?event.victim,
                block = ?event.block_number,
                profit_wei = %event.estimated_profit,
                "MEV detected"
            ),
            Alert::SuspiciousTransaction { tx_hash, from, tags } => {
                warn!(tx = ?tx_hash, from = ?from, tags = ?tags, "suspicious pending transaction")
            }
            Alert::CommitmentRevealed {
                hash,
                tx_hash,
                height,
            } => info!(commitment = %hash, tx = ?tx_hash, height, "commitment revealed"),
            Alert::RevealFailed {
                hash,
                reason,
                attempts,
            } => warn!(commitment = %hash, attempts, %reason, "reveal failed permanently"),
            Alert::CommitmentExpired {
                hash,
                submitted_at,
                height,
            } => warn!(commitment = %hash, submitted_at, height, "commitment expired"),
        }
    }
}

/// Fans alerts out to any number of async subscribers.
///
/// Publishing never blocks; a slow subscriber lags and loses the oldest
/// alerts.
#[derive(Debug, Clone)]
pub struct BroadcastAlertSink {
    tx: broadcast::Sender<Alert>,
}

impl BroadcastAlertSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }
}

impl AlertSink for BroadcastAlertSink {
    fn publish(&self, alert: Alert) {
        // No subscribers is fine.
        let _ = self.tx.send(alert);
    }
}

/// Keeps every alert in memory. Handy for tests and the demo.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

impl AlertSink for MemoryAlertSink {
    fn publish(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}

/// Publishes to several sinks in order.
#[derive(Default, Clone)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AlertSink for MultiSink {
    fn publish(&self, alert: Alert) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(alert.clone());
            }
            last.publish(alert);
        }
    }
}
