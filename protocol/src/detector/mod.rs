//! # MEV Pattern Detector
//!
//! Watches two notification streams and flags sandwich, front-run and
//! arbitrage patterns.
//!
//! ```text
//!   pending stream ──▶ intake task (PendingClassifier) ──┐
//!                                                       ├─▶ bounded mpsc ──▶ aggregator
//!   block stream   ──▶ intake task (BlockClassifier)  ──┘                     │
//!                                                                             ├─ stats (watch)
//!                                                                             ├─ history
//!                                                                             ├─ alerts
//!                                                                             └─ audit sink
//! ```
//!
//! Classification runs concurrently per stream. Aggregation has exactly
//! one writer, so statistics updates are never lost and never contend.
//! Detection is best-effort: a malformed notification is counted and
//! skipped, never raised.

pub mod audit;
pub mod event;
pub mod rules;
pub mod stats;

use std::collections::VecDeque;
use std::sync::Arc;

use ethers_core::types::{Address, Block, Transaction, H256};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alert::{Alert, AlertSink};
use crate::config::DetectorConfig;
use crate::error::ProtectionError;

pub use audit::{AuditSink, JsonlAuditSink};
pub use event::{MevEvent, MevKind};
pub use rules::{
    Anomaly, BlockClassifier, BlockRule, DexSelectors, PendingClassifier, PendingRule,
    PendingVerdict, TxTag,
};
pub use stats::DetectionStatistics;

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

/// Source of chain notifications. Each call opens a fresh subscription.
pub trait ChainFeed: Send + Sync {
    fn pending_transactions(&self) -> BoxStream<'static, Transaction>;
    fn blocks(&self) -> BoxStream<'static, Block<Transaction>>;
}

/// In-process feed backed by broadcast channels. Producers push; every
/// subscription sees everything pushed after it subscribed.
#[derive(Debug, Clone)]
pub struct BroadcastFeed {
    pending: broadcast::Sender<Transaction>,
    blocks: broadcast::Sender<Block<Transaction>>,
}

impl BroadcastFeed {
    pub fn new(capacity: usize) -> Self {
        let (pending, _) = broadcast::channel(capacity.max(1));
        let (blocks, _) = broadcast::channel(capacity.max(1));
        Self { pending, blocks }
    }

    /// Returns how many subscriptions received the transaction.
    pub fn push_pending(&self, tx: Transaction) -> usize {
        self.pending.send(tx).unwrap_or(0)
    }

    pub fn push_block(&self, block: Block<Transaction>) -> usize {
        self.blocks.send(block).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.pending.receiver_count()
    }
}

fn receiver_stream<T: Clone + Send + 'static>(rx: broadcast::Receiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((item, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "detector feed lagged, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

impl ChainFeed for BroadcastFeed {
    fn pending_transactions(&self) -> BoxStream<'static, Transaction> {
        receiver_stream(self.pending.subscribe())
    }

    fn blocks(&self) -> BoxStream<'static, Block<Transaction>> {
        receiver_stream(self.blocks.subscribe())
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Messages from intake tasks to the aggregator.
enum Finding {
    Pending {
        tx_hash: H256,
        from: Address,
        verdict: PendingVerdict,
    },
    Block {
        number: u64,
        events: Vec<MevEvent>,
    },
    Anomaly(Anomaly),
}

struct Monitor {
    stop: watch::Sender<bool>,
    intake: Vec<JoinHandle<()>>,
    aggregator: JoinHandle<()>,
}

pub struct MevDetector {
    config: DetectorConfig,
    alerts: Arc<dyn AlertSink>,
    audit: Option<Arc<dyn AuditSink>>,
    stats: Arc<watch::Sender<DetectionStatistics>>,
    history: Arc<RwLock<VecDeque<MevEvent>>>,
    monitor: Mutex<Option<Monitor>>,
}

impl MevDetector {
    pub fn new(config: DetectorConfig, alerts: Arc<dyn AlertSink>) -> Result<Self, ProtectionError> {
        config.validate()?;
        let (stats, _) = watch::channel(DetectionStatistics::default());
        Ok(Self {
            config,
            alerts,
            audit: None,
            stats: Arc::new(stats),
            history: Arc::new(RwLock::new(VecDeque::new())),
            monitor: Mutex::new(None),
        })
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Subscribe to both streams of `feed`. Returns `false` if already
    /// monitoring.
    pub fn start_monitoring(&self, feed: &dyn ChainFeed) -> bool {
        let mut slot = self.monitor.lock();
        if slot.is_some() {
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let (findings_tx, findings_rx) = mpsc::channel(self.config.channel_capacity);

        let mut pending_classifier = PendingClassifier::from_config(&self.config);
        let pending = spawn_intake(
            feed.pending_transactions(),
            stop_rx.clone(),
            findings_tx.clone(),
            move |tx: Transaction| match pending_classifier.classify(&tx) {
                Ok(verdict) => Finding::Pending {
                    tx_hash: tx.hash,
                    from: tx.from,
                    verdict,
                },
                Err(anomaly) => Finding::Anomaly(anomaly),
            },
        );

        let block_classifier = BlockClassifier::from_config(&self.config);
        let blocks = spawn_intake(
            feed.blocks(),
            stop_rx,
            findings_tx,
            move |block: Block<Transaction>| match block_classifier.classify(&block) {
                Ok((number, events)) => Finding::Block { number, events },
                Err(anomaly) => Finding::Anomaly(anomaly),
            },
        );

        let aggregator = tokio::spawn(aggregate(
            findings_rx,
            Arc::clone(&self.stats),
            Arc::clone(&self.history),
            self.config.history_capacity,
            Arc::clone(&self.alerts),
            self.audit.clone(),
        ));

        *slot = Some(Monitor {
            stop,
            intake: vec![pending, blocks],
            aggregator,
        });
        info!("MEV monitoring started");
        true
    }

    /// Unsubscribe and wait until every task has exited. When this returns
    /// no further finding will be folded in. Idempotent.
    pub async fn stop_monitoring(&self) {
        let monitor = self.monitor.lock().take();
        let Some(Monitor {
            stop,
            intake,
            aggregator,
        }) = monitor
        else {
            return;
        };

        let _ = stop.send(true);
        for handle in intake {
            if let Err(e) = handle.await {
                warn!(error = %e, "detector intake task ended abnormally");
            }
        }
        // All senders are gone now; the aggregator drains and exits.
        if let Err(e) = aggregator.await {
            warn!(error = %e, "detector aggregator ended abnormally");
        }
        info!("MEV monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().is_some()
    }

    /// Latest published statistics. Pure read.
    pub fn get_statistics(&self) -> DetectionStatistics {
        self.stats.borrow().clone()
    }

    /// Watch statistics as they change.
    pub fn subscribe_statistics(&self) -> watch::Receiver<DetectionStatistics> {
        self.stats.subscribe()
    }

    /// Most recent events, newest last, at most `limit`.
    pub fn recent_events(&self, limit: usize) -> Vec<MevEvent> {
        let history = self.history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

fn spawn_intake<T, F>(
    mut stream: BoxStream<'static, T>,
    mut stop: watch::Receiver<bool>,
    findings: mpsc::Sender<Finding>,
    mut classify: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: FnMut(T) -> Finding + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                item = stream.next() => match item {
                    Some(item) => {
                        if findings.send(classify(item)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    })
}

async fn aggregate(
    mut findings: mpsc::Receiver<Finding>,
    stats_tx: Arc<watch::Sender<DetectionStatistics>>,
    history: Arc<RwLock<VecDeque<MevEvent>>>,
    history_capacity: usize,
    alerts: Arc<dyn AlertSink>,
    audit: Option<Arc<dyn AuditSink>>,
) {
    let mut stats = stats_tx.borrow().clone();

    while let Some(finding) = findings.recv().await {
        let events = match finding {
            Finding::Pending {
                tx_hash,
                from,
                verdict,
            } => {
                stats.pending_observed += 1;
                if verdict.is_suspicious() {
                    stats.suspicious_transactions += 1;
                    alerts.publish(Alert::SuspiciousTransaction {
                        tx_hash,
                        from,
                        tags: verdict.tags.clone(),
                    });
                }
                verdict.events
            }
            Finding::Block { number, events } => {
                stats.blocks_observed += 1;
                debug!(block = number, events = events.len(), "block classified");
                events
            }
            Finding::Anomaly(anomaly) => {
                stats.anomalies_skipped += 1;
                debug!(?anomaly, "skipped malformed notification");
                Vec::new()
            }
        };

        for event in events {
            stats.record_event(&event);
            if let Some(sink) = &audit {
                if let Err(e) = sink.record(&event) {
                    warn!(error = %e, "failed to write MEV audit record");
                }
            }
            {
                let mut history = history.write();
                history.push_back(event.clone());
                while history.len() > history_capacity {
                    history.pop_front();
                }
            }
            alerts.publish(Alert::MevDetected(event));
        }

        stats_tx.send_replace(stats.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemoryAlertSink;
    use crate::config::gwei;
    use ethers_core::types::{Bytes, U64};
    use std::time::Duration;

    fn dex_tx(n: u8, from: u8, tail: u8, gas_gwei: u64) -> Transaction {
        Transaction {
            hash: H256::repeat_byte(n),
            from: Address::repeat_byte(from),
            to: Some(Address::repeat_byte(0x77)),
            input: Bytes::from(vec![0x7f, 0xf3, 0x6a, 0xb5, tail]),
            gas_price: Some(gwei(gas_gwei)),
            ..Default::default()
        }
    }

    async fn wait_for_stats(
        detector: &MevDetector,
        pred: impl FnMut(&DetectionStatistics) -> bool,
    ) -> DetectionStatistics {
        let mut rx = detector.subscribe_statistics();
        let stats = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("statistics never reached expected state")
            .unwrap()
            .clone();
        stats
    }

    fn detector() -> (MevDetector, Arc<MemoryAlertSink>) {
        let alerts = Arc::new(MemoryAlertSink::new());
        (MevDetector::new(DetectorConfig::default(), alerts.clone()).unwrap(), alerts)
    }

    #[tokio::test]
    async fn pending_and_block_paths_aggregate() {
        let (detector, alerts) = detector();
        let feed = BroadcastFeed::new(64);
        assert!(detector.start_monitoring(&feed));

        feed.push_pending(dex_tx(1, 0x01, 0, 31));
        feed.push_pending(dex_tx(2, 0x02, 0, 21));
        feed.push_block(Block {
            number: Some(U64::from(10)),
            transactions: vec![dex_tx(3, 0x05, 1, 10), dex_tx(4, 0x05, 2, 10)],
            ..Default::default()
        });

        let stats = wait_for_stats(&detector, |s| s.pending_observed == 2 && s.blocks_observed == 1).await;
        assert_eq!(stats.front_running, 1);
        assert_eq!(stats.sandwich_attacks, 1);
        assert_eq!(stats.suspicious_transactions, 1);
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.total_value_extracted, gwei(50_000_000));

        assert_eq!(detector.recent_events(10).len(), 2);
        let mev_alerts = alerts
            .alerts()
            .into_iter()
            .filter(|a| matches!(a, Alert::MevDetected(_)))
            .count();
        assert_eq!(mev_alerts, 2);

        detector.stop_monitoring().await;
    }

    #[tokio::test]
    async fn anomalies_are_counted_not_raised() {
        let (detector, _) = detector();
        let feed = BroadcastFeed::new(16);
        detector.start_monitoring(&feed);

        let mut no_gas = dex_tx(1, 0x01, 0, 50);
        no_gas.gas_price = None;
        feed.push_pending(no_gas);
        feed.push_block(Block::default());
        feed.push_pending(dex_tx(2, 0x01, 0, 50));

        let stats = wait_for_stats(&detector, |s| s.anomalies_skipped == 2 && s.pending_observed == 1).await;
        assert_eq!(stats.front_running, 1, "monitoring kept going");
        detector.stop_monitoring().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_quiescent() {
        let (detector, alerts) = detector();
        let feed = BroadcastFeed::new(16);
        detector.start_monitoring(&feed);
        assert!(!detector.start_monitoring(&feed), "already monitoring");

        detector.stop_monitoring().await;
        detector.stop_monitoring().await;
        assert!(!detector.is_monitoring());
        assert_eq!(feed.subscriber_count(), 0, "subscriptions dropped");

        let before = alerts.len();
        assert_eq!(feed.push_pending(dex_tx(1, 0x01, 0, 100)), 0);
        tokio::task::yield_now().await;
        assert_eq!(alerts.len(), before);
        assert_eq!(detector.get_statistics().pending_observed, 0);
    }

    #[tokio::test]
    async fn statistics_survive_restart() {
        let (detector, _) = detector();
        let feed = BroadcastFeed::new(16);

        detector.start_monitoring(&feed);
        feed.push_pending(dex_tx(1, 0x01, 0, 40));
        wait_for_stats(&detector, |s| s.front_running == 1).await;
        detector.stop_monitoring().await;

        detector.start_monitoring(&feed);
        feed.push_pending(dex_tx(2, 0x03, 0, 40));
        let stats = wait_for_stats(&detector, |s| s.pending_observed == 2).await;
        assert_eq!(stats.front_running, 2);
        detector.stop_monitoring().await;
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let config = DetectorConfig {
            history_capacity: 2,
            copycat_window: 0,
            ..DetectorConfig::default()
        };
        let detector = MevDetector::new(config, Arc::new(MemoryAlertSink::new())).unwrap();
        let feed = BroadcastFeed::new(16);
        detector.start_monitoring(&feed);

        for n in 1..=3 {
            feed.push_pending(dex_tx(n, n, 0, 100));
        }
        wait_for_stats(&detector, |s| s.front_running == 3).await;

        let events = detector.recent_events(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].transaction_refs, vec![H256::repeat_byte(3)]);
        assert_eq!(detector.recent_events(1).len(), 1);
        detector.stop_monitoring().await;
    }

    #[tokio::test]
    async fn events_reach_audit_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = Arc::new(JsonlAuditSink::open(&path).unwrap());
        let (detector, _) = detector();
        let detector = detector.with_audit_sink(sink);
        let feed = BroadcastFeed::new(16);
        detector.start_monitoring(&feed);

        feed.push_pending(dex_tx(1, 0x01, 0, 100));
        wait_for_stats(&detector, |s| s.total_events == 1).await;
        detector.stop_monitoring().await;

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = DetectorConfig {
            channel_capacity: 0,
            ..DetectorConfig::default()
        };
        assert!(MevDetector::new(config, Arc::new(MemoryAlertSink::new())).is_err());
    }
}
