//! The caller-facing facade over orchestrator, store, scheduler and ledger.

use std::sync::Arc;

use ethers_core::types::Address;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::orchestrator::ProofOrchestrator;
use super::scheduler::RevealScheduler;
use super::store::CommitmentStore;
use super::{CommitmentStatus, ProtectionReceipt, ProtectionRequest, SwapParams};
use crate::alert::AlertSink;
use crate::config::ProtectionConfig;
use crate::encoding::FieldElement;
use crate::error::ProtectionError;
use crate::ledger::{Ledger, LedgerError, TxReceipt};
use crate::zkp::ProvingSystem;

/// Per-owner view for wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionStatus {
    pub owner: Address,
    /// Whether the owner has anything still waiting for or inside its window.
    pub active: bool,
    pub total_tracked: usize,
    pub pending: usize,
    pub ready_for_reveal: usize,
    pub expired: usize,
    pub failed: usize,
    pub current_height: u64,
    pub auto_reveal: bool,
}

struct AutoReveal {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ProtectionService {
    orchestrator: ProofOrchestrator,
    store: Arc<CommitmentStore>,
    scheduler: Arc<RevealScheduler>,
    ledger: Arc<dyn Ledger>,
    config: ProtectionConfig,
    closing: watch::Sender<bool>,
    auto_reveal: Mutex<Option<AutoReveal>>,
}

impl ProtectionService {
    pub fn new(
        prover: Arc<dyn ProvingSystem>,
        ledger: Arc<dyn Ledger>,
        alerts: Arc<dyn AlertSink>,
        config: ProtectionConfig,
    ) -> Result<Self, ProtectionError> {
        config.validate()?;
        let store = Arc::new(CommitmentStore::new());
        let scheduler = Arc::new(RevealScheduler::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            alerts,
            config.clone(),
        ));
        let (closing, _) = watch::channel(false);

        Ok(Self {
            orchestrator: ProofOrchestrator::new(prover, config.self_verify),
            store,
            scheduler,
            ledger,
            config,
            closing,
            auto_reveal: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<CommitmentStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<RevealScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Protect
    // -----------------------------------------------------------------------

    /// Protect a swap with a freshly drawn nonce.
    pub async fn protect(
        &self,
        swap: SwapParams,
        owner: Address,
    ) -> Result<ProtectionReceipt, ProtectionError> {
        self.protect_request(ProtectionRequest::new(swap, owner)).await
    }

    /// Prove, pay, submit and start tracking.
    ///
    /// Abandoned if `shutdown` is called while the proof is still being
    /// generated; nothing is recorded in that case.
    pub async fn protect_request(
        &self,
        request: ProtectionRequest,
    ) -> Result<ProtectionReceipt, ProtectionError> {
        let mut closing = self.closing.subscribe();
        if *closing.borrow() {
            return Err(ProtectionError::ShuttingDown);
        }

        // Encoding errors first: no ledger round-trip for a request that can
        // never be proved.
        ProofOrchestrator::circuit_inputs(&request, 0)?;

        let fee = self.ledger.protection_fee().await?;
        let height = self.ledger.current_height().await?;

        let proof = tokio::select! {
            proof = self.orchestrator.build_protection_proof(&request, height) => proof?,
            _ = closing.wait_for(|closing| *closing) => return Err(ProtectionError::Cancelled),
        };
        let hash = proof.commitment_hash;

        // Don't pay for a hash the store would refuse anyway.
        if self.store.contains(&hash) || self.store.is_revealed(&hash) {
            return Err(ProtectionError::DuplicateCommitment(hash));
        }
        if *self.closing.borrow() {
            return Err(ProtectionError::Cancelled);
        }

        let receipt: TxReceipt = self.ledger.submit(hash, fee).await.map_err(|e| match e {
            LedgerError::AlreadyKnown => ProtectionError::DuplicateCommitment(hash),
            other => other.into(),
        })?;
        if !receipt.success {
            return Err(ProtectionError::LedgerRejected {
                reason: format!("commitment transaction {:?} reverted", receipt.tx_hash),
                retryable: false,
            });
        }

        self.store.record(
            hash,
            request.owner,
            receipt.block_number,
            proof.proof,
            proof.public_signals,
        )?;

        let estimated_reveal_height = receipt.block_number + self.config.min_delay_blocks;
        info!(
            commitment = %hash,
            owner = ?request.owner,
            submitted_at = receipt.block_number,
            reveal_at = estimated_reveal_height,
            fee_wei = %fee,
            "swap protected"
        );

        Ok(ProtectionReceipt {
            commitment_hash: hash,
            transaction_hash: receipt.tx_hash,
            estimated_reveal_height,
        })
    }

    // -----------------------------------------------------------------------
    // Reveal
    // -----------------------------------------------------------------------

    pub async fn reveal_status(&self, hash: FieldElement) -> Result<CommitmentStatus, ProtectionError> {
        let height = self.ledger.current_height().await?;
        self.store.status_of(
            &hash,
            height,
            self.config.min_delay_blocks,
            self.config.max_delay_blocks,
        )
    }

    /// Manual reveal. Goes through the scheduler's claim guard, so it can
    /// never race an automatic reveal of the same commitment.
    pub async fn reveal(&self, hash: FieldElement) -> Result<TxReceipt, ProtectionError> {
        let height = self.ledger.current_height().await?;
        self.scheduler.reveal_now(hash, height).await
    }

    /// Start the background reveal loop. Returns `false` if it was already
    /// running.
    pub fn start_auto_reveal(&self) -> bool {
        let mut slot = self.auto_reveal.lock();
        if let Some(running) = slot.as_ref() {
            if !running.handle.is_finished() {
                return false;
            }
        }

        let (stop, rx) = watch::channel(false);
        let scheduler = Arc::clone(&self.scheduler);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        *slot = Some(AutoReveal { stop, handle });
        info!("auto-reveal started");
        true
    }

    /// Stop the background reveal loop and wait for it to exit. Idempotent.
    pub async fn stop_auto_reveal(&self) {
        let running = self.auto_reveal.lock().take();
        if let Some(AutoReveal { stop, handle }) = running {
            let _ = stop.send(true);
            if let Err(e) = handle.await {
                warn!(error = %e, "auto-reveal task ended abnormally");
            }
            info!("auto-reveal stopped");
        }
    }

    pub fn is_auto_revealing(&self) -> bool {
        self.auto_reveal
            .lock()
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Status / housekeeping
    // -----------------------------------------------------------------------

    pub async fn protection_status(&self, owner: Address) -> Result<ProtectionStatus, ProtectionError> {
        let height = self.ledger.current_height().await?;
        let summary = self.store.owner_summary(
            owner,
            height,
            self.config.min_delay_blocks,
            self.config.max_delay_blocks,
        );
        Ok(ProtectionStatus {
            owner,
            active: summary.pending + summary.ready_for_reveal > 0,
            total_tracked: summary.total_tracked,
            pending: summary.pending,
            ready_for_reveal: summary.ready_for_reveal,
            expired: summary.expired,
            failed: summary.failed,
            current_height: height,
            auto_reveal: self.is_auto_revealing(),
        })
    }

    /// Drop expired records, and reveal tombstones older than one window.
    /// Returns the purged commitment hashes.
    pub async fn purge_expired(&self) -> Result<Vec<FieldElement>, ProtectionError> {
        let height = self.ledger.current_height().await?;
        let max_delay = self.config.max_delay_blocks;
        let tombstones = self.store.purge_tombstones(height, max_delay);
        if tombstones > 0 {
            debug!(height, tombstones, "reveal tombstones dropped");
        }
        Ok(self.store.purge_expired(height, max_delay))
    }

    /// Refuse new requests, abandon in-flight proofs, stop auto-reveal.
    pub async fn shutdown(&self) {
        self.closing.send_replace(true);
        self.stop_auto_reveal().await;
    }
}
