//! # Reveal Scheduler
//!
//! Polls block height and reveals every commitment whose window is open.
//!
//! The central guarantee: **at most one reveal submission per commitment is
//! outstanding at any time**. A tick claims each ready hash synchronously
//! ([`CommitmentStore::try_claim`]) before it awaits anything, so a second
//! tick running concurrently finds the hash in flight and skips it.
//!
//! Outcome handling:
//!
//! | ledger answer          | store transition | alert              |
//! |------------------------|------------------|--------------------|
//! | success                | `remove`         | `CommitmentRevealed` |
//! | retryable rejection    | `release`        | none (next tick)   |
//! | fatal rejection        | `mark_failed`    | `RevealFailed`     |
//! | window closed          | none (inert)     | `CommitmentExpired`, once |

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::{Claim, CommitmentStore};
use super::CommitmentStatus;
use crate::alert::{Alert, AlertSink};
use crate::config::ProtectionConfig;
use crate::encoding::FieldElement;
use crate::error::ProtectionError;
use crate::ledger::{Ledger, LedgerError, TxReceipt};
use crate::zkp::format_proof_for_verifier;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub height: u64,
    /// Reveal transactions actually sent to the ledger.
    pub submitted: usize,
    pub revealed: Vec<FieldElement>,
    /// Released after a retryable rejection.
    pub retried: Vec<FieldElement>,
    pub failed: Vec<FieldElement>,
    /// Newly expired this tick (each hash appears in one report only).
    pub expired: Vec<FieldElement>,
    /// Ready but already claimed by an outstanding submission.
    pub skipped_in_flight: usize,
    /// The ledger said "not yet"; released without a submission.
    pub deferred: usize,
}

enum RevealOutcome {
    Revealed(TxReceipt),
    Deferred,
    Retry(LedgerError),
    /// `sent` is true when the reveal transaction reached the ledger.
    Failed { reason: String, sent: bool },
}

pub struct RevealScheduler {
    store: Arc<CommitmentStore>,
    ledger: Arc<dyn Ledger>,
    alerts: Arc<dyn AlertSink>,
    config: ProtectionConfig,
}

impl RevealScheduler {
    pub fn new(
        store: Arc<CommitmentStore>,
        ledger: Arc<dyn Ledger>,
        alerts: Arc<dyn AlertSink>,
        config: ProtectionConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            alerts,
            config,
        }
    }

    /// One scan of the store at `current_height`.
    ///
    /// Claimed reveals run concurrently; no ordering between commitments.
    pub async fn tick(&self, current_height: u64) -> TickReport {
        let (min, max) = (self.config.min_delay_blocks, self.config.max_delay_blocks);
        let mut report = TickReport {
            height: current_height,
            ..TickReport::default()
        };

        let mut claims = Vec::new();
        for hash in self.store.tracked_hashes() {
            match self.store.status_of(&hash, current_height, min, max) {
                Ok(CommitmentStatus::ReadyForReveal) => {
                    match self.store.try_claim(&hash, current_height, min, max) {
                        Some(claim) => claims.push(claim),
                        None => report.skipped_in_flight += 1,
                    }
                }
                Ok(CommitmentStatus::Expired) => {
                    if self.store.mark_expiry_reported(&hash) {
                        if let Some(record) = self.store.get(&hash) {
                            self.alerts.publish(Alert::CommitmentExpired {
                                hash,
                                submitted_at: record.submitted_at,
                                height: current_height,
                            });
                        }
                        report.expired.push(hash);
                    }
                }
                // Pending, failed, or removed between snapshot and lookup.
                _ => {}
            }
        }

        let outcomes = join_all(claims.into_iter().map(|claim| async move {
            let hash = claim.hash;
            (hash, self.submit_claim(claim, current_height).await)
        }))
        .await;

        for (hash, outcome) in outcomes {
            match outcome {
                RevealOutcome::Revealed(_) => {
                    report.submitted += 1;
                    report.revealed.push(hash);
                }
                RevealOutcome::Deferred => report.deferred += 1,
                RevealOutcome::Retry(_) => {
                    report.submitted += 1;
                    report.retried.push(hash);
                }
                RevealOutcome::Failed { sent, .. } => {
                    if sent {
                        report.submitted += 1;
                    }
                    report.failed.push(hash);
                }
            }
        }

        if !report.revealed.is_empty() || !report.failed.is_empty() || !report.expired.is_empty() {
            info!(
                height = current_height,
                revealed = report.revealed.len(),
                failed = report.failed.len(),
                expired = report.expired.len(),
                retried = report.retried.len(),
                "reveal tick"
            );
        }
        report
    }

    /// Reveal one commitment now, through the same claim guard as `tick`.
    pub async fn reveal_now(
        &self,
        hash: FieldElement,
        current_height: u64,
    ) -> Result<TxReceipt, ProtectionError> {
        let (min, max) = (self.config.min_delay_blocks, self.config.max_delay_blocks);
        match self.store.status_of(&hash, current_height, min, max)? {
            CommitmentStatus::ReadyForReveal => {}
            CommitmentStatus::Pending => {
                let ready_at = self
                    .store
                    .get(&hash)
                    .map(|r| r.submitted_at.saturating_add(min))
                    .unwrap_or(current_height);
                return Err(ProtectionError::NotReadyForReveal { hash, ready_at });
            }
            CommitmentStatus::Expired => {
                let expired_after = self
                    .store
                    .get(&hash)
                    .map(|r| r.submitted_at.saturating_add(max))
                    .unwrap_or(current_height);
                return Err(ProtectionError::CommitmentExpired {
                    hash,
                    expired_after,
                });
            }
            CommitmentStatus::Revealed => return Err(ProtectionError::AlreadyRevealed(hash)),
            CommitmentStatus::Failed(reason) => {
                return Err(ProtectionError::RevealFailed { hash, reason })
            }
        }

        let claim = self
            .store
            .try_claim(&hash, current_height, min, max)
            .ok_or(ProtectionError::RevealInFlight(hash))?;

        match self.submit_claim(claim, current_height).await {
            RevealOutcome::Revealed(receipt) => Ok(receipt),
            RevealOutcome::Deferred => Err(ProtectionError::LedgerRejected {
                reason: "ledger reports commitment not ready".into(),
                retryable: true,
            }),
            RevealOutcome::Retry(err) => Err(err.into()),
            RevealOutcome::Failed { reason, .. } => {
                Err(ProtectionError::RevealFailed { hash, reason })
            }
        }
    }

    /// Submit one claimed reveal and apply the resulting transition.
    async fn submit_claim(&self, claim: Claim, current_height: u64) -> RevealOutcome {
        let hash = claim.hash;

        if self.config.confirm_with_ledger {
            match self.ledger.is_ready_for_reveal(hash).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(commitment = %hash, height = current_height, "ledger not ready yet");
                    self.store.release(&hash, None);
                    return RevealOutcome::Deferred;
                }
                Err(e) if e.is_retryable() => {
                    self.store.release(&hash, Some(e.to_string()));
                    return RevealOutcome::Retry(e);
                }
                Err(e) => return self.fail(hash, e.to_string(), false),
            }
        }

        let formatted = match format_proof_for_verifier(&claim.proof) {
            Ok(formatted) => formatted,
            Err(e) => return self.fail(hash, e.to_string(), false),
        };

        let attempt = self.store.note_attempt(&hash);
        debug!(commitment = %hash, attempt, submitted_at = claim.submitted_at, "submitting reveal");

        match self.ledger.reveal(&formatted, &claim.public_signals).await {
            Ok(receipt) if receipt.success => {
                self.store.remove(&hash, receipt.block_number);
                self.alerts.publish(Alert::CommitmentRevealed {
                    hash,
                    tx_hash: receipt.tx_hash,
                    height: receipt.block_number,
                });
                RevealOutcome::Revealed(receipt)
            }
            Ok(receipt) => self.fail(
                hash,
                format!("reveal transaction {:?} reverted", receipt.tx_hash),
                true,
            ),
            Err(e) if e.is_retryable() => {
                warn!(commitment = %hash, attempt, error = %e, "reveal rejected, will retry");
                self.store.release(&hash, Some(e.to_string()));
                RevealOutcome::Retry(e)
            }
            Err(e) => self.fail(hash, e.to_string(), true),
        }
    }

    fn fail(&self, hash: FieldElement, reason: String, sent: bool) -> RevealOutcome {
        let attempts = self.store.mark_failed(&hash, &reason).unwrap_or_default();
        self.alerts.publish(Alert::RevealFailed {
            hash,
            reason: reason.clone(),
            attempts,
        });
        RevealOutcome::Failed { reason, sent }
    }

    /// Tick on `reveal_poll_interval_ms` until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.reveal_poll_interval_ms,
            "reveal scheduler starting"
        );
        let mut interval = tokio::time::interval(self.config.reveal_poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    match self.ledger.current_height().await {
                        Ok(height) => {
                            self.tick(height).await;
                        }
                        Err(e) => warn!(error = %e, "failed to read block height"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("reveal scheduler stopped");
    }
}
