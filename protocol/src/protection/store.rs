//! # Commitment Store
//!
//! Arena of outstanding commitments keyed by hash. Every mutation is one of
//! a handful of named transitions:
//!
//! ```text
//!            record                try_claim
//!   (none) ─────────▶ Tracked ─────────────────▶ InFlight
//!                       ▲                           │
//!                       └────────── release ────────┤
//!                                                   ├── remove ──▶ tombstone
//!                                                   └── mark_failed ──▶ Failed
//! ```
//!
//! Each transition runs under the key's DashMap shard lock, so an insert and
//! a scheduler scan can never interleave on the same hash. Height-derived
//! status (Pending / ReadyForReveal / Expired) is never stored.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::{derive_status, CommitmentStatus};
use crate::encoding::FieldElement;
use crate::error::ProtectionError;
use crate::zkp::ProofPayload;

/// Scheduler-owned lifecycle phase. Orthogonal to the height-derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for its window (or for the next tick).
    Tracked,
    /// A reveal submission is outstanding.
    InFlight,
    /// Terminal. Reported once, never retried.
    Failed(String),
}

/// One commitment and everything needed to reveal it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub hash: FieldElement,
    pub owner: Address,
    pub submitted_at: u64,
    pub proof: ProofPayload,
    pub public_signals: Vec<FieldElement>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub phase: Phase,
    pub expiry_reported: bool,
}

/// What the scheduler takes away from a successful claim.
#[derive(Debug, Clone)]
pub struct Claim {
    pub hash: FieldElement,
    pub submitted_at: u64,
    pub proof: ProofPayload,
    pub public_signals: Vec<FieldElement>,
}

/// Per-owner counts for status queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub total_tracked: usize,
    pub pending: usize,
    pub ready_for_reveal: usize,
    pub expired: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct CommitmentStore {
    records: DashMap<FieldElement, CommitmentRecord>,
    /// Tombstones: hash -> height it was revealed at.
    revealed: DashMap<FieldElement, u64>,
    revealed_total: AtomicUsize,
}

impl CommitmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a commitment. A hash is accepted once, ever.
    pub fn record(
        &self,
        hash: FieldElement,
        owner: Address,
        submitted_at: u64,
        proof: ProofPayload,
        public_signals: Vec<FieldElement>,
    ) -> Result<(), ProtectionError> {
        match self.records.entry(hash) {
            Entry::Occupied(_) => Err(ProtectionError::DuplicateCommitment(hash)),
            Entry::Vacant(slot) => {
                if self.revealed.contains_key(&hash) {
                    return Err(ProtectionError::DuplicateCommitment(hash));
                }
                slot.insert(CommitmentRecord {
                    hash,
                    owner,
                    submitted_at,
                    proof,
                    public_signals,
                    attempts: 0,
                    last_error: None,
                    phase: Phase::Tracked,
                    expiry_reported: false,
                });
                debug!(commitment = %hash, submitted_at, "commitment recorded");
                Ok(())
            }
        }
    }

    /// Current status, recomputed from height every call.
    pub fn status_of(
        &self,
        hash: &FieldElement,
        current_height: u64,
        min_delay: u64,
        max_delay: u64,
    ) -> Result<CommitmentStatus, ProtectionError> {
        if let Some(record) = self.records.get(hash) {
            return Ok(match &record.phase {
                Phase::Failed(reason) => CommitmentStatus::Failed(reason.clone()),
                _ => derive_status(current_height, record.submitted_at, min_delay, max_delay),
            });
        }
        if self.revealed.contains_key(hash) {
            return Ok(CommitmentStatus::Revealed);
        }
        Err(ProtectionError::UnknownCommitment(*hash))
    }

    /// A copy of the record, if live.
    pub fn get(&self, hash: &FieldElement) -> Option<CommitmentRecord> {
        self.records.get(hash).map(|r| r.clone())
    }

    pub fn contains(&self, hash: &FieldElement) -> bool {
        self.records.contains_key(hash)
    }

    pub fn is_revealed(&self, hash: &FieldElement) -> bool {
        self.revealed.contains_key(hash)
    }

    /// Stop tracking after a successful reveal at `revealed_at`. Leaves a
    /// tombstone so the hash is refused until `purge_tombstones` drops it.
    pub fn remove(&self, hash: &FieldElement, revealed_at: u64) -> Option<CommitmentRecord> {
        // Tombstone first: a concurrent `record` either still sees the live
        // entry or sees the tombstone.
        if self.revealed.insert(*hash, revealed_at).is_none() {
            self.revealed_total.fetch_add(1, Ordering::Relaxed);
        }
        self.records.remove(hash).map(|(_, record)| record)
    }

    /// Claim a ReadyForReveal, not-in-flight commitment for one reveal.
    ///
    /// Returns `None` if the hash is unknown, already claimed, failed or
    /// outside its window. The check and the transition happen under one
    /// shard lock.
    pub fn try_claim(
        &self,
        hash: &FieldElement,
        current_height: u64,
        min_delay: u64,
        max_delay: u64,
    ) -> Option<Claim> {
        let mut record = self.records.get_mut(hash)?;
        if record.phase != Phase::Tracked {
            return None;
        }
        if derive_status(current_height, record.submitted_at, min_delay, max_delay)
            != CommitmentStatus::ReadyForReveal
        {
            return None;
        }
        record.phase = Phase::InFlight;
        Some(Claim {
            hash: *hash,
            submitted_at: record.submitted_at,
            proof: record.proof.clone(),
            public_signals: record.public_signals.clone(),
        })
    }

    /// Count one reveal submission against an in-flight record.
    pub fn note_attempt(&self, hash: &FieldElement) -> u32 {
        match self.records.get_mut(hash) {
            Some(mut record) => {
                record.attempts += 1;
                record.attempts
            }
            None => 0,
        }
    }

    /// Hand an in-flight record back for a later tick.
    pub fn release(&self, hash: &FieldElement, error: Option<String>) {
        if let Some(mut record) = self.records.get_mut(hash) {
            if record.phase == Phase::InFlight {
                record.phase = Phase::Tracked;
            }
            if error.is_some() {
                record.last_error = error;
            }
        }
    }

    /// Terminal failure. Returns the attempt count, or `None` if unknown.
    pub fn mark_failed(&self, hash: &FieldElement, reason: &str) -> Option<u32> {
        let mut record = self.records.get_mut(hash)?;
        record.phase = Phase::Failed(reason.to_string());
        record.last_error = Some(reason.to_string());
        Some(record.attempts)
    }

    /// Flag the expiry as reported. `true` only the first time.
    pub fn mark_expiry_reported(&self, hash: &FieldElement) -> bool {
        match self.records.get_mut(hash) {
            Some(mut record) if !record.expiry_reported => {
                record.expiry_reported = true;
                true
            }
            _ => false,
        }
    }

    /// Drop every record whose window closed before `current_height`.
    /// In-flight records are left alone.
    pub fn purge_expired(&self, current_height: u64, max_delay: u64) -> Vec<FieldElement> {
        let mut purged = Vec::new();
        self.records.retain(|hash, record| {
            let expired = record
                .submitted_at
                .checked_add(max_delay)
                .map_or(false, |last| current_height > last);
            if expired && record.phase != Phase::InFlight {
                purged.push(*hash);
                false
            } else {
                true
            }
        });
        purged
    }

    /// Forget tombstones older than `retention` blocks. After this the
    /// ledger's own duplicate check is what refuses a replayed hash.
    pub fn purge_tombstones(&self, current_height: u64, retention: u64) -> usize {
        let before = self.revealed.len();
        self.revealed.retain(|_, revealed_at| {
            revealed_at
                .checked_add(retention)
                .map_or(true, |keep_until| current_height <= keep_until)
        });
        before.saturating_sub(self.revealed.len())
    }

    /// Snapshot of every live hash.
    pub fn tracked_hashes(&self) -> Vec<FieldElement> {
        self.records.iter().map(|r| *r.key()).collect()
    }

    /// Live records belonging to `owner`.
    pub fn by_owner(&self, owner: Address) -> Vec<CommitmentRecord> {
        self.records
            .iter()
            .filter(|r| r.owner == owner)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Status counts for `owner` at `current_height`.
    pub fn owner_summary(
        &self,
        owner: Address,
        current_height: u64,
        min_delay: u64,
        max_delay: u64,
    ) -> OwnerSummary {
        let mut summary = OwnerSummary::default();
        for record in self.records.iter().filter(|r| r.owner == owner) {
            summary.total_tracked += 1;
            if let Phase::Failed(_) = record.phase {
                summary.failed += 1;
                continue;
            }
            match derive_status(current_height, record.submitted_at, min_delay, max_delay) {
                CommitmentStatus::Pending => summary.pending += 1,
                CommitmentStatus::ReadyForReveal => summary.ready_for_reveal += 1,
                CommitmentStatus::Expired => summary.expired += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reveals recorded since start, including purged tombstones.
    pub fn revealed_count(&self) -> usize {
        self.revealed_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn proof() -> ProofPayload {
        ProofPayload {
            pi_a: vec!["1".into(), "2".into(), "1".into()],
            pi_b: vec![
                vec!["3".into(), "4".into()],
                vec!["5".into(), "6".into()],
                vec!["1".into(), "0".into()],
            ],
            pi_c: vec!["7".into(), "8".into(), "1".into()],
            protocol: "groth16".into(),
            curve: "bn128".into(),
        }
    }

    fn h(n: u64) -> FieldElement {
        FieldElement::from(n)
    }

    fn owner() -> Address {
        Address::repeat_byte(0x42)
    }

    fn store_with(hash: FieldElement, at: u64) -> CommitmentStore {
        let store = CommitmentStore::new();
        store.record(hash, owner(), at, proof(), vec![hash]).unwrap();
        store
    }

    #[test]
    fn duplicate_record_rejected() {
        let store = store_with(h(1), 100);
        let err = store.record(h(1), owner(), 105, proof(), vec![h(1)]).unwrap_err();
        assert!(matches!(err, ProtectionError::DuplicateCommitment(x) if x == h(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn revealed_hash_cannot_be_recorded_again() {
        let store = store_with(h(1), 100);
        store.remove(&h(1), 103);
        assert!(store.record(h(1), owner(), 200, proof(), vec![h(1)]).is_err());
        assert_eq!(store.status_of(&h(1), 300, 2, 10).unwrap(), CommitmentStatus::Revealed);
    }

    #[test]
    fn status_follows_height() {
        let store = store_with(h(1), 100);
        assert_eq!(store.status_of(&h(1), 101, 2, 10).unwrap(), CommitmentStatus::Pending);
        assert_eq!(
            store.status_of(&h(1), 102, 2, 10).unwrap(),
            CommitmentStatus::ReadyForReveal
        );
        assert_eq!(store.status_of(&h(1), 111, 2, 10).unwrap(), CommitmentStatus::Expired);
        // And back: nothing is cached.
        assert_eq!(store.status_of(&h(1), 101, 2, 10).unwrap(), CommitmentStatus::Pending);
    }

    #[test]
    fn unknown_commitment() {
        let store = CommitmentStore::new();
        assert!(matches!(
            store.status_of(&h(9), 0, 2, 10),
            Err(ProtectionError::UnknownCommitment(_))
        ));
    }

    #[test]
    fn claim_is_exclusive() {
        let store = store_with(h(1), 100);
        assert!(store.try_claim(&h(1), 102, 2, 10).is_some());
        assert!(store.try_claim(&h(1), 102, 2, 10).is_none(), "second claim must fail");

        store.release(&h(1), Some("nonce too low".into()));
        let record = store.get(&h(1)).unwrap();
        assert_eq!(record.phase, Phase::Tracked);
        assert_eq!(record.last_error.as_deref(), Some("nonce too low"));
        assert!(store.try_claim(&h(1), 103, 2, 10).is_some());
    }

    #[test]
    fn claim_requires_window() {
        let store = store_with(h(1), 100);
        assert!(store.try_claim(&h(1), 101, 2, 10).is_none());
        assert!(store.try_claim(&h(1), 111, 2, 10).is_none());
        assert!(store.try_claim(&h(2), 102, 2, 10).is_none());
    }

    #[test]
    fn failed_is_terminal() {
        let store = store_with(h(1), 100);
        store.try_claim(&h(1), 102, 2, 10).unwrap();
        store.note_attempt(&h(1));
        assert_eq!(store.mark_failed(&h(1), "invalid proof"), Some(1));

        assert_eq!(
            store.status_of(&h(1), 103, 2, 10).unwrap(),
            CommitmentStatus::Failed("invalid proof".into())
        );
        assert!(store.try_claim(&h(1), 103, 2, 10).is_none());
    }

    #[test]
    fn expiry_reported_once() {
        let store = store_with(h(1), 100);
        assert!(store.mark_expiry_reported(&h(1)));
        assert!(!store.mark_expiry_reported(&h(1)));
    }

    #[test]
    fn purge_skips_in_flight_and_live() {
        let store = store_with(h(1), 100);
        store.record(h(2), owner(), 100, proof(), vec![h(2)]).unwrap();
        store.record(h(3), owner(), 105, proof(), vec![h(3)]).unwrap();
        store.try_claim(&h(2), 110, 2, 10).unwrap();

        let purged = store.purge_expired(111, 10);
        assert_eq!(purged, vec![h(1)]);
        assert!(store.contains(&h(2)));
        assert!(store.contains(&h(3)));
        assert!(!store.is_revealed(&h(1)), "purge is not a reveal");
    }

    #[test]
    fn tombstones_age_out_after_retention() {
        let store = store_with(h(1), 100);
        store.record(h(2), owner(), 100, proof(), vec![h(2)]).unwrap();
        store.remove(&h(1), 103);
        store.remove(&h(2), 108);

        assert_eq!(store.purge_tombstones(113, 10), 0);
        assert_eq!(store.purge_tombstones(114, 10), 1);
        assert!(!store.is_revealed(&h(1)));
        assert!(store.is_revealed(&h(2)));
        assert!(matches!(
            store.status_of(&h(1), 114, 2, 10),
            Err(ProtectionError::UnknownCommitment(_))
        ));
        assert_eq!(store.revealed_count(), 2);

        // Retention reaching past u64::MAX keeps the tombstone.
        assert_eq!(store.purge_tombstones(u64::MAX, u64::MAX), 0);
        assert!(store.is_revealed(&h(2)));
    }

    #[test]
    fn owner_summary_counts() {
        let store = store_with(h(1), 100);
        store.record(h(2), owner(), 108, proof(), vec![h(2)]).unwrap();
        store
            .record(h(3), Address::repeat_byte(0x99), 100, proof(), vec![h(3)])
            .unwrap();

        let summary = store.owner_summary(owner(), 103, 2, 10);
        assert_eq!(summary.total_tracked, 2);
        assert_eq!(summary.ready_for_reveal, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(store.by_owner(owner()).len(), 2);
    }

    #[test]
    fn concurrent_duplicate_inserts_accept_exactly_one() {
        let store = Arc::new(CommitmentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.record(h(7), owner(), 1, proof(), vec![h(7)]).is_ok())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
    }
}
