//! # Commit-Reveal Protection
//!
//! The user-facing half of the crate. A swap goes through four hands:
//!
//! ```text
//! ProtectionRequest ──▶ orchestrator ──▶ ledger.submit ──▶ CommitmentStore
//!                        (prove, off                          │
//!                         the executor)                       ▼
//!                                        ledger.reveal ◀── RevealScheduler
//! ```
//!
//! [`ProtectionService`] wires them together. Status is always derived from
//! block height; nothing in this module caches "ready" or "expired".

pub mod orchestrator;
pub mod scheduler;
pub mod service;
pub mod store;

use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::encoding::{self, FieldElement};

pub use orchestrator::{ProofOrchestrator, ProtectionProof};
pub use scheduler::{RevealScheduler, TickReport};
pub use service::{ProtectionService, ProtectionStatus};
pub use store::{CommitmentRecord, CommitmentStore, Phase};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The economic content of a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out_min: U256,
    /// Unix timestamp after which the swap must not execute.
    pub deadline: u64,
}

/// A swap plus who is protecting it and a per-request nonce.
///
/// Two requests with identical economics and different nonces produce
/// different commitments and different nullifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRequest {
    pub swap: SwapParams,
    pub owner: Address,
    pub nonce: u64,
}

impl ProtectionRequest {
    /// A request with a freshly drawn random nonce.
    pub fn new(swap: SwapParams, owner: Address) -> Self {
        Self {
            swap,
            owner,
            nonce: rand::random(),
        }
    }

    pub fn with_nonce(swap: SwapParams, owner: Address, nonce: u64) -> Self {
        Self { swap, owner, nonce }
    }

    /// Public binding of token pair, amounts and owner.
    pub fn signal_hash(&self) -> FieldElement {
        encoding::signal_hash(
            self.swap.token_in,
            self.swap.token_out,
            self.swap.amount_in,
            self.swap.amount_out_min,
            self.owner,
        )
    }
}

/// What `protect` hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionReceipt {
    pub commitment_hash: FieldElement,
    pub transaction_hash: H256,
    /// Height at which the commitment first becomes revealable.
    pub estimated_reveal_height: u64,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    Pending,
    ReadyForReveal,
    Revealed,
    Expired,
    Failed(String),
}

impl CommitmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revealed | Self::Expired | Self::Failed(_))
    }
}

impl std::fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::ReadyForReveal => write!(f, "ready_for_reveal"),
            Self::Revealed => write!(f, "revealed"),
            Self::Expired => write!(f, "expired"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Height-derived status. Pure: the same four numbers always give the same
/// answer, and the answer only moves forward as `current` grows.
///
/// ```text
/// current <  submitted + min                 → Pending
/// submitted + min <= current <= submitted + max → ReadyForReveal
/// current >  submitted + max                 → Expired
/// ```
///
/// A bound that overflows `u64` is never reached: the commitment stays
/// Pending, or never expires.
pub fn derive_status(current: u64, submitted_at: u64, min_delay: u64, max_delay: u64) -> CommitmentStatus {
    match submitted_at.checked_add(min_delay) {
        Some(ready_at) if current >= ready_at => {}
        _ => return CommitmentStatus::Pending,
    }
    match submitted_at.checked_add(max_delay) {
        Some(last) if current > last => CommitmentStatus::Expired,
        _ => CommitmentStatus::ReadyForReveal,
    }
}
