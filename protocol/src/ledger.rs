//! The ledger contract the protection flow depends on.
//!
//! The production ledger is an on-chain protector contract reached over RPC;
//! neither lives in this crate. `zkmev-contracts` ships an in-memory
//! implementation for devnet runs and tests.

use async_trait::async_trait;
use ethers_core::types::{H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::FieldElement;
use crate::error::ProtectionError;
use crate::zkp::VerifierProof;

/// Receipt for a transaction the ledger accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: H256,
    /// Height of the block the transaction landed in.
    pub block_number: u64,
    pub success: bool,
}

/// Reasons a ledger refuses an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient fee: required {required}, offered {offered}")]
    InsufficientFee { required: U256, offered: U256 },

    #[error("commitment already known")]
    AlreadyKnown,

    #[error("commitment not ready for reveal")]
    NotReady,

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("commitment unknown to ledger")]
    UnknownCommitment,

    /// Transient trouble: nonce contention, a full pool, a flaky node.
    #[error("temporary failure: {0}")]
    Temporary(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl LedgerError {
    /// Whether the same operation may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady | Self::Temporary(_))
    }
}

impl From<LedgerError> for ProtectionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFee { required, offered } => {
                ProtectionError::InsufficientFee { required, offered }
            }
            other => ProtectionError::LedgerRejected {
                retryable: other.is_retryable(),
                reason: other.to_string(),
            },
        }
    }
}

/// Operations the core needs from the ledger.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// Fee currently required by `submit`, in wei.
    async fn protection_fee(&self) -> Result<U256, LedgerError>;

    /// Publish a commitment hash, paying `fee`.
    async fn submit(&self, hash: FieldElement, fee: U256) -> Result<TxReceipt, LedgerError>;

    /// The ledger's own view of reveal eligibility.
    async fn is_ready_for_reveal(&self, hash: FieldElement) -> Result<bool, LedgerError>;

    /// Reveal and execute. The ledger verifies the proof itself.
    async fn reveal(
        &self,
        proof: &VerifierProof,
        public_signals: &[FieldElement],
    ) -> Result<TxReceipt, LedgerError>;

    /// Current block height.
    async fn current_height(&self) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LedgerError::NotReady.is_retryable());
        assert!(LedgerError::Temporary("nonce too low".into()).is_retryable());
        assert!(!LedgerError::InvalidProof("pairing".into()).is_retryable());
        assert!(!LedgerError::UnknownCommitment.is_retryable());
        assert!(!LedgerError::AlreadyKnown.is_retryable());
    }

    #[test]
    fn conversion_keeps_fee_details() {
        let err: ProtectionError = LedgerError::InsufficientFee {
            required: U256::from(10),
            offered: U256::from(1),
        }
        .into();
        assert!(matches!(err, ProtectionError::InsufficientFee { .. }));

        let err: ProtectionError = LedgerError::Temporary("busy".into()).into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("retryable"));
    }
}
