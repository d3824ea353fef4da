//! Error types for the commit-reveal protection flow.
//!
//! Request-time failures come back from `protect` as a [`ProtectionError`].
//! Scheduler-time failures are recorded against the commitment and published
//! as alerts instead, because the caller who submitted is long gone by then.

use ethers_core::types::U256;
use thiserror::Error;

use crate::encoding::FieldElement;

/// Errors that can occur while protecting, tracking or revealing a commitment.
#[derive(Debug, Error)]
pub enum ProtectionError {
    /// The commitment hash has already been accepted once.
    #[error("duplicate commitment: {0}")]
    DuplicateCommitment(FieldElement),

    /// No commitment with this hash is known.
    #[error("unknown commitment: {0}")]
    UnknownCommitment(FieldElement),

    /// The fee offered with the commitment does not cover the protection fee.
    #[error("insufficient protection fee: required {required}, offered {offered}")]
    InsufficientFee {
        /// Fee demanded by the ledger, in wei.
        required: U256,
        /// Fee that was offered, in wei.
        offered: U256,
    },

    /// The commitment has not yet reached its reveal window.
    #[error("commitment {hash} not ready for reveal until height {ready_at}")]
    NotReadyForReveal {
        /// The commitment in question.
        hash: FieldElement,
        /// First block height at which a reveal is accepted.
        ready_at: u64,
    },

    /// The external proving system failed. The prover's own error chain is
    /// kept verbatim.
    #[error("proof generation failed: {0:#}")]
    ProofGenerationFailed(anyhow::Error),

    /// The reveal window has closed; the commitment is inert.
    #[error("commitment {hash} expired after height {expired_after}")]
    CommitmentExpired {
        hash: FieldElement,
        /// Last height at which a reveal was accepted.
        expired_after: u64,
    },

    /// The commitment has already been revealed.
    #[error("commitment {0} already revealed")]
    AlreadyRevealed(FieldElement),

    /// A reveal for this commitment is already outstanding.
    #[error("reveal already in flight for commitment {0}")]
    RevealInFlight(FieldElement),

    /// The commitment failed terminally and will not be retried.
    #[error("commitment {hash} failed permanently: {reason}")]
    RevealFailed { hash: FieldElement, reason: String },

    /// The proof or its public signals do not have the expected shape.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// A value does not fit into the proof system's scalar field.
    #[error("encoding overflow: {field} = {value} exceeds the field modulus")]
    EncodingOverflow {
        /// Name of the offending input.
        field: &'static str,
        /// The value as supplied.
        value: U256,
    },

    /// The ledger refused an operation. `retryable` mirrors the ledger's own
    /// classification of the rejection reason.
    #[error("ledger rejected operation ({}): {reason}", retry_label(.retryable))]
    LedgerRejected {
        /// Human-readable reason reported by the ledger.
        reason: String,
        /// Whether the same operation may succeed on a later attempt.
        retryable: bool,
    },

    /// The request was abandoned before the proof finished.
    #[error("request cancelled before proof generation completed")]
    Cancelled,

    /// The service is shutting down and no longer accepts requests.
    #[error("protection service is shutting down")]
    ShuttingDown,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProtectionError {
    /// Whether the failed operation may succeed if attempted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerRejected { retryable: true, .. })
    }
}

fn retry_label(retryable: &bool) -> &'static str {
    if *retryable {
        "retryable"
    } else {
        "fatal"
    }
}
