//! # Zero-Knowledge Proof Module
//!
//! The protection flow treats the proving system as a black box behind two
//! traits:
//!
//! - [`ProvingSystem`] — client side. Turns [`CircuitInputs`] into a proof
//!   plus its public signals, and can check its own output.
//! - [`ProofVerifier`] — ledger side. Checks a proof in the coordinate layout
//!   the on-chain verifier expects ([`VerifierProof`]).
//!
//! The [`groth16`] backend implements both over BN254 with a small MiMC
//! commitment circuit. It is enough to run the whole flow end to end; a
//! production deployment plugs its own circuit in behind the same traits.
//!
//! ## Architecture
//!
//! ```text
//! proof.rs     — ProofPayload (snarkjs JSON shape), VerifierProof, formatting
//! circuit.rs   — ProtectionCircuit + MiMC gadgets
//! groth16.rs   — Groth16Backend / Groth16Verifier (setup, prove, verify, key IO)
//! ```
//!
//! ## Public signal layout
//!
//! Callers may rely on exactly one thing: `public_signals[0]` is the
//! commitment hash. Everything after index 0 belongs to the backend. The
//! Groth16 backend happens to emit `[commitment, nullifier, block_number,
//! signal_hash]`.

pub mod circuit;
pub mod groth16;
pub mod proof;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::encoding::{hash_signal, FieldElement};

pub use circuit::ProtectionCircuit;
pub use groth16::{Groth16Backend, Groth16Verifier};
pub use proof::{format_proof_for_verifier, ProofPayload, VerifierProof};

/// Index of the commitment hash in every public-signal vector.
pub const COMMITMENT_SIGNAL_INDEX: usize = 0;

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Everything the prover needs, already encoded into field elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitInputs {
    // -- Private ------------------------------------------------------------
    pub token_in: FieldElement,
    pub token_out: FieldElement,
    pub amount_in: FieldElement,
    pub amount_out_min: FieldElement,
    pub deadline: FieldElement,
    pub owner: FieldElement,
    pub nonce: FieldElement,

    // -- Public -------------------------------------------------------------
    /// Height the proof is generated against.
    pub block_number: FieldElement,
    /// keccak binding of token pair, amounts and owner.
    pub signal_hash: FieldElement,
}

impl CircuitInputs {
    /// The private inputs in the order the commitment hashes them.
    pub fn private_inputs(&self) -> [FieldElement; 7] {
        [
            self.token_in,
            self.token_out,
            self.amount_in,
            self.amount_out_min,
            self.deadline,
            self.owner,
            self.nonce,
        ]
    }

    /// `H(token_in, token_out, amount_in, amount_out_min, deadline, owner, nonce)`.
    pub fn commitment(&self) -> FieldElement {
        hash_signal(&self.private_inputs())
    }

    /// `H(owner, nonce)`. Spent on reveal so the same proof cannot execute twice.
    pub fn nullifier(&self) -> FieldElement {
        hash_signal(&[self.owner, self.nonce])
    }
}

/// What a successful `prove` call hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverOutput {
    pub proof: ProofPayload,
    pub public_signals: Vec<FieldElement>,
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// The client-side proving system.
///
/// `prove` is CPU-bound and may take seconds. Callers in async code run it on
/// the blocking pool. Errors are opaque (`anyhow`) and are wrapped into
/// `ProtectionError::ProofGenerationFailed` by the orchestrator.
pub trait ProvingSystem: Send + Sync + 'static {
    /// Generate a proof for `inputs`.
    fn prove(&self, inputs: &CircuitInputs) -> Result<ProverOutput>;

    /// Check a proof this system produced. Used for the optional
    /// pre-submission self-check.
    fn verify(&self, public_signals: &[FieldElement], proof: &ProofPayload) -> Result<bool>;
}

/// The ledger-side verifier, fed the reordered coordinates.
pub trait ProofVerifier: Send + Sync {
    /// `Ok(false)` for a well-formed proof that does not verify; `Err` when
    /// the proof cannot even be decoded.
    fn verify_proof(&self, public_signals: &[FieldElement], proof: &VerifierProof) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode_u64;

    fn sample_inputs() -> CircuitInputs {
        CircuitInputs {
            token_in: encode_u64(1),
            token_out: encode_u64(2),
            amount_in: encode_u64(1_000),
            amount_out_min: encode_u64(990),
            deadline: encode_u64(1_700_000_000),
            owner: encode_u64(7),
            nonce: encode_u64(99),
            block_number: encode_u64(100),
            signal_hash: encode_u64(5),
        }
    }

    #[test]
    fn nonce_changes_commitment_and_nullifier() {
        let a = sample_inputs();
        let mut b = a.clone();
        b.nonce = encode_u64(100);
        assert_ne!(a.commitment(), b.commitment());
        assert_ne!(a.nullifier(), b.nullifier());
    }

    #[test]
    fn public_fields_do_not_affect_commitment() {
        let a = sample_inputs();
        let mut b = a.clone();
        b.block_number = encode_u64(200);
        b.signal_hash = encode_u64(6);
        assert_eq!(a.commitment(), b.commitment());
    }
}
