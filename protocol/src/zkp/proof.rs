//! Proof payloads and the verifier-facing coordinate layout.
//!
//! [`ProofPayload`] is the snarkjs JSON shape: decimal strings, projective
//! coordinates with a trailing `"1"`. [`VerifierProof`] is what a Solidity
//! Groth16 verifier takes as calldata: affine coordinates as `uint256`, with
//! the two limbs of every G2 coordinate swapped (EIP-197 puts the imaginary
//! part first).

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::ProtectionError;

/// A Groth16 proof as emitted by the proving system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    /// G1 point `[x, y, "1"]`.
    pub pi_a: Vec<String>,
    /// G2 point `[[x.c0, x.c1], [y.c0, y.c1], ["1", "0"]]`.
    pub pi_b: Vec<Vec<String>>,
    /// G1 point `[x, y, "1"]`.
    pub pi_c: Vec<String>,
    /// Always `"groth16"` for this crate.
    pub protocol: String,
    /// Always `"bn128"` (snarkjs' name for BN254).
    pub curve: String,
}

/// Proof coordinates in the order the on-ledger verifier consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierProof {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
}

/// Reorder a proof for the verifier.
///
/// ```text
/// a = [pi_a[0], pi_a[1]]
/// b = [[pi_b[0][1], pi_b[0][0]], [pi_b[1][1], pi_b[1][0]]]
/// c = [pi_c[0], pi_c[1]]
/// ```
///
/// Pure. Fails only on a short array or a coordinate that is not a decimal
/// integer below 2^256.
pub fn format_proof_for_verifier(proof: &ProofPayload) -> Result<VerifierProof, ProtectionError> {
    let b0 = row(&proof.pi_b, 0, "pi_b")?;
    let b1 = row(&proof.pi_b, 1, "pi_b")?;

    Ok(VerifierProof {
        a: [coord(&proof.pi_a, 0, "pi_a")?, coord(&proof.pi_a, 1, "pi_a")?],
        b: [
            [coord(b0, 1, "pi_b[0]")?, coord(b0, 0, "pi_b[0]")?],
            [coord(b1, 1, "pi_b[1]")?, coord(b1, 0, "pi_b[1]")?],
        ],
        c: [coord(&proof.pi_c, 0, "pi_c")?, coord(&proof.pi_c, 1, "pi_c")?],
    })
}

fn row<'a>(
    rows: &'a [Vec<String>],
    index: usize,
    name: &str,
) -> Result<&'a [String], ProtectionError> {
    rows.get(index)
        .map(Vec::as_slice)
        .ok_or_else(|| ProtectionError::MalformedProof(format!("{name} has no row {index}")))
}

fn coord(values: &[String], index: usize, name: &str) -> Result<U256, ProtectionError> {
    let raw = values.get(index).ok_or_else(|| {
        ProtectionError::MalformedProof(format!("{name} has no coordinate {index}"))
    })?;
    parse_decimal(raw)
        .ok_or_else(|| ProtectionError::MalformedProof(format!("{name}[{index}] is not decimal: {raw}")))
}

fn parse_decimal(raw: &str) -> Option<U256> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_dec_str(raw).ok()
}
