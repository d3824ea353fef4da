//! # Field Encoder
//!
//! Everything the proof system consumes is an element of the BN254 scalar
//! field `Fr` (a ~254-bit prime). This module turns domain values into those
//! elements without losing information:
//!
//! - Addresses are 160-bit big-endian integers. Always fit, always injective.
//! - Amounts are `U256`. Anything `>= r` would silently wrap, so it is
//!   rejected with [`ProtectionError::EncodingOverflow`] instead.
//! - Deadlines, nonces and heights are `u64`. Always fit.
//!
//! [`FieldElement`] is the serialisable wrapper the rest of the crate passes
//! around. Its wire form is a decimal string, which is what snarkjs-style
//! tooling and Solidity verifiers expect for public signals.

pub mod mimc;

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::{BigInt, PrimeField};
use ethers_core::abi::{self, Token};
use ethers_core::types::{Address, U256};
use ethers_core::utils::keccak256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtectionError;

// ---------------------------------------------------------------------------
// FieldElement
// ---------------------------------------------------------------------------

/// An element of the BN254 scalar field.
///
/// Ordered and hashable, so it can key maps directly. Commitment hashes,
/// nullifiers and every public signal are `FieldElement`s.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(Fr);

impl FieldElement {
    /// The additive identity.
    pub fn zero() -> Self {
        Self(Fr::from(0u64))
    }

    /// Lift a `U256`, or `None` if it is not below the field modulus.
    pub fn from_u256(value: U256) -> Option<Self> {
        Fr::from_bigint(BigInt::new(value.0)).map(Self)
    }

    /// The canonical integer representative in `[0, r)`.
    pub fn to_u256(&self) -> U256 {
        U256(self.0.into_bigint().0)
    }

    /// The underlying arkworks scalar.
    pub fn inner(&self) -> Fr {
        self.0
    }
}

impl From<Fr> for FieldElement {
    fn from(value: Fr) -> Self {
        Self(value)
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u256())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_u256())
    }
}

/// Error returned when a string is not a canonical decimal field element.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field element: {0}")]
pub struct ParseFieldElementError(pub String);

impl FromStr for FieldElement {
    type Err = ParseFieldElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseFieldElementError(s.to_string()));
        }
        let value =
            U256::from_dec_str(trimmed).map_err(|_| ParseFieldElementError(s.to_string()))?;
        Self::from_u256(value).ok_or_else(|| ParseFieldElementError(s.to_string()))
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

/// Encode an address as its 160-bit big-endian integer value.
pub fn encode_address(address: Address) -> FieldElement {
    FieldElement(Fr::from_be_bytes_mod_order(address.as_bytes()))
}

/// Encode an unsigned amount, rejecting values at or above the modulus.
pub fn encode_amount(value: U256) -> Result<FieldElement, ProtectionError> {
    encode_field("amount", value)
}

/// Like [`encode_amount`], but names the offending input in the error.
pub fn encode_field(field: &'static str, value: U256) -> Result<FieldElement, ProtectionError> {
    FieldElement::from_u256(value).ok_or(ProtectionError::EncodingOverflow { field, value })
}

/// Encode a deadline, nonce or block height.
pub fn encode_u64(value: u64) -> FieldElement {
    FieldElement::from(value)
}

/// MiMC sponge over the given elements. The circuit recomputes this exact
/// function, so it must stay in lockstep with `zkp::circuit::mimc_sponge_gadget`.
pub fn hash_signal(fields: &[FieldElement]) -> FieldElement {
    let inputs: Vec<Fr> = fields.iter().map(FieldElement::inner).collect();
    FieldElement(mimc::sponge(&inputs))
}

/// Public binding of the economically meaningful swap fields.
///
/// `keccak256(abi.encode(tokenIn, tokenOut, amountIn, amountOutMin, owner))`
/// reduced mod `r`. Computable by a Solidity contract, so the ledger can check
/// that the revealed swap is the one the proof speaks about.
pub fn signal_hash(
    token_in: Address,
    token_out: Address,
    amount_in: U256,
    amount_out_min: U256,
    owner: Address,
) -> FieldElement {
    let encoded = abi::encode(&[
        Token::Address(token_in),
        Token::Address(token_out),
        Token::Uint(amount_in),
        Token::Uint(amount_out_min),
        Token::Address(owner),
    ]);
    FieldElement(Fr::from_be_bytes_mod_order(&keccak256(encoded)))
}

/// The BN254 scalar field modulus `r` as a `U256`.
pub fn field_modulus() -> U256 {
    U256(Fr::MODULUS.0)
}
