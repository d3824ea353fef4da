//! # MiMC-5 Sponge over BN254
//!
//! The commitment hash has to be recomputed inside the circuit, so it needs a
//! hash that is cheap in R1CS. MiMC with exponent 5 costs three
//! multiplication gates per round, and 5 is coprime to `r - 1` on BN254, so
//! `x -> x^5` is a permutation of the scalar field.
//!
//! ```text
//!   E_k(x):   for c in C:  x = (x + k + c)^5        (MIMC_ROUNDS rounds)
//!             return x + k
//!
//!   H(x_1..x_n):  h_0 = 0
//!                 h_i = E_{h_{i-1}}(x_i) + h_{i-1} + x_i   (Miyaguchi-Preneel)
//! ```
//!
//! Round constants are derived from BLAKE3 by hashing a domain tag with the
//! round index and reducing mod `r`. Anyone can regenerate them, so there is
//! no room for a trapdoor constant.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_ff::{Field, PrimeField};

/// Number of permutation rounds. `ceil(log_5(r)) = 110` for BN254.
pub const MIMC_ROUNDS: usize = 110;

/// Domain tag mixed into every round constant.
const ROUND_CONSTANT_DOMAIN: &str = "zkmev.mimc";

static ROUND_CONSTANTS: OnceLock<Vec<Fr>> = OnceLock::new();

/// Map arbitrary bytes to a scalar field element: BLAKE3, then reduce mod r.
pub fn hash_to_field(data: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(blake3::hash(data).as_bytes())
}

/// The permutation's round constants, derived once per process.
pub fn round_constants() -> &'static [Fr] {
    ROUND_CONSTANTS.get_or_init(|| {
        (0..MIMC_ROUNDS)
            .map(|i| hash_to_field(format!("{ROUND_CONSTANT_DOMAIN}.{i}").as_bytes()))
            .collect()
    })
}

/// Keyed MiMC-5 permutation `E_k(x)`.
pub fn permute(mut x: Fr, key: Fr) -> Fr {
    for c in round_constants() {
        let t = x + key + c;
        x = t.square().square() * t;
    }
    x + key
}

/// Miyaguchi-Preneel sponge over `inputs`. The empty input hashes to zero.
pub fn sponge(inputs: &[Fr]) -> Fr {
    inputs
        .iter()
        .fold(Fr::from(0u64), |h, x| permute(*x, h) + h + x)
}
