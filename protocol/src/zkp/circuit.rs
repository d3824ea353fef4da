//! # Protection R1CS Circuit
//!
//! The statement being proved is:
//!
//! ```text
//! "I know (token_in, token_out, amount_in, amount_out_min, deadline, owner, nonce)
//!  such that:
//!     1. H(token_in, ..., nonce) = commitment
//!     2. H(owner, nonce)         = nullifier"
//! ```
//!
//! where `H` is the MiMC-5 sponge from `encoding::mimc`, recomputed here gate
//! by gate. `block_number` and `signal_hash` ride along as public inputs so
//! the proof is bound to them; neither appears in a hash, so each is squared
//! once to give it a constraint.
//!
//! ## Constraint breakdown
//!
//! Each MiMC round is `t = x + k + c` (free, linear) and `t^5` (three
//! multiplication gates). With 110 rounds one compression costs 330
//! constraints. The commitment absorbs 7 elements, the nullifier 2, so the
//! whole circuit is 9 * 330 = 2 970 constraints plus two equality checks and
//! two squarings.
//!
//! ## Public inputs (in order)
//!
//! | index | value |
//! |-------|-------|
//! | 0     | commitment |
//! | 1     | nullifier |
//! | 2     | block_number |
//! | 3     | signal_hash |

use ark_bn254::Fr;
use ark_r1cs_std::{
    alloc::AllocVar,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::CircuitInputs;
use crate::encoding::mimc::round_constants;

// ---------------------------------------------------------------------------
// Circuit definition
// ---------------------------------------------------------------------------

/// Groth16 circuit binding a swap commitment to its opening.
///
/// All witness slots are `Option<_>` so the same struct, left empty, drives
/// key generation.
#[derive(Clone, Default)]
pub struct ProtectionCircuit {
    // -- Private witness ----------------------------------------------------
    pub private_inputs: Option<[Fr; 7]>,

    // -- Public inputs ------------------------------------------------------
    pub commitment: Option<Fr>,
    pub nullifier: Option<Fr>,
    pub block_number: Option<Fr>,
    pub signal_hash: Option<Fr>,
}

impl ProtectionCircuit {
    /// A fully-populated circuit for proof generation.
    pub fn new(inputs: &CircuitInputs) -> Self {
        Self {
            private_inputs: Some(inputs.private_inputs().map(|fe| fe.inner())),
            commitment: Some(inputs.commitment().inner()),
            nullifier: Some(inputs.nullifier().inner()),
            block_number: Some(inputs.block_number.inner()),
            signal_hash: Some(inputs.signal_hash.inner()),
        }
    }

    /// A blank circuit for CRS generation.
    pub fn blank() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Constraint synthesizer
// ---------------------------------------------------------------------------

impl ConstraintSynthesizer<Fr> for ProtectionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // ===================================================================
        // 1. Public inputs, in the order of `public_inputs`
        // ===================================================================

        let commitment_var = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "commitment"), || {
            self.commitment.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier_var = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "nullifier"), || {
            self.nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let block_number_var =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "block_number"), || {
                self.block_number.ok_or(SynthesisError::AssignmentMissing)
            })?;
        let signal_hash_var =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "signal_hash"), || {
                self.signal_hash.ok_or(SynthesisError::AssignmentMissing)
            })?;

        // ===================================================================
        // 2. Private witnesses
        // ===================================================================

        let mut private_vars = Vec::with_capacity(7);
        for i in 0..7 {
            let var = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "private_input"), || {
                self.private_inputs
                    .map(|inputs| inputs[i])
                    .ok_or(SynthesisError::AssignmentMissing)
            })?;
            private_vars.push(var);
        }

        // ===================================================================
        // 3. commitment == H(private inputs)
        // ===================================================================

        let computed_commitment = mimc_sponge_gadget(&private_vars)?;
        computed_commitment.enforce_equal(&commitment_var)?;

        // ===================================================================
        // 4. nullifier == H(owner, nonce)
        // ===================================================================

        let computed_nullifier = mimc_sponge_gadget(&private_vars[5..7])?;
        computed_nullifier.enforce_equal(&nullifier_var)?;

        // ===================================================================
        // 5. Bind the remaining public inputs
        // ===================================================================

        let _ = block_number_var.square()?;
        let _ = signal_hash_var.square()?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MiMC gadgets
// ---------------------------------------------------------------------------

/// In-circuit twin of `mimc::permute`.
pub fn mimc_permute_gadget(x: &FpVar<Fr>, key: &FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let mut state = x.clone();
    for c in round_constants() {
        let t = &state + key + *c;
        let t4 = t.square()?.square()?;
        state = &t4 * &t;
    }
    Ok(state + key)
}

/// In-circuit twin of `mimc::sponge`.
pub fn mimc_sponge_gadget(inputs: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let mut h = FpVar::<Fr>::zero();
    for x in inputs {
        h = mimc_permute_gadget(x, &h)? + &h + x;
    }
    Ok(h)
}

/// The public input vector the verifier expects, matching the allocation
/// order in `generate_constraints`.
pub fn public_inputs(inputs: &CircuitInputs) -> Vec<Fr> {
    vec![
        inputs.commitment().inner(),
        inputs.nullifier().inner(),
        inputs.block_number.inner(),
        inputs.signal_hash.inner(),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{encode_u64, mimc};
    use ark_r1cs_std::R1CSVar;
    use ark_relations::r1cs::ConstraintSystem;

    fn sample_inputs() -> CircuitInputs {
        CircuitInputs {
            token_in: encode_u64(11),
            token_out: encode_u64(22),
            amount_in: encode_u64(1_000_000),
            amount_out_min: encode_u64(990_000),
            deadline: encode_u64(1_800_000_000),
            owner: encode_u64(0xabcdef),
            nonce: encode_u64(7),
            block_number: encode_u64(100),
            signal_hash: encode_u64(12345),
        }
    }

    #[test]
    fn circuit_satisfiable_valid_witness() {
        let circuit = ProtectionCircuit::new(&sample_inputs());
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();

        assert!(cs.is_satisfied().unwrap(), "valid witness must satisfy");
        assert_eq!(cs.num_instance_variables(), 5, "one + four public inputs");
    }

    #[test]
    fn circuit_unsatisfied_wrong_commitment() {
        let mut circuit = ProtectionCircuit::new(&sample_inputs());
        circuit.commitment = Some(Fr::from(1u64));
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();

        assert!(!cs.is_satisfied().unwrap(), "wrong commitment must not pass");
    }

    #[test]
    fn circuit_unsatisfied_wrong_nullifier() {
        let mut circuit = ProtectionCircuit::new(&sample_inputs());
        circuit.nullifier = Some(Fr::from(1u64));
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();

        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn gadget_matches_native_sponge() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let values = [Fr::from(3u64), Fr::from(5u64), Fr::from(8u64)];
        let vars: Vec<FpVar<Fr>> = values
            .iter()
            .map(|v| FpVar::new_witness(cs.clone(), || Ok(*v)).unwrap())
            .collect();

        let out = mimc_sponge_gadget(&vars).unwrap();
        assert_eq!(out.value().unwrap(), mimc::sponge(&values));
    }

    #[test]
    fn public_inputs_match_allocation_order() {
        let inputs = sample_inputs();
        let public = public_inputs(&inputs);
        assert_eq!(public.len(), 4);
        assert_eq!(public[0], inputs.commitment().inner());
        assert_eq!(public[1], inputs.nullifier().inner());
        assert_eq!(public[2], Fr::from(100u64));
        assert_eq!(public[3], Fr::from(12345u64));
    }

    #[test]
    fn circuit_constraint_count() {
        let circuit = ProtectionCircuit::new(&sample_inputs());
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();

        let per_compression = 3 * mimc::MIMC_ROUNDS;
        let expected = 9 * per_compression + 4;
        // enforce_equal is folded into linear combinations by the optimiser
        // in some arkworks versions, so allow a little slack.
        let n = cs.num_constraints();
        assert!(
            n + 2 >= expected && n <= expected,
            "expected ~{expected} constraints, got {n}"
        );
    }
}
