//! # Groth16 Backend
//!
//! Wraps `ark-groth16` over BN254 behind [`ProvingSystem`] and
//! [`ProofVerifier`]. The workflow is:
//!
//! 1. **Setup**: `Groth16Backend::setup(rng)` once per circuit shape. In
//!    production, replace this with an MPC ceremony and load the keys with
//!    [`Groth16Backend::load`].
//!
//! 2. **Prove**: [`ProvingSystem::prove`] populates a [`ProtectionCircuit`],
//!    checks that the witness satisfies it, and runs `Groth16::prove`.
//!
//! 3. **Verify**: either the snarkjs-shaped [`ProofPayload`] (client
//!    self-check) or the reordered [`VerifierProof`] (ledger side).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::{BigInt, PrimeField};
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use ethers_core::types::U256;

use super::circuit::{self, ProtectionCircuit};
use super::proof::{format_proof_for_verifier, ProofPayload, VerifierProof};
use super::{CircuitInputs, ProofVerifier, ProverOutput, ProvingSystem};
use crate::encoding::FieldElement;

/// Number of public signals the protection circuit exposes.
pub const PUBLIC_SIGNAL_COUNT: usize = 4;

/// Positions within this backend's public signals, after the commitment.
pub const NULLIFIER_SIGNAL_INDEX: usize = 1;
pub const BLOCK_SIGNAL_INDEX: usize = 2;

// ---------------------------------------------------------------------------
// Groth16Backend
// ---------------------------------------------------------------------------

/// Holds the Groth16 proving key and its verifier half.
///
/// The proving key is large but immutable. Keep one instance for the
/// lifetime of the process and share it behind an `Arc`.
pub struct Groth16Backend {
    pk: ProvingKey<Bn254>,
    verifier: Groth16Verifier,
}

impl Groth16Backend {
    /// Run a local trusted setup for [`ProtectionCircuit`].
    pub fn setup<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(ProtectionCircuit::blank(), rng)
            .map_err(|e| anyhow!("Groth16 setup failed: {e}"))?;
        Ok(Self {
            pk,
            verifier: Groth16Verifier::from_vk(vk),
        })
    }

    /// Load keys previously written by [`Groth16Backend::write_keys`].
    pub fn load(pk_path: &Path, vk_path: &Path) -> Result<Self> {
        let pk_file = File::open(pk_path)
            .with_context(|| format!("failed to open proving key {}", pk_path.display()))?;
        let pk = ProvingKey::<Bn254>::deserialize_compressed(BufReader::new(pk_file))
            .map_err(|e| anyhow!("invalid proving key {}: {e}", pk_path.display()))?;
        let verifier = Groth16Verifier::load(vk_path)?;
        Ok(Self { pk, verifier })
    }

    /// Write the proving and verifying keys to disk.
    pub fn write_keys(&self, pk_path: &Path, vk_path: &Path) -> Result<()> {
        let pk_file = File::create(pk_path)
            .with_context(|| format!("failed to create {}", pk_path.display()))?;
        let mut writer = BufWriter::new(pk_file);
        self.pk
            .serialize_compressed(&mut writer)
            .map_err(|e| anyhow!("proving key serialization failed: {e}"))?;
        writer
            .flush()
            .with_context(|| format!("failed to write {}", pk_path.display()))?;
        self.verifier.write(vk_path)
    }

    /// The verifier half, for handing to a ledger.
    pub fn verifier(&self) -> Groth16Verifier {
        self.verifier.clone()
    }
}

impl ProvingSystem for Groth16Backend {
    fn prove(&self, inputs: &CircuitInputs) -> Result<ProverOutput> {
        // ark-groth16 0.4 panics on an unsatisfied witness instead of
        // returning Err, so check the constraint system first.
        let cs = ConstraintSystem::<Fr>::new_ref();
        ProtectionCircuit::new(inputs)
            .generate_constraints(cs.clone())
            .map_err(|e| anyhow!("constraint synthesis failed: {e}"))?;
        if !cs
            .is_satisfied()
            .map_err(|e| anyhow!("constraint check failed: {e}"))?
        {
            bail!("witness does not satisfy the protection circuit");
        }

        let mut rng = ark_std::rand::thread_rng();
        let proof = Groth16::<Bn254>::prove(&self.pk, ProtectionCircuit::new(inputs), &mut rng)
            .map_err(|e| anyhow!("Groth16 proof generation failed: {e}"))?;

        let public_signals = circuit::public_inputs(inputs)
            .into_iter()
            .map(FieldElement::from)
            .collect();

        Ok(ProverOutput {
            proof: to_payload(&proof),
            public_signals,
        })
    }

    fn verify(&self, public_signals: &[FieldElement], proof: &ProofPayload) -> Result<bool> {
        let formatted = format_proof_for_verifier(proof).context("proof payload malformed")?;
        self.verifier.verify_proof(public_signals, &formatted)
    }
}

impl ProofVerifier for Groth16Backend {
    fn verify_proof(&self, public_signals: &[FieldElement], proof: &VerifierProof) -> Result<bool> {
        self.verifier.verify_proof(public_signals, proof)
    }
}

// ---------------------------------------------------------------------------
// Groth16Verifier
// ---------------------------------------------------------------------------

/// The verification key alone. Small, cheap to clone, safe to hand out.
#[derive(Clone)]
pub struct Groth16Verifier {
    vk: VerifyingKey<Bn254>,
}

impl Groth16Verifier {
    pub(crate) fn from_vk(vk: VerifyingKey<Bn254>) -> Self {
        Self { vk }
    }

    /// Read a verifying key written by [`Groth16Verifier::write`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open verifying key {}", path.display()))?;
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(BufReader::new(file))
            .map_err(|e| anyhow!("invalid verifying key {}: {e}", path.display()))?;
        Ok(Self { vk })
    }

    /// Write the verifying key to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.vk
            .serialize_compressed(&mut writer)
            .map_err(|e| anyhow!("verifying key serialization failed: {e}"))?;
        writer
            .flush()
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Compressed verifying key bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.vk
            .serialize_compressed(&mut bytes)
            .map_err(|e| anyhow!("verifying key serialization failed: {e}"))?;
        Ok(bytes)
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify_proof(&self, public_signals: &[FieldElement], proof: &VerifierProof) -> Result<bool> {
        if public_signals.len() != PUBLIC_SIGNAL_COUNT {
            bail!(
                "expected {PUBLIC_SIGNAL_COUNT} public signals, got {}",
                public_signals.len()
            );
        }
        let ark_proof = from_verifier_proof(proof)?;
        let inputs: Vec<Fr> = public_signals.iter().map(FieldElement::inner).collect();

        Groth16::<Bn254>::verify(&self.vk, &inputs, &ark_proof)
            .map_err(|e| anyhow!("Groth16 verification algorithm failed: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Coordinate conversion
// ---------------------------------------------------------------------------

fn fq_to_decimal(value: Fq) -> String {
    U256(value.into_bigint().0).to_string()
}

fn fq_from_u256(value: U256) -> Result<Fq> {
    Fq::from_bigint(BigInt::new(value.0))
        .ok_or_else(|| anyhow!("coordinate {value} exceeds the base field modulus"))
}

fn to_payload(proof: &Proof<Bn254>) -> ProofPayload {
    let g1 = |p: &G1Affine| vec![fq_to_decimal(p.x), fq_to_decimal(p.y), "1".to_string()];
    ProofPayload {
        pi_a: g1(&proof.a),
        pi_b: vec![
            vec![fq_to_decimal(proof.b.x.c0), fq_to_decimal(proof.b.x.c1)],
            vec![fq_to_decimal(proof.b.y.c0), fq_to_decimal(proof.b.y.c1)],
            vec!["1".to_string(), "0".to_string()],
        ],
        pi_c: g1(&proof.c),
        protocol: "groth16".to_string(),
        curve: "bn128".to_string(),
    }
}

fn g1_from_coords(x: U256, y: U256) -> Result<G1Affine> {
    let point = G1Affine::new_unchecked(fq_from_u256(x)?, fq_from_u256(y)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        bail!("G1 point ({x}, {y}) is not on the curve");
    }
    Ok(point)
}

fn from_verifier_proof(proof: &VerifierProof) -> Result<Proof<Bn254>> {
    let a = g1_from_coords(proof.a[0], proof.a[1])?;
    let c = g1_from_coords(proof.c[0], proof.c[1])?;

    // Verifier layout is [imaginary, real]; arkworks wants (c0, c1).
    let bx = Fq2::new(fq_from_u256(proof.b[0][1])?, fq_from_u256(proof.b[0][0])?);
    let by = Fq2::new(fq_from_u256(proof.b[1][1])?, fq_from_u256(proof.b[1][0])?);
    let b = G2Affine::new_unchecked(bx, by);
    if !b.is_on_curve() || !b.is_in_correct_subgroup_assuming_on_curve() {
        bail!("G2 point is not on the curve");
    }

    Ok(Proof { a, b, c })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
