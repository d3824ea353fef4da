//! # Proof Orchestrator
//!
//! Request in, `{commitment_hash, proof, public_signals}` out. Encoding runs
//! first and synchronously, so an out-of-range amount fails before the prover
//! is ever touched. Proving runs on tokio's blocking pool; dropping the
//! returned future abandons the request without touching any shared state.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ProtectionRequest;
use crate::encoding::{encode_address, encode_field, encode_u64, FieldElement};
use crate::error::ProtectionError;
use crate::zkp::{
    CircuitInputs, ProofPayload, ProverOutput, ProvingSystem, COMMITMENT_SIGNAL_INDEX,
};

/// The result of proving a protection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionProof {
    pub commitment_hash: FieldElement,
    pub proof: ProofPayload,
    pub public_signals: Vec<FieldElement>,
}

pub struct ProofOrchestrator {
    prover: Arc<dyn ProvingSystem>,
    self_verify: bool,
}

impl ProofOrchestrator {
    pub fn new(prover: Arc<dyn ProvingSystem>, self_verify: bool) -> Self {
        Self {
            prover,
            self_verify,
        }
    }

    /// Encode a request into circuit inputs. Pure.
    pub fn circuit_inputs(
        request: &ProtectionRequest,
        block_number: u64,
    ) -> Result<CircuitInputs, ProtectionError> {
        let swap = &request.swap;
        Ok(CircuitInputs {
            token_in: encode_address(swap.token_in),
            token_out: encode_address(swap.token_out),
            amount_in: encode_field("amount_in", swap.amount_in)?,
            amount_out_min: encode_field("amount_out_min", swap.amount_out_min)?,
            deadline: encode_u64(swap.deadline),
            owner: encode_address(request.owner),
            nonce: encode_u64(request.nonce),
            block_number: encode_u64(block_number),
            signal_hash: request.signal_hash(),
        })
    }

    /// Prove `request` against `block_number`. Exactly one `prove` call.
    pub async fn build_protection_proof(
        &self,
        request: &ProtectionRequest,
        block_number: u64,
    ) -> Result<ProtectionProof, ProtectionError> {
        let inputs = Self::circuit_inputs(request, block_number)?;
        let prover = Arc::clone(&self.prover);
        let self_verify = self.self_verify;

        let started = Instant::now();
        let output = tokio::task::spawn_blocking(move || -> anyhow::Result<ProverOutput> {
            let output = prover.prove(&inputs)?;
            if self_verify && !prover.verify(&output.public_signals, &output.proof)? {
                return Err(anyhow!("generated proof failed local verification"));
            }
            Ok(output)
        })
        .await
        .map_err(|e| ProtectionError::ProofGenerationFailed(anyhow!("prover task failed: {e}")))?
        .map_err(|e| {
            warn!(owner = ?request.owner, error = %e, "proof generation failed");
            ProtectionError::ProofGenerationFailed(e)
        })?;

        let commitment_hash = *output
            .public_signals
            .get(COMMITMENT_SIGNAL_INDEX)
            .ok_or_else(|| ProtectionError::MalformedProof("prover returned no public signals".into()))?;

        debug!(
            commitment = %commitment_hash,
            elapsed_ms = started.elapsed().as_millis() as u64,
            signals = output.public_signals.len(),
            "protection proof generated"
        );

        Ok(ProtectionProof {
            commitment_hash,
            proof: output.proof,
            public_signals: output.public_signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{encode_amount, field_modulus};
    use crate::protection::SwapParams;
    use ethers_core::types::{Address, U256};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; echoes the commitment computed from the inputs.
    #[derive(Default)]
    struct CountingProver {
        calls: AtomicUsize,
        fail: bool,
        empty_signals: bool,
        reject_self_check: bool,
    }

    impl ProvingSystem for CountingProver {
        fn prove(&self, inputs: &CircuitInputs) -> anyhow::Result<ProverOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("witness generation exploded");
            }
            let public_signals = if self.empty_signals {
                vec![]
            } else {
                vec![inputs.commitment(), inputs.nullifier()]
            };
            Ok(ProverOutput {
                proof: ProofPayload {
                    pi_a: vec!["1".into(), "2".into(), "1".into()],
                    pi_b: vec![vec!["3".into(), "4".into()], vec!["5".into(), "6".into()]],
                    pi_c: vec!["7".into(), "8".into(), "1".into()],
                    protocol: "groth16".into(),
                    curve: "bn128".into(),
                },
                public_signals,
            })
        }

        fn verify(&self, _: &[FieldElement], _: &ProofPayload) -> anyhow::Result<bool> {
            Ok(!self.reject_self_check)
        }
    }

    fn request(amount_in: U256) -> ProtectionRequest {
        ProtectionRequest::with_nonce(
            SwapParams {
                token_in: Address::repeat_byte(0x01),
                token_out: Address::repeat_byte(0x02),
                amount_in,
                amount_out_min: U256::from(990),
                deadline: 1_800_000_000,
            },
            Address::repeat_byte(0x0a),
            42,
        )
    }

    #[tokio::test]
    async fn commitment_is_first_public_signal() {
        let prover = Arc::new(CountingProver::default());
        let orchestrator = ProofOrchestrator::new(prover.clone(), true);

        let proof = orchestrator
            .build_protection_proof(&request(U256::from(1000)), 100)
            .await
            .unwrap();

        let expected = ProofOrchestrator::circuit_inputs(&request(U256::from(1000)), 100)
            .unwrap()
            .commitment();
        assert_eq!(proof.commitment_hash, expected);
        assert_eq!(proof.public_signals[0], proof.commitment_hash);
        assert_eq!(prover.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overflow_never_reaches_prover() {
        let prover = Arc::new(CountingProver::default());
        let orchestrator = ProofOrchestrator::new(prover.clone(), true);

        let err = orchestrator
            .build_protection_proof(&request(field_modulus()), 100)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProtectionError::EncodingOverflow { field: "amount_in", .. }
        ));
        assert_eq!(prover.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prover_error_is_propagated() {
        let prover = Arc::new(CountingProver {
            fail: true,
            ..Default::default()
        });
        let orchestrator = ProofOrchestrator::new(prover, false);
        let err = orchestrator
            .build_protection_proof(&request(U256::from(1)), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, ProtectionError::ProofGenerationFailed(_)));
        assert!(err.to_string().contains("witness generation exploded"));
    }

    #[tokio::test]
    async fn failed_self_check_is_generation_failure() {
        let prover = Arc::new(CountingProver {
            reject_self_check: true,
            ..Default::default()
        });
        let orchestrator = ProofOrchestrator::new(prover, true);
        let err = orchestrator
            .build_protection_proof(&request(U256::from(1)), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtectionError::ProofGenerationFailed(_)));
    }

    #[tokio::test]
    async fn empty_signals_are_malformed() {
        let prover = Arc::new(CountingProver {
            empty_signals: true,
            ..Default::default()
        });
        let orchestrator = ProofOrchestrator::new(prover, false);
        let err = orchestrator
            .build_protection_proof(&request(U256::from(1)), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtectionError::MalformedProof(_)));
    }

    #[test]
    fn inputs_encode_every_field() {
        let req = request(U256::from(1000));
        let inputs = ProofOrchestrator::circuit_inputs(&req, 77).unwrap();
        assert_eq!(inputs.amount_in, encode_amount(U256::from(1000)).unwrap());
        assert_eq!(inputs.owner, encode_address(req.owner));
        assert_eq!(inputs.nonce, encode_u64(42));
        assert_eq!(inputs.block_number, encode_u64(77));
        assert_eq!(inputs.signal_hash, req.signal_hash());
    }

    #[test]
    fn overflow_in_min_out_is_named() {
        let mut req = request(U256::from(1));
        req.swap.amount_out_min = U256::MAX;
        let err = ProofOrchestrator::circuit_inputs(&req, 1).unwrap_err();
        assert!(matches!(
            err,
            ProtectionError::EncodingOverflow { field: "amount_out_min", .. }
        ));
    }
}
