//! End-to-end integration tests for the protection core.
//!
//! Two halves. The proof path runs a real Groth16 setup and checks that what
//! the orchestrator produces survives formatting and verification the way a
//! ledger would receive it. The detector path pushes chain notifications
//! through a feed and watches alerts and the audit trail come out the other
//! side.
//!
//! The Groth16 setup is shared across the binary; everything else is built
//! per test.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ark_std::rand::{rngs::StdRng, SeedableRng};
use ethers_core::types::{Address, Block, Bytes, Transaction, H256, U256, U64};

use zkmev_protocol::alert::{Alert, BroadcastAlertSink, MemoryAlertSink, MultiSink};
use zkmev_protocol::config::{gwei, DetectorConfig};
use zkmev_protocol::detector::{BroadcastFeed, JsonlAuditSink, MevDetector, MevEvent, MevKind};
use zkmev_protocol::encoding::FieldElement;
use zkmev_protocol::protection::{ProofOrchestrator, ProtectionRequest, SwapParams};
use zkmev_protocol::zkp::{
    format_proof_for_verifier, Groth16Backend, Groth16Verifier, ProofVerifier, COMMITMENT_SIGNAL_INDEX,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn backend() -> Arc<Groth16Backend> {
    static BACKEND: OnceLock<Arc<Groth16Backend>> = OnceLock::new();
    BACKEND
        .get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(7);
            Arc::new(Groth16Backend::setup(&mut rng).expect("circuit setup"))
        })
        .clone()
}

fn request(nonce: u64) -> ProtectionRequest {
    ProtectionRequest::with_nonce(
        SwapParams {
            token_in: Address::repeat_byte(0xa1),
            token_out: Address::repeat_byte(0xb2),
            amount_in: U256::exp10(18),
            amount_out_min: U256::exp10(17) * 9,
            deadline: 1_800_000_000,
        },
        Address::repeat_byte(0x0f),
        nonce,
    )
}

fn swap_tx(n: u8, from: u8, tail: &[u8], gas_gwei: u64) -> Transaction {
    let mut input = vec![0x38, 0xed, 0x17, 0x39];
    input.extend_from_slice(tail);
    Transaction {
        hash: H256::repeat_byte(n),
        from: Address::repeat_byte(from),
        to: Some(Address::repeat_byte(0x77)),
        input: Bytes::from(input),
        gas_price: Some(gwei(gas_gwei)),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Proof path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrated_proof_verifies_in_ledger_layout() {
    let orchestrator = ProofOrchestrator::new(backend(), true);
    let proof = orchestrator.build_protection_proof(&request(1), 420).await.unwrap();

    assert_eq!(proof.public_signals[COMMITMENT_SIGNAL_INDEX], proof.commitment_hash);
    assert_eq!(proof.proof.protocol, "groth16");

    let formatted = format_proof_for_verifier(&proof.proof).unwrap();
    let verifier = backend().verifier();
    assert!(verifier.verify_proof(&proof.public_signals, &formatted).unwrap());
}

#[tokio::test]
async fn tampered_signals_do_not_verify() {
    let orchestrator = ProofOrchestrator::new(backend(), false);
    let proof = orchestrator.build_protection_proof(&request(2), 10).await.unwrap();
    let formatted = format_proof_for_verifier(&proof.proof).unwrap();
    let verifier = backend().verifier();

    for index in 0..proof.public_signals.len() {
        let mut signals = proof.public_signals.clone();
        signals[index] = FieldElement::from(12345u64);
        assert!(
            !verifier.verify_proof(&signals, &formatted).unwrap(),
            "signal {index} is bound by the proof"
        );
    }
}

#[tokio::test]
async fn commitment_is_stable_across_heights_and_nonce_sensitive() {
    let orchestrator = ProofOrchestrator::new(backend(), false);
    let a = orchestrator.build_protection_proof(&request(3), 10).await.unwrap();
    let b = orchestrator.build_protection_proof(&request(3), 11).await.unwrap();
    let c = orchestrator.build_protection_proof(&request(4), 10).await.unwrap();

    assert_eq!(a.commitment_hash, b.commitment_hash);
    assert_ne!(a.commitment_hash, c.commitment_hash);
}

#[tokio::test]
async fn verifying_key_survives_disk() {
    let dir = tempfile::tempdir().unwrap();
    let vk_path = dir.path().join("verifying.key");
    backend().verifier().write(&vk_path).unwrap();
    let loaded = Groth16Verifier::load(&vk_path).unwrap();

    let orchestrator = ProofOrchestrator::new(backend(), false);
    let proof = orchestrator.build_protection_proof(&request(5), 1).await.unwrap();
    let formatted = format_proof_for_verifier(&proof.proof).unwrap();
    assert!(loaded.verify_proof(&proof.public_signals, &formatted).unwrap());
}

// ---------------------------------------------------------------------------
// Detector path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detector_feeds_alerts_and_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("mev.jsonl");

    let broadcast = Arc::new(BroadcastAlertSink::new(64));
    let memory = Arc::new(MemoryAlertSink::new());
    let mut alerts = broadcast.subscribe();
    let sink = MultiSink::new().with(broadcast.clone()).with(memory.clone());

    let detector = MevDetector::new(DetectorConfig::default(), Arc::new(sink))
        .unwrap()
        .with_audit_sink(Arc::new(JsonlAuditSink::open(&audit_path).unwrap()));
    let feed = BroadcastFeed::new(64);
    assert!(detector.start_monitoring(&feed));

    // Front-run at 2x the reference gas price.
    feed.push_pending(swap_tx(1, 0x01, &[], 40));
    // Sandwich around a plain transfer, plus a fat multi-hop call.
    let mut transfer = swap_tx(3, 0x02, &[], 20);
    transfer.input = Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]);
    feed.push_block(Block {
        number: Some(U64::from(900)),
        transactions: vec![
            swap_tx(2, 0x09, &[1], 30),
            transfer,
            swap_tx(4, 0x09, &[2], 18),
            swap_tx(5, 0x05, &[0u8; 1100], 20),
        ],
        ..Default::default()
    });

    let mut stats = detector.subscribe_statistics();
    tokio::time::timeout(
        Duration::from_secs(5),
        stats.wait_for(|s| s.pending_observed == 1 && s.blocks_observed == 1),
    )
    .await
    .expect("detector did not catch up")
    .unwrap();
    detector.stop_monitoring().await;

    let snapshot = detector.get_statistics();
    assert_eq!(snapshot.front_running, 1);
    assert_eq!(snapshot.sandwich_attacks, 1);
    assert_eq!(snapshot.arbitrage, 1);
    assert_eq!(snapshot.total_value_extracted, gwei(50_000_000 + 100_000_000));

    let first = alerts.recv().await.unwrap();
    assert!(matches!(first, Alert::SuspiciousTransaction { .. } | Alert::MevDetected(_)));
    let mev_alerts: Vec<MevEvent> = memory
        .alerts()
        .into_iter()
        .filter_map(|a| match a {
            Alert::MevDetected(event) => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(mev_alerts.len(), 3);

    let sandwich = mev_alerts.iter().find(|e| e.kind == MevKind::Sandwich).unwrap();
    assert_eq!(sandwich.victim, Some(Address::repeat_byte(0x02)));
    assert_eq!(sandwich.block_number, Some(900));

    let trail = std::fs::read_to_string(&audit_path).unwrap();
    assert_eq!(trail.lines().count(), 3);
}
