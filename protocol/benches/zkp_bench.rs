// Proof pipeline benchmarks.
//
// Covers the native MiMC sponge, Groth16 setup, proof generation and
// verification for the protection circuit over BN254.

use criterion::{criterion_group, criterion_main, Criterion};

use ark_bn254::Fr;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use ethers_core::types::{Address, U256};

use zkmev_protocol::encoding::mimc;
use zkmev_protocol::protection::{ProofOrchestrator, ProtectionRequest, SwapParams};
use zkmev_protocol::zkp::{format_proof_for_verifier, Groth16Backend, ProofVerifier, ProvingSystem};

fn request() -> ProtectionRequest {
    ProtectionRequest::with_nonce(
        SwapParams {
            token_in: Address::repeat_byte(0xa1),
            token_out: Address::repeat_byte(0xb2),
            amount_in: U256::exp10(18),
            amount_out_min: U256::exp10(17),
            deadline: 1_800_000_000,
        },
        Address::repeat_byte(0x0f),
        42,
    )
}

fn bench_mimc_sponge(c: &mut Criterion) {
    let inputs: Vec<Fr> = (1u64..=7).map(Fr::from).collect();
    c.bench_function("zkp/mimc_sponge_7", |b| {
        b.iter(|| mimc::sponge(&inputs));
    });
}

fn bench_groth16_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("zkp");
    group.sample_size(10);
    group.bench_function("groth16_setup", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(42);
            Groth16Backend::setup(&mut rng).unwrap()
        });
    });
    group.finish();
}

fn bench_groth16_prove(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let backend = Groth16Backend::setup(&mut rng).unwrap();
    let inputs = ProofOrchestrator::circuit_inputs(&request(), 100).unwrap();

    let mut group = c.benchmark_group("zkp");
    group.sample_size(10);
    group.bench_function("groth16_prove", |b| {
        b.iter(|| backend.prove(&inputs).unwrap());
    });
    group.finish();
}

fn bench_groth16_verify(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let backend = Groth16Backend::setup(&mut rng).unwrap();
    let inputs = ProofOrchestrator::circuit_inputs(&request(), 100).unwrap();
    let output = backend.prove(&inputs).unwrap();
    let formatted = format_proof_for_verifier(&output.proof).unwrap();
    let verifier = backend.verifier();

    c.bench_function("zkp/groth16_verify", |b| {
        b.iter(|| verifier.verify_proof(&output.public_signals, &formatted).unwrap());
    });
}

criterion_group!(
    benches,
    bench_mimc_sponge,
    bench_groth16_setup,
    bench_groth16_prove,
    bench_groth16_verify,
);
criterion_main!(benches);
