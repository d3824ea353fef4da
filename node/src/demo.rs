//! `zkmev-node demo`: one protected swap end to end, then a sandwiched block
//! through the monitor. Everything runs in-process against a fresh devnet.

use anyhow::{Context, Result};
use ethers_core::types::{Address, Block, Bytes, Transaction, H256, U256, U64};
use parking_lot::RwLock;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

use zkmev_contracts::{LocalLedger, MevProtector};
use zkmev_protocol::alert::{Alert, AlertSink, MemoryAlertSink, MultiSink, TracingAlertSink};
use zkmev_protocol::config::{gwei, DetectorConfig, ProtectionConfig};
use zkmev_protocol::detector::{BroadcastFeed, MevDetector};
use zkmev_protocol::ledger::Ledger;
use zkmev_protocol::protection::{ProtectionService, SwapParams};
use zkmev_protocol::zkp::Groth16Backend;

/// `swapExactTokensForTokens`.
const SWAP_SELECTOR: [u8; 4] = [0x38, 0xed, 0x17, 0x39];

pub async fn run(seed: u64) -> Result<()> {
    println!("== setup ==");
    let backend = tokio::task::spawn_blocking(move || {
        Groth16Backend::setup(&mut rand::rngs::StdRng::seed_from_u64(seed))
    })
    .await
    .context("setup task panicked")??;
    let backend = Arc::new(backend);
    println!("  circuit setup done (seed {seed})");

    let owner = Address::repeat_byte(0x01);
    let account = Address::repeat_byte(0x02);
    let contract = Arc::new(RwLock::new(MevProtector::new(owner, Arc::new(backend.verifier()))));
    let ledger: Arc<dyn Ledger> = Arc::new(LocalLedger::new(contract.clone(), account));

    let memory = Arc::new(MemoryAlertSink::new());
    let alerts: Arc<dyn AlertSink> = Arc::new(
        MultiSink::new()
            .with(Arc::new(TracingAlertSink))
            .with(memory.clone()),
    );
    let protection = ProtectionConfig::default();
    let min_delay = protection.min_delay_blocks;
    let service = ProtectionService::new(backend, ledger.clone(), alerts.clone(), protection)?;

    println!("== protect ==");
    let swap = SwapParams {
        token_in: Address::repeat_byte(0xa1),
        token_out: Address::repeat_byte(0xb2),
        amount_in: U256::exp10(18),
        amount_out_min: U256::exp10(17) * 9,
        deadline: 1_800_000_000,
    };
    let receipt = service.protect(swap, Address::repeat_byte(0x0f)).await?;
    println!("  commitment      {}", receipt.commitment_hash);
    println!("  transaction     {:?}", receipt.transaction_hash);
    println!("  reveal at block {}", receipt.estimated_reveal_height);
    println!("  status          {}", service.reveal_status(receipt.commitment_hash).await?);

    println!("== reveal ==");
    let height = contract.write().mine(min_delay);
    println!("  mined to block  {height}");
    println!("  status          {}", service.reveal_status(receipt.commitment_hash).await?);
    let report = service.scheduler().tick(ledger.current_height().await?).await;
    println!("  tick revealed   {}", report.revealed.len());
    println!("  status          {}", service.reveal_status(receipt.commitment_hash).await?);
    println!("  contract fees   {} wei", contract.read().balance());

    println!("== detect ==");
    let detector = MevDetector::new(DetectorConfig::default(), alerts)?;
    let feed = BroadcastFeed::new(16);
    detector.start_monitoring(&feed);

    let attacker = Address::repeat_byte(0x66);
    let mut victim = swap_tx(2, Address::repeat_byte(0x0f), &[], 20);
    victim.input = Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]);
    feed.push_block(Block {
        number: Some(U64::from(height + 1)),
        transactions: vec![
            swap_tx(1, attacker, &[1], 40),
            victim,
            swap_tx(3, attacker, &[2], 18),
        ],
        ..Default::default()
    });

    let mut stats = detector.subscribe_statistics();
    tokio::time::timeout(Duration::from_secs(5), stats.wait_for(|s| s.blocks_observed == 1))
        .await
        .context("detector did not process the block")??;
    detector.stop_monitoring().await;

    for event in detector.recent_events(10) {
        println!(
            "  {} by {:?} against {:?} in block {:?}",
            event.kind, event.attacker, event.victim, event.block_number
        );
    }
    let snapshot = detector.get_statistics();
    println!("  sandwiches      {}", snapshot.sandwich_attacks);
    println!("  value extracted {} wei", snapshot.total_value_extracted);

    let revealed = memory
        .alerts()
        .iter()
        .filter(|a| matches!(a, Alert::CommitmentRevealed { .. }))
        .count();
    println!("== done ({revealed} reveal, {} alerts) ==", memory.len());

    service.shutdown().await;
    Ok(())
}

fn swap_tx(n: u8, from: Address, tail: &[u8], gas_gwei: u64) -> Transaction {
    let mut input = SWAP_SELECTOR.to_vec();
    input.extend_from_slice(tail);
    Transaction {
        hash: H256::repeat_byte(n),
        from,
        to: Some(Address::repeat_byte(0x77)),
        input: Bytes::from(input),
        gas_price: Some(gwei(gas_gwei)),
        ..Default::default()
    }
}
