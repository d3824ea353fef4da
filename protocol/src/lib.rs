// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZK-MEV Protection — Core Library
//!
//! Front-running bots read the mempool faster than you can say "slippage".
//! This crate takes the intent out of the mempool: a swap is first published
//! as an opaque commitment hash, left to sit for a few blocks, and only then
//! revealed and executed together with a Groth16 proof that the revealed
//! parameters are exactly the ones that were committed to.
//!
//! Alongside the protection flow lives a detector that watches the pending
//! pool and confirmed blocks and flags the usual suspects: sandwiches,
//! front-runs and arbitrage.
//!
//! ## Architecture
//!
//! - **encoding** — Domain values (addresses, amounts, heights) into BN254
//!   scalar field elements, plus the circuit-friendly MiMC sponge.
//! - **zkp** — The proving-system seam and a Groth16 backend for it.
//! - **protection** — Proof orchestration, the commitment arena, the reveal
//!   scheduler and the caller-facing service.
//! - **ledger** — The contract the core expects from the chain.
//! - **detector** — Heuristic MEV classification and running statistics.
//! - **alert** — The sink that both halves report into.
//! - **config** — Constants and tunables. Every magic number lives here.
//! - **error** — The error taxonomy for the protection flow.
//!
//! ## Design Philosophy
//!
//! 1. Status is derived from block height, never cached. Heights don't lie.
//! 2. One reveal in flight per commitment. Fees are not a hobby.
//! 3. Detection is best-effort and never takes the monitor down.
//! 4. If it touches a commitment, it has tests. Plural.

pub mod alert;
pub mod config;
pub mod detector;
pub mod encoding;
pub mod error;
pub mod ledger;
pub mod protection;
pub mod zkp;

pub use error::ProtectionError;
