//! # ZK-MEV Protector Contract
//!
//! A faithful in-memory model of the on-ledger protector contract, plus a
//! [`Ledger`](zkmev_protocol::ledger::Ledger) adapter over it. The devnet
//! node runs against it and so do the end-to-end tests.
//!
//! - **protector** — Fee collection, commitment registry, reveal window,
//!   proof verification, nullifier tracking, MEV reports and the event log.
//! - **ledger** — [`LocalLedger`]: the protection flow's view of a shared
//!   [`MevProtector`].
//!
//! ## Design Principles
//!
//! 1. Automine: every state-changing call lands in a fresh block, the way a
//!    development chain behaves. `mine` advances the clock without a
//!    transaction.
//! 2. Monetary arithmetic is checked. Wrapping arithmetic and money do not
//!    mix.
//! 3. Privileged operations name their caller and are gated on the owner.
//! 4. Every event is serializable (serde) so the node can expose the log.

pub mod ledger;
pub mod protector;

pub use ledger::LocalLedger;
pub use protector::{CommitmentInfo, ContractError, ContractEvent, MevProtector};
