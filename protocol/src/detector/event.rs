//! MEV findings.

use std::fmt;

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pattern families the detector recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MevKind {
    Sandwich,
    FrontRun,
    Arbitrage,
}

impl fmt::Display for MevKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MevKind::Sandwich => write!(f, "sandwich"),
            MevKind::FrontRun => write!(f, "front_run"),
            MevKind::Arbitrage => write!(f, "arbitrage"),
        }
    }
}

/// One detected pattern instance. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MevEvent {
    pub id: Uuid,
    pub kind: MevKind,
    pub attacker: Address,
    pub victim: Option<Address>,
    /// Advisory only. A configured placeholder, not a reconstruction of
    /// pool state.
    pub estimated_profit: U256,
    /// `None` for findings from the pending pool.
    pub block_number: Option<u64>,
    /// Implicated transactions in block (or observation) order. Never empty.
    pub transaction_refs: Vec<H256>,
    pub detected_at: DateTime<Utc>,
}

impl MevEvent {
    pub fn new(
        kind: MevKind,
        attacker: Address,
        victim: Option<Address>,
        estimated_profit: U256,
        block_number: Option<u64>,
        transaction_refs: Vec<H256>,
    ) -> Self {
        debug_assert!(!transaction_refs.is_empty(), "an event implicates at least one tx");
        Self {
            id: Uuid::new_v4(),
            kind,
            attacker,
            victim,
            estimated_profit,
            block_number,
            transaction_refs,
            detected_at: Utc::now(),
        }
    }
}
