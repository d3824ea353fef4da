//! # Protocol Configuration & Constants
//!
//! Every magic number in the protection flow and the detector lives here.
//! If you're hardcoding a gas threshold somewhere else, you're doing it wrong
//! and you owe the team coffee.
//!
//! Two kinds of things live in this file:
//!
//! - `const` defaults that describe the protocol (delay window, selectors,
//!   placeholder profit estimates).
//! - serde-deserialisable config structs ([`ProtectionConfig`],
//!   [`DetectorConfig`]) that start from those defaults and can be overridden
//!   from the node's TOML file.

use std::time::Duration;

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::detector::rules::parse_selector;
use crate::error::ProtectionError;

// ---------------------------------------------------------------------------
// Commit-Reveal Timing
// ---------------------------------------------------------------------------

/// Blocks a commitment must age before it may be revealed. Two blocks is
/// long enough that the commitment is buried under somebody else's block,
/// short enough that the user doesn't notice.
pub const DEFAULT_MIN_DELAY_BLOCKS: u64 = 2;

/// Blocks after which an unrevealed commitment expires. Past this point the
/// market has moved and the committed swap is no longer what the user wanted.
pub const DEFAULT_MAX_DELAY_BLOCKS: u64 = 10;

/// How often the reveal scheduler polls block height. Eligibility is a
/// function of block height, not wall-clock time, so this is a poll, not a
/// timer per commitment.
pub const DEFAULT_REVEAL_POLL_INTERVAL_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Default protection fee charged by the protector contract: 0.001 ETH.
pub const DEFAULT_PROTECTION_FEE_WEI: u64 = 1_000_000_000_000_000;

/// Upper bound the contract owner may raise the fee to: 0.01 ETH.
pub const MAX_PROTECTION_FEE_WEI: u64 = 10_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Detector Heuristics
// ---------------------------------------------------------------------------

/// Reference gas price the spike rule compares against, in gwei.
pub const DEFAULT_REFERENCE_GAS_PRICE_GWEI: u64 = 20;

/// Gas price multiple (in basis points) above which a DEX call looks like it
/// is trying to jump the queue. 15 000 bps = 1.5x the reference.
pub const DEFAULT_GAS_SPIKE_MULTIPLIER_BPS: u64 = 15_000;

/// Basis-point denominator. 10 000 bps = 1x.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Call payloads strictly larger than this many bytes are treated as
/// multi-hop (arbitrage-shaped) when they also hit a DEX entry point.
pub const DEFAULT_ARBITRAGE_PAYLOAD_BYTES: usize = 1000;

/// Number of recent pending DEX calls remembered by the copy-cat rule.
pub const DEFAULT_COPYCAT_WINDOW: usize = 256;

/// Function selectors of the common router entry points.
pub const DEFAULT_DEX_SELECTORS: [&str; 4] = [
    "0x7ff36ab5", // swapExactETHForTokens
    "0x18cbafe5", // swapExactTokensForETH
    "0x38ed1739", // swapExactTokensForTokens
    "0x8803dbee", // swapTokensForExactTokens
];

/// Placeholder profit for a completed sandwich: 0.05 ETH, in gwei.
/// Exact profit needs pool-state replay, which the detector does not do.
pub const DEFAULT_SANDWICH_PROFIT_GWEI: u64 = 50_000_000;

/// Placeholder profit for a detected arbitrage: 0.1 ETH, in gwei.
pub const DEFAULT_ARBITRAGE_PROFIT_GWEI: u64 = 100_000_000;

/// Placeholder profit for a pending front-run. Unknown until it lands.
pub const DEFAULT_FRONTRUN_PROFIT_GWEI: u64 = 0;

/// Capacity of the findings queue between the intake tasks and the
/// aggregator. Intake waits when the aggregator falls behind.
pub const DEFAULT_FINDINGS_CHANNEL_CAPACITY: usize = 1024;

/// Number of MEV events kept in memory for `recent_events`.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// Unit helpers
// ---------------------------------------------------------------------------

/// Converts gwei to wei.
pub fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(9)
}

// ---------------------------------------------------------------------------
// ProtectionConfig
// ---------------------------------------------------------------------------

/// Tunables for the commit-reveal half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Minimum commitment age (in blocks) before reveal.
    pub min_delay_blocks: u64,

    /// Maximum commitment age (in blocks) at which reveal is still accepted.
    pub max_delay_blocks: u64,

    /// Reveal scheduler poll cadence in milliseconds.
    pub reveal_poll_interval_ms: u64,

    /// Verify each freshly generated proof locally before submitting the
    /// commitment. Costs a few milliseconds, saves a wasted fee.
    pub self_verify: bool,

    /// Ask the ledger `is_ready_for_reveal` before each reveal submission.
    pub confirm_with_ledger: bool,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            min_delay_blocks: DEFAULT_MIN_DELAY_BLOCKS,
            max_delay_blocks: DEFAULT_MAX_DELAY_BLOCKS,
            reveal_poll_interval_ms: DEFAULT_REVEAL_POLL_INTERVAL_MS,
            self_verify: true,
            confirm_with_ledger: true,
        }
    }
}

impl ProtectionConfig {
    /// Rejects configurations that would make every commitment unrevealable
    /// or the scheduler spin.
    pub fn validate(&self) -> Result<(), ProtectionError> {
        if self.min_delay_blocks > self.max_delay_blocks {
            return Err(ProtectionError::InvalidConfig(format!(
                "min_delay_blocks ({}) exceeds max_delay_blocks ({})",
                self.min_delay_blocks, self.max_delay_blocks
            )));
        }
        if self.reveal_poll_interval_ms == 0 {
            return Err(ProtectionError::InvalidConfig(
                "reveal_poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Poll cadence as a [`Duration`].
    pub fn reveal_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// DetectorConfig
// ---------------------------------------------------------------------------

/// Tunables for the MEV pattern detector.
///
/// Gas and profit values are in gwei so that they survive a round trip
/// through TOML (which tops out at i64).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Reference gas price for the spike rule, in gwei.
    pub reference_gas_price_gwei: u64,

    /// Spike threshold as a multiple of the reference, in basis points.
    pub gas_spike_multiplier_bps: u64,

    /// Payload size (bytes) a DEX call must exceed to count as arbitrage.
    pub arbitrage_payload_threshold: usize,

    /// Hex-encoded 4-byte selectors identifying DEX entry points.
    pub dex_selectors: Vec<String>,

    /// How many recent pending DEX calls the copy-cat rule remembers.
    /// Zero disables the rule.
    pub copycat_window: usize,

    /// Placeholder profit for a sandwich, in gwei.
    pub sandwich_profit_gwei: u64,

    /// Placeholder profit for an arbitrage, in gwei.
    pub arbitrage_profit_gwei: u64,

    /// Placeholder profit for a front-run, in gwei.
    pub frontrun_profit_gwei: u64,

    /// Capacity of the bounded findings queue.
    pub channel_capacity: usize,

    /// Number of events retained for `recent_events`.
    pub history_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            reference_gas_price_gwei: DEFAULT_REFERENCE_GAS_PRICE_GWEI,
            gas_spike_multiplier_bps: DEFAULT_GAS_SPIKE_MULTIPLIER_BPS,
            arbitrage_payload_threshold: DEFAULT_ARBITRAGE_PAYLOAD_BYTES,
            dex_selectors: DEFAULT_DEX_SELECTORS.iter().map(|s| s.to_string()).collect(),
            copycat_window: DEFAULT_COPYCAT_WINDOW,
            sandwich_profit_gwei: DEFAULT_SANDWICH_PROFIT_GWEI,
            arbitrage_profit_gwei: DEFAULT_ARBITRAGE_PROFIT_GWEI,
            frontrun_profit_gwei: DEFAULT_FRONTRUN_PROFIT_GWEI,
            channel_capacity: DEFAULT_FINDINGS_CHANNEL_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl DetectorConfig {
    /// Checks ranges and that every selector parses.
    pub fn validate(&self) -> Result<(), ProtectionError> {
        if self.gas_spike_multiplier_bps == 0 {
            return Err(ProtectionError::InvalidConfig(
                "gas_spike_multiplier_bps must be positive".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ProtectionError::InvalidConfig(
                "channel_capacity must be positive".into(),
            ));
        }
        if self.dex_selectors.is_empty() {
            return Err(ProtectionError::InvalidConfig(
                "at least one DEX selector is required".into(),
            ));
        }
        for selector in &self.dex_selectors {
            if parse_selector(selector).is_none() {
                return Err(ProtectionError::InvalidConfig(format!(
                    "invalid function selector: {selector}"
                )));
            }
        }
        Ok(())
    }

    /// Reference gas price in wei.
    pub fn reference_gas_price(&self) -> U256 {
        gwei(self.reference_gas_price_gwei)
    }
}
