//! # Classification Rules
//!
//! Heuristics, on purpose. Each rule is a tagged variant; the scanning loops
//! in [`PendingClassifier`] and [`BlockClassifier`] dispatch on the tag and
//! never need to change when a rule is added.
//!
//! ## Pending pool
//!
//! | rule        | fires when                                                            |
//! |-------------|-----------------------------------------------------------------------|
//! | `GasSpike`  | DEX call and `gas_price * 10_000 > reference * multiplier_bps`        |
//! | `Copycat`   | DEX call to the same router and selector as a recent pending DEX call |
//! |             | from someone else, at a strictly higher gas price                     |
//!
//! ## Confirmed blocks
//!
//! | rule                    | fires when                                                 |
//! |-------------------------|------------------------------------------------------------|
//! | `AdjacentSandwich`      | two consecutive DEX calls (in block order) share a sender   |
//! |                         | and carry different payloads                               |
//! | `LargePayloadArbitrage` | a DEX call's payload is larger than the threshold           |
//!
//! "Consecutive" is within the block's DEX-interacting subsequence, so a
//! victim's non-DEX transfer sitting between front- and back-run does not
//! hide the pair. "Different payload" stands in for "opposite direction";
//! it will flag unrelated same-sender trades too.

use std::collections::VecDeque;

use ethers_core::types::{Address, Block, Transaction, H256, U256};
use serde::{Deserialize, Serialize};

use super::event::{MevEvent, MevKind};
use crate::config::{gwei, DetectorConfig, BPS_DENOMINATOR};

/// Parse a `0x`-prefixed 4-byte function selector.
pub fn parse_selector(raw: &str) -> Option<[u8; 4]> {
    let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(hex_part).ok()?;
    bytes.try_into().ok()
}

/// Labels attached to a suspicious pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxTag {
    FrontRun,
    SandwichCandidate,
    Copycat,
}

// ---------------------------------------------------------------------------
// DEX matching
// ---------------------------------------------------------------------------

/// Known decentralised-exchange entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexSelectors(Vec<[u8; 4]>);

impl DexSelectors {
    pub fn new(selectors: Vec<[u8; 4]>) -> Self {
        Self(selectors)
    }

    /// Selectors from config. Unparseable entries are dropped;
    /// `DetectorConfig::validate` rejects them earlier.
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self(config.dex_selectors.iter().filter_map(|s| parse_selector(s)).collect())
    }

    /// The call's selector, if it targets a DEX entry point.
    pub fn matched(&self, tx: &Transaction) -> Option<[u8; 4]> {
        let selector: [u8; 4] = tx.input.get(..4)?.try_into().ok()?;
        self.0.contains(&selector).then_some(selector)
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.matched(tx).is_some()
    }
}

/// Placeholder profit per event kind, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitTable {
    pub sandwich: U256,
    pub front_run: U256,
    pub arbitrage: U256,
}

impl ProfitTable {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            sandwich: gwei(config.sandwich_profit_gwei),
            front_run: gwei(config.frontrun_profit_gwei),
            arbitrage: gwei(config.arbitrage_profit_gwei),
        }
    }

    pub fn for_kind(&self, kind: MevKind) -> U256 {
        match kind {
            MevKind::Sandwich => self.sandwich,
            MevKind::FrontRun => self.front_run,
            MevKind::Arbitrage => self.arbitrage,
        }
    }
}

/// Why a notification was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    MissingGasPrice,
    MissingBlockNumber,
}

// ---------------------------------------------------------------------------
// Pending rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRule {
    GasSpike {
        reference_gas_price: U256,
        multiplier_bps: u64,
    },
    Copycat {
        window: usize,
    },
}

/// Result of classifying one pending transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingVerdict {
    pub tags: Vec<TxTag>,
    pub events: Vec<MevEvent>,
}

impl PendingVerdict {
    fn tag(&mut self, tag: TxTag) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn is_suspicious(&self) -> bool {
        !self.tags.is_empty()
    }
}

#[derive(Debug, Clone)]
struct SeenCall {
    hash: H256,
    from: Address,
    to: Option<Address>,
    selector: [u8; 4],
    gas_price: U256,
}

/// Stateful classifier for one pending-transaction stream.
#[derive(Debug, Clone)]
pub struct PendingClassifier {
    rules: Vec<PendingRule>,
    dex: DexSelectors,
    profits: ProfitTable,
    recent: VecDeque<SeenCall>,
}

impl PendingClassifier {
    pub fn new(rules: Vec<PendingRule>, dex: DexSelectors, profits: ProfitTable) -> Self {
        Self {
            rules,
            dex,
            profits,
            recent: VecDeque::new(),
        }
    }

    /// Default rule set from config.
    pub fn from_config(config: &DetectorConfig) -> Self {
        let mut rules = vec![PendingRule::GasSpike {
            reference_gas_price: config.reference_gas_price(),
            multiplier_bps: config.gas_spike_multiplier_bps,
        }];
        if config.copycat_window > 0 {
            rules.push(PendingRule::Copycat {
                window: config.copycat_window,
            });
        }
        Self::new(rules, DexSelectors::from_config(config), ProfitTable::from_config(config))
    }

    pub fn classify(&mut self, tx: &Transaction) -> Result<PendingVerdict, Anomaly> {
        let gas_price = tx
            .gas_price
            .or(tx.max_fee_per_gas)
            .ok_or(Anomaly::MissingGasPrice)?;

        let mut verdict = PendingVerdict::default();
        let Some(selector) = self.dex.matched(tx) else {
            return Ok(verdict);
        };

        for rule in &self.rules {
            match rule {
                PendingRule::GasSpike {
                    reference_gas_price,
                    multiplier_bps,
                } => {
                    let lhs = gas_price.saturating_mul(U256::from(BPS_DENOMINATOR));
                    let rhs = reference_gas_price.saturating_mul(U256::from(*multiplier_bps));
                    if lhs > rhs {
                        verdict.tag(TxTag::FrontRun);
                        verdict.tag(TxTag::SandwichCandidate);
                        verdict.events.push(MevEvent::new(
                            MevKind::FrontRun,
                            tx.from,
                            None,
                            self.profits.front_run,
                            None,
                            vec![tx.hash],
                        ));
                    }
                }
                PendingRule::Copycat { .. } => {
                    let copied = self.recent.iter().rev().find(|seen| {
                        seen.to == tx.to
                            && seen.selector == selector
                            && seen.from != tx.from
                            && gas_price > seen.gas_price
                    });
                    if let Some(seen) = copied {
                        verdict.tag(TxTag::FrontRun);
                        verdict.tag(TxTag::Copycat);
                        verdict.events.push(MevEvent::new(
                            MevKind::FrontRun,
                            tx.from,
                            Some(seen.from),
                            self.profits.front_run,
                            None,
                            vec![tx.hash, seen.hash],
                        ));
                    }
                }
            }
        }

        if let Some(window) = self.copycat_window() {
            self.recent.push_back(SeenCall {
                hash: tx.hash,
                from: tx.from,
                to: tx.to,
                selector,
                gas_price,
            });
            while self.recent.len() > window {
                self.recent.pop_front();
            }
        }

        Ok(verdict)
    }

    fn copycat_window(&self) -> Option<usize> {
        self.rules.iter().find_map(|rule| match rule {
            PendingRule::Copycat { window } => Some(*window),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Block rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRule {
    AdjacentSandwich,
    LargePayloadArbitrage { min_payload_bytes: usize },
}

/// Stateless classifier for confirmed blocks.
#[derive(Debug, Clone)]
pub struct BlockClassifier {
    rules: Vec<BlockRule>,
    dex: DexSelectors,
    profits: ProfitTable,
}

impl BlockClassifier {
    pub fn new(rules: Vec<BlockRule>, dex: DexSelectors, profits: ProfitTable) -> Self {
        Self {
            rules,
            dex,
            profits,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            vec![
                BlockRule::AdjacentSandwich,
                BlockRule::LargePayloadArbitrage {
                    min_payload_bytes: config.arbitrage_payload_threshold,
                },
            ],
            DexSelectors::from_config(config),
            ProfitTable::from_config(config),
        )
    }

    /// Returns `(block_number, events)`.
    pub fn classify(&self, block: &Block<Transaction>) -> Result<(u64, Vec<MevEvent>), Anomaly> {
        let number = block.number.ok_or(Anomaly::MissingBlockNumber)?.as_u64();
        let txs = &block.transactions;
        let dex_positions: Vec<usize> = (0..txs.len()).filter(|&i| self.dex.matches(&txs[i])).collect();

        let mut events = Vec::new();
        for rule in &self.rules {
            match rule {
                BlockRule::AdjacentSandwich => {
                    for pair in dex_positions.windows(2) {
                        let (front, back) = (&txs[pair[0]], &txs[pair[1]]);
                        if front.from == back.from && front.input != back.input {
                            let victim = txs[pair[0] + 1..pair[1]]
                                .iter()
                                .map(|t| t.from)
                                .find(|from| *from != front.from);
                            events.push(MevEvent::new(
                                MevKind::Sandwich,
                                front.from,
                                victim,
                                self.profits.sandwich,
                                Some(number),
                                vec![front.hash, back.hash],
                            ));
                        }
                    }
                }
                BlockRule::LargePayloadArbitrage { min_payload_bytes } => {
                    for &i in &dex_positions {
                        let tx = &txs[i];
                        if tx.input.len() > *min_payload_bytes {
                            events.push(MevEvent::new(
                                MevKind::Arbitrage,
                                tx.from,
                                None,
                                self.profits.arbitrage,
                                Some(number),
                                vec![tx.hash],
                            ));
                        }
                    }
                }
            }
        }

        Ok((number, events))
    }
}
