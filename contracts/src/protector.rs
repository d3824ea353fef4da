//! # MEV Protector Contract
//!
//! The commit-reveal contract, modelled in memory. Its lifecycle per
//! commitment is:
//!
//! 1. **Submit**: pay at least the protection fee, the hash is recorded at
//!    the block the transaction lands in.
//! 2. **Wait**: the commitment is revealable from `block + min_delay` to
//!    `block + max_delay` inclusive. Past that it is expired.
//! 3. **Reveal**: a proof whose public signals carry the commitment and a
//!    fresh nullifier. The proof is checked by the configured
//!    [`ProofVerifier`]; the nullifier is burned.
//!
//! Fees accumulate in the contract balance until the owner withdraws them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ethers_core::types::{Address, H256, U256};
use ethers_core::utils::keccak256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use zkmev_protocol::config::{
    DEFAULT_MAX_DELAY_BLOCKS, DEFAULT_MIN_DELAY_BLOCKS, DEFAULT_PROTECTION_FEE_WEI,
    MAX_PROTECTION_FEE_WEI,
};
use zkmev_protocol::encoding::FieldElement;
use zkmev_protocol::ledger::TxReceipt;
use zkmev_protocol::zkp::groth16::{BLOCK_SIGNAL_INDEX, NULLIFIER_SIGNAL_INDEX};
use zkmev_protocol::zkp::{ProofVerifier, VerifierProof, COMMITMENT_SIGNAL_INDEX};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons the contract reverts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("caller {0:?} is not the owner")]
    NotOwner(Address),

    #[error("fee too high: requested {requested}, maximum {max}")]
    FeeTooHigh { requested: U256, max: U256 },

    #[error("insufficient protection fee: required {required}, offered {offered}")]
    InsufficientFee { required: U256, offered: U256 },

    #[error("commitment already exists")]
    CommitmentExists,

    #[error("commitment not found")]
    UnknownCommitment,

    #[error("commitment not ready for reveal until block {ready_at}")]
    NotReady { ready_at: u64 },

    #[error("commitment expired after block {expired_after}")]
    Expired { expired_after: u64 },

    #[error("commitment already revealed")]
    AlreadyRevealed,

    #[error("nullifier already used")]
    NullifierUsed,

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("malformed public signals: {0}")]
    MalformedSignals(String),

    #[error("balance overflow")]
    BalanceOverflow,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContractEvent {
    CommitmentSubmitted {
        hash: FieldElement,
        block_number: u64,
        submitter: Address,
    },
    TransactionRevealed {
        hash: FieldElement,
        nullifier: FieldElement,
        executor: Address,
        block_number: u64,
    },
    ProtectionFeeUpdated {
        old_fee: U256,
        new_fee: U256,
    },
    FeesWithdrawn {
        to: Address,
        amount: U256,
    },
    MevReported {
        block_number: u64,
        attacker: Address,
        extracted_value: U256,
        reporter: Address,
    },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Commitment {
    block_number: u64,
    submitter: Address,
    revealed: bool,
}

/// Result of [`MevProtector::commitment_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentInfo {
    pub exists: bool,
    pub block_number: u64,
    pub expired: bool,
}

pub struct MevProtector {
    owner: Address,
    verifier: Arc<dyn ProofVerifier>,
    protection_fee: U256,
    max_fee: U256,
    min_delay: u64,
    max_delay: u64,
    height: u64,
    tx_count: u64,
    balance: U256,
    commitments: HashMap<FieldElement, Commitment>,
    nullifiers: HashSet<FieldElement>,
    events: Vec<ContractEvent>,
}

impl MevProtector {
    /// Deploy with the default fee and delay window at block 0.
    pub fn new(owner: Address, verifier: Arc<dyn ProofVerifier>) -> Self {
        Self {
            owner,
            verifier,
            protection_fee: U256::from(DEFAULT_PROTECTION_FEE_WEI),
            max_fee: U256::from(MAX_PROTECTION_FEE_WEI),
            min_delay: DEFAULT_MIN_DELAY_BLOCKS,
            max_delay: DEFAULT_MAX_DELAY_BLOCKS,
            height: 0,
            tx_count: 0,
            balance: U256::zero(),
            commitments: HashMap::new(),
            nullifiers: HashSet::new(),
            events: Vec::new(),
        }
    }

    pub fn with_delays(mut self, min_delay: u64, max_delay: u64) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn protection_fee(&self) -> U256 {
        self.protection_fee
    }

    pub fn balance(&self) -> U256 {
        self.balance
    }

    /// Latest mined block.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    pub fn is_nullifier_used(&self, nullifier: &FieldElement) -> bool {
        self.nullifiers.contains(nullifier)
    }

    /// Advance the chain by `blocks` empty blocks. Returns the new height.
    pub fn mine(&mut self, blocks: u64) -> u64 {
        self.height = self.height.saturating_add(blocks);
        self.height
    }

    // -- Owner --------------------------------------------------------------

    pub fn update_protection_fee(&mut self, caller: Address, new_fee: U256) -> Result<TxReceipt, ContractError> {
        self.only_owner(caller)?;
        if new_fee > self.max_fee {
            return Err(ContractError::FeeTooHigh {
                requested: new_fee,
                max: self.max_fee,
            });
        }
        let old_fee = std::mem::replace(&mut self.protection_fee, new_fee);
        info!(%old_fee, %new_fee, "protection fee updated");
        self.events.push(ContractEvent::ProtectionFeeUpdated { old_fee, new_fee });
        Ok(self.land())
    }

    /// Transfer the whole balance to the owner. Returns the amount.
    pub fn withdraw_fees(&mut self, caller: Address) -> Result<U256, ContractError> {
        self.only_owner(caller)?;
        let amount = std::mem::take(&mut self.balance);
        self.events.push(ContractEvent::FeesWithdrawn {
            to: self.owner,
            amount,
        });
        self.land();
        Ok(amount)
    }

    fn only_owner(&self, caller: Address) -> Result<(), ContractError> {
        if caller != self.owner {
            return Err(ContractError::NotOwner(caller));
        }
        Ok(())
    }

    // -- Commit -------------------------------------------------------------

    pub fn submit_commitment(
        &mut self,
        caller: Address,
        hash: FieldElement,
        value: U256,
    ) -> Result<TxReceipt, ContractError> {
        if value < self.protection_fee {
            return Err(ContractError::InsufficientFee {
                required: self.protection_fee,
                offered: value,
            });
        }
        if self.commitments.contains_key(&hash) {
            return Err(ContractError::CommitmentExists);
        }
        self.balance = self
            .balance
            .checked_add(value)
            .ok_or(ContractError::BalanceOverflow)?;

        let receipt = self.land();
        self.commitments.insert(
            hash,
            Commitment {
                block_number: receipt.block_number,
                submitter: caller,
                revealed: false,
            },
        );
        self.events.push(ContractEvent::CommitmentSubmitted {
            hash,
            block_number: receipt.block_number,
            submitter: caller,
        });
        debug!(commitment = %hash, block = receipt.block_number, "commitment submitted");
        Ok(receipt)
    }

    /// Revealable at the current height.
    pub fn is_ready_for_reveal(&self, hash: &FieldElement) -> bool {
        self.commitments
            .get(hash)
            .map_or(false, |c| !c.revealed && self.check_window(c.block_number).is_ok())
    }

    /// The closed window `[block + min_delay, block + max_delay]` against the
    /// current head. A bound past `u64::MAX` is never reached.
    fn check_window(&self, block_number: u64) -> Result<(), ContractError> {
        match block_number.checked_add(self.min_delay) {
            Some(ready_at) if self.height >= ready_at => {}
            ready_at => {
                return Err(ContractError::NotReady {
                    ready_at: ready_at.unwrap_or(u64::MAX),
                })
            }
        }
        if let Some(expired_after) = block_number.checked_add(self.max_delay) {
            if self.height > expired_after {
                return Err(ContractError::Expired { expired_after });
            }
        }
        Ok(())
    }

    pub fn commitment_info(&self, hash: &FieldElement) -> CommitmentInfo {
        match self.commitments.get(hash) {
            Some(c) => CommitmentInfo {
                exists: true,
                block_number: c.block_number,
                expired: c
                    .block_number
                    .checked_add(self.max_delay)
                    .map_or(false, |last| self.height > last),
            },
            None => CommitmentInfo {
                exists: false,
                block_number: 0,
                expired: false,
            },
        }
    }

    /// Submitter of a known commitment.
    pub fn submitter_of(&self, hash: &FieldElement) -> Option<Address> {
        self.commitments.get(hash).map(|c| c.submitter)
    }

    // -- Reveal -------------------------------------------------------------

    /// Verify and execute. The window is checked against the head the caller
    /// observed, the same height `is_ready_for_reveal` answers for; the
    /// transaction then lands in the next block.
    pub fn reveal_and_execute(
        &mut self,
        caller: Address,
        proof: &VerifierProof,
        public_signals: &[FieldElement],
    ) -> Result<TxReceipt, ContractError> {
        let signal = |index: usize, name: &str| {
            public_signals
                .get(index)
                .copied()
                .ok_or_else(|| ContractError::MalformedSignals(format!("missing {name} at index {index}")))
        };
        let hash = signal(COMMITMENT_SIGNAL_INDEX, "commitment")?;
        let nullifier = signal(NULLIFIER_SIGNAL_INDEX, "nullifier")?;
        let proof_block = signal(BLOCK_SIGNAL_INDEX, "block number")?;

        let commitment = self
            .commitments
            .get(&hash)
            .ok_or(ContractError::UnknownCommitment)?;
        if commitment.revealed {
            return Err(ContractError::AlreadyRevealed);
        }

        self.check_window(commitment.block_number)?;
        if proof_block.to_u256() > U256::from(commitment.block_number) {
            return Err(ContractError::InvalidProof(
                "proof bound to a block after the commitment".into(),
            ));
        }
        if self.nullifiers.contains(&nullifier) {
            return Err(ContractError::NullifierUsed);
        }

        match self.verifier.verify_proof(public_signals, proof) {
            Ok(true) => {}
            Ok(false) => return Err(ContractError::InvalidProof("verification failed".into())),
            Err(e) => return Err(ContractError::InvalidProof(format!("{e:#}"))),
        }

        if let Some(c) = self.commitments.get_mut(&hash) {
            c.revealed = true;
        }
        self.nullifiers.insert(nullifier);
        let receipt = self.land();
        self.events.push(ContractEvent::TransactionRevealed {
            hash,
            nullifier,
            executor: caller,
            block_number: receipt.block_number,
        });
        info!(commitment = %hash, block = receipt.block_number, "commitment revealed");
        Ok(receipt)
    }

    // -- Reporting ----------------------------------------------------------

    pub fn report_mev(
        &mut self,
        caller: Address,
        block_number: u64,
        attacker: Address,
        extracted_value: U256,
    ) -> TxReceipt {
        self.events.push(ContractEvent::MevReported {
            block_number,
            attacker,
            extracted_value,
            reporter: caller,
        });
        self.land()
    }

    /// Mine one block holding the current transaction.
    fn land(&mut self) -> TxReceipt {
        self.height += 1;
        self.tx_count += 1;
        let mut preimage = [0u8; 16];
        preimage[..8].copy_from_slice(&self.height.to_be_bytes());
        preimage[8..].copy_from_slice(&self.tx_count.to_be_bytes());
        TxReceipt {
            tx_hash: H256::from(keccak256(preimage)),
            block_number: self.height,
            success: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    struct FixedVerifier(bool);

    impl ProofVerifier for FixedVerifier {
        fn verify_proof(&self, _: &[FieldElement], _: &VerifierProof) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn owner() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn user() -> Address {
        Address::repeat_byte(0x0b)
    }

    fn fee() -> U256 {
        U256::from(DEFAULT_PROTECTION_FEE_WEI)
    }

    fn protector(accept: bool) -> MevProtector {
        MevProtector::new(owner(), Arc::new(FixedVerifier(accept)))
    }

    fn proof() -> VerifierProof {
        VerifierProof {
            a: [U256::one(), U256::from(2)],
            b: [[U256::from(3), U256::from(4)], [U256::from(5), U256::from(6)]],
            c: [U256::from(7), U256::from(8)],
        }
    }

    fn signals(hash: u64, nullifier: u64, block: u64) -> Vec<FieldElement> {
        vec![hash.into(), nullifier.into(), block.into(), 0u64.into()]
    }

    #[test]
    fn default_fee_and_owner() {
        let p = protector(true);
        assert_eq!(p.protection_fee(), U256::exp10(15));
        assert_eq!(p.owner(), owner());
        assert_eq!(p.height(), 0);
    }

    #[test]
    fn submit_lands_in_next_block() {
        let mut p = protector(true);
        p.mine(7);
        let receipt = p.submit_commitment(user(), 1u64.into(), fee()).unwrap();
        assert_eq!(receipt.block_number, 8);
        assert_eq!(
            p.events().last(),
            Some(&ContractEvent::CommitmentSubmitted {
                hash: 1u64.into(),
                block_number: 8,
                submitter: user(),
            })
        );
        assert_eq!(p.balance(), fee());
    }

    #[test]
    fn submit_rejects_low_fee_and_duplicates() {
        let mut p = protector(true);
        let low = U256::exp10(14);
        assert_eq!(
            p.submit_commitment(user(), 1u64.into(), low).unwrap_err(),
            ContractError::InsufficientFee {
                required: fee(),
                offered: low
            }
        );
        p.submit_commitment(user(), 1u64.into(), fee()).unwrap();
        assert_eq!(
            p.submit_commitment(user(), 1u64.into(), fee()).unwrap_err(),
            ContractError::CommitmentExists
        );
    }

    #[test]
    fn zero_hash_is_accepted() {
        let mut p = protector(true);
        assert!(p.submit_commitment(user(), FieldElement::zero(), fee()).is_ok());
    }

    #[test]
    fn readiness_window() {
        let mut p = protector(true);
        let hash: FieldElement = 1u64.into();
        let at = p.submit_commitment(user(), hash, fee()).unwrap().block_number;

        assert!(!p.is_ready_for_reveal(&hash));
        p.mine(1);
        assert!(!p.is_ready_for_reveal(&hash));
        p.mine(1);
        assert_eq!(p.height(), at + DEFAULT_MIN_DELAY_BLOCKS);
        assert!(p.is_ready_for_reveal(&hash));
        p.mine(DEFAULT_MAX_DELAY_BLOCKS - DEFAULT_MIN_DELAY_BLOCKS);
        assert!(p.is_ready_for_reveal(&hash));
        p.mine(1);
        assert!(!p.is_ready_for_reveal(&hash));
        assert!(p.commitment_info(&hash).expired);
    }

    #[test]
    fn commitment_info_for_fresh_and_unknown() {
        let mut p = protector(true);
        let hash: FieldElement = 1u64.into();
        p.submit_commitment(user(), hash, fee()).unwrap();
        assert_eq!(
            p.commitment_info(&hash),
            CommitmentInfo {
                exists: true,
                block_number: 1,
                expired: false
            }
        );
        assert!(!p.commitment_info(&2u64.into()).exists);
    }

    #[test]
    fn reveal_burns_nullifier() {
        let mut p = protector(true);
        p.submit_commitment(user(), 1u64.into(), fee()).unwrap();
        p.submit_commitment(user(), 2u64.into(), fee()).unwrap();
        p.mine(2);

        let receipt = p.reveal_and_execute(user(), &proof(), &signals(1, 99, 0)).unwrap();
        assert!(receipt.success);
        assert!(p.is_nullifier_used(&99u64.into()));
        assert!(!p.is_ready_for_reveal(&1u64.into()));

        assert_eq!(
            p.reveal_and_execute(user(), &proof(), &signals(1, 99, 0)).unwrap_err(),
            ContractError::AlreadyRevealed
        );
        assert_eq!(
            p.reveal_and_execute(user(), &proof(), &signals(2, 99, 0)).unwrap_err(),
            ContractError::NullifierUsed
        );
    }

    #[test]
    fn reveal_window_matches_readiness() {
        let mut p = protector(true);
        let first: FieldElement = 1u64.into();
        p.submit_commitment(user(), first, fee()).unwrap();
        assert_eq!(
            p.reveal_and_execute(user(), &proof(), &signals(1, 5, 0)).unwrap_err(),
            ContractError::NotReady { ready_at: 3 }
        );
        p.mine(1);
        assert!(!p.is_ready_for_reveal(&first));
        assert!(p.reveal_and_execute(user(), &proof(), &signals(1, 5, 0)).is_err());

        // Last block of the closed window: ready, and the reveal goes through.
        p.mine(DEFAULT_MAX_DELAY_BLOCKS - 1);
        assert_eq!(p.height(), 1 + DEFAULT_MAX_DELAY_BLOCKS);
        assert!(p.is_ready_for_reveal(&first));
        assert!(p.reveal_and_execute(user(), &proof(), &signals(1, 5, 0)).is_ok());

        let second: FieldElement = 2u64.into();
        let at = p.submit_commitment(user(), second, fee()).unwrap().block_number;
        p.mine(DEFAULT_MAX_DELAY_BLOCKS + 1);
        assert!(!p.is_ready_for_reveal(&second));
        assert_eq!(
            p.reveal_and_execute(user(), &proof(), &signals(2, 6, 0)).unwrap_err(),
            ContractError::Expired {
                expired_after: at + DEFAULT_MAX_DELAY_BLOCKS
            }
        );
    }

    #[test]
    fn window_bounds_past_u64_max_do_not_wrap() {
        let mut p = protector(true);
        p.mine(u64::MAX - 2);
        let hash: FieldElement = 1u64.into();
        let at = p.submit_commitment(user(), hash, fee()).unwrap().block_number;
        assert_eq!(at, u64::MAX - 1);
        p.mine(1);
        assert!(!p.is_ready_for_reveal(&hash));
        assert!(!p.commitment_info(&hash).expired);
        assert_eq!(
            p.reveal_and_execute(user(), &proof(), &signals(1, 5, 0)).unwrap_err(),
            ContractError::NotReady { ready_at: u64::MAX }
        );
    }

    #[test]
    fn reveal_rejects_bad_proofs_and_signals() {
        let mut p = protector(false);
        p.submit_commitment(user(), 1u64.into(), fee()).unwrap();
        p.mine(2);

        assert!(matches!(
            p.reveal_and_execute(user(), &proof(), &signals(1, 5, 0)),
            Err(ContractError::InvalidProof(_))
        ));
        assert!(!p.is_nullifier_used(&5u64.into()));
        assert!(matches!(
            p.reveal_and_execute(user(), &proof(), &[1u64.into()]),
            Err(ContractError::MalformedSignals(_))
        ));
        assert_eq!(
            p.reveal_and_execute(user(), &proof(), &signals(42, 5, 0)).unwrap_err(),
            ContractError::UnknownCommitment
        );
    }

    #[test]
    fn reveal_rejects_proof_from_the_future() {
        let mut p = protector(true);
        p.submit_commitment(user(), 1u64.into(), fee()).unwrap();
        p.mine(2);
        assert!(matches!(
            p.reveal_and_execute(user(), &proof(), &signals(1, 5, 50)),
            Err(ContractError::InvalidProof(_))
        ));
    }

    #[test]
    fn owner_fee_controls() {
        let mut p = protector(true);
        let new_fee = U256::from(2) * U256::exp10(15);
        assert_eq!(
            p.update_protection_fee(user(), new_fee).unwrap_err(),
            ContractError::NotOwner(user())
        );
        p.update_protection_fee(owner(), new_fee).unwrap();
        assert_eq!(p.protection_fee(), new_fee);

        let excessive = U256::from(2) * U256::exp10(16);
        assert!(matches!(
            p.update_protection_fee(owner(), excessive),
            Err(ContractError::FeeTooHigh { .. })
        ));
        assert_eq!(p.protection_fee(), new_fee);
    }

    #[test]
    fn withdraw_drains_balance() {
        let mut p = protector(true);
        p.submit_commitment(user(), 1u64.into(), fee() * 3).unwrap();
        assert!(p.withdraw_fees(user()).is_err());
        assert_eq!(p.withdraw_fees(owner()).unwrap(), fee() * 3);
        assert_eq!(p.balance(), U256::zero());
        assert_eq!(p.withdraw_fees(owner()).unwrap(), U256::zero());
    }

    #[test]
    fn mev_report_is_logged() {
        let mut p = protector(true);
        let value = U256::exp10(17);
        p.report_mev(user(), 0, Address::repeat_byte(0xee), value);
        assert_eq!(
            p.events().last(),
            Some(&ContractEvent::MevReported {
                block_number: 0,
                attacker: Address::repeat_byte(0xee),
                extracted_value: value,
                reporter: user(),
            })
        );
    }

    #[test]
    fn events_serialize_tagged() {
        let event = ContractEvent::FeesWithdrawn {
            to: owner(),
            amount: U256::from(5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fees_withdrawn");
    }
}
