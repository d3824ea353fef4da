//! [`Ledger`] over an in-memory [`MevProtector`].

use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::types::{Address, U256};
use parking_lot::RwLock;

use zkmev_protocol::encoding::FieldElement;
use zkmev_protocol::ledger::{Ledger, LedgerError, TxReceipt};
use zkmev_protocol::zkp::VerifierProof;

use crate::protector::{ContractError, MevProtector};

impl From<ContractError> for LedgerError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::InsufficientFee { required, offered } => {
                LedgerError::InsufficientFee { required, offered }
            }
            ContractError::CommitmentExists => LedgerError::AlreadyKnown,
            ContractError::NotReady { .. } => LedgerError::NotReady,
            ContractError::UnknownCommitment => LedgerError::UnknownCommitment,
            ContractError::InvalidProof(reason) | ContractError::MalformedSignals(reason) => {
                LedgerError::InvalidProof(reason)
            }
            other => LedgerError::Rejected(other.to_string()),
        }
    }
}

/// One account's connection to a shared protector.
#[derive(Clone)]
pub struct LocalLedger {
    contract: Arc<RwLock<MevProtector>>,
    account: Address,
}

impl LocalLedger {
    pub fn new(contract: Arc<RwLock<MevProtector>>, account: Address) -> Self {
        Self { contract, account }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn contract(&self) -> &Arc<RwLock<MevProtector>> {
        &self.contract
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn protection_fee(&self) -> Result<U256, LedgerError> {
        Ok(self.contract.read().protection_fee())
    }

    async fn submit(&self, hash: FieldElement, fee: U256) -> Result<TxReceipt, LedgerError> {
        Ok(self.contract.write().submit_commitment(self.account, hash, fee)?)
    }

    async fn is_ready_for_reveal(&self, hash: FieldElement) -> Result<bool, LedgerError> {
        Ok(self.contract.read().is_ready_for_reveal(&hash))
    }

    async fn reveal(
        &self,
        proof: &VerifierProof,
        public_signals: &[FieldElement],
    ) -> Result<TxReceipt, LedgerError> {
        Ok(self
            .contract
            .write()
            .reveal_and_execute(self.account, proof, public_signals)?)
    }

    async fn current_height(&self) -> Result<u64, LedgerError> {
        Ok(self.contract.read().height())
    }
}
