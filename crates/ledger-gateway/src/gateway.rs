// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ethers::types::{Address, Bytes, TxHash, U256};
use parking_lot::RwLock;

use crowdfund_utils::Result;

use crate::events::{EventFilter, LoggedEvent};
use crate::types::{
    BlockTag, CampaignSnapshot, ConfirmationOptions, ContractCall, Receipt,
    TransactionHandle, UserRecord,
};

/// Everything the client needs from the chain: a signer, a node and the
/// crowdfunding contract.
#[async_trait::async_trait]
pub trait LedgerGateway: Send + Sync {
    /// The address of the crowdfunding contract.
    fn contract_address(&self) -> Address;

    /// Block explorer used to render transaction links, if any.
    fn explorer(&self) -> Option<&url::Url> {
        None
    }

    /// The account of the connected signer.
    ///
    /// Fails with `WalletUnavailable` when there is no signer.
    async fn account(&self) -> Result<Address>;

    /// Dry-runs the call from the signer's account.
    ///
    /// A revert is returned as `SimulationReverted` with the decoded reason.
    async fn simulate(&self, call: &ContractCall) -> Result<()>;

    /// Fills, signs and broadcasts the call. Returns as soon as the node
    /// accepted the transaction.
    async fn submit(&self, call: &ContractCall) -> Result<TransactionHandle>;

    /// Forwards an already signed transaction.
    async fn broadcast_raw(&self, signed: Bytes) -> Result<TxHash>;

    async fn block_number(&self) -> Result<u64>;

    /// Logs matching `filter` in `[from_block, to_block]`, ascending by
    /// `(block_number, log_index)`.
    async fn query_events(
        &self,
        filter: &EventFilter,
        from_block: u64,
        to_block: BlockTag,
    ) -> Result<Vec<LoggedEvent>>;

    async fn await_confirmation(
        &self,
        hash: TxHash,
        options: ConfirmationOptions,
    ) -> Result<Receipt>;

    async fn read_campaign(&self, id: U256) -> Result<CampaignSnapshot>;

    async fn read_user(&self, address: Address) -> Result<UserRecord>;

    async fn read_all_users(&self) -> Result<Vec<UserRecord>>;

    /// Total amount ever contributed by `address`, in wei.
    async fn read_contribution_total(&self, address: Address) -> Result<U256>;
}

/// A swappable slot holding the current gateway.
///
/// Readers take a cheap clone of the current gateway; the slot is replaced
/// only when the session is re-established on another account.
#[derive(Clone)]
pub struct SharedGateway {
    inner: Arc<RwLock<Arc<dyn LedgerGateway>>>,
    generation: Arc<AtomicU64>,
}

impl SharedGateway {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(gateway)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn current(&self) -> Arc<dyn LedgerGateway> {
        self.inner.read().clone()
    }

    /// Installs a new gateway and returns the new generation.
    pub fn replace(&self, gateway: Arc<dyn LedgerGateway>) -> u64 {
        let mut slot = self.inner.write();
        *slot = gateway;
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Bumped on every [`SharedGateway::replace`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SharedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedGateway")
            .field("contract", &self.current().contract_address())
            .field("generation", &self.generation())
            .finish()
    }
}
