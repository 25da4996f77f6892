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

//! A scripted, in-memory [`LedgerGateway`] for tests.

use std::collections::{HashMap, VecDeque};

use ethers::types::{Address, Bytes, TxHash, U256};
use parking_lot::Mutex;
use tokio::sync::watch;

use crowdfund_utils::{Error, Result};

use crate::events::{CrowdfundEvent, EventFilter, EventMeta, LoggedEvent};
use crate::gateway::LedgerGateway;
use crate::types::{
    BlockTag, CampaignSnapshot, ConfirmationOptions, ContractCall, Receipt,
    ReceiptStatus, TransactionHandle, UserRecord,
};

/// How a scripted transaction ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Mined(ReceiptStatus),
    Dropped(String),
}

#[derive(Debug, Clone)]
enum SubmitFailure {
    Rejected(String),
    Broadcast(String),
}

#[derive(Default)]
struct MockState {
    account: Option<Address>,
    reverts: HashMap<&'static str, String>,
    submit_failures: VecDeque<SubmitFailure>,
    next_hashes: VecDeque<TxHash>,
    hash_nonce: u64,
    simulated: Vec<ContractCall>,
    submitted: Vec<ContractCall>,
    broadcasts: Vec<Bytes>,
    outcomes: HashMap<TxHash, MockOutcome>,
    block_number: u64,
    logs: Vec<LoggedEvent>,
    log_nonce: u64,
    failing_queries: usize,
    queries: usize,
    ranges: Vec<(u64, u64)>,
    campaigns: HashMap<U256, CampaignSnapshot>,
    users: HashMap<Address, UserRecord>,
    contribution_totals: HashMap<Address, U256>,
}

/// A gateway whose every answer is scripted by the test.
///
/// Receipts are held back until [`MockGateway::release`] is called, so tests
/// can observe the `Pending` state.
pub struct MockGateway {
    contract: Address,
    state: Mutex<MockState>,
    outcomes_changed: watch::Sender<u64>,
}

impl MockGateway {
    pub fn new(contract: Address) -> Self {
        let (outcomes_changed, _) = watch::channel(0);
        Self {
            contract,
            state: Mutex::new(MockState::default()),
            outcomes_changed,
        }
    }

    pub fn with_account(self, account: Address) -> Self {
        self.state.lock().account = Some(account);
        self
    }

    pub fn set_account(&self, account: Option<Address>) {
        self.state.lock().account = account;
    }

    /// Every simulation of `method` reverts with `reason`.
    pub fn revert_on(&self, method: &'static str, reason: impl Into<String>) {
        self.state.lock().reverts.insert(method, reason.into());
    }

    pub fn clear_revert(&self, method: &'static str) {
        self.state.lock().reverts.remove(method);
    }

    /// The next submission is declined by the signer.
    pub fn reject_next_submit(&self) {
        self.state
            .lock()
            .submit_failures
            .push_back(SubmitFailure::Rejected("user denied signature".into()));
    }

    /// The next submission is refused by the node.
    pub fn fail_next_broadcast(&self, message: impl Into<String>) {
        self.state
            .lock()
            .submit_failures
            .push_back(SubmitFailure::Broadcast(message.into()));
    }

    /// Hash handed out by the next submission.
    pub fn queue_tx_hash(&self, hash: TxHash) {
        self.state.lock().next_hashes.push_back(hash);
    }

    /// Lets a pending transaction finish with `outcome`.
    pub fn release(&self, hash: TxHash, outcome: MockOutcome) {
        self.state.lock().outcomes.insert(hash, outcome);
        self.outcomes_changed.send_modify(|v| *v += 1);
    }

    pub fn set_block_number(&self, block: u64) {
        self.state.lock().block_number = block;
    }

    /// Appends a log at `block_number`, advancing the chain head if needed.
    pub fn emit(&self, event: CrowdfundEvent, block_number: u64) -> EventMeta {
        let mut state = self.state.lock();
        state.log_nonce += 1;
        let meta = EventMeta {
            tx_hash: TxHash::from_low_u64_be(0xe000_0000 + state.log_nonce),
            block_number,
            log_index: state.log_nonce,
        };
        state.block_number = state.block_number.max(block_number);
        state.logs.push(LoggedEvent { event, meta });
        meta
    }

    /// Appends a log with an explicit position. Emitting the same meta twice
    /// simulates a transport that re-announces a log.
    pub fn emit_with_meta(&self, event: CrowdfundEvent, meta: EventMeta) {
        let mut state = self.state.lock();
        state.block_number = state.block_number.max(meta.block_number);
        state.logs.push(LoggedEvent { event, meta });
    }

    /// The next `count` log queries fail with a transport error.
    pub fn fail_next_queries(&self, count: usize) {
        self.state.lock().failing_queries = count;
    }

    pub fn insert_campaign(&self, snapshot: CampaignSnapshot) {
        self.state.lock().campaigns.insert(snapshot.id, snapshot);
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.state.lock().users.insert(user.address, user);
    }

    pub fn set_contribution_total(&self, address: Address, total: U256) {
        self.state
            .lock()
            .contribution_totals
            .insert(address, total);
    }

    pub fn simulated_calls(&self) -> Vec<ContractCall> {
        self.state.lock().simulated.clone()
    }

    pub fn submitted_calls(&self) -> Vec<ContractCall> {
        self.state.lock().submitted.clone()
    }

    pub fn raw_broadcasts(&self) -> Vec<Bytes> {
        self.state.lock().broadcasts.clone()
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }

    /// Inclusive block ranges of the successful log queries, in order.
    pub fn queried_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().ranges.clone()
    }

    fn outcome(&self, hash: TxHash) -> Option<MockOutcome> {
        self.state.lock().outcomes.get(&hash).cloned()
    }

    async fn wait_for_outcome(&self, hash: TxHash) -> MockOutcome {
        let mut changed = self.outcomes_changed.subscribe();
        loop {
            if let Some(outcome) = self.outcome(hash) {
                return outcome;
            }
            if changed.changed().await.is_err() {
                // The sender lives as long as `self`.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[async_trait::async_trait]
impl LedgerGateway for MockGateway {
    fn contract_address(&self) -> Address {
        self.contract
    }

    async fn account(&self) -> Result<Address> {
        self.state.lock().account.ok_or(Error::WalletUnavailable)
    }

    async fn simulate(&self, call: &ContractCall) -> Result<()> {
        let mut state = self.state.lock();
        state.simulated.push(call.clone());
        match state.reverts.get(call.method.name()) {
            Some(reason) => Err(Error::SimulationReverted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn submit(&self, call: &ContractCall) -> Result<TransactionHandle> {
        let mut state = self.state.lock();
        if state.account.is_none() {
            return Err(Error::WalletUnavailable);
        }
        match state.submit_failures.pop_front() {
            Some(SubmitFailure::Rejected(msg)) => {
                return Err(Error::UserRejected(msg))
            }
            Some(SubmitFailure::Broadcast(msg)) => {
                return Err(Error::Broadcast(msg))
            }
            None => {}
        }
        let hash = match state.next_hashes.pop_front() {
            Some(hash) => hash,
            None => {
                state.hash_nonce += 1;
                TxHash::from_low_u64_be(0x7000_0000 + state.hash_nonce)
            }
        };
        state.submitted.push(call.clone());
        Ok(TransactionHandle::new(hash))
    }

    async fn broadcast_raw(&self, signed: Bytes) -> Result<TxHash> {
        let mut state = self.state.lock();
        if let Some(SubmitFailure::Broadcast(msg)) =
            state.submit_failures.front().cloned()
        {
            state.submit_failures.pop_front();
            return Err(Error::Broadcast(msg));
        }
        let hash = TxHash::from(ethers::utils::keccak256(&signed));
        state.broadcasts.push(signed);
        Ok(hash)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state.lock().block_number)
    }

    async fn query_events(
        &self,
        filter: &EventFilter,
        from_block: u64,
        to_block: BlockTag,
    ) -> Result<Vec<LoggedEvent>> {
        let mut state = self.state.lock();
        state.queries += 1;
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(Error::SubscriptionTransport(
                "connection reset by peer".into(),
            ));
        }
        let to_block = match to_block {
            BlockTag::Latest => state.block_number,
            BlockTag::Number(n) => n,
        };
        state.ranges.push((from_block, to_block));
        let mut events: Vec<_> = state
            .logs
            .iter()
            .filter(|e| {
                (from_block..=to_block).contains(&e.meta.block_number)
                    && filter.matches(e)
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.meta.position());
        Ok(events)
    }

    async fn await_confirmation(
        &self,
        hash: TxHash,
        options: ConfirmationOptions,
    ) -> Result<Receipt> {
        let outcome = match options.timeout {
            Some(timeout) => {
                tokio::time::timeout(timeout, self.wait_for_outcome(hash))
                    .await
                    .map_err(|_| Error::ConfirmationTimeout { hash })?
            }
            None => self.wait_for_outcome(hash).await,
        };
        match outcome {
            MockOutcome::Mined(status) => Ok(Receipt {
                hash,
                status,
                block_number: Some(self.state.lock().block_number),
                gas_used: None,
            }),
            MockOutcome::Dropped(reason) => {
                Err(Error::TransactionDropped { hash, reason })
            }
        }
    }

    async fn read_campaign(&self, id: U256) -> Result<CampaignSnapshot> {
        self.state
            .lock()
            .campaigns
            .get(&id)
            .cloned()
            .ok_or(Error::CampaignNotFound(id))
    }

    async fn read_user(&self, address: Address) -> Result<UserRecord> {
        Ok(self
            .state
            .lock()
            .users
            .get(&address)
            .cloned()
            .unwrap_or(UserRecord {
                address,
                name: String::new(),
                registered: false,
            }))
    }

    async fn read_all_users(&self) -> Result<Vec<UserRecord>> {
        let mut users: Vec<_> =
            self.state.lock().users.values().cloned().collect();
        users.sort_by_key(|u| u.address);
        Ok(users)
    }

    async fn read_contribution_total(&self, address: Address) -> Result<U256> {
        Ok(self
            .state
            .lock()
            .contribution_totals
            .get(&address)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::FundedFilter;
    use crate::types::CrowdfundMethod;

    fn funded(id: u64) -> CrowdfundEvent {
        CrowdfundEvent::Funded(FundedFilter {
            campaign_id: id.into(),
            funder: Address::repeat_byte(0x22),
            amount: 1.into(),
            timestamp: 1.into(),
        })
    }

    #[tokio::test]
    async fn scripted_revert_is_returned_by_simulate() {
        let gateway = MockGateway::new(Address::repeat_byte(0xcf));
        gateway.revert_on("fundCampaign", "Goal already reached");
        let call = ContractCall::new(
            gateway.contract_address(),
            CrowdfundMethod::FundCampaign {
                campaign_id: 7.into(),
            },
        );
        let err = gateway.simulate(&call).await.unwrap_err();
        assert!(matches!(err, Error::SimulationReverted { reason } if reason == "Goal already reached"));
    }

    #[tokio::test]
    async fn receipt_waits_for_release() {
        let gateway = std::sync::Arc::new(
            MockGateway::new(Address::zero()).with_account(Address::repeat_byte(1)),
        );
        let hash = TxHash::repeat_byte(0xab);
        let waiter = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .await_confirmation(hash, ConfirmationOptions::default())
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        gateway.release(hash, MockOutcome::Mined(ReceiptStatus::Success));
        let receipt = waiter.await.unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Success);
    }

    #[tokio::test]
    async fn timeout_without_release() {
        let gateway = MockGateway::new(Address::zero());
        let options = ConfirmationOptions {
            timeout: Some(std::time::Duration::from_millis(10)),
            ..Default::default()
        };
        let err = gateway
            .await_confirmation(TxHash::repeat_byte(1), options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn queries_are_filtered_and_ordered() {
        let gateway = MockGateway::new(Address::zero());
        gateway.emit(funded(2), 5);
        gateway.emit(funded(1), 3);
        gateway.emit(funded(1), 9);
        let events = gateway
            .query_events(&EventFilter::funded(Some(1.into()), None), 0, BlockTag::Latest)
            .await
            .unwrap();
        let blocks: Vec<_> = events.iter().map(|e| e.meta.block_number).collect();
        assert_eq!(blocks, vec![3, 9]);

        gateway.fail_next_queries(1);
        assert!(gateway
            .query_events(&EventFilter::funded(None, None), 0, BlockTag::Latest)
            .await
            .is_err());
    }
}
