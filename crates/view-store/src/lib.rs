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

//! # Crowdfund View Store 🕸️
//!
//! An in-memory, event-sourced view of the crowdfunding contract, shared by
//! the components that reconcile chain events into it.

use std::sync::Arc;

use ethers::types::{Address, U256};
use parking_lot::RwLock;

use crowdfund_ledger_gateway::{CampaignSnapshot, LoggedEvent, UserRecord};
use crowdfund_utils::probe;

/// Session, campaign and contribution records.
pub mod model;
/// The reconciled state and its reducers.
pub mod state;

pub use model::{Campaign, Contribution, ContributionKey, Registration, Session};
pub use state::ViewState;

/// A cloneable handle to the shared [`ViewState`].
#[derive(Clone, Default)]
pub struct ViewStateStore {
    state: Arc<RwLock<ViewState>>,
}

impl std::fmt::Debug for ViewStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewStateStore").finish()
    }
}

impl ViewStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a reducer over the current state.
    pub fn update(&self, reducer: impl FnOnce(ViewState) -> ViewState) {
        let mut guard = self.state.write();
        let current = std::mem::take(&mut *guard);
        *guard = reducer(current);
    }

    /// Reconciles one chain event into the state.
    #[tracing::instrument(
        skip_all,
        fields(kind = %logged.event.kind(), block = logged.meta.block_number)
    )]
    pub fn dispatch(&self, logged: &LoggedEvent) {
        self.update(|state| state.apply(logged));
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::TRACE,
            kind = %probe::Kind::ViewStore,
            event = %logged.event.kind(),
            tx_hash = ?logged.meta.tx_hash,
            log_index = logged.meta.log_index,
        );
    }

    /// Merges a campaign read back from the contract.
    pub fn apply_campaign_snapshot(&self, snapshot: &CampaignSnapshot) {
        self.update(|state| state.apply_campaign_snapshot(snapshot));
    }

    /// Merges user directory entries read back from the contract.
    pub fn apply_users(&self, users: &[UserRecord]) {
        self.update(|state| state.apply_users(users));
    }

    /// A consistent copy of the whole state.
    pub fn snapshot(&self) -> ViewState {
        self.state.read().clone()
    }

    /// Reads a single campaign.
    pub fn campaign(&self, id: U256) -> Option<Campaign> {
        self.state.read().campaign(id).cloned()
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.state.read().session.clone()
    }

    /// Installs the session of `account`. `user` is what `getUserData`
    /// returned for it, if it was read.
    pub fn establish_session(
        &self,
        account: Address,
        user: Option<&UserRecord>,
    ) {
        self.update(|state| state.establish_session(account, user));
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Session,
            established = true,
            account = ?account,
        );
    }

    /// Destroys the session. Campaigns and users are kept.
    pub fn logout(&self) {
        self.update(ViewState::logout);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Session,
            established = false,
        );
    }

    /// Drains the ids of campaigns that need a targeted re-fetch, plus
    /// every campaign that still has buffered events.
    pub fn take_refetch_requests(&self) -> Vec<U256> {
        self.state.write().take_refetch_requests()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdfund_ledger_gateway::abi::{CampaignCreatedFilter, FundedFilter};
    use crowdfund_ledger_gateway::{CrowdfundEvent, EventMeta};
    use ethers::types::TxHash;

    fn logged(event: CrowdfundEvent, block: u64) -> LoggedEvent {
        LoggedEvent {
            event,
            meta: EventMeta {
                tx_hash: TxHash::from_low_u64_be(block),
                block_number: block,
                log_index: 0,
            },
        }
    }

    #[test]
    #[tracing_test::traced_test]
    fn dispatch_reconciles_and_queues_refetch() {
        let store = ViewStateStore::new();
        store.dispatch(&logged(
            CrowdfundEvent::Funded(FundedFilter {
                campaign_id: 4.into(),
                funder: Address::repeat_byte(0x22),
                amount: 3.into(),
                timestamp: 1.into(),
            }),
            2,
        ));
        assert!(logs_contain("Buffering event for unknown campaign"));
        assert_eq!(store.take_refetch_requests(), vec![U256::from(4)]);
        // Still buffered, so still requested.
        assert_eq!(store.take_refetch_requests(), vec![U256::from(4)]);

        store.dispatch(&logged(
            CrowdfundEvent::CampaignCreated(CampaignCreatedFilter {
                campaign_id: 4.into(),
                creator: Address::repeat_byte(0xc0),
                title: "Solar roof".into(),
                goal: 100.into(),
            }),
            1,
        ));
        assert_eq!(store.campaign(4.into()).unwrap().raised, U256::from(3));
        store.take_refetch_requests();
        assert!(store.take_refetch_requests().is_empty());
    }

    #[test]
    fn logout_keeps_campaigns() {
        let store = ViewStateStore::new();
        store.establish_session(Address::repeat_byte(1), None);
        assert!(store.session().is_some());
        store.logout();
        assert!(store.session().is_none());
        assert!(store.snapshot().campaigns.is_empty());
    }
}
