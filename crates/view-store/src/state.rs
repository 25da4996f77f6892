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

use std::collections::{BTreeMap, BTreeSet};

use ethers::types::{Address, U256};
use serde::Serialize;

use crowdfund_ledger_gateway::abi::{
    CampaignCreatedFilter, DeactivatedFilter, FundedFilter, RefundedFilter,
    UserRegisteredFilter, WithdrawnFilter,
};
use crowdfund_ledger_gateway::{
    CampaignSnapshot, CrowdfundEvent, EventKey, EventMeta, LoggedEvent,
    UserRecord,
};

use crate::model::{Campaign, Contribution, Registration, Session};

/// The reconciled local picture of the contract.
///
/// Every reducer consumes the state and returns the next one. Reducers are
/// idempotent, and applying the same set of events in any order yields the
/// same state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub session: Option<Session>,
    pub campaigns: BTreeMap<U256, Campaign>,
    pub users: BTreeMap<Address, UserRecord>,
    /// Events about campaigns we have not seen yet, replayed on arrival.
    #[serde(skip)]
    buffered: BTreeMap<U256, BTreeMap<EventKey, LoggedEvent>>,
    /// Campaign ids waiting for a targeted `getCampaign` re-fetch.
    #[serde(skip)]
    refetch: BTreeSet<U256>,
}

impl ViewState {
    pub fn campaign(&self, id: U256) -> Option<&Campaign> {
        self.campaigns.get(&id)
    }

    /// Campaigns created by `creator`, by id.
    pub fn campaigns_by(&self, creator: Address) -> Vec<&Campaign> {
        self.campaigns
            .values()
            .filter(|c| c.creator == creator)
            .collect()
    }

    /// All contributions made by `contributor`, across campaigns.
    pub fn contributions_by(&self, contributor: Address) -> Vec<&Contribution> {
        self.campaigns
            .values()
            .flat_map(|c| c.contributions.iter())
            .filter(|c| c.contributor == contributor)
            .collect()
    }

    pub fn buffered_events(&self) -> usize {
        self.buffered.values().map(BTreeMap::len).sum()
    }

    pub fn pending_refetches(&self) -> Vec<U256> {
        self.refetch.iter().copied().collect()
    }

    /// Drains the queued re-fetches. Campaigns still holding buffered
    /// events are handed out again on every call until they resolve.
    pub(crate) fn take_refetch_requests(&mut self) -> Vec<U256> {
        let mut ids = std::mem::take(&mut self.refetch);
        ids.extend(self.buffered.keys().copied());
        ids.into_iter().collect()
    }

    pub fn apply(self, logged: &LoggedEvent) -> Self {
        let meta = &logged.meta;
        match &logged.event {
            CrowdfundEvent::UserRegistered(e) => {
                self.apply_user_registered(e, meta)
            }
            CrowdfundEvent::CampaignCreated(e) => {
                self.apply_campaign_created(e, meta)
            }
            CrowdfundEvent::Funded(e) => self.apply_funded(e, meta),
            CrowdfundEvent::Deactivated(e) => self.apply_deactivated(e, meta),
            CrowdfundEvent::Withdrawn(e) => self.apply_withdrawn(e, meta),
            CrowdfundEvent::Refunded(e) => self.apply_refunded(e, meta),
        }
    }

    pub fn apply_user_registered(
        mut self,
        payload: &UserRegisteredFilter,
        _meta: &EventMeta,
    ) -> Self {
        self.users.insert(
            payload.user,
            UserRecord {
                address: payload.user,
                name: payload.name.clone(),
                registered: true,
            },
        );
        if let Some(session) = self.session.as_mut() {
            if session.account == payload.user && !session.registered() {
                session.registration = Registration::Registered {
                    display_name: payload.name.clone(),
                };
            }
        }
        self
    }

    pub fn apply_campaign_created(
        mut self,
        payload: &CampaignCreatedFilter,
        _meta: &EventMeta,
    ) -> Self {
        let id = payload.campaign_id;
        if self.campaigns.contains_key(&id) {
            return self;
        }
        self.campaigns.insert(
            id,
            Campaign::announced(
                id,
                payload.creator,
                payload.title.clone(),
                payload.goal,
            ),
        );
        // The event carries no description nor deadline.
        self.refetch.insert(id);
        self.drain_buffered(id)
    }

    /// Merges the result of a `getCampaign` read.
    pub fn apply_campaign_snapshot(
        mut self,
        snapshot: &CampaignSnapshot,
    ) -> Self {
        let id = snapshot.id;
        self.refetch.remove(&id);
        match self.campaigns.get_mut(&id) {
            Some(campaign) => {
                campaign.merge_snapshot(snapshot);
                self
            }
            None => {
                self.campaigns.insert(id, Campaign::from_snapshot(snapshot));
                self.drain_buffered(id)
            }
        }
    }

    /// Replaces the user directory entries with the given records.
    pub fn apply_users(mut self, users: &[UserRecord]) -> Self {
        for user in users {
            self.users.insert(user.address, user.clone());
        }
        self
    }

    pub fn apply_funded(
        mut self,
        payload: &FundedFilter,
        meta: &EventMeta,
    ) -> Self {
        let Some(campaign) = self.campaigns.get_mut(&payload.campaign_id)
        else {
            let event = CrowdfundEvent::Funded(payload.clone());
            return self.buffer(payload.campaign_id, event, meta);
        };
        let position = meta.position();
        let inserted = campaign.insert_contribution(Contribution {
            campaign_id: payload.campaign_id,
            contributor: payload.funder,
            amount: payload.amount,
            timestamp: payload.timestamp.low_u64(),
            position: Some(position),
        });
        let refunded_later =
            matches!(campaign.refunded_at, Some(refund) if position < refund);
        if inserted && !refunded_later {
            campaign.raised = campaign.raised.saturating_add(payload.amount);
        }
        self
    }

    pub fn apply_deactivated(
        mut self,
        payload: &DeactivatedFilter,
        meta: &EventMeta,
    ) -> Self {
        match self.campaigns.get_mut(&payload.campaign_id) {
            Some(campaign) => {
                campaign.active = false;
                self
            }
            None => self.buffer(
                payload.campaign_id,
                CrowdfundEvent::Deactivated(payload.clone()),
                meta,
            ),
        }
    }

    pub fn apply_withdrawn(
        mut self,
        payload: &WithdrawnFilter,
        meta: &EventMeta,
    ) -> Self {
        match self.campaigns.get_mut(&payload.campaign_id) {
            Some(campaign) => {
                campaign.withdrawn = true;
                campaign.active = false;
                self
            }
            None => self.buffer(
                payload.campaign_id,
                CrowdfundEvent::Withdrawn(payload.clone()),
                meta,
            ),
        }
    }

    pub fn apply_refunded(
        mut self,
        payload: &RefundedFilter,
        meta: &EventMeta,
    ) -> Self {
        let Some(campaign) = self.campaigns.get_mut(&payload.campaign_id)
        else {
            let event = CrowdfundEvent::Refunded(payload.clone());
            return self.buffer(payload.campaign_id, event, meta);
        };
        let position = meta.position();
        if matches!(campaign.refunded_at, Some(known) if known >= position) {
            return self;
        }
        campaign.refunded_at = Some(position);
        campaign.active = false;
        // Only contributions logged after the refund still count.
        campaign.raised = campaign
            .contributions
            .iter()
            .filter(|c| matches!(c.position, Some(p) if p > position))
            .fold(U256::zero(), |acc, c| acc.saturating_add(c.amount));
        self
    }

    fn buffer(
        mut self,
        campaign_id: U256,
        event: CrowdfundEvent,
        meta: &EventMeta,
    ) -> Self {
        tracing::debug!(
            campaign_id = %campaign_id,
            kind = %event.kind(),
            "Buffering event for unknown campaign",
        );
        self.buffered
            .entry(campaign_id)
            .or_default()
            .insert(meta.key(), LoggedEvent { event, meta: *meta });
        self.refetch.insert(campaign_id);
        self
    }

    fn drain_buffered(mut self, campaign_id: U256) -> Self {
        let Some(buffered) = self.buffered.remove(&campaign_id) else {
            return self;
        };
        let mut events: Vec<_> = buffered.into_values().collect();
        events.sort_by_key(|e| e.meta.position());
        events.iter().fold(self, |state, logged| state.apply(logged))
    }

    pub(crate) fn establish_session(
        mut self,
        account: Address,
        user: Option<&UserRecord>,
    ) -> Self {
        let display_name = user
            .filter(|u| u.registered && u.address == account)
            .map(|u| u.name.clone())
            .or_else(|| {
                self.users
                    .get(&account)
                    .filter(|u| u.registered)
                    .map(|u| u.name.clone())
            });
        self.session = Some(Session::new(account, display_name));
        self
    }

    pub(crate) fn logout(mut self) -> Self {
        self.session = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::TxHash;

    fn meta(block: u64, index: u64) -> EventMeta {
        EventMeta {
            tx_hash: TxHash::from_low_u64_be(block * 1000 + index),
            block_number: block,
            log_index: index,
        }
    }

    fn created(id: u64) -> CampaignCreatedFilter {
        CampaignCreatedFilter {
            campaign_id: id.into(),
            creator: Address::repeat_byte(0xc0),
            title: format!("campaign {id}"),
            goal: U256::exp10(19),
        }
    }

    fn funded(
        id: u64,
        funder: u8,
        amount: u64,
        timestamp: u64,
    ) -> FundedFilter {
        FundedFilter {
            campaign_id: id.into(),
            funder: Address::repeat_byte(funder),
            amount: amount.into(),
            timestamp: timestamp.into(),
        }
    }

    fn with_campaign(id: u64) -> ViewState {
        ViewState::default().apply_campaign_created(&created(id), &meta(1, 0))
    }

    #[test]
    fn funded_twice_is_applied_once() {
        let event = funded(7, 0x22, 500, 100);
        let once = with_campaign(7).apply_funded(&event, &meta(2, 0));
        let twice = once.clone().apply_funded(&event, &meta(2, 0));
        assert_eq!(once, twice);
        let campaign = twice.campaign(7.into()).unwrap();
        assert_eq!(campaign.raised, U256::from(500));
        assert_eq!(campaign.contributions.len(), 1);
    }

    #[test]
    fn funded_before_created_is_buffered_and_drained() {
        let state = ViewState::default()
            .apply_funded(&funded(3, 0x22, 10, 1), &meta(5, 1));
        assert_eq!(state.buffered_events(), 1);
        assert_eq!(state.pending_refetches(), vec![U256::from(3)]);
        assert!(state.campaign(3.into()).is_none());

        let state = state.apply_campaign_created(&created(3), &meta(4, 0));
        assert_eq!(state.buffered_events(), 0);
        assert_eq!(state.campaign(3.into()).unwrap().raised, U256::from(10));
    }

    #[test]
    fn buffered_campaign_is_requested_until_it_resolves() {
        let mut state = ViewState::default()
            .apply_funded(&funded(9, 0x22, 10, 1), &meta(5, 0));
        assert_eq!(state.take_refetch_requests(), vec![U256::from(9)]);
        // A failed read does not re-queue anything by itself.
        assert_eq!(state.take_refetch_requests(), vec![U256::from(9)]);
        assert!(state.pending_refetches().is_empty());

        let mut state = state.apply_campaign_created(&created(9), &meta(4, 0));
        assert_eq!(state.buffered_events(), 0);
        assert_eq!(state.take_refetch_requests(), vec![U256::from(9)]);
        assert!(state.take_refetch_requests().is_empty());
    }

    #[test]
    fn events_commute() {
        let events = vec![
            LoggedEvent {
                event: CrowdfundEvent::CampaignCreated(created(1)),
                meta: meta(1, 0),
            },
            LoggedEvent {
                event: CrowdfundEvent::Funded(funded(1, 0x22, 5, 10)),
                meta: meta(2, 0),
            },
            LoggedEvent {
                event: CrowdfundEvent::Funded(funded(1, 0x33, 7, 11)),
                meta: meta(3, 0),
            },
            LoggedEvent {
                event: CrowdfundEvent::Deactivated(DeactivatedFilter {
                    campaign_id: 1.into(),
                }),
                meta: meta(4, 0),
            },
        ];
        let forward =
            events.iter().fold(ViewState::default(), |s, e| s.apply(e));
        let backward = events
            .iter()
            .rev()
            .fold(ViewState::default(), |s, e| s.apply(e));
        assert_eq!(forward.campaigns, backward.campaigns);
        let campaign = forward.campaign(1.into()).unwrap();
        assert_eq!(campaign.raised, U256::from(12));
        assert!(!campaign.active);
    }

    #[test]
    fn late_contribution_does_not_raise_after_refund() {
        let refunded = RefundedFilter {
            campaign_id: 1.into(),
        };
        let state = with_campaign(1)
            .apply_funded(&funded(1, 0x22, 5, 10), &meta(2, 0))
            .apply_refunded(&refunded, &meta(6, 0));
        let campaign = state.campaign(1.into()).unwrap();
        assert_eq!(campaign.raised, U256::zero());
        assert!(!campaign.active);

        // Logged before the refund, delivered after it.
        let state = state.apply_funded(&funded(1, 0x33, 9, 11), &meta(3, 0));
        let campaign = state.campaign(1.into()).unwrap();
        assert_eq!(campaign.raised, U256::zero());
        assert_eq!(campaign.contributions.len(), 2);
    }

    #[test]
    fn snapshot_never_lowers_raised() {
        let state = with_campaign(1)
            .apply_funded(&funded(1, 0x22, 5, 10), &meta(2, 0));
        let stale = CampaignSnapshot {
            id: 1.into(),
            creator: Address::repeat_byte(0xc0),
            title: "campaign 1".into(),
            description: "details".into(),
            goal: U256::exp10(19),
            raised: U256::zero(),
            active: true,
            contributions: vec![],
            created_at: 1_700_000_000,
            deadline: 1_800_000_000,
        };
        let state = state.apply_campaign_snapshot(&stale);
        let campaign = state.campaign(1.into()).unwrap();
        assert_eq!(campaign.raised, U256::from(5));
        assert_eq!(campaign.description, "details");
        assert!(state.pending_refetches().is_empty());
    }

    #[test]
    fn registration_event_completes_session() {
        let account = Address::repeat_byte(0xaa);
        let state = ViewState::default().establish_session(account, None);
        assert!(!state.session.as_ref().unwrap().registered());
        let state = state.apply_user_registered(
            &UserRegisteredFilter {
                user: account,
                name: "Ada".into(),
            },
            &meta(9, 0),
        );
        let session = state.session.as_ref().unwrap();
        assert_eq!(session.display_name(), Some("Ada"));
        assert!(state.users[&account].registered);
    }
}
