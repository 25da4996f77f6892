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

use ethers::types::{Address, U256};
use serde::Serialize;

use crowdfund_ledger_gateway::{
    CampaignSnapshot, ContributionRecord, EventPosition,
};

/// Whether the session's account has registered a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Registration {
    Unregistered,
    Registered { display_name: String },
}

/// The connected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account: Address,
    pub registration: Registration,
}

impl Session {
    pub fn new(account: Address, display_name: Option<String>) -> Self {
        let registration = match display_name {
            Some(display_name) => Registration::Registered { display_name },
            None => Registration::Unregistered,
        };
        Self {
            account,
            registration,
        }
    }

    pub fn registered(&self) -> bool {
        matches!(self.registration, Registration::Registered { .. })
    }

    pub fn display_name(&self) -> Option<&str> {
        match &self.registration {
            Registration::Registered { display_name } => Some(display_name),
            Registration::Unregistered => None,
        }
    }
}

/// Identity of a contribution.
///
/// Two contributions by the same account with the same amount in the same
/// second are indistinguishable and collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContributionKey {
    pub timestamp: u64,
    pub contributor: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub campaign_id: U256,
    pub contributor: Address,
    pub amount: U256,
    pub timestamp: u64,
    #[serde(skip)]
    pub(crate) position: Option<EventPosition>,
}

impl Contribution {
    pub fn key(&self) -> ContributionKey {
        ContributionKey {
            timestamp: self.timestamp,
            contributor: self.contributor,
            amount: self.amount,
        }
    }

    pub(crate) fn from_record(
        campaign_id: U256,
        record: &ContributionRecord,
    ) -> Self {
        Self {
            campaign_id,
            contributor: record.contributor,
            amount: record.amount,
            timestamp: record.timestamp,
            position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: U256,
    pub creator: Address,
    pub title: String,
    pub description: String,
    pub goal: U256,
    pub raised: U256,
    pub active: bool,
    pub withdrawn: bool,
    pub created_at: u64,
    pub deadline: u64,
    /// Ordered by `(timestamp, contributor, amount)`.
    pub contributions: Vec<Contribution>,
    /// Position of the latest refund seen. Contributions logged before it
    /// were returned and no longer count towards `raised`.
    #[serde(skip)]
    pub(crate) refunded_at: Option<EventPosition>,
}

impl Campaign {
    pub(crate) fn announced(
        id: U256,
        creator: Address,
        title: String,
        goal: U256,
    ) -> Self {
        Self {
            id,
            creator,
            title,
            description: String::new(),
            goal,
            raised: U256::zero(),
            active: true,
            withdrawn: false,
            created_at: 0,
            deadline: 0,
            contributions: Vec::new(),
            refunded_at: None,
        }
    }

    pub(crate) fn from_snapshot(snapshot: &CampaignSnapshot) -> Self {
        Self {
            id: snapshot.id,
            creator: snapshot.creator,
            title: snapshot.title.clone(),
            description: snapshot.description.clone(),
            goal: snapshot.goal,
            raised: snapshot.raised,
            active: snapshot.active,
            withdrawn: false,
            created_at: snapshot.created_at,
            deadline: snapshot.deadline,
            contributions: snapshot
                .contributions
                .iter()
                .map(|c| Contribution::from_record(snapshot.id, c))
                .collect(),
            refunded_at: None,
        }
        .with_sorted_contributions()
    }

    fn with_sorted_contributions(mut self) -> Self {
        self.contributions.sort_by_key(Contribution::key);
        self.contributions.dedup_by_key(|c| c.key());
        self
    }

    pub fn was_refunded(&self) -> bool {
        self.refunded_at.is_some()
    }

    /// Inserts `contribution` unless already known. Returns whether it was
    /// new.
    pub(crate) fn insert_contribution(
        &mut self,
        contribution: Contribution,
    ) -> bool {
        let key = contribution.key();
        match self.contributions.binary_search_by_key(&key, Contribution::key) {
            Ok(existing) => {
                let known = &mut self.contributions[existing];
                if known.position.is_none() {
                    known.position = contribution.position;
                }
                false
            }
            Err(at) => {
                self.contributions.insert(at, contribution);
                true
            }
        }
    }

    /// Contributions are immutable once observed; a later snapshot only adds
    /// what is missing and never lowers `raised`.
    pub(crate) fn merge_snapshot(&mut self, snapshot: &CampaignSnapshot) {
        self.creator = snapshot.creator;
        self.title = snapshot.title.clone();
        self.description = snapshot.description.clone();
        self.goal = snapshot.goal;
        self.created_at = snapshot.created_at;
        self.deadline = snapshot.deadline;
        self.active = self.active && snapshot.active;
        if self.refunded_at.is_none() {
            self.raised = self.raised.max(snapshot.raised);
        }
        for record in &snapshot.contributions {
            let contribution = Contribution::from_record(self.id, record);
            self.insert_contribution(contribution);
        }
    }

    pub fn total_contributed_by(&self, contributor: Address) -> U256 {
        self.contributions
            .iter()
            .filter(|c| c.contributor == contributor)
            .fold(U256::zero(), |acc, c| acc.saturating_add(c.amount))
    }
}
