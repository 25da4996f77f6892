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

//! Typed contract events.
//!
//! Raw logs are decoded here, at the gateway boundary, into
//! [`CrowdfundEvent`]. Everything past this module matches on variants.

use std::fmt;

use ethers::contract::EthEvent;
use ethers::types::{Address, Log, TxHash, H256, U256};
use serde::Serialize;

use crate::abi::{
    CampaignCreatedFilter, DeactivatedFilter, FundedFilter, RefundedFilter,
    UserRegisteredFilter, WithdrawnFilter,
};

/// The kinds of events the crowdfunding contract emits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
pub enum EventKind {
    UserRegistered,
    CampaignCreated,
    Funded,
    Deactivated,
    Withdrawn,
    Refunded,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::UserRegistered,
        EventKind::CampaignCreated,
        EventKind::Funded,
        EventKind::Deactivated,
        EventKind::Withdrawn,
        EventKind::Refunded,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::UserRegistered => "UserRegistered",
            EventKind::CampaignCreated => "CampaignCreated",
            EventKind::Funded => "Funded",
            EventKind::Deactivated => "Deactivated",
            EventKind::Withdrawn => "Withdrawn",
            EventKind::Refunded => "Refunded",
        }
    }

    /// `topic0` of logs of this kind.
    pub fn signature(&self) -> H256 {
        match self {
            EventKind::UserRegistered => UserRegisteredFilter::signature(),
            EventKind::CampaignCreated => CampaignCreatedFilter::signature(),
            EventKind::Funded => FundedFilter::signature(),
            EventKind::Deactivated => DeactivatedFilter::signature(),
            EventKind::Withdrawn => WithdrawnFilter::signature(),
            EventKind::Refunded => RefundedFilter::signature(),
        }
    }

    pub fn from_signature(topic0: H256) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.signature() == topic0)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded crowdfunding event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrowdfundEvent {
    UserRegistered(UserRegisteredFilter),
    CampaignCreated(CampaignCreatedFilter),
    Funded(FundedFilter),
    Deactivated(DeactivatedFilter),
    Withdrawn(WithdrawnFilter),
    Refunded(RefundedFilter),
}

impl CrowdfundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CrowdfundEvent::UserRegistered(_) => EventKind::UserRegistered,
            CrowdfundEvent::CampaignCreated(_) => EventKind::CampaignCreated,
            CrowdfundEvent::Funded(_) => EventKind::Funded,
            CrowdfundEvent::Deactivated(_) => EventKind::Deactivated,
            CrowdfundEvent::Withdrawn(_) => EventKind::Withdrawn,
            CrowdfundEvent::Refunded(_) => EventKind::Refunded,
        }
    }

    /// The campaign this event is about, if any.
    pub fn campaign_id(&self) -> Option<U256> {
        match self {
            CrowdfundEvent::UserRegistered(_) => None,
            CrowdfundEvent::CampaignCreated(e) => Some(e.campaign_id),
            CrowdfundEvent::Funded(e) => Some(e.campaign_id),
            CrowdfundEvent::Deactivated(e) => Some(e.campaign_id),
            CrowdfundEvent::Withdrawn(e) => Some(e.campaign_id),
            CrowdfundEvent::Refunded(e) => Some(e.campaign_id),
        }
    }

    /// The indexed arguments, in declaration order, as they appear in
    /// `topic1..topic3` of the log.
    pub fn indexed_topics(&self) -> Vec<H256> {
        match self {
            CrowdfundEvent::UserRegistered(e) => vec![address_topic(e.user)],
            CrowdfundEvent::CampaignCreated(e) => {
                vec![u256_topic(e.campaign_id), address_topic(e.creator)]
            }
            CrowdfundEvent::Funded(e) => {
                vec![u256_topic(e.campaign_id), address_topic(e.funder)]
            }
            CrowdfundEvent::Deactivated(e) => vec![u256_topic(e.campaign_id)],
            CrowdfundEvent::Withdrawn(e) => vec![u256_topic(e.campaign_id)],
            CrowdfundEvent::Refunded(e) => vec![u256_topic(e.campaign_id)],
        }
    }
}

/// Identity of a log across re-announcements.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
pub struct EventKey {
    pub tx_hash: TxHash,
    pub log_index: u64,
}

/// Position of a log in the chain, the delivery order of events.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventMeta {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u64,
}

impl EventMeta {
    pub fn key(&self) -> EventKey {
        EventKey {
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }

    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// A decoded event together with where it was logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub event: CrowdfundEvent,
    pub meta: EventMeta,
}

impl LoggedEvent {
    /// Decodes a raw log emitted by the contract.
    ///
    /// Returns `None` for logs of unknown events and for pending logs that
    /// carry no position yet.
    pub fn decode(log: &Log) -> Option<Self> {
        let meta = EventMeta {
            tx_hash: log.transaction_hash?,
            block_number: log.block_number?.as_u64(),
            log_index: log.log_index?.low_u64(),
        };
        let kind = EventKind::from_signature(*log.topics.first()?)?;
        let raw = ethers::abi::RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let decoded = match kind {
            EventKind::UserRegistered => UserRegisteredFilter::decode_log(&raw)
                .map(CrowdfundEvent::UserRegistered),
            EventKind::CampaignCreated => {
                CampaignCreatedFilter::decode_log(&raw)
                    .map(CrowdfundEvent::CampaignCreated)
            }
            EventKind::Funded => {
                FundedFilter::decode_log(&raw).map(CrowdfundEvent::Funded)
            }
            EventKind::Deactivated => DeactivatedFilter::decode_log(&raw)
                .map(CrowdfundEvent::Deactivated),
            EventKind::Withdrawn => WithdrawnFilter::decode_log(&raw)
                .map(CrowdfundEvent::Withdrawn),
            EventKind::Refunded => RefundedFilter::decode_log(&raw)
                .map(CrowdfundEvent::Refunded),
        };
        match decoded {
            Ok(event) => Some(Self { event, meta }),
            Err(e) => {
                tracing::warn!(
                    %kind,
                    tx_hash = ?meta.tx_hash,
                    log_index = meta.log_index,
                    "Failed to decode log: {}",
                    e
                );
                None
            }
        }
    }
}

/// A positional topic filter over one event kind.
///
/// `topics[i]` constrains the `i`-th indexed argument; `None` matches
/// anything. The filter is also the stable identity of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventFilter {
    pub kind: EventKind,
    pub topics: [Option<H256>; 3],
}

impl EventFilter {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            topics: [None; 3],
        }
    }

    pub fn user_registered(user: Option<Address>) -> Self {
        Self::new(EventKind::UserRegistered)
            .with_topic(0, user.map(address_topic))
    }

    pub fn campaign_created(
        campaign_id: Option<U256>,
        creator: Option<Address>,
    ) -> Self {
        Self::new(EventKind::CampaignCreated)
            .with_topic(0, campaign_id.map(u256_topic))
            .with_topic(1, creator.map(address_topic))
    }

    pub fn funded(campaign_id: Option<U256>, funder: Option<Address>) -> Self {
        Self::new(EventKind::Funded)
            .with_topic(0, campaign_id.map(u256_topic))
            .with_topic(1, funder.map(address_topic))
    }

    pub fn deactivated(campaign_id: Option<U256>) -> Self {
        Self::new(EventKind::Deactivated)
            .with_topic(0, campaign_id.map(u256_topic))
    }

    pub fn withdrawn(campaign_id: Option<U256>) -> Self {
        Self::new(EventKind::Withdrawn)
            .with_topic(0, campaign_id.map(u256_topic))
    }

    pub fn refunded(campaign_id: Option<U256>) -> Self {
        Self::new(EventKind::Refunded)
            .with_topic(0, campaign_id.map(u256_topic))
    }

    /// Constrains the indexed argument at `position` (0-based).
    /// Positions past the last topic slot are ignored.
    pub fn with_topic(mut self, position: usize, topic: Option<H256>) -> Self {
        if let Some(slot) = self.topics.get_mut(position) {
            *slot = topic;
        }
        self
    }

    pub fn matches(&self, logged: &LoggedEvent) -> bool {
        if logged.event.kind() != self.kind {
            return false;
        }
        let indexed = logged.event.indexed_topics();
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            None => true,
            Some(topic) => indexed.get(i) == Some(topic),
        })
    }

    /// The equivalent `eth_getLogs` filter for the given contract.
    pub fn to_log_filter(&self, contract: Address) -> ethers::types::Filter {
        let mut filter = ethers::types::Filter::new()
            .address(contract)
            .topic0(self.kind.signature());
        if let Some(t) = self.topics[0] {
            filter = filter.topic1(t);
        }
        if let Some(t) = self.topics[1] {
            filter = filter.topic2(t);
        }
        if let Some(t) = self.topics[2] {
            filter = filter.topic3(t);
        }
        filter
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .topics
            .iter()
            .map(|t| match t {
                Some(t) => format!("{t:?}"),
                None => "*".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.kind, args)
    }
}

pub fn u256_topic(value: U256) -> H256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    H256(bytes)
}

pub fn address_topic(address: Address) -> H256 {
    H256::from(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{AbiEncode, Token};

    fn funded_log(campaign: u64, funder: Address, amount: u64) -> Log {
        let data = ethers::abi::encode(&[
            Token::Uint(U256::from(amount)),
            Token::Uint(U256::from(1_700_000_000u64)),
        ]);
        Log {
            address: Address::repeat_byte(0xcf),
            topics: vec![
                EventKind::Funded.signature(),
                u256_topic(U256::from(campaign)),
                address_topic(funder),
            ],
            data: data.into(),
            block_number: Some(12.into()),
            transaction_hash: Some(TxHash::repeat_byte(0xab)),
            log_index: Some(3.into()),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_funded_log() {
        let funder = Address::repeat_byte(0x22);
        let logged = LoggedEvent::decode(&funded_log(7, funder, 1000)).unwrap();
        assert_eq!(logged.meta.block_number, 12);
        assert_eq!(logged.meta.log_index, 3);
        match logged.event {
            CrowdfundEvent::Funded(e) => {
                assert_eq!(e.campaign_id, U256::from(7));
                assert_eq!(e.funder, funder);
                assert_eq!(e.amount, U256::from(1000));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn pending_and_foreign_logs_are_skipped() {
        let mut pending = funded_log(1, Address::zero(), 1);
        pending.block_number = None;
        assert!(LoggedEvent::decode(&pending).is_none());

        let mut foreign = funded_log(1, Address::zero(), 1);
        foreign.topics[0] = H256::repeat_byte(0x01);
        assert!(LoggedEvent::decode(&foreign).is_none());
    }

    #[test]
    fn filter_matches_positional_topics() {
        let funder = Address::repeat_byte(0x22);
        let logged = LoggedEvent::decode(&funded_log(7, funder, 1)).unwrap();
        assert!(EventFilter::funded(None, None).matches(&logged));
        assert!(EventFilter::funded(Some(7.into()), None).matches(&logged));
        assert!(EventFilter::funded(None, Some(funder)).matches(&logged));
        assert!(!EventFilter::funded(Some(8.into()), None).matches(&logged));
        assert!(!EventFilter::refunded(Some(7.into())).matches(&logged));
    }

    #[test]
    fn u256_topic_is_left_padded_big_endian() {
        let topic = u256_topic(U256::from(7));
        assert_eq!(topic, H256::from_low_u64_be(7));
        assert_eq!(H256::from_slice(&U256::from(7).encode()), topic);
    }
}
