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

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, TxHash, U256};
use tokio::sync::broadcast;

use crowdfund_config::event_watcher::EventsWatcherConfig;
use crowdfund_context::{ContextOptions, CrowdfundContext};
use crowdfund_event_subscriptions::StartBlock;
use crowdfund_ledger_gateway::abi::{
    CampaignCreatedFilter, FundedFilter, UserRegisteredFilter,
};
use crowdfund_ledger_gateway::mock::{MockGateway, MockOutcome};
use crowdfund_ledger_gateway::{
    CampaignSnapshot, CrowdfundEvent, LedgerGateway, Notification,
    ReceiptStatus, TxStatus, UserRecord,
};
use crowdfund_utils::Error;

fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

fn creator() -> Address {
    Address::repeat_byte(0xc0)
}

fn one_ether() -> U256 {
    U256::exp10(18)
}

fn options() -> ContextOptions {
    ContextOptions::builder()
        .events_watcher(EventsWatcherConfig {
            polling_interval: 5,
            max_blocks_per_step: 100,
            seen_set_capacity: 1000,
            resubscribe_max_elapsed: 200,
        })
        .refetch_interval(Duration::from_millis(5))
        .refetch_max_retries(2)
        .build()
}

fn setup() -> (Arc<MockGateway>, CrowdfundContext) {
    let gateway = Arc::new(
        MockGateway::new(Address::repeat_byte(0xcf)).with_account(alice()),
    );
    let context = CrowdfundContext::new(gateway.clone(), options()).unwrap();
    (gateway, context)
}

fn campaign_seven() -> CampaignSnapshot {
    CampaignSnapshot {
        id: 7.into(),
        creator: creator(),
        title: "Solar roof".into(),
        description: "Panels for the community hall".into(),
        goal: one_ether() * 10,
        raised: U256::zero(),
        active: true,
        contributions: Vec::new(),
        created_at: 1_700_000_000,
        deadline: 1_800_000_000,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met in time");
}

async fn next_transaction(
    rx: &mut broadcast::Receiver<Notification>,
) -> (TxHash, TxStatus) {
    loop {
        let received =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        if let Notification::Transaction { hash, status, .. } =
            received.unwrap().unwrap()
        {
            return (hash, status);
        }
    }
}

#[tokio::test]
async fn contribute_is_pending_then_reconciled_then_confirmed() {
    let (gateway, context) = setup();
    gateway.insert_campaign(campaign_seven());
    gateway.emit(
        CrowdfundEvent::CampaignCreated(CampaignCreatedFilter {
            campaign_id: 7.into(),
            creator: creator(),
            title: "Solar roof".into(),
            goal: one_ether() * 10,
        }),
        3,
    );
    gateway.set_block_number(10);

    let head = context.replay().await.unwrap();
    assert_eq!(head, 10);
    let campaign = context.store().campaign(7.into()).unwrap();
    assert_eq!(campaign.description, "Panels for the community hall");
    context.start(StartBlock::From(head + 1));

    let mut notifications = context.notifications();
    let hash = TxHash::repeat_byte(0xab);
    gateway.queue_tx_hash(hash);
    let handle = context.contribute(7.into(), "1.0").await.unwrap();
    assert_eq!(handle.hash, hash);
    assert_eq!(
        next_transaction(&mut notifications).await,
        (hash, TxStatus::Pending)
    );
    assert_eq!(context.tracker().get(hash).unwrap().status, TxStatus::Pending);
    let submitted = gateway.submitted_calls();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].value, one_ether());

    gateway.set_block_number(11);
    gateway.emit(
        CrowdfundEvent::Funded(FundedFilter {
            campaign_id: 7.into(),
            funder: alice(),
            amount: one_ether(),
            timestamp: 1_700_000_100u64.into(),
        }),
        11,
    );
    let store = context.store().clone();
    eventually(|| {
        store
            .campaign(7.into())
            .map_or(false, |c| c.contributions.len() == 1)
    })
    .await;
    let campaign = store.campaign(7.into()).unwrap();
    assert_eq!(campaign.raised, one_ether());
    assert_eq!(campaign.contributions[0].contributor, alice());

    gateway.release(hash, MockOutcome::Mined(ReceiptStatus::Success));
    assert_eq!(
        next_transaction(&mut notifications).await,
        (hash, TxStatus::Confirmed)
    );
    context.shutdown();
}

#[tokio::test]
async fn rejected_registration_leaves_no_trace() {
    let (gateway, context) = setup();
    context.connect().await.unwrap();
    gateway.revert_on("registerUser", "Name already taken");
    let mut notifications = context.notifications();

    let err = context.register("alice").await.unwrap_err();
    assert!(
        matches!(err, Error::SimulationReverted { ref reason } if reason == "Name already taken")
    );
    assert!(gateway.submitted_calls().is_empty());
    assert!(context.tracker().list().is_empty());
    assert!(!context.store().session().unwrap().registered());
    assert!(context.subscriptions().active_subscriptions().is_empty());

    match notifications.try_recv().unwrap() {
        Notification::ActionRejected { action, reason } => {
            assert_eq!(action, "registerUser(alice)");
            assert!(reason.contains("Name already taken"));
        }
        other => panic!("unexpected notification {other:?}"),
    }
    context.shutdown();
}

#[tokio::test]
async fn registration_completes_on_own_event() {
    let (gateway, context) = setup();
    context.connect().await.unwrap();
    gateway.set_block_number(4);
    context.register("alice").await.unwrap();
    assert!(!context.store().session().unwrap().registered());

    // Someone else registering does not count.
    gateway.emit(
        CrowdfundEvent::UserRegistered(UserRegisteredFilter {
            user: creator(),
            name: "bob".into(),
        }),
        5,
    );
    gateway.emit(
        CrowdfundEvent::UserRegistered(UserRegisteredFilter {
            user: alice(),
            name: "alice".into(),
        }),
        6,
    );
    gateway.set_block_number(6);
    let store = context.store().clone();
    eventually(|| store.session().map_or(false, |s| s.registered())).await;
    assert_eq!(
        store.session().unwrap().display_name(),
        Some("alice")
    );
    eventually(|| context.subscriptions().active_subscriptions().is_empty())
        .await;
    context.shutdown();
}

#[tokio::test]
async fn switching_accounts_replaces_the_session() {
    let (gateway, context) = setup();
    context.connect().await.unwrap();
    let other = Arc::new(
        MockGateway::new(gateway.contract_address())
            .with_account(creator()),
    );
    other.insert_user(UserRecord {
        address: creator(),
        name: "carol".into(),
        registered: true,
    });
    let session = context.switch_account(other).await.unwrap();
    assert_eq!(session.account, creator());
    assert!(session.registered());
    context.logout();
    assert!(context.store().session().is_none());
}

#[tokio::test]
async fn relay_and_contribution_queries() {
    let (gateway, context) = setup();
    for (block, amount) in [(2u64, 1u64), (5, 2)] {
        gateway.emit(
            CrowdfundEvent::Funded(FundedFilter {
                campaign_id: 7.into(),
                funder: alice(),
                amount: one_ether() * amount,
                timestamp: block.into(),
            }),
            block,
        );
    }
    gateway.set_block_number(5);
    let mine = context.user_contributions(alice()).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[1].amount, one_ether() * 2);
    assert!(context.user_contributions(creator()).await.unwrap().is_empty());
    assert_eq!(
        context.campaign_contributions(7.into()).await.unwrap().len(),
        2
    );

    let signed = vec![0x02, 0x01];
    let relayed = context.relay(signed.clone().into()).await.unwrap();
    assert_eq!(relayed, TxHash::from(ethers::utils::keccak256(&signed)));
    assert_eq!(gateway.raw_broadcasts().len(), 1);
}

#[tokio::test]
async fn user_campaigns_fill_gaps_from_the_contract() {
    let (gateway, context) = setup();
    gateway.insert_campaign(campaign_seven());
    gateway.emit(
        CrowdfundEvent::CampaignCreated(CampaignCreatedFilter {
            campaign_id: 7.into(),
            creator: creator(),
            title: "Solar roof".into(),
            goal: one_ether() * 10,
        }),
        3,
    );
    assert!(context.store().campaign(7.into()).is_none());
    let campaigns = context.user_campaigns(creator()).await.unwrap();
    assert_eq!(campaigns.len(), 1);
    assert_eq!(campaigns[0].title, "Solar roof");
    assert!(context.store().campaign(7.into()).is_some());
    assert!(context.user_campaigns(alice()).await.unwrap().is_empty());
}

#[tokio::test]
async fn refused_broadcast_is_tracked_as_dropped() {
    let (gateway, context) = setup();
    let mut notifications = context.notifications();
    gateway.fail_next_broadcast("nonce too low");

    let err = context.contribute(7.into(), "1.0").await.unwrap_err();
    assert!(matches!(err, Error::Broadcast(ref msg) if msg == "nonce too low"));
    assert!(gateway.submitted_calls().is_empty());

    let tracked = context.tracker().list();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].label, "fundCampaign(7)");
    assert_eq!(tracked[0].status, TxStatus::Dropped);
    assert_eq!(tracked[0].reason.as_deref(), Some("nonce too low"));
    assert_eq!(context.tracker().in_flight(), 0);
    assert_eq!(
        next_transaction(&mut notifications).await,
        (tracked[0].hash, TxStatus::Dropped)
    );
    assert!(notifications.try_recv().is_err());

    // Trying again is a fresh invocation.
    let handle = context.contribute(7.into(), "1.0").await.unwrap();
    assert_eq!(
        next_transaction(&mut notifications).await,
        (handle.hash, TxStatus::Pending)
    );
    assert_eq!(context.tracker().list().len(), 2);
    context.shutdown();
}

#[tokio::test]
async fn shutdown_drops_what_is_still_pending() {
    let (_gateway, context) = setup();
    let handle = context.contribute(7.into(), "1.0").await.unwrap();
    assert_eq!(context.tracker().in_flight(), 1);
    context.shutdown();
    let tx = context.tracker().get(handle.hash).unwrap();
    assert_eq!(tx.status, TxStatus::Dropped);
    assert_eq!(context.tracker().in_flight(), 0);
}

#[tokio::test]
async fn buffered_events_resolve_once_the_campaign_is_readable() {
    let (gateway, context) = setup();
    gateway.emit(
        CrowdfundEvent::Funded(FundedFilter {
            campaign_id: 9.into(),
            funder: alice(),
            amount: one_ether(),
            timestamp: 1_700_000_050u64.into(),
        }),
        3,
    );
    gateway.set_block_number(10);

    // The node does not know campaign 9 yet, so every read fails.
    let head = context.replay().await.unwrap();
    assert!(context.store().campaign(9.into()).is_none());
    assert_eq!(context.snapshot().buffered_events(), 1);

    gateway.insert_campaign(CampaignSnapshot {
        id: 9.into(),
        ..campaign_seven()
    });
    context.start(StartBlock::From(head + 1));
    let store = context.store().clone();
    eventually(|| store.snapshot().buffered_events() == 0).await;
    let campaign = store.campaign(9.into()).unwrap();
    assert_eq!(campaign.title, "Solar roof");
    assert_eq!(campaign.contributions.len(), 1);
    assert_eq!(campaign.contributions[0].contributor, alice());
    context.shutdown();
}

#[tokio::test]
async fn rejected_campaign_is_labelled_by_its_title() {
    let (gateway, context) = setup();
    gateway.revert_on("createCampaign", "Goal must be positive");
    let mut notifications = context.notifications();

    let err = context
        .create_campaign("  Solar roof ", "Panels", "10")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SimulationReverted { .. }));
    match notifications.try_recv().unwrap() {
        Notification::ActionRejected { action, reason } => {
            assert_eq!(action, "createCampaign(Solar roof)");
            assert!(reason.contains("Goal must be positive"));
        }
        other => panic!("unexpected notification {other:?}"),
    }
    assert!(context.tracker().list().is_empty());
}
