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

use ethers::types::{Address, TxHash};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crowdfund_ledger_gateway::abi::FundedFilter;
use crowdfund_ledger_gateway::mock::MockGateway;
use crowdfund_ledger_gateway::{CrowdfundEvent, EventMeta, Notification};

use super::*;

fn config() -> EventsWatcherConfig {
    EventsWatcherConfig {
        polling_interval: 5,
        max_blocks_per_step: 10,
        seen_set_capacity: 100,
        resubscribe_max_elapsed: 30,
    }
}

fn funded(campaign: u64, amount: u64) -> CrowdfundEvent {
    CrowdfundEvent::Funded(FundedFilter {
        campaign_id: campaign.into(),
        funder: Address::repeat_byte(0x22),
        amount: amount.into(),
        timestamp: 1.into(),
    })
}

fn meta(block: u64, log_index: u64) -> EventMeta {
    EventMeta {
        tx_hash: TxHash::from_low_u64_be(block),
        block_number: block,
        log_index,
    }
}

struct Harness {
    gateway: Arc<MockGateway>,
    shared: SharedGateway,
    manager: EventSubscriptionManager,
    notifications: broadcast::Receiver<Notification>,
}

fn harness() -> Harness {
    let gateway = Arc::new(MockGateway::new(Address::repeat_byte(0xcf)));
    let shared = SharedGateway::new(gateway.clone());
    let (tx, rx) = broadcast::channel(256);
    let manager = EventSubscriptionManager::new(
        shared.clone(),
        config(),
        tx,
        Metrics::new().unwrap(),
    );
    Harness {
        gateway,
        shared,
        manager,
        notifications: rx,
    }
}

fn collector(
) -> (Arc<Mutex<Vec<LoggedEvent>>>, impl FnMut(&LoggedEvent) + Send) {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    (delivered, move |e: &LoggedEvent| sink.lock().push(e.clone()))
}

/// Waits for the next notification matching `pred`.
async fn wait_for(
    rx: &mut broadcast::Receiver<Notification>,
    pred: impl Fn(&Notification) -> bool,
) -> Notification {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(n) if pred(&n) => return n,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("notification channel closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a notification")
}

fn is_reconciled(n: &Notification) -> bool {
    matches!(n, Notification::EventReconciled { .. })
}

#[tokio::test]
async fn duplicate_logs_are_delivered_once() {
    let mut h = harness();
    h.gateway.emit_with_meta(funded(7, 1), meta(3, 0));
    h.gateway.emit_with_meta(funded(7, 1), meta(3, 0));
    h.gateway.emit_with_meta(funded(7, 2), meta(4, 0));

    let (delivered, on_event) = collector();
    let _handle = h.manager.subscribe(
        EventFilter::funded(Some(7.into()), None),
        StartBlock::From(0),
        on_event,
    );
    wait_for(&mut h.notifications, is_reconciled).await;
    wait_for(&mut h.notifications, is_reconciled).await;
    // A few more polls re-read the last block.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let delivered = delivered.lock();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].meta.block_number, 3);
    assert_eq!(delivered[1].meta.block_number, 4);
}

#[tokio::test]
async fn double_unsubscribe_stops_deliveries() {
    let mut h = harness();
    h.gateway.emit(funded(1, 1), 1);
    let (delivered, on_event) = collector();
    let handle = h.manager.subscribe(
        EventFilter::funded(None, None),
        StartBlock::From(0),
        on_event,
    );
    wait_for(&mut h.notifications, is_reconciled).await;

    handle.unsubscribe();
    handle.unsubscribe();
    assert!(!handle.is_active());
    assert!(h.manager.active_subscriptions().is_empty());

    h.gateway.emit(funded(1, 2), 2);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(delivered.lock().len(), 1);
    drop(handle);
}

#[tokio::test]
async fn callback_may_unsubscribe_itself() {
    let mut h = harness();
    h.gateway.emit(funded(1, 1), 1);
    h.gateway.emit(funded(1, 2), 2);

    let slot: Arc<Mutex<Option<SubscriptionHandle>>> =
        Arc::new(Mutex::new(None));
    let count = Arc::new(Mutex::new(0));
    let handle = {
        let slot = slot.clone();
        let count = count.clone();
        h.manager.subscribe(
            EventFilter::funded(None, None),
            StartBlock::From(0),
            move |_| {
                *count.lock() += 1;
                if let Some(handle) = slot.lock().as_ref() {
                    handle.unsubscribe();
                }
            },
        )
    };
    *slot.lock() = Some(handle);
    wait_for(&mut h.notifications, is_reconciled).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(*count.lock(), 1);
    assert!(h.manager.active_subscriptions().is_empty());
}

#[tokio::test]
async fn once_stops_after_first_event() {
    let mut h = harness();
    let (delivered, on_event) = collector();
    let handle = h.manager.subscribe_once(
        EventFilter::funded(None, Some(Address::repeat_byte(0x22))),
        StartBlock::Head,
        on_event,
    );
    // Let the subscription resolve the head first.
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.gateway.emit(funded(2, 1), 5);
    h.gateway.emit(funded(2, 2), 6);
    wait_for(&mut h.notifications, is_reconciled).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(delivered.lock().len(), 1);
    assert!(!handle.is_active());
}

#[tokio::test]
async fn transport_failures_degrade_once_then_recover() {
    let mut h = harness();
    h.gateway.emit(funded(1, 1), 1);
    h.gateway.fail_next_queries(40);
    let (delivered, on_event) = collector();
    let _handle = h.manager.subscribe(
        EventFilter::funded(None, None),
        StartBlock::From(0),
        on_event,
    );

    let degraded = wait_for(&mut h.notifications, |n| {
        matches!(n, Notification::SyncDegraded { .. })
    })
    .await;
    assert!(matches!(
        degraded,
        Notification::SyncDegraded { ref error, .. } if error.contains("connection reset")
    ));

    // Polling carries on and eventually delivers.
    wait_for(&mut h.notifications, is_reconciled).await;
    assert_eq!(delivered.lock().len(), 1);
    while let Ok(n) = h.notifications.try_recv() {
        assert!(!matches!(n, Notification::SyncDegraded { .. }));
    }
}

#[tokio::test]
async fn rebind_keeps_seen_set() {
    let mut h = harness();
    h.gateway.emit_with_meta(funded(1, 1), meta(1, 0));
    let (delivered, on_event) = collector();
    let _handle = h.manager.subscribe(
        EventFilter::funded(None, None),
        StartBlock::From(0),
        on_event,
    );
    wait_for(&mut h.notifications, is_reconciled).await;

    let other = Arc::new(MockGateway::new(Address::repeat_byte(0xcf)));
    other.emit_with_meta(funded(1, 1), meta(1, 0));
    other.emit_with_meta(funded(1, 5), meta(2, 0));
    h.shared.replace(other);
    h.manager.rebind();

    wait_for(&mut h.notifications, is_reconciled).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    let delivered = delivered.lock();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1].meta.block_number, 2);
}

#[tokio::test]
async fn replay_reads_in_windows() {
    let h = harness();
    for block in 1..=25 {
        h.gateway.emit(funded(block % 3, block), block);
    }
    let events = h
        .manager
        .replay(EventFilter::funded(None, None), 0)
        .await
        .unwrap();
    assert_eq!(events.len(), 25);
    assert!(events
        .windows(2)
        .all(|w| w[0].meta.position() < w[1].meta.position()));
    assert_eq!(
        h.gateway.queried_ranges(),
        vec![(0, 9), (10, 19), (20, 25)]
    );
}

#[tokio::test]
async fn polling_windows_span_max_blocks_per_step() {
    let h = harness();
    for block in 1..=25 {
        h.gateway.emit(funded(1, block), block);
    }
    let (delivered, on_event) = collector();
    let _handle = h.manager.subscribe(
        EventFilter::funded(None, None),
        StartBlock::From(0),
        on_event,
    );
    tokio::time::timeout(Duration::from_secs(5), async {
        while delivered.lock().len() < 25 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    let ranges = h.gateway.queried_ranges();
    assert_eq!(ranges[..3], [(0, 9), (10, 19), (20, 25)]);
    // Later polls only read the last block again.
    assert!(ranges[3..].iter().all(|range| *range == (25, 25)));
}

#[test]
#[tracing_test::traced_test]
fn stale_logs_below_cursor_are_skipped() {
    let (delivered, on_event) = collector();
    let subscription = Subscription::new(
        1,
        EventFilter::funded(None, None),
        StartBlock::From(0),
        false,
        16,
        Box::new(on_event),
    );
    let (tx, _rx) = broadcast::channel(16);
    let metrics = Metrics::new().unwrap();
    let newer = LoggedEvent {
        event: funded(1, 1),
        meta: meta(9, 0),
    };
    let older = LoggedEvent {
        event: funded(1, 2),
        meta: meta(4, 0),
    };
    assert!(subscription.deliver(vec![newer.clone()], &tx, &metrics));
    assert!(subscription.deliver(vec![older, newer], &tx, &metrics));

    assert_eq!(delivered.lock().len(), 1);
    assert_eq!(metrics.duplicate_events_skipped.get(), 1.0);
    assert!(logs_contain("Skipping stale log below the delivery cursor"));
}
