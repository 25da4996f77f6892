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

//! Tracking submitted transactions until they settle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ethers::types::TxHash;
use ethers::utils::keccak256;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;

use crowdfund_ledger_gateway::{
    ConfirmationOptions, Notification, NotificationSender, ReceiptStatus,
    SharedGateway, TransactionHandle, TxStatus, unix_millis,
};
use crowdfund_utils::clickable_link::tx_hash_for_logs;
use crowdfund_utils::metric::Metrics;
use crowdfund_utils::probe;

/// A transaction the client submitted and is following.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub label: String,
    /// Unix time in milliseconds.
    pub submitted_at: u64,
    pub status: TxStatus,
    /// Why the transaction ended up `Failed` or `Dropped`.
    pub reason: Option<String>,
}

#[derive(Default)]
struct Entries {
    /// In submission order.
    active: Vec<PendingTransaction>,
    history: Vec<PendingTransaction>,
    waiters: HashMap<TxHash, JoinHandle<()>>,
}

struct TrackerInner {
    gateway: SharedGateway,
    options: ConfirmationOptions,
    entries: RwLock<Entries>,
    notifications: NotificationSender,
    metrics: Metrics,
    unsent: AtomicU64,
}

/// Follows submitted transactions to a terminal status.
///
/// Every tracked transaction gets its own waiting task, so a slow receipt
/// never blocks the others. Each status change is announced exactly once on
/// the notification channel. Nothing is ever resubmitted.
#[derive(Clone)]
pub struct TransactionTracker {
    inner: Arc<TrackerInner>,
}

impl std::fmt::Debug for TransactionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTracker")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl TransactionTracker {
    pub fn new(
        gateway: SharedGateway,
        options: ConfirmationOptions,
        notifications: NotificationSender,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                gateway,
                options,
                entries: RwLock::new(Entries::default()),
                notifications,
                metrics,
                unsent: AtomicU64::new(0),
            }),
        }
    }

    /// Starts following `handle`. Tracking the same hash twice is a no-op.
    pub fn track(&self, handle: TransactionHandle, label: impl Into<String>) {
        let label = label.into();
        let entry = PendingTransaction {
            hash: handle.hash,
            label: label.clone(),
            submitted_at: handle.submitted_at,
            status: TxStatus::Pending,
            reason: None,
        };
        {
            let mut entries = self.inner.entries.write();
            let known = entries
                .active
                .iter()
                .chain(entries.history.iter())
                .any(|tx| tx.hash == handle.hash);
            if known {
                return;
            }
            entries.active.push(entry);
            let waiter = tokio::spawn(Self::await_receipt(
                Arc::downgrade(&self.inner),
                self.inner.gateway.clone(),
                handle.hash,
                self.inner.options,
            ));
            entries.waiters.insert(handle.hash, waiter);
        }
        self.inner.metrics.in_flight_transactions.inc();
        self.announce(handle.hash, label, TxStatus::Pending, None);
    }

    /// Records an action the node refused to accept as `Dropped` right
    /// away. The node never assigned it a hash, so the entry gets a local
    /// one, which is returned.
    pub fn record_unsent(
        &self,
        label: impl Into<String>,
        reason: impl Into<String>,
    ) -> TxHash {
        let label = label.into();
        let reason = Some(reason.into());
        let nonce = self.inner.unsent.fetch_add(1, Ordering::Relaxed);
        let submitted_at = unix_millis();
        let hash = TxHash::from(keccak256(format!(
            "unsent:{submitted_at}:{nonce}:{label}"
        )));
        self.inner.entries.write().active.push(PendingTransaction {
            hash,
            label: label.clone(),
            submitted_at,
            status: TxStatus::Dropped,
            reason: reason.clone(),
        });
        self.inner.metrics.transactions_dropped.inc();
        tracing::warn!(%label, "Transaction was never broadcast");
        self.announce(hash, label, TxStatus::Dropped, reason);
        hash
    }

    async fn await_receipt(
        tracker: Weak<TrackerInner>,
        gateway: SharedGateway,
        hash: TxHash,
        options: ConfirmationOptions,
    ) {
        let gateway = gateway.current();
        let outcome = gateway.await_confirmation(hash, options).await;
        let Some(inner) = tracker.upgrade() else {
            return;
        };
        let tracker = TransactionTracker { inner };
        let (status, reason) = match outcome {
            Ok(receipt) if receipt.status == ReceiptStatus::Success => {
                (TxStatus::Confirmed, None)
            }
            Ok(_) => (
                TxStatus::Failed,
                Some("transaction reverted on chain".to_string()),
            ),
            // Timed out, vanished, or the node failed us.
            Err(e) => (TxStatus::Dropped, Some(e.to_string())),
        };
        tracing::info!(
            "Tx {} finished as {:?}",
            tx_hash_for_logs(gateway.explorer(), hash),
            status,
        );
        tracker.settle(hash, status, reason);
    }

    /// Moves `hash` to a terminal status. Returns false when it was already
    /// settled or is unknown.
    fn settle(
        &self,
        hash: TxHash,
        status: TxStatus,
        reason: Option<String>,
    ) -> bool {
        let label = {
            let mut entries = self.inner.entries.write();
            let Some(tx) = entries
                .active
                .iter_mut()
                .find(|tx| tx.hash == hash && !tx.status.is_terminal())
            else {
                return false;
            };
            tx.status = status;
            tx.reason = reason.clone();
            let label = tx.label.clone();
            entries.waiters.remove(&hash);
            label
        };
        let metrics = &self.inner.metrics;
        metrics.in_flight_transactions.dec();
        match status {
            TxStatus::Confirmed => metrics.transactions_confirmed.inc(),
            TxStatus::Failed => metrics.transactions_failed.inc(),
            TxStatus::Dropped => metrics.transactions_dropped.inc(),
            TxStatus::Pending => {}
        }
        self.announce(hash, label, status, reason);
        true
    }

    fn announce(
        &self,
        hash: TxHash,
        label: String,
        status: TxStatus,
        reason: Option<String>,
    ) {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxTracker,
            tx_hash = ?hash,
            status = ?status,
        );
        // No receivers is fine, nobody is listening yet.
        let _ = self.inner.notifications.send(Notification::Transaction {
            hash,
            label,
            status,
            reason,
        });
    }

    /// Stops waiting for `hash` and marks it `Dropped`.
    ///
    /// The transaction may still be mined; we just stop caring.
    pub fn abandon(&self, hash: TxHash) -> bool {
        if let Some(waiter) = self.inner.entries.write().waiters.remove(&hash)
        {
            waiter.abort();
        }
        self.settle(hash, TxStatus::Dropped, Some("abandoned".to_string()))
    }

    /// All tracked transactions not yet cleared, in submission order.
    pub fn list(&self) -> Vec<PendingTransaction> {
        self.inner.entries.read().active.clone()
    }

    pub fn get(&self, hash: TxHash) -> Option<PendingTransaction> {
        let entries = self.inner.entries.read();
        entries
            .active
            .iter()
            .chain(entries.history.iter())
            .find(|tx| tx.hash == hash)
            .cloned()
    }

    /// Number of transactions still `Pending`.
    pub fn in_flight(&self) -> usize {
        self.inner
            .entries
            .read()
            .active
            .iter()
            .filter(|tx| tx.status == TxStatus::Pending)
            .count()
    }

    /// Moves every settled transaction into the history.
    pub fn clear_finished(&self) -> usize {
        let mut entries = self.inner.entries.write();
        let (finished, active): (Vec<_>, Vec<_>) =
            std::mem::take(&mut entries.active)
                .into_iter()
                .partition(|tx| tx.status.is_terminal());
        entries.active = active;
        let cleared = finished.len();
        entries.history.extend(finished);
        cleared
    }

    /// Settled transactions removed by [`TransactionTracker::clear_finished`].
    pub fn history(&self) -> Vec<PendingTransaction> {
        self.inner.entries.read().history.clone()
    }

    /// Aborts every waiting task and marks what was still pending as
    /// `Dropped`.
    pub fn shutdown(&self) {
        let waiters: Vec<_> =
            self.inner.entries.write().waiters.drain().collect();
        for (hash, waiter) in waiters {
            waiter.abort();
            let reason = Some("shut down".to_string());
            self.settle(hash, TxStatus::Dropped, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdfund_ledger_gateway::mock::{MockGateway, MockOutcome};
    use ethers::types::Address;
    use tokio::sync::broadcast;

    struct Harness {
        gateway: Arc<MockGateway>,
        tracker: TransactionTracker,
        notifications: broadcast::Receiver<Notification>,
    }

    fn harness() -> Harness {
        harness_with(ConfirmationOptions::default())
    }

    fn harness_with(options: ConfirmationOptions) -> Harness {
        let gateway = Arc::new(MockGateway::new(Address::repeat_byte(0xcf)));
        let (tx, rx) = broadcast::channel(64);
        let tracker = TransactionTracker::new(
            SharedGateway::new(gateway.clone()),
            options,
            tx,
            Metrics::new().unwrap(),
        );
        Harness {
            gateway,
            tracker,
            notifications: rx,
        }
    }

    async fn next_status(
        rx: &mut broadcast::Receiver<Notification>,
    ) -> TxStatus {
        match rx.recv().await.unwrap() {
            Notification::Transaction { status, .. } => status,
            other => panic!("unexpected notification {other:?}"),
        }
    }

    #[tokio::test]
    async fn reverted_receipt_fails_once() {
        let mut h = harness();
        let hash = TxHash::repeat_byte(0x01);
        h.tracker.track(TransactionHandle::new(hash), "fundCampaign(7)");
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Pending);
        assert_eq!(h.tracker.in_flight(), 1);

        h.gateway
            .release(hash, MockOutcome::Mined(ReceiptStatus::Reverted));
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Failed);

        assert_eq!(h.tracker.in_flight(), 0);
        assert_eq!(h.tracker.get(hash).unwrap().status, TxStatus::Failed);
        // Terminal states never change.
        assert!(!h.tracker.abandon(hash));
        assert_eq!(h.tracker.get(hash).unwrap().status, TxStatus::Failed);
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn list_is_in_submission_order_and_clears_into_history() {
        let mut h = harness();
        let first = TxHash::repeat_byte(0x01);
        let second = TxHash::repeat_byte(0x02);
        h.tracker.track(TransactionHandle::new(first), "a");
        h.tracker.track(TransactionHandle::new(second), "b");
        h.tracker.track(TransactionHandle::new(first), "a again");
        let hashes: Vec<_> = h.tracker.list().iter().map(|t| t.hash).collect();
        assert_eq!(hashes, vec![first, second]);

        h.gateway
            .release(second, MockOutcome::Mined(ReceiptStatus::Success));
        next_status(&mut h.notifications).await;
        next_status(&mut h.notifications).await;
        assert_eq!(
            next_status(&mut h.notifications).await,
            TxStatus::Confirmed
        );

        assert_eq!(h.tracker.clear_finished(), 1);
        assert_eq!(h.tracker.list().len(), 1);
        assert_eq!(h.tracker.history()[0].hash, second);
    }

    #[tokio::test]
    async fn abandon_stops_waiting() {
        let mut h = harness();
        let hash = TxHash::repeat_byte(0x03);
        h.tracker.track(TransactionHandle::new(hash), "withdrawFunds(1)");
        next_status(&mut h.notifications).await;

        assert!(h.tracker.abandon(hash));
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Dropped);

        // A late receipt does not resurrect it.
        h.gateway
            .release(hash, MockOutcome::Mined(ReceiptStatus::Success));
        tokio::task::yield_now().await;
        assert_eq!(h.tracker.get(hash).unwrap().status, TxStatus::Dropped);
        assert_eq!(h.tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn dropped_by_node() {
        let mut h = harness();
        let hash = TxHash::repeat_byte(0x04);
        h.tracker.track(TransactionHandle::new(hash), "refund(2)");
        next_status(&mut h.notifications).await;
        h.gateway
            .release(hash, MockOutcome::Dropped("replaced".into()));
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Dropped);
        assert!(h.tracker.get(hash).unwrap().reason.is_some());
    }

    #[tokio::test]
    async fn confirmation_timeout_drops_once() {
        let mut h = harness_with(ConfirmationOptions {
            timeout: Some(std::time::Duration::from_millis(10)),
            ..Default::default()
        });
        let hash = TxHash::repeat_byte(0x05);
        h.tracker.track(TransactionHandle::new(hash), "fundCampaign(3)");
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Pending);
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Dropped);

        assert_eq!(h.tracker.in_flight(), 0);
        let tx = h.tracker.get(hash).unwrap();
        assert_eq!(tx.status, TxStatus::Dropped);
        assert!(tx.reason.is_some());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_drops_pending_transactions() {
        let mut h = harness();
        let pending = TxHash::repeat_byte(0x06);
        let done = TxHash::repeat_byte(0x07);
        h.tracker.track(TransactionHandle::new(done), "refund(1)");
        h.gateway
            .release(done, MockOutcome::Mined(ReceiptStatus::Success));
        next_status(&mut h.notifications).await;
        assert_eq!(
            next_status(&mut h.notifications).await,
            TxStatus::Confirmed
        );
        h.tracker.track(TransactionHandle::new(pending), "fundCampaign(1)");
        next_status(&mut h.notifications).await;
        assert_eq!(h.tracker.in_flight(), 1);

        h.tracker.shutdown();
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Dropped);
        assert!(h.notifications.try_recv().is_err());
        assert_eq!(h.tracker.in_flight(), 0);
        let tx = h.tracker.get(pending).unwrap();
        assert_eq!(tx.status, TxStatus::Dropped);
        assert_eq!(tx.reason.as_deref(), Some("shut down"));
        assert_eq!(h.tracker.get(done).unwrap().status, TxStatus::Confirmed);

        // Nothing left to settle.
        h.tracker.shutdown();
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsent_action_is_recorded_as_dropped() {
        let mut h = harness();
        let label = "fundCampaign(7)";
        let first = h.tracker.record_unsent(label, "nonce too low");
        let second = h.tracker.record_unsent(label, "nonce too low");
        assert_ne!(first, second);

        match h.notifications.recv().await.unwrap() {
            Notification::Transaction {
                hash,
                label,
                status,
                reason,
            } => {
                assert_eq!(hash, first);
                assert_eq!(label, "fundCampaign(7)");
                assert_eq!(status, TxStatus::Dropped);
                assert_eq!(reason.as_deref(), Some("nonce too low"));
            }
            other => panic!("unexpected notification {other:?}"),
        }
        assert_eq!(next_status(&mut h.notifications).await, TxStatus::Dropped);
        assert_eq!(h.tracker.in_flight(), 0);
        assert_eq!(h.tracker.list().len(), 2);
        assert!(!h.tracker.abandon(first));
        assert!(h.gateway.submitted_calls().is_empty());
    }
}
