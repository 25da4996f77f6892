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

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use backoff::backoff::Backoff;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::JoinHandle;

use crowdfund_config::event_watcher::EventsWatcherConfig;
use crowdfund_ledger_gateway::{
    BlockTag, EventFilter, EventPosition, LedgerGateway, LoggedEvent,
    Notification, NotificationSender,
};
use crowdfund_utils::metric::Metrics;
use crowdfund_utils::{probe, retry};

use crate::seen::SeenSet;

/// Callback invoked once per delivered event.
pub type OnEvent = Box<dyn FnMut(&LoggedEvent) + Send>;

/// Where a subscription starts reading logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartBlock {
    /// Only logs in blocks after the current head.
    #[default]
    Head,
    /// Every log from this block on, inclusive.
    From(u64),
}

struct Delivery {
    on_event: OnEvent,
    seen: SeenSet,
    cursor: Option<EventPosition>,
}

pub(crate) struct Subscription {
    pub(crate) id: u64,
    pub(crate) filter: EventFilter,
    once: bool,
    active: AtomicBool,
    /// Held for the whole duration of a delivery. Re-entrant, so the callback
    /// itself may unsubscribe.
    delivery: ReentrantMutex<RefCell<Delivery>>,
    /// Next block to read. `None` until the head has been resolved.
    from_block: Mutex<Option<u64>>,
    start: StartBlock,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        filter: EventFilter,
        start: StartBlock,
        once: bool,
        seen_set_capacity: usize,
        on_event: OnEvent,
    ) -> Self {
        Self {
            id,
            filter,
            once,
            active: AtomicBool::new(true),
            delivery: ReentrantMutex::new(RefCell::new(Delivery {
                on_event,
                seen: SeenSet::new(seen_set_capacity),
                cursor: None,
            })),
            from_block: Mutex::new(match start {
                StartBlock::Head => None,
                StartBlock::From(block) => Some(block),
            }),
            start,
            task: Mutex::new(None),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stops deliveries. Once this returns no new callback starts.
    pub(crate) fn deactivate(&self) {
        {
            // Waits for an in-flight delivery on another thread.
            let _delivery = self.delivery.lock();
            self.active.store(false, Ordering::SeqCst);
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Replaces the polling task, keeping seen-set and cursor.
    pub(crate) fn restart(
        self: &Arc<Self>,
        gateway: Arc<dyn LedgerGateway>,
        config: EventsWatcherConfig,
        notifications: NotificationSender,
        metrics: Metrics,
    ) {
        let mut task = self.task.lock();
        if let Some(old) = task.take() {
            old.abort();
        }
        if !self.is_active() {
            return;
        }
        let worker = Worker {
            subscription: Arc::downgrade(self),
            filter: self.filter,
            gateway,
            config,
            notifications,
            metrics,
        };
        *task = Some(tokio::spawn(worker.run()));
    }

    /// Delivers a batch in order. Returns false once the subscription is no
    /// longer active.
    pub(crate) fn deliver(
        &self,
        events: Vec<LoggedEvent>,
        notifications: &NotificationSender,
        metrics: &Metrics,
    ) -> bool {
        for logged in events {
            let guard = self.delivery.lock();
            if !self.is_active() {
                return false;
            }
            let mut delivery = guard.borrow_mut();
            if !delivery.seen.insert(logged.meta.key()) {
                metrics.duplicate_events_skipped.inc();
                continue;
            }
            let position = logged.meta.position();
            if matches!(delivery.cursor, Some(cursor) if position < cursor) {
                tracing::warn!(
                    filter = %self.filter,
                    tx_hash = ?logged.meta.tx_hash,
                    log_index = logged.meta.log_index,
                    "Skipping stale log below the delivery cursor",
                );
                continue;
            }
            delivery.cursor = Some(position);
            (delivery.on_event)(&logged);
            drop(delivery);

            metrics.events_reconciled.inc();
            let _ = notifications.send(Notification::EventReconciled {
                kind: logged.event.kind(),
                tx_hash: logged.meta.tx_hash,
                log_index: logged.meta.log_index,
                block_number: logged.meta.block_number,
            });
            if self.once {
                // Still holding the delivery lock, so nothing else slips in.
                self.active.store(false, Ordering::SeqCst);
                return false;
            }
        }
        self.is_active()
    }
}

/// The polling loop of one subscription.
struct Worker {
    subscription: Weak<Subscription>,
    filter: EventFilter,
    gateway: Arc<dyn LedgerGateway>,
    config: EventsWatcherConfig,
    notifications: NotificationSender,
    metrics: Metrics,
}

impl Worker {
    #[tracing::instrument(skip_all, fields(filter = %self.filter))]
    async fn run(self) {
        let polling_interval = self.config.polling_interval();
        let mut backoff = retry::resubscribe_backoff(
            polling_interval.min(Duration::from_millis(500)),
            self.config.resubscribe_max_elapsed(),
        );
        let mut degraded = false;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            filter = %self.filter,
            starting = true,
        );
        loop {
            let Some(subscription) = self.subscription.upgrade() else {
                return;
            };
            if !subscription.is_active() {
                return;
            }
            let outcome = self.poll_once(&subscription).await;
            drop(subscription);
            match outcome {
                Ok(true) => {
                    if degraded {
                        tracing::info!("Event subscription recovered");
                    }
                    degraded = false;
                    backoff.reset();
                    tokio::time::sleep(polling_interval).await;
                }
                Ok(false) => return,
                Err(e) => {
                    self.metrics.resubscribe_back_off.inc();
                    match backoff.next_backoff() {
                        Some(delay) => {
                            tracing::warn!(
                                "Event subscription failed, resubscribing in {}ms: {}",
                                delay.as_millis(),
                                e
                            );
                            tracing::event!(
                                target: probe::TARGET,
                                tracing::Level::DEBUG,
                                kind = %probe::Kind::Retry,
                                filter = %self.filter,
                                backoff = delay.as_millis() as u64,
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            if !degraded {
                                degraded = true;
                                tracing::error!(
                                    "Event subscription degraded: {}",
                                    e
                                );
                                let _ = self.notifications.send(
                                    Notification::SyncDegraded {
                                        subscription: self.filter.to_string(),
                                        error: e.to_string(),
                                    },
                                );
                            }
                            tokio::time::sleep(polling_interval).await;
                        }
                    }
                }
            }
        }
    }

    /// Reads the next window of logs and delivers it.
    ///
    /// The last processed block is read again on the next poll, so logs a
    /// node announces late in that block are still picked up.
    async fn poll_once(
        &self,
        subscription: &Subscription,
    ) -> crowdfund_utils::Result<bool> {
        let head = self.gateway.block_number().await?;
        let from = {
            let mut from_block = subscription.from_block.lock();
            *from_block.get_or_insert(head + 1)
        };
        if from > head {
            return Ok(true);
        }
        let step = self.config.max_blocks_per_step.max(1);
        let mut window_start = from;
        loop {
            let to = head.min(window_start.saturating_add(step - 1));
            let events = self
                .gateway
                .query_events(&self.filter, window_start, BlockTag::Number(to))
                .await?;
            tracing::trace!(
                from = window_start,
                to,
                "Found #{} events",
                events.len()
            );
            let keep_going = subscription.deliver(
                events,
                &self.notifications,
                &self.metrics,
            );
            *subscription.from_block.lock() = Some(to);
            if !keep_going {
                return Ok(false);
            }
            if to == head {
                return Ok(true);
            }
            window_start = to + 1;
        }
    }
}

/// Returned by a subscribe call. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    pub(crate) subscription: Arc<Subscription>,
    pub(crate) registry: Weak<Mutex<Vec<Weak<Subscription>>>>,
}

impl SubscriptionHandle {
    /// Stops deliveries. Idempotent, and safe from inside the callback or
    /// after the manager shut down.
    pub fn unsubscribe(&self) {
        if !self.subscription.is_active()
            && self.subscription.task.lock().is_none()
        {
            return;
        }
        self.subscription.deactivate();
        if let Some(registry) = self.registry.upgrade() {
            let id = self.subscription.id;
            registry.lock().retain(|s| {
                s.upgrade().map(|s| s.id != id).unwrap_or(false)
            });
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            filter = %self.subscription.filter,
            unsubscribed = true,
        );
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// The stable identity of the subscription: event kind plus topics.
    pub fn key(&self) -> EventFilter {
        self.subscription.filter
    }

    pub fn start(&self) -> StartBlock {
        self.subscription.start
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("filter", &self.subscription.filter)
            .field("active", &self.is_active())
            .finish()
    }
}
