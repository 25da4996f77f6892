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

//! # Crowdfund Event Subscriptions 🕸️
//!
//! Subscriptions to the contract's event streams, delivered at most once per
//! log and in chain order.
//!
//! Each subscription polls the node on its own task: it reads the logs of
//! the next window of blocks, filters what it already delivered, and hands
//! the rest to its callback. Transport failures are retried with an
//! exponential backoff; if that budget runs out, a `SyncDegraded`
//! notification is raised and polling carries on at the base interval.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crowdfund_config::event_watcher::EventsWatcherConfig;
use crowdfund_ledger_gateway::{
    BlockTag, EventFilter, LoggedEvent, NotificationSender, SharedGateway,
};
use crowdfund_utils::metric::Metrics;
use crowdfund_utils::{probe, retry};

mod seen;
mod subscription;

pub use seen::SeenSet;
pub use subscription::{OnEvent, StartBlock, SubscriptionHandle};

use subscription::Subscription;

type Registry = Mutex<Vec<Weak<Subscription>>>;

/// Creates and supervises event subscriptions over the shared gateway.
#[derive(Clone)]
pub struct EventSubscriptionManager {
    gateway: SharedGateway,
    config: EventsWatcherConfig,
    registry: Arc<Registry>,
    next_id: Arc<AtomicU64>,
    notifications: NotificationSender,
    metrics: Metrics,
}

impl std::fmt::Debug for EventSubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriptionManager")
            .field("subscriptions", &self.active_subscriptions().len())
            .finish()
    }
}

impl EventSubscriptionManager {
    pub fn new(
        gateway: SharedGateway,
        config: EventsWatcherConfig,
        notifications: NotificationSender,
        metrics: Metrics,
    ) -> Self {
        Self {
            gateway,
            config,
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            notifications,
            metrics,
        }
    }

    /// Calls `on_event` for every log matching `filter`, until the returned
    /// handle is unsubscribed or dropped.
    pub fn subscribe<F>(
        &self,
        filter: EventFilter,
        start: StartBlock,
        on_event: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(&LoggedEvent) + Send + 'static,
    {
        self.spawn(filter, start, false, Box::new(on_event))
    }

    /// Like [`EventSubscriptionManager::subscribe`], but stops after the
    /// first delivered event.
    pub fn subscribe_once<F>(
        &self,
        filter: EventFilter,
        start: StartBlock,
        on_event: F,
    ) -> SubscriptionHandle
    where
        F: FnOnce(&LoggedEvent) + Send + 'static,
    {
        let mut on_event = Some(on_event);
        self.spawn(
            filter,
            start,
            true,
            Box::new(move |logged| {
                if let Some(on_event) = on_event.take() {
                    on_event(logged);
                }
            }),
        )
    }

    fn spawn(
        &self,
        filter: EventFilter,
        start: StartBlock,
        once: bool,
        on_event: OnEvent,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let subscription = Arc::new(Subscription::new(
            id,
            filter,
            start,
            once,
            self.config.seen_set_capacity,
            on_event,
        ));
        {
            let mut registry = self.registry.lock();
            registry.retain(|s| s.strong_count() > 0);
            registry.push(Arc::downgrade(&subscription));
        }
        subscription.restart(
            self.gateway.current(),
            self.config,
            self.notifications.clone(),
            self.metrics.clone(),
        );
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            %filter,
            ?start,
            once,
            subscribed = true,
        );
        SubscriptionHandle {
            subscription,
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn live(&self) -> Vec<Arc<Subscription>> {
        self.registry
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|s| s.is_active())
            .collect()
    }

    /// Keys of the live subscriptions.
    pub fn active_subscriptions(&self) -> Vec<EventFilter> {
        self.live().iter().map(|s| s.filter).collect()
    }

    /// Restarts every live subscription on the current gateway.
    ///
    /// Call after the shared gateway was replaced. Delivered logs stay
    /// deduplicated across the switch.
    pub fn rebind(&self) {
        let gateway = self.gateway.current();
        let live = self.live();
        for subscription in &live {
            subscription.restart(
                gateway.clone(),
                self.config,
                self.notifications.clone(),
                self.metrics.clone(),
            );
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            rebound = live.len(),
            generation = self.gateway.generation(),
        );
    }

    /// Stops every subscription. Handles stay valid; unsubscribing them is a
    /// no-op.
    pub fn shutdown(&self) {
        let all: Vec<_> = self
            .registry
            .lock()
            .drain(..)
            .filter_map(|s| s.upgrade())
            .collect();
        for subscription in all {
            subscription.deactivate();
        }
    }

    /// Reads every log matching `filter` from `from_block` up to the current
    /// head, in windows of `max-blocks-per-step`, deduplicated and ordered.
    ///
    /// Transport errors are retried with the resubscribe backoff.
    #[tracing::instrument(
        skip_all,
        fields(filter = %filter, from_block = from_block)
    )]
    pub async fn replay(
        &self,
        filter: EventFilter,
        from_block: u64,
    ) -> crowdfund_utils::Result<Vec<LoggedEvent>> {
        let gateway = self.gateway.current();
        let backoff = retry::resubscribe_backoff(
            self.config
                .polling_interval()
                .min(std::time::Duration::from_millis(500)),
            self.config.resubscribe_max_elapsed(),
        );
        let step = self.config.max_blocks_per_step.max(1);
        let metrics = self.metrics.clone();
        let task = || async {
            let head = gateway
                .block_number()
                .await
                .map_err(backoff::Error::transient)?;
            let mut seen = HashSet::new();
            let mut found = Vec::new();
            let mut window_start = from_block;
            while window_start <= head {
                let to = head.min(window_start.saturating_add(step - 1));
                let events = gateway
                    .query_events(&filter, window_start, BlockTag::Number(to))
                    .await
                    .map_err(backoff::Error::transient)?;
                for logged in events {
                    if seen.insert(logged.meta.key()) {
                        found.push(logged);
                    } else {
                        metrics.duplicate_events_skipped.inc();
                    }
                }
                window_start = to + 1;
            }
            Ok::<_, backoff::Error<crowdfund_utils::Error>>(found)
        };
        let mut events = backoff::future::retry(backoff, task).await?;
        events.sort_by_key(|e| e.meta.position());
        tracing::debug!(count = events.len(), "Replayed events");
        Ok(events)
    }
}

#[cfg(test)]
mod tests;
