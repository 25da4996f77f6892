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

use std::time::Duration;

use typed_builder::TypedBuilder;

use crowdfund_config::event_watcher::EventsWatcherConfig;
use crowdfund_config::tx_tracker::TxTrackerConfig;
use crowdfund_config::CrowdfundConfig;
use crowdfund_ledger_gateway::ConfirmationOptions;

/// Tunables of a [`CrowdfundContext`](crate::CrowdfundContext).
#[derive(Debug, Clone, TypedBuilder)]
pub struct ContextOptions {
    /// Block the contract was deployed at. Log replay starts here.
    #[builder(default)]
    pub deployed_at: u64,
    /// Polling and backoff of the event subscriptions.
    #[builder(default)]
    pub events_watcher: EventsWatcherConfig,
    /// How transactions are awaited.
    #[builder(default)]
    pub tx_tracker: TxTrackerConfig,
    /// Capacity of the notification channel. Slow receivers lag behind and
    /// lose the oldest notifications.
    #[builder(default = 256)]
    pub notification_capacity: usize,
    /// Interval between two `getCampaign` attempts of a targeted re-fetch.
    #[builder(default = Duration::from_millis(500))]
    pub refetch_interval: Duration,
    /// How many times a targeted re-fetch is retried.
    #[builder(default = 5)]
    pub refetch_max_retries: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ContextOptions {
    /// Reads the options out of the loaded configuration.
    pub fn from_config(config: &CrowdfundConfig) -> Self {
        Self::builder()
            .deployed_at(config.chain.contract.deployed_at)
            .events_watcher(config.events_watcher)
            .tx_tracker(config.tx_tracker)
            .build()
    }

    pub(crate) fn confirmation_options(&self) -> ConfirmationOptions {
        ConfirmationOptions {
            confirmations: self.tx_tracker.confirmations,
            timeout: self.tx_tracker.timeout(),
            poll_interval: self.tx_tracker.poll_interval(),
        }
    }
}
