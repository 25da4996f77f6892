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

use super::*;

/// EventsWatcherConfig is the configuration for contract event subscriptions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventsWatcherConfig {
    /// Polling interval in milliseconds
    #[serde(
        rename(serialize = "pollingInterval"),
        default = "polling_interval_default"
    )]
    pub polling_interval: u64,
    /// The maximum number of blocks to fetch logs for in one request.
    #[serde(skip_serializing, default = "max_blocks_per_step_default")]
    pub max_blocks_per_step: u64,
    /// How many delivered `(tx hash, log index)` pairs a subscription keeps
    /// for deduplication before evicting the oldest.
    #[serde(skip_serializing, default = "seen_set_capacity_default")]
    pub seen_set_capacity: usize,
    /// How long (ms) a subscription keeps trying to re-establish itself before
    /// reporting a degraded sync.
    #[serde(skip_serializing, default = "resubscribe_max_elapsed_default")]
    pub resubscribe_max_elapsed: u64,
}

impl Default for EventsWatcherConfig {
    fn default() -> Self {
        Self {
            polling_interval: polling_interval_default(),
            max_blocks_per_step: max_blocks_per_step_default(),
            seen_set_capacity: seen_set_capacity_default(),
            resubscribe_max_elapsed: resubscribe_max_elapsed_default(),
        }
    }
}

impl EventsWatcherConfig {
    /// Polling interval as a [`Duration`].
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval)
    }

    /// Resubscribe budget as a [`Duration`].
    pub fn resubscribe_max_elapsed(&self) -> Duration {
        Duration::from_millis(self.resubscribe_max_elapsed)
    }
}
