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

/// TxTrackerConfig controls how submitted transactions are awaited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TxTrackerConfig {
    /// Number of block confirmations before a receipt counts.
    #[serde(default = "confirmations_default")]
    pub confirmations: usize,
    /// Give up waiting after this many milliseconds.
    ///
    /// When unset, a transaction is awaited until it is abandoned or the
    /// client shuts down.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// How often (ms) the node is asked for the receipt.
    #[serde(default = "receipt_poll_interval_default")]
    pub poll_interval: u64,
}

impl Default for TxTrackerConfig {
    fn default() -> Self {
        Self {
            confirmations: confirmations_default(),
            timeout: None,
            poll_interval: receipt_poll_interval_default(),
        }
    }
}

impl TxTrackerConfig {
    /// The confirmation timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_millis)
    }

    /// Receipt polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }
}
