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

#![warn(missing_docs)]

//! # Crowdfund Client Configuration Module 🕸️
//!
//! A module for configuring the crowdfunding client.
//!
//! ## Overview
//!
//! Possible configuration include:
//! * `port`: The port the relay server will listen on. Defaults to 9955
//! * `chain`: The network, the signing key and the crowdfunding contract.
//! * `events-watcher`: How contract events are polled and deduplicated.
//! * `tx-tracker`: How submitted transactions are awaited.

/// Chain and contract configuration
pub mod chain;
/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Event watcher configuration
pub mod event_watcher;
/// Transaction tracker configuration
pub mod tx_tracker;
/// Utils for processing configuration
pub mod utils;

use serde::{Deserialize, Serialize};

use chain::ChainConfig;
use event_watcher::EventsWatcherConfig;
use tx_tracker::TxTrackerConfig;

/// The default port the relay server will listen on. Defaults to 9955.
const fn default_port() -> u16 {
    9955
}
/// Relaying signed transactions is enabled by default.
const fn enable_relay_default() -> bool {
    true
}
/// Data query access is set to `true` by default.
const fn enable_data_query_default() -> bool {
    true
}
/// The polling interval is set to `3_000` ms by default.
const fn polling_interval_default() -> u64 {
    3_000
}
/// The maximum blocks per logs query is set to `1_000` by default.
const fn max_blocks_per_step_default() -> u64 {
    1_000
}
/// A subscription remembers up to `10_000` delivered logs by default.
const fn seen_set_capacity_default() -> usize {
    10_000
}
/// Resubscribing gives up after `30_000` ms by default.
const fn resubscribe_max_elapsed_default() -> u64 {
    30_000
}
/// One confirmation is enough by default.
const fn confirmations_default() -> usize {
    1
}
/// Receipts are polled every `1_000` ms by default.
const fn receipt_poll_interval_default() -> u64 {
    1_000
}

/// CrowdfundConfig is the configuration for the crowdfunding client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrowdfundConfig {
    /// Relay server port number
    ///
    /// default to 9955
    #[serde(default = "default_port", skip_serializing)]
    pub port: u16,
    /// The network and the crowdfunding contract deployed on it.
    pub chain: ChainConfig,
    /// Event polling and dedup configuration.
    #[serde(default)]
    pub events_watcher: EventsWatcherConfig,
    /// Pending transaction tracking configuration.
    #[serde(default)]
    pub tx_tracker: TxTrackerConfig,
    /// Configuration for running the HTTP surface.
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// FeaturesConfig is the configuration for running the HTTP surface.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeaturesConfig {
    /// Enable `POST /relay` for forwarding pre-signed transactions.
    #[serde(default = "enable_relay_default")]
    pub relay: bool,
    /// Enable the read-only campaign and user endpoints.
    #[serde(default = "enable_data_query_default")]
    pub data_query: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            relay: enable_relay_default(),
            data_query: enable_data_query_default(),
        }
    }
}
