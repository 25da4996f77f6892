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

use ethers::types::TxHash;
use serde::Serialize;

use crate::events::EventKind;

/// Local status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    Dropped,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// Something the caller should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// A tracked transaction changed status.
    #[serde(rename_all = "camelCase")]
    Transaction {
        hash: TxHash,
        label: String,
        status: TxStatus,
        reason: Option<String>,
    },
    /// A contract event was delivered to a subscriber.
    #[serde(rename_all = "camelCase")]
    EventReconciled {
        kind: EventKind,
        tx_hash: TxHash,
        log_index: u64,
        block_number: u64,
    },
    /// A subscription could not be re-established within its backoff budget.
    /// Polling continues at the base interval.
    #[serde(rename_all = "camelCase")]
    SyncDegraded { subscription: String, error: String },
    /// An action failed before anything was submitted.
    #[serde(rename_all = "camelCase")]
    ActionRejected { action: String, reason: String },
}

pub type NotificationSender = tokio::sync::broadcast::Sender<Notification>;
