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

//! # Crowdfund Ledger Gateway 🕸️
//!
//! The boundary between the client and the chain: the [`LedgerGateway`]
//! trait, its `ethers` implementation, contract bindings and typed events.

pub mod abi;
mod ethers_gateway;
pub mod events;
mod gateway;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod revert;
mod types;

pub use ethers_gateway::EthersGateway;
pub use events::{
    CrowdfundEvent, EventFilter, EventKey, EventKind, EventMeta, EventPosition,
    LoggedEvent,
};
pub use gateway::{LedgerGateway, SharedGateway};
pub use notification::{Notification, NotificationSender, TxStatus};
pub use types::{
    BlockTag, CampaignSnapshot, ConfirmationOptions, ContractCall,
    ContributionRecord, CrowdfundMethod, Receipt, ReceiptStatus,
    TransactionHandle, UserRecord, unix_millis,
};
