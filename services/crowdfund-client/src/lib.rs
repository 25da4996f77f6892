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


#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Crowdfund Client Crate 🕸️
//!
//! A client for a crowdfunding contract: users register, create campaigns,
//! fund them, and creators withdraw or refund.
//!
//! ## Overview
//!
//! The client keeps a local, event-reconciled view of the contract. On
//! startup it replays the contract's logs since deployment, then follows
//! new blocks, so the view converges on what the chain says regardless of
//! missed or re-announced logs.
//!
//! #### Transaction Relaying
//!
//! Pre-signed transactions can be forwarded to the node through
//! `POST /api/v1/relay`.
//!
//! #### Data Querying
//!
//! Campaigns, users and contributions are served read-only under
//! `/api/v1`.

/// A module for starting the client's long-running tasks.
pub mod service;

/// A type alias for the result for the client, that uses the `Error` enum.
pub type Result<T> = crowdfund_utils::Result<T>;
