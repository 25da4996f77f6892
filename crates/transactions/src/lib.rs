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

//! # Crowdfund Transactions 🕸️
//!
//! Submitting contract calls and following them until they settle.

/// Input validation, dry-run and submission of contract calls.
pub mod invocation;
/// Asynchronous tracking of submitted transactions.
pub mod tracker;

pub use invocation::{describe, parse_ether_amount, ContractInvoker};
pub use tracker::{PendingTransaction, TransactionTracker};
