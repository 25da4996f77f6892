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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "crowdfund_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the client changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Session establishment, account switches and logouts.
    #[display(fmt = "session")]
    Session,
    /// Event subscription sync state.
    #[display(fmt = "sync")]
    Sync,
    /// A contract call passing through simulation and submission.
    #[display(fmt = "invocation")]
    Invocation,
    /// Pending transaction state changes.
    #[display(fmt = "tx_tracker")]
    TxTracker,
    /// View state store reconciliation.
    #[display(fmt = "view_store")]
    ViewStore,
    /// Signed transactions forwarded through the relay endpoint.
    #[display(fmt = "relay")]
    Relay,
    /// When the client will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
