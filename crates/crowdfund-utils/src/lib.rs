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
//! # Crowdfund Utils 🕸️
//!
//! Shared error type, logging probes, retry policies and metrics used by
//! every crate in the workspace.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ethers::types::TxHash;

pub mod clickable_link;

/// Metrics functionality
pub mod metric;
/// A module used for debugging client lifecycle, sync state, or other client state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered while talking to
/// the crowdfunding contract, tracking transactions or syncing events.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No signer is connected, so nothing can be signed or submitted.
    #[error("No wallet or signer is available")]
    WalletUnavailable,
    /// The signer declined to sign the transaction.
    #[error("The signer rejected the request: {}", _0)]
    UserRejected(String),
    /// The dry-run of the call reverted, nothing was submitted.
    #[error("Simulation reverted: {reason}")]
    SimulationReverted {
        /// The human readable revert reason.
        reason: String,
    },
    /// The node refused the signed transaction (nonce, funds, ...).
    #[error("Broadcast rejected by the node: {}", _0)]
    Broadcast(String),
    /// No receipt arrived in time. The transaction may still be mined.
    #[error("Timed out waiting for confirmation of 0x{hash:x}")]
    ConfirmationTimeout {
        /// The hash of the transaction we gave up on.
        hash: TxHash,
    },
    /// The node lost track of the transaction, or failed while we waited.
    #[error("Transaction 0x{hash:x} dropped: {reason}")]
    TransactionDropped {
        /// The hash of the dropped transaction.
        hash: TxHash,
        /// What the node reported.
        reason: String,
    },
    /// The event transport failed while polling for logs.
    #[error("Subscription transport error: {}", _0)]
    SubscriptionTransport(String),
    /// The caller supplied a malformed amount or missing field.
    #[error("Invalid input: {}", _0)]
    InvalidInput(String),
    /// A view call returned nothing for the requested campaign.
    #[error("Campaign {} not found", _0)]
    CampaignNotFound(ethers::types::U256),
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// ABI encoding or decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::abi::AbiError),
    /// Ethers currency conversion error
    #[error(transparent)]
    Conversion(#[from] ethers::utils::ConversionError),
    /// Metrics registry error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// a background task failed and stopped abnormally.
    #[error("Task Stopped Abnormally")]
    TaskStoppedAbnormally,
}

impl Error {
    /// Errors that are recovered where they happen: shown inline to the user,
    /// and no transaction was attempted.
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Error::SimulationReverted { .. } | Error::InvalidInput(_)
        )
    }

    /// Errors after which a flow aborts without touching any local state.
    pub fn is_wallet_error(&self) -> bool {
        matches!(self, Error::WalletUnavailable | Error::UserRejected(_))
    }
}

/// A type alias for the result used across the workspace, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        let status = match value {
            Error::InvalidInput(_) | Error::SimulationReverted { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::CampaignNotFound(_) => StatusCode::NOT_FOUND,
            Error::Broadcast(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::WalletUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HandlerError(status, value.to_string())
    }
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_errors_are_classified() {
        let reverted = Error::SimulationReverted {
            reason: "Goal already reached".into(),
        };
        assert!(reverted.is_inline());
        assert!(Error::InvalidInput("amount".into()).is_inline());
        assert!(!Error::WalletUnavailable.is_inline());
        assert!(Error::UserRejected("denied".into()).is_wallet_error());
    }

    #[test]
    fn simulation_reverted_displays_reason() {
        let err = Error::SimulationReverted {
            reason: "Name already taken".into(),
        };
        assert_eq!(err.to_string(), "Simulation reverted: Name already taken");
    }

    #[test]
    fn handler_error_maps_status() {
        let err: HandlerError = Error::InvalidInput("bad hex".into()).into();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        let err: HandlerError =
            Error::CampaignNotFound(ethers::types::U256::from(7)).into();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
