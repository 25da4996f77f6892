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


//! HTTP handlers of the crowdfunding client.
//!
//! A thin surface over [`CrowdfundContext`]: forwarding pre-signed
//! transactions, and read-only views of campaigns, users and tracked
//! transactions.

#![warn(missing_docs)]
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use ethers::types::{Address, U256};

use crowdfund_config::FeaturesConfig;
use crowdfund_context::CrowdfundContext;
use crowdfund_utils::HandlerError;

/// Module handles the client API
pub mod routes;

/// Builds the `/api/v1` routes enabled by `features`.
pub fn build_web_services(
    features: FeaturesConfig,
) -> Router<Arc<CrowdfundContext>> {
    let mut api = Router::new()
        .route("/info", get(routes::handle_client_info))
        .route("/metrics", get(routes::handle_metric_info))
        .route("/transactions", get(routes::handle_transactions));
    if features.relay {
        api = api.route("/relay", post(routes::handle_relay));
    } else {
        tracing::warn!("Transaction relaying is not enabled");
    }
    if features.data_query {
        api = api
            .route(
                "/contributions/:address",
                get(routes::handle_contribution_total),
            )
            .route("/campaigns", get(routes::handle_campaigns))
            .route("/campaigns/:id", get(routes::handle_campaign))
            .route(
                "/campaigns/:id/contributions",
                get(routes::handle_campaign_contributions),
            )
            .route("/users", get(routes::handle_users))
            .route("/users/:address", get(routes::handle_user))
            .route(
                "/users/:address/contributions",
                get(routes::handle_user_contributions),
            )
            .route(
                "/users/:address/campaigns",
                get(routes::handle_user_campaigns),
            );
    }
    api
}

/// Parses an address path segment.
pub(crate) fn parse_address(value: &str) -> Result<Address, HandlerError> {
    Address::from_str(value).map_err(|_| {
        HandlerError(
            StatusCode::BAD_REQUEST,
            format!("Invalid address: {value}"),
        )
    })
}

/// Parses a decimal campaign id path segment.
pub(crate) fn parse_campaign_id(value: &str) -> Result<U256, HandlerError> {
    U256::from_dec_str(value).map_err(|_| {
        HandlerError(
            StatusCode::BAD_REQUEST,
            format!("Invalid campaign id: {value}"),
        )
    })
}
