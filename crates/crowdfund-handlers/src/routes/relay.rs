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


use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use ethers::types::{Bytes, TxHash};
use ethers::utils::format_ether;
use serde::{Deserialize, Serialize};

use crowdfund_context::CrowdfundContext;
use crowdfund_utils::HandlerError;

use crate::parse_address;

/// Relay request struct
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    signed_tx: Option<Bytes>,
}

/// Relay response struct
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    message: &'static str,
    tx_hash: TxHash,
}

/// Contribution total response struct
#[derive(Debug, Serialize)]
pub struct ContributionTotalResponse {
    contributions: String,
}

/// Forwards a pre-signed transaction to the node.
///
/// Returns the hash of the broadcast transaction. Nothing is tracked.
pub async fn handle_relay(
    State(ctx): State<Arc<CrowdfundContext>>,
    Json(payload): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, HandlerError> {
    let signed_tx = payload.signed_tx.filter(|tx| !tx.is_empty());
    let Some(signed_tx) = signed_tx else {
        return Err(HandlerError(
            StatusCode::BAD_REQUEST,
            "Missing signedTx".to_string(),
        ));
    };
    let tx_hash = ctx.relay(signed_tx).await?;
    tracing::info!(?tx_hash, "Transaction relayed");
    Ok(Json(RelayResponse {
        message: "Transaction relayed",
        tx_hash,
    }))
}

/// Handles the total an address ever contributed, in ether, as the contract
/// accounts it.
pub async fn handle_contribution_total(
    State(ctx): State<Arc<CrowdfundContext>>,
    Path(address): Path<String>,
) -> Result<Json<ContributionTotalResponse>, HandlerError> {
    let address = parse_address(&address)?;
    let total = ctx.contribution_total(address).await?;
    Ok(Json(ContributionTotalResponse {
        contributions: format_ether(total),
    }))
}
