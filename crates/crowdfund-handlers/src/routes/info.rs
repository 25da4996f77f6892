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

use axum::extract::State;
use axum::Json;
use ethers::types::Address;
use serde::Serialize;

use crowdfund_context::CrowdfundContext;
use crowdfund_utils::HandlerError;

/// Client information response struct
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInformationResponse {
    contract: Address,
    account: Option<Address>,
    registered: bool,
    block_number: u64,
    campaigns: usize,
    in_flight_transactions: usize,
}

/// Handles the client's view of the chain and its session.
pub async fn handle_client_info(
    State(ctx): State<Arc<CrowdfundContext>>,
) -> Result<Json<ClientInformationResponse>, HandlerError> {
    let gateway = ctx.gateway();
    let block_number = gateway.block_number().await?;
    let state = ctx.snapshot();
    let session = state.session.as_ref();
    Ok(Json(ClientInformationResponse {
        contract: gateway.contract_address(),
        account: session.map(|s| s.account),
        registered: session.map_or(false, |s| s.registered()),
        block_number,
        campaigns: state.campaigns.len(),
        in_flight_transactions: ctx.tracker().in_flight(),
    }))
}
