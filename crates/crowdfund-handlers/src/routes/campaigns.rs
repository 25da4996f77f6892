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
use axum::Json;
use ethers::types::{Address, TxHash, U256};
use ethers::utils::format_ether;
use serde::Serialize;

use crowdfund_context::{ContributionEntry, CrowdfundContext};
use crowdfund_utils::HandlerError;
use crowdfund_view_store::Campaign;

use crate::parse_campaign_id;

/// A `Funded` log, with the amount in ether.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionResponse {
    campaign_id: U256,
    contributor: Address,
    amount: String,
    timestamp: u64,
    tx_hash: TxHash,
    block_number: u64,
}

impl From<ContributionEntry> for ContributionResponse {
    fn from(entry: ContributionEntry) -> Self {
        Self {
            campaign_id: entry.campaign_id,
            contributor: entry.contributor,
            amount: format_ether(entry.amount),
            timestamp: entry.timestamp,
            tx_hash: entry.tx_hash,
            block_number: entry.block_number,
        }
    }
}

/// Contributions response struct
#[derive(Debug, Serialize)]
pub struct ContributionsResponse {
    contributions: Vec<ContributionResponse>,
}

impl From<Vec<ContributionEntry>> for ContributionsResponse {
    fn from(entries: Vec<ContributionEntry>) -> Self {
        Self {
            contributions: entries.into_iter().map(Into::into).collect(),
        }
    }
}

/// Campaigns response struct
#[derive(Debug, Serialize)]
pub struct CampaignsResponse {
    campaigns: Vec<Campaign>,
}

/// Handles the list of campaigns known to the local view.
pub async fn handle_campaigns(
    State(ctx): State<Arc<CrowdfundContext>>,
) -> Json<CampaignsResponse> {
    let campaigns = ctx.snapshot().campaigns.into_values().collect();
    Json(CampaignsResponse { campaigns })
}

/// Handles a single campaign.
///
/// Campaigns missing from the local view are read from the contract.
///
/// # Arguments
///
/// * `id` - The decimal campaign id.
pub async fn handle_campaign(
    State(ctx): State<Arc<CrowdfundContext>>,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, HandlerError> {
    let id = parse_campaign_id(&id)?;
    match ctx.store().campaign(id) {
        Some(campaign) => Ok(Json(campaign)),
        None => Ok(Json(ctx.refresh_campaign(id).await?)),
    }
}

/// Handles the contributions made to a campaign, read from the `Funded`
/// logs.
pub async fn handle_campaign_contributions(
    State(ctx): State<Arc<CrowdfundContext>>,
    Path(id): Path<String>,
) -> Result<Json<ContributionsResponse>, HandlerError> {
    let id = parse_campaign_id(&id)?;
    let entries = ctx.campaign_contributions(id).await?;
    Ok(Json(entries.into()))
}
