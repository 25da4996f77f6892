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
use serde::Serialize;

use crowdfund_context::CrowdfundContext;
use crowdfund_ledger_gateway::UserRecord;
use crowdfund_utils::HandlerError;
use crowdfund_view_store::Campaign;

use super::{ContributionResponse, ContributionsResponse};
use crate::parse_address;

/// Users response struct
#[derive(Debug, Serialize)]
pub struct UsersResponse {
    users: Vec<UserRecord>,
}

/// User response struct
#[derive(Debug, Serialize)]
pub struct UserResponse {
    user: UserRecord,
    contributions: Vec<ContributionResponse>,
}

/// User campaigns response struct
#[derive(Debug, Serialize)]
pub struct UserCampaignsResponse {
    campaigns: Vec<Campaign>,
}

/// Handles the user directory, as read from the contract.
pub async fn handle_users(
    State(ctx): State<Arc<CrowdfundContext>>,
) -> Result<Json<UsersResponse>, HandlerError> {
    let users = ctx.refresh_users().await?;
    Ok(Json(UsersResponse { users }))
}

/// Handles a user and everything it contributed.
pub async fn handle_user(
    State(ctx): State<Arc<CrowdfundContext>>,
    Path(address): Path<String>,
) -> Result<Json<UserResponse>, HandlerError> {
    let address = parse_address(&address)?;
    let user = ctx.gateway().read_user(address).await?;
    let contributions = ctx
        .user_contributions(address)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(UserResponse {
        user,
        contributions,
    }))
}

/// Handles the contributions made by a user, read from the `Funded` logs.
pub async fn handle_user_contributions(
    State(ctx): State<Arc<CrowdfundContext>>,
    Path(address): Path<String>,
) -> Result<Json<ContributionsResponse>, HandlerError> {
    let address = parse_address(&address)?;
    let entries = ctx.user_contributions(address).await?;
    Ok(Json(entries.into()))
}

/// Handles the campaigns created by a user.
pub async fn handle_user_campaigns(
    State(ctx): State<Arc<CrowdfundContext>>,
    Path(address): Path<String>,
) -> Result<Json<UserCampaignsResponse>, HandlerError> {
    let address = parse_address(&address)?;
    let campaigns = ctx.user_campaigns(address).await?;
    Ok(Json(UserCampaignsResponse { campaigns }))
}
