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
use serde::Serialize;

use crowdfund_context::CrowdfundContext;
use crowdfund_utils::HandlerError;

/// Metrics response struct
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetricResponse {
    metrics: String,
}

/// Handles the client's prometheus metrics.
pub async fn handle_metric_info(
    State(ctx): State<Arc<CrowdfundContext>>,
) -> Result<Json<ClientMetricResponse>, HandlerError> {
    let metrics = ctx.metrics.gather_metrics()?;
    Ok(Json(ClientMetricResponse { metrics }))
}
