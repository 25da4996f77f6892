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
use crowdfund_transactions::PendingTransaction;

/// Transactions response struct
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    in_flight: usize,
    transactions: Vec<PendingTransaction>,
    history: Vec<PendingTransaction>,
}

/// Handles the transactions submitted by this client.
pub async fn handle_transactions(
    State(ctx): State<Arc<CrowdfundContext>>,
) -> Json<TransactionsResponse> {
    let tracker = ctx.tracker();
    Json(TransactionsResponse {
        in_flight: tracker.in_flight(),
        transactions: tracker.list(),
        history: tracker.history(),
    })
}
