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

use std::time::Duration;

use ethers::types::U256;

use crowdfund_ledger_gateway::SharedGateway;
use crowdfund_utils::retry::ConstantWithMaxRetryCount;
use crowdfund_utils::{probe, Result};
use crowdfund_view_store::{Campaign, ViewStateStore};

/// Resolves campaigns the view store asked for with targeted
/// `getCampaign` reads.
#[derive(Clone, Debug)]
pub(crate) struct Refetcher {
    gateway: SharedGateway,
    store: ViewStateStore,
    interval: Duration,
    max_retries: usize,
}

impl Refetcher {
    pub(crate) fn new(
        gateway: SharedGateway,
        store: ViewStateStore,
        interval: Duration,
        max_retries: usize,
    ) -> Self {
        Self {
            gateway,
            store,
            interval,
            max_retries,
        }
    }

    /// Reads campaign `id` and merges it into the store, retrying at a
    /// constant interval.
    #[tracing::instrument(skip_all, fields(campaign_id = %id))]
    pub(crate) async fn refresh(&self, id: U256) -> Result<Campaign> {
        let gateway = self.gateway.current();
        let backoff =
            ConstantWithMaxRetryCount::new(self.interval, self.max_retries);
        let task = || async {
            gateway.read_campaign(id).await.map_err(|e| {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Retry,
                    campaign_id = %id,
                    error = %e,
                );
                backoff::Error::transient(e)
            })
        };
        let snapshot = backoff::future::retry(backoff, task).await?;
        self.store.apply_campaign_snapshot(&snapshot);
        self.store
            .campaign(id)
            .ok_or(crowdfund_utils::Error::CampaignNotFound(id))
    }

    /// Serves every pending re-fetch request once.
    pub(crate) async fn drain(&self) {
        for id in self.store.take_refetch_requests() {
            if let Err(e) = self.refresh(id).await {
                tracing::warn!(
                    campaign_id = %id,
                    "Failed to re-fetch campaign: {}",
                    e
                );
            }
        }
    }

    /// Serves re-fetch requests every `period` until shutdown.
    pub(crate) async fn run(
        self,
        period: Duration,
        mut shutdown: crate::Shutdown,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("Refetch worker stopped");
                    return;
                }
                _ = tokio::time::sleep(period) => self.drain().await,
            }
        }
    }
}
