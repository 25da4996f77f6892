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


//! # Client Service Module 🕸️
//!
//! Services are tasks which the client constantly runs throughout its
//! lifetime: the HTTP surface and the event sync.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crowdfund_config::FeaturesConfig;
use crowdfund_context::CrowdfundContext;
use crowdfund_event_subscriptions::StartBlock;
use crowdfund_ledger_gateway::{Notification, TxStatus};

/// Sets up the HTTP server of the client, routing endpoint queries and
/// requests to the handlers enabled by `features`.
///
/// # Arguments
///
/// * `ctx` - The client context shared with the handlers
/// * `port` - The port to listen on
/// * `features` - Which groups of routes to serve
pub async fn build_web_services(
    ctx: Arc<CrowdfundContext>,
    port: u16,
    features: FeaturesConfig,
) -> crate::Result<()> {
    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), port);
    let api = crowdfund_handlers::build_web_services(features);

    let app = Router::new()
        .nest("/api/v1", api)
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
        .into_make_service_with_connect_info::<SocketAddr>();

    tracing::info!("Starting the server on {}", socket_addr);
    axum::Server::bind(&socket_addr).serve(app).await?;
    Ok(())
}

/// Establishes the session, rebuilds the view and starts following new
/// blocks.
///
/// A missing or failing signer is not fatal: the client then runs
/// read-only.
///
/// # Arguments
///
/// * `ctx` - The client context
/// * `skip_replay` - Only follow new blocks, without reading the history
pub async fn ignite(
    ctx: &CrowdfundContext,
    skip_replay: bool,
) -> crate::Result<()> {
    match ctx.connect().await {
        Ok(session) => tracing::info!(
            account = ?session.account,
            registered = session.registered(),
            "Connected"
        ),
        Err(e) => tracing::warn!("Running read-only: {}", e),
    }
    if skip_replay {
        tracing::warn!("Skipping the replay, only new blocks are followed");
        ctx.start(StartBlock::Head);
        return Ok(());
    }
    ctx.sync().await
}

/// Logs every notification of the client until shutdown.
///
/// Transaction outcomes and sync problems are what a user of the client
/// would otherwise see in a UI.
pub async fn log_notifications(ctx: Arc<CrowdfundContext>) {
    let mut shutdown = ctx.shutdown_signal();
    let mut notifications = BroadcastStream::new(ctx.notifications());
    loop {
        let next = tokio::select! {
            _ = shutdown.recv() => return,
            next = notifications.next() => next,
        };
        match next {
            Some(Ok(notification)) => log_notification(&notification),
            Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                tracing::warn!(missed, "Notifications lagged behind");
            }
            None => return,
        }
    }
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::Transaction {
            hash,
            label,
            status,
            reason,
        } => match status {
            TxStatus::Pending | TxStatus::Confirmed => {
                tracing::info!(?hash, %label, "Transaction {:?}", status)
            }
            TxStatus::Failed | TxStatus::Dropped => tracing::warn!(
                ?hash,
                %label,
                reason = reason.as_deref().unwrap_or_default(),
                "Transaction {:?}",
                status
            ),
        },
        Notification::EventReconciled {
            kind, block_number, ..
        } => {
            tracing::debug!(%kind, block_number, "Event reconciled");
        }
        Notification::SyncDegraded {
            subscription,
            error,
        } => {
            tracing::error!(%subscription, %error, "Event sync degraded");
        }
        Notification::ActionRejected { action, reason } => {
            tracing::warn!(%action, %reason, "Action rejected");
        }
    }
}
