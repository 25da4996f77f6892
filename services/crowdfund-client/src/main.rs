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


//! Crowdfund Client Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use tokio::signal::unix;

use crowdfund_client::service;
use crowdfund_config::cli::{load_config, setup_logger, Opts};
use crowdfund_context::CrowdfundContext;
use crowdfund_utils::probe;

/// The main entry point for the client.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, "crowdfund")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;
    tracing::trace!(
        "Client configuration: {}",
        serde_json::to_string_pretty(&config)?
    );

    // The context builds the provider, the signer and every component
    // that lives as long as the client.
    let ctx = Arc::new(CrowdfundContext::from_config(&config)?);

    // the HTTP server maps endpoint queries and requests to handled code,
    // so clients can interact with the contract through us.
    let server_handle = tokio::spawn(service::build_web_services(
        ctx.clone(),
        config.port,
        config.features,
    ));
    let notifications_handle =
        tokio::spawn(service::log_notifications(ctx.clone()));
    // replay the history, then follow new blocks in the background.
    service::ignite(&ctx, args.skip_replay).await?;
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );
    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let shutdown = || {
        tracing::warn!("Shutting down...");
        // send shutdown signal to all of the application.
        ctx.shutdown();
        // also abort the server task
        server_handle.abort();
        notifications_handle.abort();
        tracing::info!("Clean Exit ..");
    };
    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            shutdown();
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            shutdown();
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
            shutdown();
        },
    }
    Ok(())
}
