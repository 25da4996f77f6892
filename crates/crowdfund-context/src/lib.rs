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

#![warn(missing_docs)]
//! # Crowdfund Context Module 🕸️
//!
//! The composition root of the client. A [`CrowdfundContext`] owns the
//! shared gateway, the view store, the transaction tracker and the event
//! subscriptions, and wires user actions through them.

use std::future::Future;
use std::sync::Arc;

use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TxHash, U256};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crowdfund_config::CrowdfundConfig;
use crowdfund_event_subscriptions::{
    EventSubscriptionManager, StartBlock, SubscriptionHandle,
};
use crowdfund_ledger_gateway::{
    CrowdfundEvent, CrowdfundMethod, EthersGateway, EventFilter, EventKind,
    LedgerGateway, Notification, NotificationSender, SharedGateway,
    TransactionHandle, UserRecord,
};
use crowdfund_transactions::{describe, ContractInvoker, TransactionTracker};
use crowdfund_utils::metric::Metrics;
use crowdfund_utils::{probe, Error, Result};
use crowdfund_view_store::{Campaign, Session, ViewState, ViewStateStore};

mod options;
mod refetch;

pub use options::ContextOptions;
use refetch::Refetcher;

/// Replay order of the contract's events: campaigns first, so that most
/// events find their campaign already known.
const REPLAY_ORDER: [EventKind; 6] = [
    EventKind::CampaignCreated,
    EventKind::Funded,
    EventKind::Deactivated,
    EventKind::Withdrawn,
    EventKind::Refunded,
    EventKind::UserRegistered,
];

/// A contribution as read from the `Funded` logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionEntry {
    /// The funded campaign.
    pub campaign_id: U256,
    /// Who funded it.
    pub contributor: Address,
    /// Amount in wei.
    pub amount: U256,
    /// Block timestamp of the contribution, in seconds.
    pub timestamp: u64,
    /// The funding transaction.
    pub tx_hash: TxHash,
    /// Block the contribution was logged in.
    pub block_number: u64,
}

/// CrowdfundContext contains the client's components and shutdown signal.
pub struct CrowdfundContext {
    options: ContextOptions,
    gateway: SharedGateway,
    store: ViewStateStore,
    invoker: ContractInvoker,
    tracker: TransactionTracker,
    subscriptions: EventSubscriptionManager,
    refetcher: Refetcher,
    notifications: NotificationSender,
    /// Broadcasts a shutdown signal to the background workers.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the client
    pub metrics: Metrics,
    /// One subscription per event kind, feeding the view store.
    listeners: Mutex<Vec<SubscriptionHandle>>,
    /// One-shot subscriptions waiting for the session's own registration.
    registrations: Mutex<Vec<SubscriptionHandle>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for CrowdfundContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdfundContext")
            .field("gateway", &self.gateway)
            .field("options", &self.options)
            .finish()
    }
}

impl CrowdfundContext {
    /// Creates a new context over `gateway`. Nothing is started yet.
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        options: ContextOptions,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        let gateway = SharedGateway::new(gateway);
        let (notifications, _) =
            broadcast::channel(options.notification_capacity.max(1));
        let (notify_shutdown, _) = broadcast::channel(2);
        let store = ViewStateStore::new();
        let invoker = ContractInvoker::new(gateway.clone(), metrics.clone());
        let tracker = TransactionTracker::new(
            gateway.clone(),
            options.confirmation_options(),
            notifications.clone(),
            metrics.clone(),
        );
        let subscriptions = EventSubscriptionManager::new(
            gateway.clone(),
            options.events_watcher,
            notifications.clone(),
            metrics.clone(),
        );
        let refetcher = Refetcher::new(
            gateway.clone(),
            store.clone(),
            options.refetch_interval,
            options.refetch_max_retries,
        );
        Ok(Self {
            options,
            gateway,
            store,
            invoker,
            tracker,
            subscriptions,
            refetcher,
            notifications,
            notify_shutdown,
            metrics,
            listeners: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Creates a context talking to the configured node and contract,
    /// signing with the configured key if there is one.
    pub fn from_config(config: &CrowdfundConfig) -> Result<Self> {
        let chain = &config.chain;
        let provider = Provider::<Http>::try_from(chain.http_endpoint.as_str())?
            .interval(config.events_watcher.polling_interval());
        let wallet = chain
            .private_key
            .as_ref()
            .map(|key| {
                LocalWallet::from_bytes(key.as_bytes())
                    .map(|wallet| wallet.with_chain_id(chain.chain_id))
            })
            .transpose()
            .map_err(|_| Error::Generic("invalid private key"))?;
        let gateway =
            EthersGateway::new(provider, wallet, chain.contract.address)
                .with_explorer(chain.explorer.clone());
        Self::new(Arc::new(gateway), ContextOptions::from_config(config))
    }

    /// The view store.
    pub fn store(&self) -> &ViewStateStore {
        &self.store
    }

    /// The transaction tracker.
    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    /// The subscription manager.
    pub fn subscriptions(&self) -> &EventSubscriptionManager {
        &self.subscriptions
    }

    /// The gateway in use.
    pub fn gateway(&self) -> Arc<dyn LedgerGateway> {
        self.gateway.current()
    }

    /// A new receiver of every notification sent from now on.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// A consistent copy of the view state.
    pub fn snapshot(&self) -> ViewState {
        self.store.snapshot()
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Establishes the session of the signer's account.
    ///
    /// Registered accounts get their display name right away.
    #[tracing::instrument(skip_all)]
    pub async fn connect(&self) -> Result<Session> {
        let gateway = self.gateway.current();
        let account = gateway.account().await?;
        let user = match gateway.read_user(account).await {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(?account, "Failed to read user data: {}", e);
                None
            }
        };
        self.store.establish_session(account, user.as_ref());
        let session = self.store.session().ok_or(Error::WalletUnavailable)?;
        tracing::info!(
            ?account,
            registered = session.registered(),
            "Session established"
        );
        Ok(session)
    }

    /// Rebuilds the view from the contract's logs since deployment.
    ///
    /// Returns the head block the replay started from.
    #[tracing::instrument(skip_all, fields(from = self.options.deployed_at))]
    pub async fn replay(&self) -> Result<u64> {
        let gateway = self.gateway.current();
        let head = gateway.block_number().await?;
        for kind in REPLAY_ORDER {
            let events = self
                .subscriptions
                .replay(EventFilter::new(kind), self.options.deployed_at)
                .await?;
            tracing::debug!(%kind, count = events.len(), "Replaying events");
            for logged in &events {
                self.store.dispatch(logged);
            }
        }
        if let Err(e) = self.refresh_users().await {
            tracing::warn!("Failed to read the user directory: {}", e);
        }
        self.refetcher.drain().await;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            replayed = true,
            head,
        );
        Ok(head)
    }

    /// Starts the event listeners feeding the view store and the re-fetch
    /// worker. Calling it again is a no-op.
    pub fn start(&self, from: StartBlock) {
        {
            let mut listeners = self.listeners.lock();
            if !listeners.is_empty() {
                return;
            }
            for kind in EventKind::ALL {
                let store = self.store.clone();
                listeners.push(self.subscriptions.subscribe(
                    EventFilter::new(kind),
                    from,
                    move |logged| store.dispatch(logged),
                ));
            }
        }
        let worker = tokio::spawn(self.refetcher.clone().run(
            self.options.events_watcher.polling_interval(),
            self.shutdown_signal(),
        ));
        self.workers.lock().push(worker);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            started = true,
        );
    }

    /// Replays the history, then follows new blocks.
    pub async fn sync(&self) -> Result<()> {
        let head = self.replay().await?;
        self.start(StartBlock::From(head + 1));
        Ok(())
    }

    /// Follows a submitted action. Inline errors become an
    /// `ActionRejected` notification, and a refused broadcast becomes a
    /// terminal `Dropped` entry. Nothing is retried.
    async fn track<F>(
        &self,
        label: String,
        action: F,
    ) -> Result<TransactionHandle>
    where
        F: Future<Output = Result<TransactionHandle>>,
    {
        match action.await {
            Ok(handle) => {
                self.tracker.track(handle, label);
                Ok(handle)
            }
            Err(Error::Broadcast(reason)) => {
                self.tracker.record_unsent(label, reason.clone());
                Err(Error::Broadcast(reason))
            }
            Err(e) => {
                if e.is_inline() {
                    let _ =
                        self.notifications.send(Notification::ActionRejected {
                            action: label,
                            reason: e.to_string(),
                        });
                }
                Err(e)
            }
        }
    }

    /// Registers the session's account under `name`.
    ///
    /// The session becomes registered once the account's own
    /// `UserRegistered` event arrives.
    pub async fn register(&self, name: &str) -> Result<TransactionHandle> {
        let gateway = self.gateway.current();
        let account = gateway.account().await?;
        let head = gateway.block_number().await?;
        let store = self.store.clone();
        let once = self.subscriptions.subscribe_once(
            EventFilter::user_registered(Some(account)),
            StartBlock::From(head + 1),
            move |logged| {
                if let CrowdfundEvent::UserRegistered(e) = &logged.event {
                    tracing::info!(name = %e.name, "Registration confirmed");
                }
                store.dispatch(logged);
            },
        );
        let method = CrowdfundMethod::RegisterUser {
            name: name.trim().to_string(),
        };
        // On failure `once` is dropped, and unsubscribed, here.
        let handle = self
            .track(describe(&method), self.invoker.register_user(name))
            .await?;
        let mut registrations = self.registrations.lock();
        registrations.retain(SubscriptionHandle::is_active);
        registrations.push(once);
        Ok(handle)
    }

    /// Creates a campaign with a `goal` in ether.
    pub async fn create_campaign(
        &self,
        title: &str,
        description: &str,
        goal: &str,
    ) -> Result<TransactionHandle> {
        self.track(
            format!("createCampaign({})", title.trim()),
            self.invoker.create_campaign(title, description, goal),
        )
        .await
    }

    /// Funds `campaign_id` with `amount` ether.
    pub async fn contribute(
        &self,
        campaign_id: U256,
        amount: &str,
    ) -> Result<TransactionHandle> {
        self.track(
            describe(&CrowdfundMethod::FundCampaign { campaign_id }),
            self.invoker.contribute(campaign_id, amount),
        )
        .await
    }

    /// Withdraws the funds of `campaign_id`.
    pub async fn withdraw(
        &self,
        campaign_id: U256,
    ) -> Result<TransactionHandle> {
        self.track(
            describe(&CrowdfundMethod::WithdrawFunds { campaign_id }),
            self.invoker.withdraw(campaign_id),
        )
        .await
    }

    /// Refunds the contributors of `campaign_id`.
    pub async fn refund(&self, campaign_id: U256) -> Result<TransactionHandle> {
        self.track(
            describe(&CrowdfundMethod::RefundContributions { campaign_id }),
            self.invoker.refund(campaign_id),
        )
        .await
    }

    /// Deactivates `campaign_id`.
    pub async fn deactivate(
        &self,
        campaign_id: U256,
    ) -> Result<TransactionHandle> {
        self.track(
            describe(&CrowdfundMethod::InActivateCampaign { campaign_id }),
            self.invoker.deactivate(campaign_id),
        )
        .await
    }

    /// Replaces the gateway, e.g. after the signer switched accounts, and
    /// re-establishes the session on it.
    pub async fn switch_account(
        &self,
        gateway: Arc<dyn LedgerGateway>,
    ) -> Result<Session> {
        let generation = self.gateway.replace(gateway);
        self.registrations.lock().clear();
        self.subscriptions.rebind();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Session,
            switched = true,
            generation,
        );
        self.connect().await
    }

    /// Destroys the session. The campaigns and users stay.
    pub fn logout(&self) {
        self.registrations.lock().clear();
        self.store.logout();
    }

    /// Reads campaign `id` from the contract and merges it into the view.
    pub async fn refresh_campaign(&self, id: U256) -> Result<Campaign> {
        self.refetcher.refresh(id).await
    }

    /// Reads the user directory from the contract.
    pub async fn refresh_users(&self) -> Result<Vec<UserRecord>> {
        let users = self.gateway.current().read_all_users().await?;
        self.store.apply_users(&users);
        Ok(users)
    }

    /// Contributions made to campaign `id`, read from the logs.
    pub async fn campaign_contributions(
        &self,
        id: U256,
    ) -> Result<Vec<ContributionEntry>> {
        self.contributions(EventFilter::funded(Some(id), None)).await
    }

    /// Contributions made by `contributor`, read from the logs.
    pub async fn user_contributions(
        &self,
        contributor: Address,
    ) -> Result<Vec<ContributionEntry>> {
        self.contributions(EventFilter::funded(None, Some(contributor)))
            .await
    }

    async fn contributions(
        &self,
        filter: EventFilter,
    ) -> Result<Vec<ContributionEntry>> {
        let events = self
            .subscriptions
            .replay(filter, self.options.deployed_at)
            .await?;
        Ok(events
            .into_iter()
            .filter_map(|logged| match logged.event {
                CrowdfundEvent::Funded(e) => Some(ContributionEntry {
                    campaign_id: e.campaign_id,
                    contributor: e.funder,
                    amount: e.amount,
                    timestamp: e.timestamp.low_u64(),
                    tx_hash: logged.meta.tx_hash,
                    block_number: logged.meta.block_number,
                }),
                _ => None,
            })
            .collect())
    }

    /// Campaigns created by `creator`.
    pub async fn user_campaigns(
        &self,
        creator: Address,
    ) -> Result<Vec<Campaign>> {
        let events = self
            .subscriptions
            .replay(
                EventFilter::campaign_created(None, Some(creator)),
                self.options.deployed_at,
            )
            .await?;
        let lookups = events
            .iter()
            .filter_map(|logged| logged.event.campaign_id())
            .map(|id| async move {
                match self.store.campaign(id) {
                    Some(campaign) => Ok(campaign),
                    None => self.refresh_campaign(id).await,
                }
            });
        futures::future::try_join_all(lookups).await
    }

    /// Total ever contributed by `address`, as the contract accounts it.
    pub async fn contribution_total(&self, address: Address) -> Result<U256> {
        self.gateway.current().read_contribution_total(address).await
    }

    /// Forwards an already signed transaction to the node.
    pub async fn relay(&self, signed: Bytes) -> Result<TxHash> {
        let hash = self.gateway.current().broadcast_raw(signed).await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Relay,
            tx_hash = ?hash,
        );
        Ok(hash)
    }

    /// Stops every subscription, waiting task and background worker.
    ///
    /// Sends a shutdown signal to all subscribed tasks/connections.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
        self.subscriptions.shutdown();
        self.tracker.shutdown();
        self.listeners.lock().clear();
        self.registrations.lock().clear();
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            shutdown = true,
        );
    }
}

/// Listens for the client shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the
/// workers should stop.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}
