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

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::middleware::signer::SignerMiddlewareError;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::Signer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, TxHash, U256};

use crowdfund_utils::clickable_link::tx_hash_for_logs;
use crowdfund_utils::{probe, Error, Result};

use crate::abi;
use crate::events::{EventFilter, LoggedEvent};
use crate::gateway::LedgerGateway;
use crate::revert;
use crate::types::{
    BlockTag, CampaignSnapshot, ConfirmationOptions, ContractCall, Receipt,
    ReceiptStatus, TransactionHandle, UserRecord,
};

type SignerClient<S> = SignerMiddleware<Provider<Http>, S>;

/// A [`LedgerGateway`] talking JSON-RPC over HTTP, signing with `S`.
#[derive(Debug)]
pub struct EthersGateway<S: Signer> {
    provider: Provider<Http>,
    client: Option<SignerClient<S>>,
    contract: Address,
    explorer: Option<url::Url>,
}

impl<S: Signer + 'static> EthersGateway<S> {
    /// Creates a gateway. Without a signer only reads and relaying work.
    pub fn new(
        provider: Provider<Http>,
        signer: Option<S>,
        contract: Address,
    ) -> Self {
        let client = signer
            .map(|signer| SignerMiddleware::new(provider.clone(), signer));
        Self {
            provider,
            client,
            contract,
            explorer: None,
        }
    }

    pub fn with_explorer(mut self, explorer: Option<url::Url>) -> Self {
        self.explorer = explorer;
        self
    }

    fn client(&self) -> Result<&SignerClient<S>> {
        self.client.as_ref().ok_or(Error::WalletUnavailable)
    }

    fn transaction(
        &self,
        call: &ContractCall,
        from: Option<Address>,
    ) -> TypedTransaction {
        let mut tx = TransactionRequest::new()
            .to(call.target)
            .data(call.method.calldata())
            .value(call.value);
        if let Some(from) = from {
            tx = tx.from(from);
        }
        tx.into()
    }

    async fn view<C: AbiEncode, R: AbiDecode>(&self, call: C) -> Result<R> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.contract)
            .data(Bytes::from(call.encode()))
            .into();
        let output = self.provider.call(&tx, None).await?;
        Ok(R::decode(output)?)
    }

    fn classify_signer_error(
        err: SignerMiddlewareError<Provider<Http>, S>,
    ) -> Error {
        match err {
            SignerMiddlewareError::SignerError(e) => {
                Error::UserRejected(e.to_string())
            }
            SignerMiddlewareError::MiddlewareError(e) => {
                revert::classify_broadcast_error(e)
            }
            other => Error::Broadcast(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl<S> LedgerGateway for EthersGateway<S>
where
    S: Signer + 'static,
{
    fn contract_address(&self) -> Address {
        self.contract
    }

    fn explorer(&self) -> Option<&url::Url> {
        self.explorer.as_ref()
    }

    async fn account(&self) -> Result<Address> {
        Ok(self.client()?.address())
    }

    #[tracing::instrument(skip_all, fields(method = call.method.name()))]
    async fn simulate(&self, call: &ContractCall) -> Result<()> {
        let from = self.client.as_ref().map(|c| c.address());
        let tx = self.transaction(call, from);
        match self.provider.call(&tx, None).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = revert::classify_simulation_error(e);
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Invocation,
                    method = call.method.name(),
                    simulated = false,
                    error = %err,
                );
                Err(err)
            }
        }
    }

    #[tracing::instrument(skip_all, fields(method = call.method.name()))]
    async fn submit(&self, call: &ContractCall) -> Result<TransactionHandle> {
        let client = self.client()?;
        let mut tx = self.transaction(call, Some(client.address()));
        client
            .fill_transaction(&mut tx, None)
            .await
            .map_err(Self::classify_signer_error)?;
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(Self::classify_signer_error)?;
        let hash = pending.tx_hash();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Invocation,
            method = call.method.name(),
            submitted = true,
            tx_hash = %tx_hash_for_logs(self.explorer.as_ref(), hash),
        );
        Ok(TransactionHandle::new(hash))
    }

    async fn broadcast_raw(&self, signed: Bytes) -> Result<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(signed)
            .await
            .map_err(revert::classify_broadcast_error)?;
        Ok(pending.tx_hash())
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    #[tracing::instrument(
        skip_all,
        fields(
            filter = %filter,
            from_block = from_block,
            to_block = %to_block,
        )
    )]
    async fn query_events(
        &self,
        filter: &EventFilter,
        from_block: u64,
        to_block: BlockTag,
    ) -> Result<Vec<LoggedEvent>> {
        let log_filter = filter
            .to_log_filter(self.contract)
            .from_block(from_block)
            .to_block(ethers::types::BlockNumber::from(to_block));
        let logs = self
            .provider
            .get_logs(&log_filter)
            .await
            .map_err(|e| Error::SubscriptionTransport(e.to_string()))?;
        let mut events: Vec<_> =
            logs.iter().filter_map(LoggedEvent::decode).collect();
        events.sort_by_key(|e| e.meta.position());
        tracing::trace!(count = events.len(), "Queried events");
        Ok(events)
    }

    #[tracing::instrument(
        skip_all,
        fields(tx_hash = %tx_hash_for_logs(self.explorer.as_ref(), hash))
    )]
    async fn await_confirmation(
        &self,
        hash: TxHash,
        options: ConfirmationOptions,
    ) -> Result<Receipt> {
        let pending = PendingTransaction::new(hash, &self.provider)
            .confirmations(options.confirmations)
            .interval(options.poll_interval);
        let outcome = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, pending)
                .await
                .map_err(|_| Error::ConfirmationTimeout { hash })?,
            None => pending.await,
        };
        match outcome {
            Ok(Some(receipt)) => {
                let status = match receipt.status.map(|s| s.as_u64()) {
                    Some(0) => ReceiptStatus::Reverted,
                    // Pre-byzantium receipts carry no status.
                    _ => ReceiptStatus::Success,
                };
                Ok(Receipt {
                    hash,
                    status,
                    block_number: receipt.block_number.map(|n| n.as_u64()),
                    gas_used: receipt.gas_used,
                })
            }
            Ok(None) => Err(Error::TransactionDropped {
                hash,
                reason: "transaction dropped from the mempool".into(),
            }),
            Err(e) => Err(Error::TransactionDropped {
                hash,
                reason: e.to_string(),
            }),
        }
    }

    async fn read_campaign(&self, id: U256) -> Result<CampaignSnapshot> {
        let ret: abi::GetCampaignReturn = self
            .view(abi::GetCampaignCall { campaign_id: id })
            .await
            .map_err(|e| match e {
                Error::EthersProvider(ref p)
                    if revert::revert_reason(p).is_some() =>
                {
                    Error::CampaignNotFound(id)
                }
                other => other,
            })?;
        if ret.creator.is_zero() {
            return Err(Error::CampaignNotFound(id));
        }
        Ok(CampaignSnapshot::from_abi(id, ret))
    }

    async fn read_user(&self, address: Address) -> Result<UserRecord> {
        let ret: abi::GetUserDataReturn =
            self.view(abi::GetUserDataCall { user: address }).await?;
        Ok(UserRecord {
            address,
            name: ret.name,
            registered: ret.is_registered,
        })
    }

    async fn read_all_users(&self) -> Result<Vec<UserRecord>> {
        let abi::GetAllUserReturn(users) =
            self.view(abi::GetAllUserCall).await?;
        Ok(users.into_iter().map(UserRecord::from).collect())
    }

    async fn read_contribution_total(&self, address: Address) -> Result<U256> {
        self.view(abi::ContributionsCall {
            contributor: address,
        })
        .await
    }
}
