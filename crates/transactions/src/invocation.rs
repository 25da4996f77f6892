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

//! Validating and submitting contract calls.

use ethers::types::U256;

use crowdfund_ledger_gateway::{
    ContractCall, CrowdfundMethod, SharedGateway, TransactionHandle,
};
use crowdfund_utils::clickable_link::tx_hash_for_logs;
use crowdfund_utils::metric::Metrics;
use crowdfund_utils::{probe, Error, Result};

/// Maximum number of decimals an ether amount can carry.
const ETHER_DECIMALS: usize = 18;

/// Parses a decimal ether amount (`"1.5"`) into wei.
///
/// Only plain decimal notation is accepted: no sign, no exponent, at most
/// 18 fractional digits. The scaling is exact.
pub fn parse_ether_amount(input: &str) -> Result<U256> {
    let amount = input.trim();
    let invalid =
        |why: &str| Error::InvalidInput(format!("amount `{input}` {why}"));
    if amount.is_empty() {
        return Err(invalid("is empty"));
    }
    if amount.starts_with('-') {
        return Err(invalid("is negative"));
    }
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty())
        || !all_digits(whole)
        || !all_digits(fraction)
    {
        return Err(invalid("is not a decimal number"));
    }
    if fraction.len() > ETHER_DECIMALS {
        return Err(invalid("has more than 18 decimals"));
    }
    let normalized = format!(
        "{}.{}",
        if whole.is_empty() { "0" } else { whole },
        if fraction.is_empty() { "0" } else { fraction }
    );
    let wei = ethers::utils::parse_units(normalized, "ether")?;
    Ok(wei.into())
}

fn positive_amount(input: &str) -> Result<U256> {
    let amount = parse_ether_amount(input)?;
    if amount.is_zero() {
        return Err(Error::InvalidInput(format!(
            "amount `{input}` must be greater than zero"
        )));
    }
    Ok(amount)
}

fn non_empty(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// A short human readable description of a call, used as the label of the
/// tracked transaction.
pub fn describe(method: &CrowdfundMethod) -> String {
    match method {
        CrowdfundMethod::RegisterUser { name } => {
            format!("registerUser({name})")
        }
        CrowdfundMethod::CreateCampaign { title, .. } => {
            format!("createCampaign({title})")
        }
        CrowdfundMethod::FundCampaign { campaign_id }
        | CrowdfundMethod::WithdrawFunds { campaign_id }
        | CrowdfundMethod::RefundContributions { campaign_id }
        | CrowdfundMethod::InActivateCampaign { campaign_id } => {
            format!("{}({campaign_id})", method.name())
        }
    }
}

/// Turns user intents into simulated, then submitted, contract calls.
///
/// An invocation never waits for confirmation; the returned handle is meant
/// to be passed to the [`TransactionTracker`](crate::TransactionTracker).
#[derive(Clone, Debug)]
pub struct ContractInvoker {
    gateway: SharedGateway,
    metrics: Metrics,
}

impl ContractInvoker {
    pub fn new(gateway: SharedGateway, metrics: Metrics) -> Self {
        Self { gateway, metrics }
    }

    pub async fn register_user(&self, name: &str) -> Result<TransactionHandle> {
        let name = non_empty("name", name)?;
        self.invoke(CrowdfundMethod::RegisterUser { name }, U256::zero())
            .await
    }

    /// `goal` is a decimal ether amount.
    pub async fn create_campaign(
        &self,
        title: &str,
        description: &str,
        goal: &str,
    ) -> Result<TransactionHandle> {
        let title = non_empty("title", title)?;
        let description = non_empty("description", description)?;
        let goal = positive_amount(goal)?;
        self.invoke(
            CrowdfundMethod::CreateCampaign {
                title,
                description,
                goal,
            },
            U256::zero(),
        )
        .await
    }

    /// Funds `campaign_id` with `amount` ether.
    pub async fn contribute(
        &self,
        campaign_id: U256,
        amount: &str,
    ) -> Result<TransactionHandle> {
        let value = positive_amount(amount)?;
        self.invoke(CrowdfundMethod::FundCampaign { campaign_id }, value)
            .await
    }

    pub async fn withdraw(
        &self,
        campaign_id: U256,
    ) -> Result<TransactionHandle> {
        let method = CrowdfundMethod::WithdrawFunds { campaign_id };
        self.invoke(method, U256::zero()).await
    }

    pub async fn refund(&self, campaign_id: U256) -> Result<TransactionHandle> {
        self.invoke(
            CrowdfundMethod::RefundContributions { campaign_id },
            U256::zero(),
        )
        .await
    }

    pub async fn deactivate(
        &self,
        campaign_id: U256,
    ) -> Result<TransactionHandle> {
        self.invoke(
            CrowdfundMethod::InActivateCampaign { campaign_id },
            U256::zero(),
        )
        .await
    }

    /// Dry-runs `method`, and submits it only if the dry-run passed.
    #[tracing::instrument(skip_all, fields(method = method.name()))]
    pub async fn invoke(
        &self,
        method: CrowdfundMethod,
        value: U256,
    ) -> Result<TransactionHandle> {
        let gateway = self.gateway.current();
        let call = ContractCall::new(gateway.contract_address(), method)
            .with_value(value);

        if let Err(e) = gateway.simulate(&call).await {
            if matches!(e, Error::SimulationReverted { .. }) {
                self.metrics.simulations_reverted.inc();
            }
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Invocation,
                method = call.method.name(),
                dry_run = "failed",
                error = %e,
            );
            return Err(e);
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Invocation,
            method = call.method.name(),
            dry_run = "passed",
        );

        let handle = gateway.submit(&call).await.map_err(|e| {
            tracing::warn!(
                method = call.method.name(),
                "Submission failed: {}",
                e
            );
            e
        })?;
        self.metrics.transactions_submitted.inc();
        tracing::info!(
            "Tx {} is submitted and pending!",
            tx_hash_for_logs(gateway.explorer(), handle.hash),
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crowdfund_ledger_gateway::mock::MockGateway;
    use ethers::types::{Address, TxHash};

    fn invoker(gateway: Arc<MockGateway>) -> ContractInvoker {
        ContractInvoker::new(
            SharedGateway::new(gateway),
            Metrics::new().unwrap(),
        )
    }

    fn mock() -> Arc<MockGateway> {
        Arc::new(
            MockGateway::new(Address::repeat_byte(0xcf))
                .with_account(Address::repeat_byte(0xaa)),
        )
    }

    #[test]
    fn parses_ether_amounts_exactly() {
        assert_eq!(parse_ether_amount("1.0").unwrap(), U256::exp10(18));
        assert_eq!(parse_ether_amount("1").unwrap(), U256::exp10(18));
        assert_eq!(parse_ether_amount(".5").unwrap(), U256::exp10(17) * 5);
        assert_eq!(
            parse_ether_amount("0.000000000000000001").unwrap(),
            U256::one()
        );
        assert_eq!(
            parse_ether_amount("0.1").unwrap(),
            U256::from(100_000_000_000_000_000u64)
        );
    }

    #[test]
    fn rejects_malformed_amounts() {
        for input in ["", "-1", "abc", "1e18", "1.2.3", ".", "0.0000000000000000001"]
        {
            let err = parse_ether_amount(input).unwrap_err();
            assert!(
                matches!(err, Error::InvalidInput(_)),
                "{input} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn reverted_simulation_is_never_submitted() {
        let gateway = mock();
        gateway.revert_on("fundCampaign", "Goal already reached");
        let invoker = invoker(gateway.clone());

        let err = invoker.contribute(7.into(), "1.0").await.unwrap_err();

        assert!(matches!(
            err,
            Error::SimulationReverted { ref reason } if reason == "Goal already reached"
        ));
        assert!(err.is_inline());
        assert_eq!(gateway.simulated_calls().len(), 1);
        assert!(gateway.submitted_calls().is_empty());
        assert_eq!(invoker.metrics.simulations_reverted.get(), 1.0);
    }

    #[tokio::test]
    async fn contribute_attaches_value_and_returns_handle() {
        let gateway = mock();
        let hash = TxHash::repeat_byte(0xab);
        gateway.queue_tx_hash(hash);
        let invoker = invoker(gateway.clone());

        let handle = invoker.contribute(7.into(), "1.0").await.unwrap();

        assert_eq!(handle.hash, hash);
        let submitted = gateway.submitted_calls();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].value, U256::exp10(18));
        assert_eq!(
            submitted[0].method,
            CrowdfundMethod::FundCampaign {
                campaign_id: 7.into()
            }
        );
    }

    #[tokio::test]
    async fn invalid_input_skips_the_gateway() {
        let gateway = mock();
        let invoker = invoker(gateway.clone());
        assert!(invoker.register_user("   ").await.is_err());
        assert!(invoker.contribute(1.into(), "0").await.is_err());
        assert!(gateway.simulated_calls().is_empty());
    }

    #[tokio::test]
    async fn signer_rejection_is_reported() {
        let gateway = mock();
        gateway.reject_next_submit();
        let invoker = invoker(gateway.clone());
        let err = invoker.withdraw(3.into()).await.unwrap_err();
        assert!(err.is_wallet_error());
        assert_eq!(invoker.metrics.transactions_submitted.get(), 0.0);
    }
}
