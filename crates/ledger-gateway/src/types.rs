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

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, TxHash, U256};
use serde::Serialize;

use crowdfund_utils::Error;

use crate::abi;

/// A state-changing method of the crowdfunding contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrowdfundMethod {
    RegisterUser { name: String },
    CreateCampaign {
        title: String,
        description: String,
        goal: U256,
    },
    FundCampaign { campaign_id: U256 },
    WithdrawFunds { campaign_id: U256 },
    RefundContributions { campaign_id: U256 },
    InActivateCampaign { campaign_id: U256 },
}

impl CrowdfundMethod {
    /// The Solidity name of the method.
    pub fn name(&self) -> &'static str {
        match self {
            CrowdfundMethod::RegisterUser { .. } => "registerUser",
            CrowdfundMethod::CreateCampaign { .. } => "createCampaign",
            CrowdfundMethod::FundCampaign { .. } => "fundCampaign",
            CrowdfundMethod::WithdrawFunds { .. } => "withdrawFunds",
            CrowdfundMethod::RefundContributions { .. } => {
                "refundContributions"
            }
            CrowdfundMethod::InActivateCampaign { .. } => "inActivateCampaign",
        }
    }

    pub fn calldata(&self) -> Bytes {
        let encoded = match self.clone() {
            CrowdfundMethod::RegisterUser { name } => {
                abi::RegisterUserCall { name }.encode()
            }
            CrowdfundMethod::CreateCampaign {
                title,
                description,
                goal,
            } => abi::CreateCampaignCall {
                title,
                description,
                goal,
            }
            .encode(),
            CrowdfundMethod::FundCampaign { campaign_id } => {
                abi::FundCampaignCall { campaign_id }.encode()
            }
            CrowdfundMethod::WithdrawFunds { campaign_id } => {
                abi::WithdrawFundsCall { campaign_id }.encode()
            }
            CrowdfundMethod::RefundContributions { campaign_id } => {
                abi::RefundContributionsCall { campaign_id }.encode()
            }
            CrowdfundMethod::InActivateCampaign { campaign_id } => {
                abi::InActivateCampaignCall { campaign_id }.encode()
            }
        };
        encoded.into()
    }
}

/// An intended contract call: target, method with arguments, attached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub target: Address,
    pub method: CrowdfundMethod,
    pub value: U256,
}

impl ContractCall {
    pub fn new(target: Address, method: CrowdfundMethod) -> Self {
        Self {
            target,
            method,
            value: U256::zero(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Returned by a successful submission. Does not imply confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionHandle {
    pub hash: TxHash,
    /// Unix time in milliseconds.
    pub submitted_at: u64,
}

impl TransactionHandle {
    pub fn new(hash: TxHash) -> Self {
        Self {
            hash,
            submitted_at: unix_millis(),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationOptions {
    pub confirmations: usize,
    /// `None` waits until the transaction is mined or dropped.
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for ConfirmationOptions {
    fn default() -> Self {
        Self {
            confirmations: 1,
            timeout: None,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Upper bound of a log query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

impl FromStr for BlockTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(BlockTag::Latest),
            other => other.parse::<u64>().map(BlockTag::Number).map_err(|_| {
                Error::InvalidInput(format!(
                    "expected `latest` or a block number, got `{other}`"
                ))
            }),
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => f.write_str("latest"),
            BlockTag::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<BlockTag> for ethers::types::BlockNumber {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => ethers::types::BlockNumber::Latest,
            BlockTag::Number(n) => ethers::types::BlockNumber::Number(n.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionRecord {
    pub contributor: Address,
    pub amount: U256,
    pub timestamp: u64,
}

/// The result of `getCampaign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSnapshot {
    pub id: U256,
    pub creator: Address,
    pub title: String,
    pub description: String,
    pub goal: U256,
    pub raised: U256,
    pub active: bool,
    pub contributions: Vec<ContributionRecord>,
    pub created_at: u64,
    pub deadline: u64,
}

impl CampaignSnapshot {
    pub(crate) fn from_abi(id: U256, ret: abi::GetCampaignReturn) -> Self {
        Self {
            id,
            creator: ret.creator,
            title: ret.title,
            description: ret.description,
            goal: ret.goal,
            raised: ret.raised,
            active: ret.is_active,
            contributions: ret
                .contributions
                .into_iter()
                .map(|c| ContributionRecord {
                    contributor: c.contributor,
                    amount: c.amount,
                    timestamp: c.timestamp.low_u64(),
                })
                .collect(),
            created_at: ret.created_at.low_u64(),
            deadline: ret.deadline.low_u64(),
        }
    }
}

/// A user directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub address: Address,
    pub name: String,
    pub registered: bool,
}

impl From<abi::UserData> for UserRecord {
    fn from(data: abi::UserData) -> Self {
        Self {
            address: data.user,
            name: data.name,
            registered: data.is_registered,
        }
    }
}
