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

//! Contract bindings for the crowdfunding contract.
//!
//! Calls, view return values and events are bound with the `ethers` derive
//! macros, so nothing downstream ever touches positional log arguments.

use ethers::contract::{EthAbiCodec, EthAbiType, EthCall, EthEvent};
use ethers::types::{Address, U256};

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "registerUser", abi = "registerUser(string)")]
pub struct RegisterUserCall {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "createCampaign",
    abi = "createCampaign(string,string,uint256)"
)]
pub struct CreateCampaignCall {
    pub title: String,
    pub description: String,
    pub goal: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "fundCampaign", abi = "fundCampaign(uint256)")]
pub struct FundCampaignCall {
    pub campaign_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "withdrawFunds", abi = "withdrawFunds(uint256)")]
pub struct WithdrawFundsCall {
    pub campaign_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "refundContributions", abi = "refundContributions(uint256)")]
pub struct RefundContributionsCall {
    pub campaign_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "inActivateCampaign", abi = "inActivateCampaign(uint256)")]
pub struct InActivateCampaignCall {
    pub campaign_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getUserData", abi = "getUserData(address)")]
pub struct GetUserDataCall {
    pub user: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getCampaign", abi = "getCampaign(uint256)")]
pub struct GetCampaignCall {
    pub campaign_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getAllUser", abi = "getAllUser()")]
pub struct GetAllUserCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "contributions", abi = "contributions(address)")]
pub struct ContributionsCall {
    pub contributor: Address,
}

/// `(address contributor, uint256 amount, uint256 timestamp)`
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct ContributionData {
    pub contributor: Address,
    pub amount: U256,
    pub timestamp: U256,
}

/// `(string name, address user, bool isRegistered)`
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct UserData {
    pub name: String,
    pub user: Address,
    pub is_registered: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetUserDataReturn {
    pub name: String,
    pub user: Address,
    pub is_registered: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetCampaignReturn {
    pub creator: Address,
    pub title: String,
    pub description: String,
    pub goal: U256,
    pub raised: U256,
    pub is_active: bool,
    pub contributions: Vec<ContributionData>,
    pub created_at: U256,
    pub deadline: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetAllUserReturn(pub Vec<UserData>);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(name = "UserRegistered", abi = "UserRegistered(address,string)")]
pub struct UserRegisteredFilter {
    #[ethevent(indexed)]
    pub user: Address,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "CampaignCreated",
    abi = "CampaignCreated(uint256,address,string,uint256)"
)]
pub struct CampaignCreatedFilter {
    #[ethevent(indexed)]
    pub campaign_id: U256,
    #[ethevent(indexed)]
    pub creator: Address,
    pub title: String,
    pub goal: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(name = "Funded", abi = "Funded(uint256,address,uint256,uint256)")]
pub struct FundedFilter {
    #[ethevent(indexed)]
    pub campaign_id: U256,
    #[ethevent(indexed)]
    pub funder: Address,
    pub amount: U256,
    pub timestamp: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(name = "Deactivated", abi = "Deactivated(uint256)")]
pub struct DeactivatedFilter {
    #[ethevent(indexed)]
    pub campaign_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(name = "Withdrawn", abi = "Withdrawn(uint256)")]
pub struct WithdrawnFilter {
    #[ethevent(indexed)]
    pub campaign_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(name = "Refunded", abi = "Refunded(uint256)")]
pub struct RefundedFilter {
    #[ethevent(indexed)]
    pub campaign_id: U256,
}
