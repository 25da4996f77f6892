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

use ethers::types::Address;
use crowdfund_types::{private_key::PrivateKey, rpc_url::RpcUrl};

use super::*;

/// ChainConfig is the configuration for the network the crowdfunding
/// contract lives on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u32,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: RpcUrl,
    /// Block Explorer for this chain.
    ///
    /// Optional, and only used for printing a clickable links
    /// for transactions.
    #[serde(skip_serializing)]
    pub explorer: Option<url::Url>,
    /// The Private Key of the signing account on this network
    /// the format is:
    /// 1. if it starts with '0x' then this would be raw (64 bytes) hex encoded
    ///    private key.
    /// 2. if it starts with '$' then it would be considered as an Enviroment variable
    ///    of a hex-encoded private key.
    ///
    /// Without it the client runs read-only: queries and subscriptions work,
    /// every submission fails with `WalletUnavailable`.
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// The crowdfunding contract.
    pub contract: ContractConfig,
}

/// ContractConfig represents the deployed crowdfunding contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractConfig {
    /// The address of this contract on this chain.
    pub address: Address,
    /// the block number where this contract got deployed at.
    ///
    /// Log replay starts here.
    #[serde(rename(serialize = "deployedAt"), default)]
    pub deployed_at: u64,
}
