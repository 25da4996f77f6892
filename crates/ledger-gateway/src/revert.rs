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

//! Mapping of node and signer failures onto the error taxonomy.

use ethers::abi::AbiDecode;
use ethers::providers::{JsonRpcError, ProviderError, RpcError};
use ethers::types::Bytes;

use crowdfund_utils::Error;

/// Selector of `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// EIP-1193 "User Rejected Request".
const USER_REJECTED_CODE: i64 = 4001;
const EXECUTION_REVERTED: &str = "execution reverted";

fn rpc_error(err: &ProviderError) -> Option<&JsonRpcError> {
    match err {
        ProviderError::JsonRpcClientError(inner) => inner.as_error_response(),
        _ => None,
    }
}

/// Decodes `Error(string)` revert data into its message.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    String::decode(&data[4..]).ok()
}

fn revert_data(err: &JsonRpcError) -> Option<Bytes> {
    let data = err.data.as_ref()?;
    // geth returns the hex string directly, some nodes nest it.
    let hex = match data {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(obj) => obj.get("data")?.as_str()?,
        _ => return None,
    };
    hex.parse::<Bytes>().ok()
}

/// Extracts a human readable revert reason, if the error is a revert.
pub fn revert_reason(err: &ProviderError) -> Option<String> {
    let rpc = rpc_error(err)?;
    if let Some(reason) =
        revert_data(rpc).and_then(|data| decode_revert_reason(&data))
    {
        return Some(reason);
    }
    let message = rpc.message.as_str();
    let rest = message.strip_prefix(EXECUTION_REVERTED)?;
    let reason = rest
        .trim_start_matches(':')
        .trim()
        .trim_start_matches("reverted with reason string")
        .trim()
        .trim_matches('\'');
    if reason.is_empty() {
        Some(EXECUTION_REVERTED.to_string())
    } else {
        Some(reason.to_string())
    }
}

/// Classifies a failed `eth_call` dry-run.
pub fn classify_simulation_error(err: ProviderError) -> Error {
    match revert_reason(&err) {
        Some(reason) => Error::SimulationReverted { reason },
        None => Error::EthersProvider(err),
    }
}

pub fn is_user_rejection(err: &ProviderError) -> bool {
    rpc_error(err)
        .map(|rpc| rpc.code == USER_REJECTED_CODE)
        .unwrap_or(false)
}

/// Classifies a node-level failure while filling or broadcasting.
pub fn classify_broadcast_error(err: ProviderError) -> Error {
    if is_user_rejection(&err) {
        return Error::UserRejected(err.to_string());
    }
    match rpc_error(&err) {
        Some(rpc) => Error::Broadcast(rpc.message.clone()),
        None => Error::Broadcast(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::AbiEncode;

    fn revert_payload(reason: &str) -> Vec<u8> {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(reason.to_string().encode());
        data
    }

    #[test]
    fn decodes_error_string_payload() {
        let data = revert_payload("Goal already reached");
        assert_eq!(
            decode_revert_reason(&data).as_deref(),
            Some("Goal already reached")
        );
        assert_eq!(decode_revert_reason(&[0xde, 0xad]), None);
    }

    #[test]
    fn reads_reason_from_rpc_error_data() {
        let rpc = JsonRpcError {
            code: 3,
            message: "execution reverted: Goal already reached".into(),
            data: Some(serde_json::Value::String(
                Bytes::from(revert_payload("Goal already reached")).to_string(),
            )),
        };
        let data = revert_data(&rpc).unwrap();
        assert_eq!(
            decode_revert_reason(&data).as_deref(),
            Some("Goal already reached")
        );
    }
}
