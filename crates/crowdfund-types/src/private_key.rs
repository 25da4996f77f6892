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

use std::str::FromStr;

use ethers::types::H256;
use serde::Deserialize;

/// PrivateKey represents the secret key of the account the client signs with.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<H256> for PrivateKey {
    fn from(secret: H256) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = H256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn parse_secret(value: &str) -> Result<H256, String> {
    H256::from_str(value).map_err(|e| {
        format!(
            "{e}\n got {} chars but expected a 66 chars string (including the 0x prefix)",
            value.len()
        )
    })
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = H256;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with("0x") {
                    parse_secret(value).map_err(serde::de::Error::custom)
                } else if let Some(var) = value.strip_prefix('$') {
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?;
                    parse_secret(&val).map_err(serde::de::Error::custom)
                } else {
                    Err(serde::de::Error::custom(
                        "expected a 0x prefixed hex string or a $ENV_VAR",
                    ))
                }
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "0x8917174396171783496173419137618235192359106130478137647163400318";

    #[test]
    fn parses_hex_key() {
        let key: PrivateKey =
            serde_json::from_str(&format!("\"{KEY}\"")).unwrap();
        assert_eq!(*key, H256::from_str(KEY).unwrap());
    }

    #[test]
    fn parses_key_from_env() {
        std::env::set_var("CROWDFUND_TEST_PRIVATE_KEY", KEY);
        let key: PrivateKey =
            serde_json::from_str("\"$CROWDFUND_TEST_PRIVATE_KEY\"").unwrap();
        assert_eq!(*key, H256::from_str(KEY).unwrap());
    }

    #[test]
    fn rejects_bare_words() {
        let key: Result<PrivateKey, _> = serde_json::from_str("\"hunter2\"");
        assert!(key.is_err());
    }

    #[test]
    fn debug_does_not_leak_the_key() {
        let key = PrivateKey::from(H256::repeat_byte(1));
        assert_eq!(format!("{key:?}"), "PrivateKey");
    }
}
