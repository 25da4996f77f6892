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

use config::{Config, File};
use std::path::{Path, PathBuf};

use super::*;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> crowdfund_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(crowdfund_utils::Error::from))
        .collect()
}

/// Try to parse the [`CrowdfundConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> crowdfund_utils::Result<CrowdfundConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of CROWDFUND).
    let builder = builder.add_source(
        config::Environment::with_prefix("CROWDFUND").separator("__"),
    );
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        CrowdfundConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// Returns `Ok(CrowdfundConfig)` on success, or `Err(crowdfund_utils::Error)` on failure.
///
/// # Arguments
///
/// * `path` - The path to the configuration directory
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> crowdfund_utils::Result<CrowdfundConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    config: CrowdfundConfig,
) -> crowdfund_utils::Result<CrowdfundConfig> {
    tracing::trace!("Checking configration sanity ...");
    if config.chain.contract.address.is_zero() {
        return Err(crowdfund_utils::Error::Generic(
            "chain.contract.address must not be the zero address",
        ));
    }
    if config.events_watcher.max_blocks_per_step == 0 {
        return Err(crowdfund_utils::Error::Generic(
            "events-watcher.max-blocks-per-step must be greater than zero",
        ));
    }
    if config.events_watcher.seen_set_capacity == 0 {
        return Err(crowdfund_utils::Error::Generic(
            "events-watcher.seen-set-capacity must be greater than zero",
        ));
    }
    if config.tx_tracker.confirmations == 0 {
        return Err(crowdfund_utils::Error::Generic(
            "tx-tracker.confirmations must be at least 1",
        ));
    }
    if config.chain.private_key.is_none() {
        tracing::warn!(
            "!!WARNING!!: no private-key configured for ({}), running read-only",
            config.chain.name
        );
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("crowdfund-config-{tag}-{}", std::process::id()))
    }

    #[test]
    fn loads_toml_with_defaults() {
        let dir = temp_dir("defaults");
        write_config(
            &dir,
            "sepolia.toml",
            r#"
            [chain]
            name = "sepolia"
            chain-id = 11155111
            http-endpoint = "http://127.0.0.1:8545"

            [chain.contract]
            address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            deployed-at = 42
            "#,
        );
        let config = load(&dir).unwrap();
        assert_eq!(config.port, 9955);
        assert_eq!(config.chain.chain_id, 11155111);
        assert_eq!(config.chain.contract.deployed_at, 42);
        assert_eq!(config.events_watcher.polling_interval, 3_000);
        assert_eq!(config.events_watcher.seen_set_capacity, 10_000);
        assert_eq!(config.tx_tracker.confirmations, 1);
        assert!(config.tx_tracker.timeout().is_none());
        assert!(config.features.relay);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn rejects_zero_confirmations() {
        let dir = temp_dir("zero-confirmations");
        write_config(
            &dir,
            "local.json",
            r#"{
                "chain": {
                    "name": "hardhat",
                    "chain-id": 31337,
                    "http-endpoint": "http://127.0.0.1:8545",
                    "contract": {
                        "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3"
                    }
                },
                "tx-tracker": { "confirmations": 0 }
            }"#,
        );
        let result = load(&dir);
        assert!(result.is_err());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_chain_is_a_parse_error() {
        let result = parse_from_files(&[]);
        assert!(matches!(
            result,
            Err(crowdfund_utils::Error::ParseConfig(_))
        ));
    }
}
