use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::{DEFAULT_RESULT_CAP, DEFAULT_STORE_FILE_NAME, SNAPSHOT_DIR_NAME};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub result_cap: usize,
    pub query_timeout_ms: u64,
    pub busy_timeout_ms: u64,
    pub store_file_name: String,
    pub profile_root: String,
    pub scratch_dir: String,
    pub max_parallel_stores: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            result_cap: DEFAULT_RESULT_CAP,
            query_timeout_ms: 5000,
            busy_timeout_ms: 250,
            store_file_name: DEFAULT_STORE_FILE_NAME.to_string(),
            profile_root: String::new(),
            scratch_dir: String::new(),
            max_parallel_stores: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.result_cap == 0 {
            bail!("result_cap must be greater than zero");
        }
        if self.query_timeout_ms == 0 {
            bail!("query_timeout_ms must be greater than zero");
        }
        if self.store_file_name.trim().is_empty() {
            bail!("store_file_name must not be empty");
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Configured profile root, or `None` to use the platform default.
    pub fn profile_root(&self) -> Option<PathBuf> {
        non_empty_path(&self.profile_root)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        non_empty_path(&self.scratch_dir)
            .unwrap_or_else(|| std::env::temp_dir().join(SNAPSHOT_DIR_NAME))
    }

    pub fn parallelism(&self) -> usize {
        if self.max_parallel_stores == 0 {
            num_cpus::get()
        } else {
            self.max_parallel_stores
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let config: Config = serde_yaml::from_slice(&bytes)?;
    config.validate()?;

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}
