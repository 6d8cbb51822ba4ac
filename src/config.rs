use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::DEFAULT_PROGRESS_INTERVAL_MS;
use crate::probe::ProbeKind;

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    pub kind: ProbeKind,
    #[serde(default)]
    pub pattern: String,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default)]
    pub session_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes).context("parsing config")?;
    if config
        .session_path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        config.session_path = None;
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn default_template() -> String {
    crate::probe::PLACEHOLDER.to_string()
}

fn default_port() -> u16 {
    80
}

fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL_MS
}
