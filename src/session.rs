//! # Session Snapshots
//!
//! Persists the statistics of an interrupted run so the next run can skip the
//! lines that were already processed. The resume skip is positional, so the
//! wordlist fingerprint is stored alongside and checked before resuming.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::constants::{FINGERPRINT_BUFFER_SIZE, SESSION_VERSION};
use crate::stats::Statistics;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("session encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported session version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("session was recorded for {recorded}, not {requested}")]
    WordlistPath { recorded: String, requested: String },
    #[error("wordlist {path} changed since the session was saved")]
    WordlistChanged { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    pub wordlist: PathBuf,
    pub wordlist_sha256: String,
    pub config_hash: String,
    pub stats: Statistics,
}

impl SessionState {
    pub fn new(
        wordlist: &Path,
        wordlist_sha256: &str,
        config_hash: &str,
        stats: Statistics,
    ) -> Self {
        Self {
            version: SESSION_VERSION,
            wordlist: wordlist.to_path_buf(),
            wordlist_sha256: wordlist_sha256.to_string(),
            config_hash: config_hash.to_string(),
            stats,
        }
    }

    /// Check that this session can resume against `wordlist`.
    pub fn validate(
        &self,
        wordlist: &Path,
        wordlist_sha256: &str,
        config_hash: &str,
    ) -> Result<(), SessionError> {
        if self.version != SESSION_VERSION {
            return Err(SessionError::Version {
                found: self.version,
                expected: SESSION_VERSION,
            });
        }
        if self.wordlist != wordlist {
            return Err(SessionError::WordlistPath {
                recorded: self.wordlist.display().to_string(),
                requested: wordlist.display().to_string(),
            });
        }
        if self.wordlist_sha256 != wordlist_sha256 {
            return Err(SessionError::WordlistChanged {
                path: wordlist.display().to_string(),
            });
        }
        if self.config_hash != config_hash {
            warn!(
                "session config_hash={} does not match current config_hash={}",
                self.config_hash, config_hash
            );
        }
        Ok(())
    }
}

pub fn load_session(path: &Path) -> Result<SessionState, SessionError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the session next to `path` and rename it into place.
pub fn save_session(path: &Path, state: &SessionState) -> Result<(), SessionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Hex SHA-256 of the file at `path`.
pub fn fingerprint(path: &Path) -> Result<String, SessionError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; FINGERPRINT_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
