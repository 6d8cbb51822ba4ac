//! # Probes
//!
//! Built-in processing functions for the command line tool. Each probe turns
//! one wordlist entry into an optional [`Finding`].

use std::net::ToSocketAddrs;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProbeConfig;
use crate::pipeline::RunHandler;

/// Placeholder replaced by the wordlist entry in resolve templates.
pub const PLACEHOLDER: &str = "{}";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Emit entries matching a regular expression
    Match,
    /// Resolve a host name built from each entry
    Resolve,
}

/// A positive result produced by a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub input: String,
    pub target: String,
    pub detail: Vec<String>,
}

pub fn build_probe(cfg: &ProbeConfig) -> Result<RunHandler<Finding>> {
    match cfg.kind {
        ProbeKind::Match => {
            let re = Regex::new(&cfg.pattern)
                .with_context(|| format!("invalid match pattern {:?}", cfg.pattern))?;
            Ok(Arc::new(move |line: &str| match_line(&re, line)))
        }
        ProbeKind::Resolve => {
            if !cfg.template.contains(PLACEHOLDER) {
                bail!("resolve template {:?} has no {PLACEHOLDER} placeholder", cfg.template);
            }
            let template = cfg.template.clone();
            let port = cfg.port;
            Ok(Arc::new(move |line: &str| resolve_line(&template, port, line)))
        }
    }
}

fn match_line(re: &Regex, line: &str) -> Option<Finding> {
    let found = re.find(line)?;
    Some(Finding {
        input: line.to_string(),
        target: line.to_string(),
        detail: vec![found.as_str().to_string()],
    })
}

fn resolve_line(template: &str, port: u16, line: &str) -> Option<Finding> {
    let word = line.trim();
    if word.is_empty() {
        return None;
    }
    let host = template.replace(PLACEHOLDER, word);
    let addrs = match (host.as_str(), port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            debug!("resolve {host} failed: {err}");
            return None;
        }
    };

    let mut detail: Vec<String> = addrs.map(|addr| addr.ip().to_string()).collect();
    detail.sort();
    detail.dedup();
    if detail.is_empty() {
        return None;
    }
    Some(Finding {
        input: line.to_string(),
        target: host,
        detail,
    })
}
