use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::probe::ProbeKind;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Wordlist to process, one entry per line
    #[arg(short, long)]
    pub wordlist: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Number of worker threads (0 = twice the CPU count). Negative counts
    /// are rejected at parse time.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Processing function applied to every entry
    #[arg(long, value_enum)]
    pub probe: Option<ProbeKind>,

    /// Regular expression for the match probe
    #[arg(long)]
    pub pattern: Option<String>,

    /// Host template for the resolve probe, `{}` is replaced by the entry
    #[arg(long)]
    pub template: Option<String>,

    /// Port used when resolving
    #[arg(long)]
    pub port: Option<u16>,

    /// JSON Lines file receiving findings
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Session file used to save and resume progress
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Resume from the session file
    #[arg(long)]
    pub resume: bool,

    /// Interval between progress reports, in milliseconds
    #[arg(long)]
    pub progress_interval_ms: Option<u64>,
}

impl CliOptions {
    /// Apply command line overrides on top of the loaded config.
    pub fn apply_to(&self, cfg: &mut Config) {
        if let Some(workers) = self.workers {
            cfg.workers = workers;
        }
        if let Some(kind) = self.probe {
            cfg.probe.kind = kind;
        }
        if let Some(pattern) = &self.pattern {
            cfg.probe.pattern = pattern.clone();
        }
        if let Some(template) = &self.template {
            cfg.probe.template = template.clone();
        }
        if let Some(port) = self.port {
            cfg.probe.port = port;
        }
        if let Some(output) = &self.output {
            cfg.output_path = output.clone();
        }
        if let Some(session) = &self.session {
            cfg.session_path = Some(session.clone());
        }
        if let Some(interval) = self.progress_interval_ms {
            cfg.progress_interval_ms = interval;
        }
    }
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
