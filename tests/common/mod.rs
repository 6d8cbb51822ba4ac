//! Shared helpers for machine integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use wordpump::pipeline::Machine;
use wordpump::stats::Statistics;

/// Write `lines` to `dir/name`, newline terminated.
pub fn write_wordlist(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut content = lines.join("\n");
    if !lines.is_empty() {
        content.push('\n');
    }
    fs::write(&path, content).expect("write wordlist");
    path
}

pub fn words(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

pub fn numbered(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("word-{i:05}")).collect()
}

/// Outcome of a full run.
pub struct RunOutcome {
    pub stats: Statistics,
    /// Every line the processing function was called with.
    pub processed: Vec<String>,
    /// Every result passed to the result handler, in handling order.
    pub handled: Vec<String>,
}

/// Run a machine to completion. `hit` decides which lines produce a result.
pub fn run_machine<F>(path: &Path, workers: usize, prior: Option<Statistics>, hit: F) -> RunOutcome
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    let processed = Arc::new(Mutex::new(Vec::new()));
    let handled = Arc::new(Mutex::new(Vec::new()));

    let run = {
        let processed = processed.clone();
        move |line: &str| {
            processed.lock().expect("lock").push(line.to_string());
            hit(line).then(|| line.to_string())
        }
    };
    let on_result = {
        let handled = handled.clone();
        move |result: String| handled.lock().expect("lock").push(result)
    };

    let mut machine = Machine::new(workers, path, prior, run, on_result);
    let stats = machine.run().expect("machine run");
    drop(machine);

    let processed = processed.lock().expect("lock").clone();
    let handled = handled.lock().expect("lock").clone();
    RunOutcome {
        stats,
        processed,
        handled,
    }
}
