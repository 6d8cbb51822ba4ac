use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

use wordpump::output::JsonlWriter;
use wordpump::pipeline::{LogProgressReporter, Machine, ProgressConfig};
use wordpump::probe::Finding;
use wordpump::session::{self, SessionState};
use wordpump::source::FileLineSource;
use wordpump::{cli, config, logging, probe};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    cli_opts.apply_to(&mut cfg);

    let wordlist = cli_opts
        .wordlist
        .canonicalize()
        .with_context(|| format!("wordlist {}", cli_opts.wordlist.display()))?;

    if cli_opts.resume && cfg.session_path.is_none() {
        bail!("--resume needs a session file (--session or session_path in config)");
    }
    let wordlist_sha256 = match &cfg.session_path {
        Some(_) => session::fingerprint(&wordlist)?,
        None => String::new(),
    };

    let prior = match (&cfg.session_path, cli_opts.resume) {
        (Some(path), true) => {
            let state = session::load_session(path)
                .with_context(|| format!("loading session {}", path.display()))?;
            state.validate(&wordlist, &wordlist_sha256, &loaded.config_hash)?;
            info!(
                "loaded session {} execs={} results={}",
                path.display(),
                state.stats.execs,
                state.stats.results
            );
            Some(state.stats)
        }
        _ => None,
    };

    let run_handler = probe::build_probe(&cfg.probe)?;
    let writer = JsonlWriter::create(&cfg.output_path, prior.is_some())
        .with_context(|| format!("opening output {}", cfg.output_path.display()))?;
    let writer = Arc::new(Mutex::new(writer));

    let result_handler = {
        let writer = writer.clone();
        move |finding: Finding| {
            info!("found {} -> {}", finding.target, finding.detail.join(","));
            let mut guard = writer.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(err) = guard.record(&finding) {
                warn!("failed to record finding for {}: {err}", finding.input);
            }
        }
    };

    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop_flag = stop_flag.clone();
        ctrlc::set_handler(move || {
            stop_flag.store(true, Ordering::Relaxed);
        })
        .context("installing interrupt handler")?;
    }

    let mut machine = Machine::with_source(
        cfg.workers,
        Arc::new(FileLineSource::new(&wordlist)),
        prior,
        run_handler,
        Box::new(result_handler),
    )
    .with_stop_flag(stop_flag.clone())
    .with_progress(ProgressConfig {
        reporter: Arc::new(LogProgressReporter),
        interval: Duration::from_millis(cfg.progress_interval_ms),
    });

    let stats = machine.run()?;

    writer
        .lock()
        .map_err(|_| anyhow!("output writer poisoned"))?
        .flush()
        .context("flushing findings")?;

    if let Some(path) = &cfg.session_path {
        let state = SessionState::new(
            &wordlist,
            &wordlist_sha256,
            &loaded.config_hash,
            stats.clone(),
        );
        session::save_session(path, &state)
            .with_context(|| format!("saving session {}", path.display()))?;
        info!("session saved to {}", path.display());
    }

    if stop_flag.load(Ordering::Relaxed) {
        info!(
            "interrupted after {}/{} entries; rerun with --resume to continue",
            stats.execs, stats.inputs
        );
    }
    info!(
        "wordpump run finished: {} results in {:.2?} ({:.1} eps)",
        stats.results, stats.total, stats.eps
    );
    Ok(())
}
