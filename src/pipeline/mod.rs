//! # Pipeline Module
//!
//! The job machine: counts the wordlist, fans every line out to a fixed pool
//! of input workers over an unbuffered job queue, funnels positive results
//! through a single collector and finalizes statistics once everything has
//! drained.
//!
//! Both queues are rendezvous channels (`bounded(0)`), so the producer can
//! never run ahead of the workers and the workers can never run ahead of the
//! collector.

pub mod completion;
pub mod workers;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Sender, bounded};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::WORKERS_PER_CPU;
use crate::source::{FileLineSource, LineSource, Lines, SourceError};
use crate::stats::{ExecCounters, Statistics, completion_pct};

use completion::{Aborted, CompletionTracker};

/// Processing function run by the input workers. `None` means no finding.
pub type RunHandler<R> = Arc<dyn Fn(&str) -> Option<R> + Send + Sync>;

/// Handler invoked serially for every positive result.
pub type ResultHandler<R> = Box<dyn FnMut(R) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Created,
    Counting,
    Running,
    Draining,
    Finalized,
    Failed,
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("machine is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: MachineState,
        actual: MachineState,
    },
    #[error(transparent)]
    Aborted(#[from] Aborted),
    #[error("job queue closed while submitting line {line}")]
    QueueClosed { line: u64 },
    #[error("{0} pipeline thread(s) panicked")]
    ThreadPanicked(usize),
}

/// Live progress reported while the pump is running.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub inputs: u64,
    pub execs: u64,
    pub results: u64,
    pub elapsed_seconds: f64,
    /// Executions per second for this run only.
    pub eps: f64,
    pub eta_seconds: Option<u64>,
    /// Completion percentage (0.0 - 100.0)
    pub completion_pct: f64,
}

/// Progress callback for long-running wordlists.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

pub struct ProgressConfig {
    pub reporter: Arc<dyn ProgressReporter>,
    pub interval: Duration,
}

/// Reports progress through `tracing`.
pub struct LogProgressReporter;

impl ProgressReporter for LogProgressReporter {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let eta = snapshot
            .eta_seconds
            .map(|secs| format!("{secs}s"))
            .unwrap_or_else(|| "-".to_string());
        info!(
            "progress {:.2}% execs={}/{} results={} eps={:.1} eta={}",
            snapshot.completion_pct,
            snapshot.execs,
            snapshot.inputs,
            snapshot.results,
            snapshot.eps,
            eta
        );
    }
}

/// Worker count to use for a requested count; `0` selects twice the CPU count.
pub fn resolve_workers(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().saturating_mul(WORKERS_PER_CPU).max(1)
    } else {
        requested
    }
}

struct WorkerHandles {
    workers: Vec<JoinHandle<()>>,
    collector: JoinHandle<()>,
}

/// Single-shot job machine over a line source.
pub struct Machine<R> {
    stats: Statistics,
    counters: Arc<ExecCounters>,
    tracker: Arc<CompletionTracker>,
    workers: usize,
    source: Arc<dyn LineSource>,
    run_handler: RunHandler<R>,
    result_handler: Option<ResultHandler<R>>,
    state: MachineState,
    job_tx: Option<Sender<String>>,
    handles: Option<WorkerHandles>,
    stop_flag: Option<Arc<AtomicBool>>,
    progress: Option<ProgressConfig>,
    started_at: Option<Instant>,
    baseline_execs: u64,
}

impl<R: Send + 'static> Machine<R> {
    /// Build a machine over a wordlist file.
    ///
    /// `prior` seeds the statistics only when it carries at least one
    /// execution; the run then resumes after that many lines.
    pub fn new<F, G>(
        workers: usize,
        path: impl Into<PathBuf>,
        prior: Option<Statistics>,
        run_handler: F,
        result_handler: G,
    ) -> Self
    where
        F: Fn(&str) -> Option<R> + Send + Sync + 'static,
        G: FnMut(R) + Send + 'static,
    {
        Self::with_source(
            workers,
            Arc::new(FileLineSource::new(path)),
            prior,
            Arc::new(run_handler),
            Box::new(result_handler),
        )
    }

    pub fn with_source(
        workers: usize,
        source: Arc<dyn LineSource>,
        prior: Option<Statistics>,
        run_handler: RunHandler<R>,
        result_handler: ResultHandler<R>,
    ) -> Self {
        let stats = prior.filter(Statistics::is_resumable).unwrap_or_default();
        let counters = Arc::new(ExecCounters::seeded(stats.execs, stats.results));
        let baseline_execs = stats.execs;
        Self {
            stats,
            counters,
            tracker: Arc::new(CompletionTracker::new()),
            workers: resolve_workers(workers),
            source,
            run_handler,
            result_handler: Some(result_handler),
            state: MachineState::Created,
            job_tx: None,
            handles: None,
            stop_flag: None,
            progress: None,
            started_at: None,
            baseline_execs,
        }
    }

    /// Stop submitting new lines once `flag` is set. Submitted lines still drain.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Current statistics. Derived fields are only meaningful once finalized.
    pub fn statistics(&self) -> Statistics {
        let mut stats = self.stats.clone();
        self.counters.apply_to(&mut stats);
        stats
    }

    /// Count the input, spawn the workers and submit every line not already
    /// covered by the prior statistics. Returns once the last line is queued.
    pub fn start(&mut self) -> Result<(), MachineError> {
        self.expect_state(MachineState::Created)?;
        let Some(result_handler) = self.result_handler.take() else {
            return Err(self.invalid_state(MachineState::Created));
        };

        self.state = MachineState::Counting;
        let source = self.source.clone();
        let inputs = source.count_lines().inspect_err(|_| {
            self.state = MachineState::Failed;
        })?;
        self.stats.inputs = inputs;

        let skip = self.stats.execs;
        if skip > 0 {
            info!(
                "resuming {} after {} of {} lines",
                source.describe(),
                skip,
                inputs
            );
            if skip > inputs {
                warn!(
                    "prior execution count {} exceeds input count {}; nothing left to submit",
                    skip, inputs
                );
            }
        }
        if skip == 0 || self.stats.start.is_none() {
            self.stats.start = Some(Utc::now());
        }

        let lines = source.open(skip).inspect_err(|_| {
            self.state = MachineState::Failed;
        })?;

        self.state = MachineState::Running;
        info!(
            "starting input={} inputs={} workers={}",
            source.describe(),
            inputs,
            self.workers
        );

        let (job_tx, job_rx) = bounded::<String>(0);
        let (result_tx, result_rx) = bounded::<R>(0);
        let collector =
            workers::spawn_collector_thread(result_handler, result_rx, self.tracker.clone());
        let workers = workers::spawn_input_workers(
            self.workers,
            self.run_handler.clone(),
            job_rx,
            result_tx,
            self.counters.clone(),
            self.tracker.clone(),
        );
        self.handles = Some(WorkerHandles { workers, collector });
        self.started_at = Some(Instant::now());

        match self.pump(lines, skip, &job_tx) {
            Ok(submitted) => {
                debug!("submitted {submitted} lines");
                self.job_tx = Some(job_tx);
                Ok(())
            }
            Err(err) => {
                drop(job_tx);
                self.shutdown();
                self.state = MachineState::Failed;
                Err(err)
            }
        }
    }

    /// Block until every submitted job has been handled, stop the workers and
    /// finalize the statistics.
    pub fn wait(&mut self) -> Result<Statistics, MachineError> {
        self.expect_state(MachineState::Running)?;
        self.state = MachineState::Draining;

        let drained = self.tracker.wait();
        let panicked = self.shutdown();
        if let Err(aborted) = drained {
            self.state = MachineState::Failed;
            return Err(aborted.into());
        }
        if panicked > 0 {
            self.state = MachineState::Failed;
            return Err(MachineError::ThreadPanicked(panicked));
        }

        self.counters.apply_to(&mut self.stats);
        self.stats.finalize(Utc::now());
        self.state = MachineState::Finalized;

        if let Some(progress) = &self.progress {
            progress.reporter.on_progress(&self.progress_snapshot());
        }
        info!(
            "run_summary inputs={} execs={} results={} eps={:.1} progress={:.2}% total={:?}",
            self.stats.inputs,
            self.stats.execs,
            self.stats.results,
            self.stats.eps,
            self.stats.progress,
            self.stats.total
        );
        Ok(self.stats.clone())
    }

    /// `start` followed by `wait`.
    pub fn run(&mut self) -> Result<Statistics, MachineError> {
        self.start()?;
        self.wait()
    }

    fn pump(
        &self,
        lines: Lines<'_>,
        skip: u64,
        job_tx: &Sender<String>,
    ) -> Result<u64, MachineError> {
        let mut submitted = 0u64;
        let mut last_progress = Instant::now();

        for line in lines {
            if self.stop_requested() {
                info!("stop requested; no further lines will be submitted");
                break;
            }
            if self.tracker.is_aborted() {
                return Err(MachineError::Aborted(Aborted {
                    pending: self.tracker.pending(),
                }));
            }
            let line = line.map_err(SourceError::from)?;

            self.tracker.submit();
            if job_tx.send(line).is_err() {
                self.tracker.complete();
                if self.tracker.is_aborted() {
                    return Err(MachineError::Aborted(Aborted {
                        pending: self.tracker.pending(),
                    }));
                }
                return Err(MachineError::QueueClosed {
                    line: skip + submitted,
                });
            }
            submitted += 1;

            if let Some(progress) = &self.progress {
                if progress.interval.is_zero() || last_progress.elapsed() >= progress.interval {
                    progress.reporter.on_progress(&self.progress_snapshot());
                    last_progress = Instant::now();
                }
            }
        }

        Ok(submitted)
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn progress_snapshot(&self) -> ProgressSnapshot {
        let elapsed_seconds = self
            .started_at
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let execs = self.counters.execs();
        let inputs = self.stats.inputs;
        let done_this_run = execs.saturating_sub(self.baseline_execs);
        let eps = if elapsed_seconds > 0.0 {
            done_this_run as f64 / elapsed_seconds
        } else {
            0.0
        };
        let eta_seconds = if eps > 0.0 && execs < inputs {
            Some(((inputs - execs) as f64 / eps).round() as u64)
        } else {
            None
        };

        ProgressSnapshot {
            inputs,
            execs,
            results: self.counters.results(),
            elapsed_seconds,
            eps,
            eta_seconds,
            completion_pct: completion_pct(execs, inputs),
        }
    }
}

impl<R> Machine<R> {
    fn expect_state(&self, expected: MachineState) -> Result<(), MachineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(expected))
        }
    }

    fn invalid_state(&self, expected: MachineState) -> MachineError {
        MachineError::InvalidState {
            expected,
            actual: self.state,
        }
    }

    /// Close the job queue and join every thread. Returns how many panicked.
    fn shutdown(&mut self) -> usize {
        drop(self.job_tx.take());
        let Some(handles) = self.handles.take() else {
            return 0;
        };

        let mut panicked = 0;
        for handle in handles.workers {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        // The collector exits once every worker has dropped its result sender.
        if handles.collector.join().is_err() {
            panicked += 1;
        }
        if panicked > 0 {
            warn!("{panicked} pipeline thread(s) panicked");
        }
        panicked
    }
}

impl<R> Drop for Machine<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn wordlist(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("words.txt");
        fs::write(&path, lines.join("\n")).expect("write wordlist");
        (dir, path)
    }

    #[test]
    fn resolves_default_worker_count() {
        assert_eq!(resolve_workers(0), num_cpus::get() * WORKERS_PER_CPU);
        assert_eq!(resolve_workers(3), 3);
    }

    #[test]
    fn prior_without_execs_is_ignored() {
        let prior = Statistics {
            inputs: 10,
            results: 4,
            ..Statistics::default()
        };
        let machine: Machine<String> =
            Machine::new(1, "unused.txt", Some(prior), |_| None, |_| {});
        assert_eq!(machine.statistics(), Statistics::default());
    }

    #[test]
    fn lifecycle_rejects_out_of_order_calls() {
        let (_dir, path) = wordlist(&["a", "b"]);
        let mut machine: Machine<String> = Machine::new(2, path, None, |_| None, |_| {});
        assert!(matches!(
            machine.wait(),
            Err(MachineError::InvalidState {
                expected: MachineState::Running,
                actual: MachineState::Created,
            })
        ));

        machine.start().expect("start");
        assert_eq!(machine.state(), MachineState::Running);
        assert!(matches!(
            machine.start(),
            Err(MachineError::InvalidState { .. })
        ));

        machine.wait().expect("wait");
        assert_eq!(machine.state(), MachineState::Finalized);
        assert!(machine.wait().is_err());
    }

    #[test]
    fn missing_wordlist_fails_before_any_submission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut machine: Machine<String> = Machine::new(
            2,
            "/nonexistent/wordpump/words.txt",
            None,
            move |_| {
                seen.fetch_add(1, Ordering::Relaxed);
                None
            },
            |_| {},
        );
        let err = machine.start().expect_err("missing wordlist");
        assert!(matches!(err, MachineError::Source(SourceError::Open { .. })));
        assert_eq!(machine.state(), MachineState::Failed);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(machine.statistics().execs, 0);
    }

    #[test]
    fn stop_flag_prevents_submission() {
        let (_dir, path) = wordlist(&["a", "b", "c"]);
        let flag = Arc::new(AtomicBool::new(true));
        let mut machine: Machine<String> =
            Machine::new(2, path, None, |line| Some(line.to_string()), |_| {})
                .with_stop_flag(flag);
        let stats = machine.run().expect("run");
        assert_eq!(stats.inputs, 3);
        assert_eq!(stats.execs, 0);
        assert_eq!(stats.results, 0);
    }

    struct Recorder(Mutex<Vec<ProgressSnapshot>>);

    impl ProgressReporter for Recorder {
        fn on_progress(&self, snapshot: &ProgressSnapshot) {
            self.0.lock().expect("lock").push(snapshot.clone());
        }
    }

    #[test]
    fn reports_progress_and_final_snapshot() {
        let (_dir, path) = wordlist(&["a", "b", "c", "d"]);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut machine: Machine<()> = Machine::new(1, path, None, |_| None, |_| {})
            .with_progress(ProgressConfig {
                reporter: recorder.clone(),
                interval: Duration::ZERO,
            });
        machine.run().expect("run");

        let snapshots = recorder.0.lock().expect("lock");
        // one per submitted line plus the final one
        assert_eq!(snapshots.len(), 5);
        let last = snapshots.last().expect("final snapshot");
        assert_eq!(last.execs, 4);
        assert_eq!(last.inputs, 4);
        assert!((last.completion_pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn panicking_handler_fails_the_run() {
        let (_dir, path) = wordlist(&["ok", "boom", "ok"]);
        let mut machine: Machine<String> = Machine::new(
            1,
            path,
            None,
            |line| {
                if line == "boom" {
                    panic!("processing fault");
                }
                None
            },
            |_| {},
        );
        let outcome = machine.run();
        assert!(
            matches!(outcome, Err(MachineError::Aborted(_))),
            "unexpected outcome: {outcome:?}"
        );
        assert_eq!(machine.state(), MachineState::Failed);
    }

    #[test]
    fn panicking_result_handler_aborts_the_run() {
        let lines: Vec<String> = (0..200).map(|i| format!("w{i}")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let (_dir, path) = wordlist(&refs);

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let mut machine: Machine<String> = Machine::new(
                4,
                path,
                None,
                |line| Some(line.to_string()),
                |line| {
                    if line == "w10" {
                        panic!("result handler fault");
                    }
                },
            );
            let outcome = machine.run();
            let _ = done_tx.send((outcome, machine.state()));
        });

        let (outcome, state) = done_rx
            .recv_timeout(Duration::from_secs(30))
            .expect("run hung after the collector panicked");
        assert!(
            matches!(outcome, Err(MachineError::Aborted(_))),
            "unexpected outcome: {outcome:?}"
        );
        assert_eq!(state, MachineState::Failed);
    }

    /// In-memory source whose running pass can be made to fail.
    struct ScriptedSource {
        lines: Vec<String>,
        fail_read_at: Option<usize>,
        fail_second_open: bool,
        opens: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(count: usize) -> Self {
            Self {
                lines: (0..count).map(|i| format!("line-{i}")).collect(),
                fail_read_at: None,
                fail_second_open: false,
                opens: AtomicUsize::new(0),
            }
        }
    }

    impl LineSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn open(&self, start: u64) -> Result<Lines<'_>, SourceError> {
            let pass = self.opens.fetch_add(1, Ordering::SeqCst);
            if pass > 0 && self.fail_second_open {
                return Err(SourceError::Open {
                    path: PathBuf::from("scripted"),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                });
            }
            let fail_at = if pass > 0 { self.fail_read_at } else { None };
            let skip = usize::try_from(start).unwrap_or(usize::MAX);
            let lines = self
                .lines
                .iter()
                .enumerate()
                .skip(skip)
                .map(move |(idx, line)| {
                    if Some(idx) == fail_at {
                        Err(std::io::Error::other("read fail"))
                    } else {
                        Ok(line.clone())
                    }
                });
            Ok(Box::new(lines))
        }
    }

    fn counting_machine(
        source: ScriptedSource,
        processed: Arc<AtomicUsize>,
    ) -> Machine<String> {
        let run: RunHandler<String> = Arc::new(move |_line: &str| {
            processed.fetch_add(1, Ordering::SeqCst);
            None
        });
        Machine::with_source(2, Arc::new(source), None, run, Box::new(|_| {}))
    }

    #[test]
    fn read_error_mid_stream_fails_after_draining_submitted_lines() {
        let mut source = ScriptedSource::new(10);
        source.fail_read_at = Some(5);
        let processed = Arc::new(AtomicUsize::new(0));
        let mut machine = counting_machine(source, processed.clone());

        let err = machine.start().expect_err("read error must surface");
        assert!(
            matches!(err, MachineError::Source(SourceError::Io(_))),
            "unexpected error: {err:?}"
        );
        assert_eq!(machine.state(), MachineState::Failed);
        assert_eq!(processed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn reopen_failure_fails_without_processing() {
        let mut source = ScriptedSource::new(10);
        source.fail_second_open = true;
        let processed = Arc::new(AtomicUsize::new(0));
        let mut machine = counting_machine(source, processed.clone());

        let err = machine.run().expect_err("open error must surface");
        assert!(
            matches!(err, MachineError::Source(SourceError::Open { .. })),
            "unexpected error: {err:?}"
        );
        assert_eq!(machine.state(), MachineState::Failed);
        assert_eq!(machine.statistics().inputs, 10);
        assert_eq!(processed.load(Ordering::SeqCst), 0);
    }
}
