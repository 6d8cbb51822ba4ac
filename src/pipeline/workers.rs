//! # Pipeline Workers
//!
//! Input consumers and the single result collector.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::stats::ExecCounters;

use super::completion::{AbortOnPanic, CompletionTracker};
use super::{ResultHandler, RunHandler};

/// Spawn the input consumer threads.
///
/// Each worker records an execution per job, runs the handler and forwards
/// any result to the collector. Jobs without a result are completed here;
/// jobs with one are completed by the collector once handled.
pub fn spawn_input_workers<R: Send + 'static>(
    workers: usize,
    run_handler: RunHandler<R>,
    rx: Receiver<String>,
    result_tx: Sender<R>,
    counters: Arc<ExecCounters>,
    tracker: Arc<CompletionTracker>,
) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::with_capacity(workers);

    for id in 0..workers.max(1) {
        let run_handler = run_handler.clone();
        let rx = rx.clone();
        let result_tx = result_tx.clone();
        let counters = counters.clone();
        let tracker = tracker.clone();

        handles.push(thread::spawn(move || {
            // Declared before the guard so the queue stays open until the
            // tracker has been aborted on unwind.
            let rx = rx;
            let _guard = AbortOnPanic(&tracker);
            for line in rx.iter() {
                counters.record_execution();
                match run_handler(&line) {
                    Some(result) => {
                        counters.record_result();
                        if result_tx.send(result).is_err() {
                            warn!("worker {id}: result queue closed, aborting run");
                            tracker.abort();
                            break;
                        }
                    }
                    None => tracker.complete(),
                }
            }
            debug!("worker {id} exiting");
        }));
    }

    handles
}

/// Spawn the result collector thread. Results are handled one at a time.
pub fn spawn_collector_thread<R: Send + 'static>(
    mut result_handler: ResultHandler<R>,
    rx: Receiver<R>,
    tracker: Arc<CompletionTracker>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let rx = rx;
        let _guard = AbortOnPanic(&tracker);
        for result in rx.iter() {
            result_handler(result);
            tracker.complete();
        }
        debug!("collector exiting");
    })
}
