//! Worker Pool: a fixed number of OS threads that drain the Processing
//! Queue by claiming one file at a time from the File Metadata DB and
//! driving it through an [`Orchestrator`].
//!
//! Plain `std::thread`s rather than `tokio` tasks: [`Orchestrator`] embeds a
//! `Rc`-based graph store handle and tree-sitter parsers, both `!Send`, so it
//! must be constructed and live entirely on one thread. Each worker builds
//! its own Orchestrator once (a fresh `SqliteGraphStore` connection to the
//! same database file; SQLite serializes writers across connections) and
//! reuses it for every file it claims thereafter — the `!Sync`/`!Send`
//! constraint only rules out *sharing* one Orchestrator, not running several.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::events::EventPublisher;
use crate::orchestrator::Orchestrator;
use crate::queue::ProcessingQueue;

/// Builds one Orchestrator per worker thread. Boxed so [`WorkerPool::start`]
/// can accept any closure without forcing callers to name the concrete type.
pub type OrchestratorFactory = dyn Fn() -> anyhow::Result<Orchestrator> + Send + Sync;

pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    queue: ProcessingQueue,
    threads: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `concurrency` worker threads pulling from `queue`. Each retry
    /// failure goes back through `mark_failed_or_retry` with `retry_delay_millis`
    /// as the exponential-backoff base.
    pub fn start(
        concurrency: usize,
        queue: ProcessingQueue,
        retry_delay_millis: u64,
        make_orchestrator: Arc<OrchestratorFactory>,
        events: EventPublisher,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(concurrency);

        for worker_id in 0..concurrency {
            let queue = queue.clone();
            let events = events.clone();
            let shutdown = shutdown.clone();
            let make_orchestrator = make_orchestrator.clone();

            let thread = thread::Builder::new()
                .name(format!("cappy-worker-{worker_id}"))
                .spawn(move || {
                    let mut orchestrator = match make_orchestrator() {
                        Ok(o) => o,
                        Err(e) => {
                            eprintln!("cappy: worker {worker_id} failed to initialize: {e}");
                            return;
                        }
                    };
                    run_worker_loop(worker_id, &mut orchestrator, &queue, retry_delay_millis, &events, &shutdown);
                })
                .expect("failed to spawn cappy worker thread");
            threads.push(thread);
        }

        Self { shutdown, queue, threads }
    }

    /// Signal every worker to stop claiming new files and wait for in-flight
    /// files to finish: a file already being processed runs to completion or
    /// failure, only queued-but-unclaimed work is abandoned.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.queue.close();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

fn run_worker_loop(
    worker_id: usize,
    orchestrator: &mut Orchestrator,
    queue: &ProcessingQueue,
    retry_delay_millis: u64,
    events: &EventPublisher,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        let claimed = match queue.metadata().claim_next_pending() {
            Ok(claimed) => claimed,
            Err(e) => {
                eprintln!("cappy: worker {worker_id} failed to claim work: {e}");
                None
            }
        };

        let Some(record) = claimed else {
            if !queue.wait_for_work_blocking() {
                return;
            }
            continue;
        };

        match orchestrator.process_file(&record.file_id, &record.path, None, events) {
            Ok(_) => {}
            Err(e) => {
                let error_message = e.to_string();
                match queue.metadata().mark_failed_or_retry(&record.file_id, &error_message, retry_delay_millis) {
                    // `file:failed` is the terminal event (§6): only publish it once
                    // retries are exhausted, not on every retryable attempt.
                    Ok((crate::metadata_db::FileStatus::Failed, _)) => {
                        events.publish(crate::events::IndexEvent::FileFailed {
                            file_id: record.file_id.clone(),
                            error_message,
                        });
                    }
                    Ok(_) => {}
                    Err(db_err) => eprintln!("cappy: worker {worker_id} failed to record failure for {}: {db_err}", record.path),
                }
            }
        }
    }
}
