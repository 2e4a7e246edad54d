//! Worker threads that run job payloads
//!
//! Each worker owns the receiving end of its dispatch channel and runs one
//! payload at a time. Completions are reported through the scheduler's
//! completion handler, which may hand back the next queued payload directly
//! so a busy pool never round-trips through the channel.

use crate::job::JobPayload;
use crate::pool::Shared;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::thread;

/// A pool worker: one OS thread running jobs one at a time
pub(crate) struct Worker {
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Spawn worker `id`, reading payloads from `rx`
    pub(crate) fn spawn(id: usize, rx: Receiver<JobPayload>, shared: Arc<Shared>) -> Self {
        let handle = thread::Builder::new()
            .name(format!("workpool-{}", id))
            .spawn(move || Worker::run_loop(id, rx, shared))
            .expect("failed to spawn worker thread");

        Self {
            handle: Some(handle),
        }
    }

    /// Wait for the worker thread to exit.
    ///
    /// Only meaningful after the dispatch sender has been dropped; a panic
    /// on the worker thread was already converted into a job rejection by
    /// the fault guard.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Worker thread main loop
    fn run_loop(id: usize, rx: Receiver<JobPayload>, shared: Arc<Shared>) {
        // If this thread unwinds mid-job, fail that job instead of leaving
        // its assignment entry behind.
        let _guard = FaultGuard {
            id,
            shared: Arc::clone(&shared),
        };

        // Exits when the pool drops this worker's sender
        while let Ok(payload) = rx.recv() {
            let mut next = Some(payload);
            while let Some(payload) = next.take() {
                let outcome = payload.execute();
                next = shared.complete(id, outcome);
            }
        }
    }
}

/// Converts a worker-thread unwind into a fault on its in-flight job
struct FaultGuard {
    id: usize,
    shared: Arc<Shared>,
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.fault(self.id, "worker thread panicked");
        }
    }
}
