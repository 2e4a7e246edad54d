//! Pool scheduler: pending queue, worker assignments, and lifecycle
//!
//! All scheduler state lives behind a single mutex, so submissions and
//! completions are serialized and the queue/assignment invariants hold at
//! every observable instant. Workers interact with the scheduler only
//! through [`Shared::complete`] and [`Shared::fault`].

use crate::job::{completion_pair, Completion, JobHandle, JobId, JobPayload, Outcome};
use crate::worker::Worker;
use crate::{PoolError, PoolResult};
use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Lifecycle phase of the pool
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    /// New submissions allowed
    Accepting,
    /// Submissions rejected; queued and in-flight jobs run to completion
    Draining,
    /// Workers stopped, no further activity
    Terminated,
}

/// A job waiting in the pending queue
struct QueuedJob {
    payload: JobPayload,
    completion: Completion,
}

/// A job currently running on a worker
struct InFlight {
    id: JobId,
    completion: Completion,
}

/// Scheduler state, serialized behind one mutex
struct Sched {
    phase: Phase,

    /// FIFO backlog of jobs not yet assigned
    queue: VecDeque<QueuedJob>,

    /// Slot `i` holds the job in flight on worker `i`; `None` means idle
    assignments: Vec<Option<InFlight>>,

    /// Per-worker dispatch channels in construction order; `None` once the
    /// worker is out of rotation
    senders: Vec<Option<Sender<JobPayload>>>,
}

impl Sched {
    /// Drain condition: nothing queued and every worker idle
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.assignments.iter().all(Option::is_none)
    }
}

/// Scheduler state shared between the pool handle and its workers
pub(crate) struct Shared {
    sched: Mutex<Sched>,

    /// Signaled when the drain condition holds while draining
    drained: Condvar,
}

impl Shared {
    /// Completion handler: resolve worker `worker_id`'s in-flight job and
    /// hand back the next queued payload, if any.
    ///
    /// Returns `None` when the worker should go idle.
    pub(crate) fn complete(&self, worker_id: usize, outcome: Outcome) -> Option<JobPayload> {
        let mut sched = self.sched.lock();

        let Some(in_flight) = sched.assignments[worker_id].take() else {
            // Orphaned completion (e.g. the pool was terminated while the
            // payload was still running): nobody is waiting for it.
            return None;
        };

        match outcome {
            Ok(output) => in_flight.completion.resolve(output),
            Err(message) => in_flight.completion.reject(PoolError::Job(message)),
        }

        if let Some(job) = sched.queue.pop_front() {
            sched.assignments[worker_id] = Some(InFlight {
                id: job.payload.id(),
                completion: job.completion,
            });
            return Some(job.payload);
        }

        if sched.phase == Phase::Draining && sched.is_drained() {
            self.drained.notify_all();
        }
        None
    }

    /// A worker thread faulted while a job was assigned to it: reject that
    /// job only and take the worker out of rotation.
    pub(crate) fn fault(&self, worker_id: usize, message: &str) {
        let mut sched = self.sched.lock();

        sched.senders[worker_id] = None;

        if let Some(in_flight) = sched.assignments[worker_id].take() {
            eprintln!(
                "worker {}: job {} rejected after fault: {}",
                worker_id,
                in_flight.id.as_u64(),
                message
            );
            in_flight
                .completion
                .reject(PoolError::Worker(message.to_string()));
        }

        if sched.phase == Phase::Draining && sched.is_drained() {
            self.drained.notify_all();
        }
    }
}

/// Pool construction options
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Number of workers; `None` means one per available CPU core
    pub pool_size: Option<usize>,
}

/// Fixed-size worker pool.
///
/// Jobs submitted with [`Pool::submit`] run on one of `size` worker threads
/// created at construction. Dispatch is FIFO: an idle worker picks up a new
/// submission immediately, otherwise the job waits in an unbounded queue.
pub struct Pool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<Worker>>,
    size: usize,
}

impl Pool {
    /// Create a pool with one worker per available CPU core
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with `size` workers.
    ///
    /// A size of 0 falls back to the number of CPU cores.
    pub fn with_size(size: usize) -> Self {
        Self::with_config(PoolConfig {
            pool_size: Some(size),
        })
    }

    /// Create a pool from explicit configuration
    pub fn with_config(config: PoolConfig) -> Self {
        let size = match config.pool_size {
            Some(n) if n > 0 => n,
            _ => num_cpus::get(),
        };

        let mut senders = Vec::with_capacity(size);
        let mut receivers = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = unbounded();
            senders.push(Some(tx));
            receivers.push(rx);
        }

        let shared = Arc::new(Shared {
            sched: Mutex::new(Sched {
                phase: Phase::Accepting,
                queue: VecDeque::new(),
                assignments: (0..size).map(|_| None).collect(),
                senders,
            }),
            drained: Condvar::new(),
        });

        let workers = receivers
            .into_iter()
            .enumerate()
            .map(|(id, rx)| Worker::spawn(id, rx, Arc::clone(&shared)))
            .collect();

        Self {
            shared,
            workers: Mutex::new(workers),
            size,
        }
    }

    /// Number of workers configured at construction
    pub fn size(&self) -> usize {
        self.size
    }

    /// Submit a computation to the pool.
    ///
    /// Runs on the first idle worker, or waits in the queue until one frees
    /// up. Never blocks the caller; the returned handle resolves or rejects
    /// exactly once. Fails with [`PoolError::Closing`] once [`Pool::close`]
    /// or [`Pool::terminate`] has been called.
    pub fn submit<F, R>(&self, f: F) -> PoolResult<JobHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut sched = self.shared.sched.lock();
        if sched.phase != Phase::Accepting {
            return Err(PoolError::Closing);
        }

        let id = JobId::new();
        let (completion, handle) = completion_pair(id);
        let payload = JobPayload::new(id, f);

        // Idle scan in construction order
        let idle = (0..self.size)
            .find(|&i| sched.assignments[i].is_none() && sched.senders[i].is_some());

        match idle {
            Some(i) => {
                sched.assignments[i] = Some(InFlight { id, completion });
                if let Some(tx) = &sched.senders[i] {
                    // A send failure means the worker died between the scan
                    // and the send; its fault guard clears the slot and
                    // rejects the job.
                    let _ = tx.send(payload);
                }
            }
            None => sched.queue.push_back(QueuedJob {
                payload,
                completion,
            }),
        }

        Ok(handle)
    }

    /// Immediately stop the pool.
    ///
    /// Queued and in-flight jobs are rejected with [`PoolError::Terminated`];
    /// a payload already running finishes on its own thread and its
    /// completion is discarded. Worker threads are not joined.
    pub fn terminate(&self) {
        let mut sched = self.shared.sched.lock();
        sched.phase = Phase::Terminated;

        for slot in &mut sched.assignments {
            if let Some(in_flight) = slot.take() {
                in_flight.completion.reject(PoolError::Terminated);
            }
        }
        while let Some(job) = sched.queue.pop_front() {
            job.completion.reject(PoolError::Terminated);
        }

        // Dropping the senders makes each worker exit after its current job
        for sender in &mut sched.senders {
            *sender = None;
        }
        drop(sched);

        // Wake any closer blocked on the drain condition
        self.shared.drained.notify_all();
    }

    /// Gracefully close the pool.
    ///
    /// Stops accepting new jobs, waits until the queue is empty and every
    /// worker is idle, then stops and joins the workers. Jobs submitted
    /// before the call still run to completion. Safe to call repeatedly or
    /// from multiple threads.
    pub fn close(&self) {
        let mut sched = self.shared.sched.lock();
        if sched.phase == Phase::Terminated {
            return;
        }
        if sched.phase == Phase::Accepting {
            sched.phase = Phase::Draining;
        }

        while !sched.is_drained() {
            self.shared.drained.wait(&mut sched);
        }
        drop(sched);

        self.terminate();

        // Workers are idle here, so their threads exit promptly
        for worker in self.workers.lock().iter_mut() {
            worker.join();
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Abandoned pools must not leak live workers
        self.terminate();
    }
}
