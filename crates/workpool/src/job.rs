//! Job payloads and completion handles

use crate::{PoolError, PoolResult};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a submitted job
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct JobId(u64);

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

impl JobId {
    /// Generate a new unique JobId
    pub fn new() -> Self {
        JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased value produced by a job's computation
pub(crate) type JobOutput = Box<dyn Any + Send>;

/// What a worker reports back after running a payload: the result value
/// or an error description, never both
pub(crate) type Outcome = Result<JobOutput, String>;

/// A self-contained computation ready to run on a worker.
///
/// The closure and its captured arguments are boxed together; the
/// `Send + 'static` bounds on construction guarantee the payload holds no
/// borrows of pool-side state.
pub(crate) struct JobPayload {
    id: JobId,
    run: Box<dyn FnOnce() -> Outcome + Send>,
}

impl JobPayload {
    pub(crate) fn new<F, R>(id: JobId, f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        Self {
            id,
            run: Box::new(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => Ok(Box::new(value) as JobOutput),
                Err(payload) => Err(panic_message(payload.as_ref())),
            }),
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    /// Run the computation, capturing a panic as an error description
    pub(crate) fn execute(self) -> Outcome {
        (self.run)()
    }
}

/// Extract a readable message from a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

/// Sending half of a job's one-shot completion channel.
///
/// Firing consumes the slot, so a job is resolved or rejected at most once
/// by construction.
pub(crate) struct Completion {
    tx: Sender<PoolResult<JobOutput>>,
}

impl Completion {
    pub(crate) fn resolve(self, output: JobOutput) {
        let _ = self.tx.send(Ok(output));
    }

    pub(crate) fn reject(self, err: PoolError) {
        let _ = self.tx.send(Err(err));
    }
}

/// Handle to a job's eventual result
pub struct JobHandle<R> {
    id: JobId,
    rx: Receiver<PoolResult<JobOutput>>,
    _marker: PhantomData<fn() -> R>,
}

/// Create the one-shot completion channel for a job
pub(crate) fn completion_pair<R>(id: JobId) -> (Completion, JobHandle<R>) {
    let (tx, rx) = bounded(1);
    (
        Completion { tx },
        JobHandle {
            id,
            rx,
            _marker: PhantomData,
        },
    )
}

impl<R: 'static> JobHandle<R> {
    /// Get the job's unique ID
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Block until the job resolves or is rejected
    pub fn wait(self) -> PoolResult<R> {
        match self.rx.recv() {
            Ok(Ok(output)) => match output.downcast::<R>() {
                Ok(value) => Ok(*value),
                // Unreachable: submit pairs the payload's R with the handle's R
                Err(_) => Err(PoolError::Worker(
                    "job produced a result of unexpected type".to_string(),
                )),
            },
            Ok(Err(err)) => Err(err),
            // The pool dropped the completion without firing it
            Err(_) => Err(PoolError::Terminated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_unique() {
        let ids: Vec<_> = (0..100).map(|_| JobId::new()).collect();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                assert_ne!(ids[i], ids[j]);
            }
        }
    }

    #[test]
    fn test_payload_returns_value() {
        let payload = JobPayload::new(JobId::new(), || 6 * 7);
        let output = payload.execute().unwrap();
        assert_eq!(*output.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_payload_captures_panic_message() {
        let payload = JobPayload::new(JobId::new(), || -> i32 { panic!("boom") });
        let err = payload.execute().unwrap_err();
        assert_eq!(err, "boom");
    }

    #[test]
    fn test_payload_captures_string_panic() {
        let payload = JobPayload::new(JobId::new(), || -> i32 { panic!("{}", "dynamic") });
        let err = payload.execute().unwrap_err();
        assert_eq!(err, "dynamic");
    }

    #[test]
    fn test_handle_resolves_once() {
        let id = JobId::new();
        let (completion, handle) = completion_pair::<i32>(id);
        completion.resolve(Box::new(5i32));
        assert_eq!(handle.wait(), Ok(5));
    }

    #[test]
    fn test_handle_rejects_with_error() {
        let (completion, handle) = completion_pair::<i32>(JobId::new());
        completion.reject(PoolError::Job("boom".to_string()));
        assert_eq!(handle.wait(), Err(PoolError::Job("boom".to_string())));
    }

    #[test]
    fn test_dropped_completion_reports_termination() {
        let (completion, handle) = completion_pair::<i32>(JobId::new());
        drop(completion);
        assert_eq!(handle.wait(), Err(PoolError::Terminated));
    }
}
