//! Fixed-size worker pool
//!
//! This crate provides a pool of OS threads that run submitted closures:
//! - FIFO job queue with construction-order dispatch to idle workers
//! - One-shot completion handles ([`JobHandle`]) resolved exactly once
//! - Graceful drain ([`Pool::close`]) and abrupt stop ([`Pool::terminate`])

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod job;
pub mod pool;
mod worker;

pub use job::{JobHandle, JobId};
pub use pool::{Pool, PoolConfig};

/// Pool and job errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Submitted after `close` or `terminate` was called
    #[error("cannot accept new jobs while closing")]
    Closing,

    /// The pool was terminated before the job completed
    #[error("pool terminated before the job completed")]
    Terminated,

    /// The job's computation panicked
    #[error("job failed: {0}")]
    Job(String),

    /// A worker thread faulted while the job was assigned to it
    #[error("worker fault: {0}")]
    Worker(String),
}

/// Pool operation result
pub type PoolResult<T> = Result<T, PoolError>;
