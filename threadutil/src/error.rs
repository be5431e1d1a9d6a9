//! Error types for the threadutil crate

use thiserror::Error;

use crate::job::{Job, JobId};
use crate::timer_thread::EventId;

/// Errors returned by [`ThreadPool`](crate::ThreadPool) operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThreadPoolError {
    /// Attribute values are inconsistent
    #[error("Invalid thread pool attributes: {0}")]
    InvalidAttr(String),

    /// The OS refused to create a worker thread
    #[error("Unable to create worker thread: {0}")]
    ResourceExhausted(String),

    /// The pool already runs its maximum number of threads
    #[error("Maximum number of threads reached")]
    TooManyThreads,

    /// The job queues hold `max_jobs_total` jobs already
    #[error("Too many queued jobs ({queued}, limit {limit})")]
    TooManyJobs { queued: usize, limit: usize },

    /// The OS rejected the requested scheduling policy
    #[error("Scheduling policy rejected by the OS: {0}")]
    InvalidPolicy(String),

    /// No queued job carries this id
    #[error("No queued job with id {0}")]
    InvalidJobId(JobId),

    /// The pool has been shut down
    #[error("Thread pool is shut down")]
    ShutDown,
}

/// A job the pool refused, handed back together with the reason
///
/// The caller decides what happens to the job: discard it through its
/// cleanup routine, retry later, or run it inline.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct AddError {
    reason: ThreadPoolError,
    job: Job,
}

impl AddError {
    pub(crate) fn new(reason: ThreadPoolError, job: Job) -> Self {
        Self { reason, job }
    }

    /// Why the job was refused
    pub fn reason(&self) -> &ThreadPoolError {
        &self.reason
    }

    /// Take the refused job back
    pub fn into_job(self) -> Job {
        self.job
    }

    /// Split into reason and job
    pub fn into_parts(self) -> (ThreadPoolError, Job) {
        (self.reason, self.job)
    }

    /// Discard the refused job through its cleanup routine and keep the reason
    pub fn discard(self) -> ThreadPoolError {
        self.job.discard();
        self.reason
    }
}

/// Errors returned by [`TimerThread`](crate::TimerThread) operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// No pending event carries this id
    #[error("No pending timer event with id {0}")]
    InvalidEventId(EventId),

    /// The timer thread has been shut down
    #[error("Timer thread is shut down")]
    ShutDown,

    /// The run loop could not be started on the pool
    #[error("Thread pool error: {0}")]
    Pool(#[from] ThreadPoolError),
}

/// Convenience type alias for pool results
pub type Result<T> = std::result::Result<T, ThreadPoolError>;
