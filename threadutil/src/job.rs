//! Units of work submitted to the thread pool
//!
//! A [`Job`] bundles a routine with the argument it owns and an optional
//! cleanup routine. The pool consumes every job exactly once: either a worker
//! runs it, or the pool discards it while refusing it or shutting down and
//! the cleanup routine gets the argument instead.
//!
//! Only [`Job::discard`] runs the cleanup routine. A job handed back by
//! `remove` belongs to the caller again; dropping it drops the routine and
//! its argument without calling the cleanup.

use std::fmt;
use std::time::Instant;

/// Numeric id the pool assigns to every accepted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Wrap a raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue a job is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum Priority {
    Low,
    #[default]
    Med,
    High,
}

/// Work carried by a [`Job`]
///
/// `run` executes the work on a worker thread. `discard` is called instead
/// when the job is never going to run; the default simply drops the routine
/// and everything it owns.
pub trait JobRoutine: Send + 'static {
    fn run(self: Box<Self>);

    fn discard(self: Box<Self>) {}
}

struct FnRoutine<F>(F);

impl<F> JobRoutine for FnRoutine<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (self.0)()
    }
}

struct ArgRoutine<A, R, C> {
    arg: A,
    routine: R,
    cleanup: C,
}

impl<A, R, C> JobRoutine for ArgRoutine<A, R, C>
where
    A: Send + 'static,
    R: FnOnce(A) + Send + 'static,
    C: FnOnce(A) + Send + 'static,
{
    fn run(self: Box<Self>) {
        let this = *self;
        (this.routine)(this.arg)
    }

    fn discard(self: Box<Self>) {
        let this = *self;
        (this.cleanup)(this.arg)
    }
}

/// A unit of work plus its scheduling metadata
pub struct Job {
    routine: Box<dyn JobRoutine>,
    priority: Priority,
    pub(crate) id: Option<JobId>,
    pub(crate) request_time: Instant,
}

impl Job {
    /// Job running a closure at the default priority
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_routine(FnRoutine(f))
    }

    /// Job that owns `arg` and hands it to either `routine` or `cleanup`
    pub fn with_cleanup<A, R, C>(arg: A, routine: R, cleanup: C) -> Self
    where
        A: Send + 'static,
        R: FnOnce(A) + Send + 'static,
        C: FnOnce(A) + Send + 'static,
    {
        Self::from_routine(ArgRoutine {
            arg,
            routine,
            cleanup,
        })
    }

    /// Job wrapping any [`JobRoutine`]
    pub fn from_routine<R: JobRoutine>(routine: R) -> Self {
        Self {
            routine: Box::new(routine),
            priority: Priority::default(),
            id: None,
            request_time: Instant::now(),
        }
    }

    /// Set the queue the job goes to
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Id assigned by the pool, once the job was accepted
    pub fn id(&self) -> Option<JobId> {
        self.id
    }

    /// When the job entered its current queue
    pub fn request_time(&self) -> Instant {
        self.request_time
    }

    /// Execute the job on the calling thread
    pub fn run(self) {
        self.routine.run()
    }

    /// Give up on the job, handing its argument to the cleanup routine
    pub fn discard(self) {
        self.routine.discard()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_run_consumes_argument() {
        let hits = Arc::new(AtomicUsize::new(0));
        let job = Job::with_cleanup(
            Arc::clone(&hits),
            |h| {
                h.fetch_add(1, Ordering::SeqCst);
            },
            |_| panic!("cleanup must not run"),
        );

        job.run();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&hits), 1);
    }

    #[test]
    fn test_discard_runs_cleanup() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let job = Job::with_cleanup(
            Arc::clone(&cleaned),
            |_| panic!("routine must not run"),
            |c| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        job.discard();
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_skips_cleanup_but_releases_argument() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let job = Job::with_cleanup(
            Arc::clone(&cleaned),
            |_| panic!("routine must not run"),
            |c| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        drop(job);
        assert_eq!(cleaned.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&cleaned), 1);
    }

    #[test]
    fn test_default_priority_is_medium() {
        let job = Job::new(|| {});
        assert_eq!(job.priority(), Priority::Med);
        assert_eq!(job.id(), None);

        let job = job.with_priority(Priority::High);
        assert_eq!(job.priority(), Priority::High);
        assert!(format!("{:?}", job).contains("High"));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Med);
        assert!(Priority::Med > Priority::Low);
    }
}
