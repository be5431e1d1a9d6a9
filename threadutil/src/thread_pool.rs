//! Priority thread pool
//!
//! Workers are detached OS threads that serve three FIFO queues (high,
//! medium, low) plus a single persistent slot for long-running jobs such as
//! the timer loop. The pool grows while the queued-jobs-per-worker ratio is
//! exceeded or every worker is busy, and shrinks back to `min_threads` as
//! workers stay idle past `max_idle_time`.
//!
//! Jobs that wait too long are promoted: medium to high after
//! `starvation_time`, low to medium after `max_idle_time`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::attr::{apply_sched_policy, ThreadPoolAttr};
use crate::error::{AddError, Result, ThreadPoolError};
use crate::free_list::{Block, FreeList};
use crate::job::{Job, JobId, Priority};
use crate::linked_list::LinkedList;
use crate::stats::{StatsAccumulator, ThreadPoolStats};

/// Spare job blocks kept for reuse
const JOB_FREE_LIST_SIZE: usize = 100;

type JobQueue = LinkedList<Block<Job>>;

struct PoolState {
    high: JobQueue,
    med: JobQueue,
    low: JobQueue,
    persistent: Option<Job>,
    job_free_list: FreeList<Job>,
    attr: ThreadPoolAttr,
    last_job_id: u64,
    total_threads: usize,
    busy_threads: usize,
    persistent_threads: usize,
    pending_worker_start: bool,
    spawned_workers: u64,
    shutdown: bool,
    stats: StatsAccumulator,
}

impl PoolState {
    fn new(attr: ThreadPoolAttr) -> Self {
        Self {
            high: LinkedList::new(),
            med: LinkedList::new(),
            low: LinkedList::new(),
            persistent: None,
            job_free_list: FreeList::new(JOB_FREE_LIST_SIZE),
            attr,
            last_job_id: 0,
            total_threads: 0,
            busy_threads: 0,
            persistent_threads: 0,
            pending_worker_start: false,
            spawned_workers: 0,
            shutdown: false,
            stats: StatsAccumulator::default(),
        }
    }

    fn queue_mut(&mut self, priority: Priority) -> &mut JobQueue {
        match priority {
            Priority::High => &mut self.high,
            Priority::Med => &mut self.med,
            Priority::Low => &mut self.low,
        }
    }

    fn queued_jobs(&self) -> usize {
        self.high.len() + self.med.len() + self.low.len()
    }

    fn has_work(&self) -> bool {
        self.persistent.is_some() || self.queued_jobs() > 0
    }

    fn next_job_id(&mut self) -> JobId {
        self.last_job_id += 1;
        JobId::new(self.last_job_id)
    }

    /// Promote jobs that waited past their queue's threshold
    fn bump_priority(&mut self) {
        let now = Instant::now();
        loop {
            let med_wait = self.med.front().map(|job| now.saturating_duration_since(job.request_time));
            if let Some(waited) = med_wait {
                if waited >= self.attr.starvation_time {
                    self.promote(Priority::Med, Priority::High, waited);
                    continue;
                }
            }

            let low_wait = self.low.front().map(|job| now.saturating_duration_since(job.request_time));
            if let Some(waited) = low_wait {
                if waited >= self.attr.max_idle_time {
                    self.promote(Priority::Low, Priority::Med, waited);
                    continue;
                }
            }

            break;
        }
    }

    fn promote(&mut self, from: Priority, to: Priority, waited: Duration) {
        if let Some(mut block) = self.queue_mut(from).pop_head() {
            self.stats.account(from, waited);
            block.set_priority(to);
            trace!("Promoting job {:?} from {:?} to {:?} after {:?}", block.id, from, to, waited);
            self.queue_mut(to).add_tail(block);
        }
    }

    /// Take the next ordinary job, highest priority first
    fn dequeue(&mut self) -> Option<Job> {
        for priority in [Priority::High, Priority::Med, Priority::Low] {
            if let Some(block) = self.queue_mut(priority).pop_head() {
                let waited = block.request_time.elapsed();
                self.stats.account(priority, waited);
                return Some(self.job_free_list.free(block));
            }
        }
        None
    }

    /// Pull every queued job out, persistent slot included
    fn drain_jobs(&mut self) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(self.queued_jobs() + 1);
        for priority in [Priority::High, Priority::Med, Priority::Low] {
            for block in self.queue_mut(priority).drain() {
                jobs.push(self.job_free_list.free(block));
            }
        }
        jobs.extend(self.persistent.take());
        jobs
    }
}

struct Shared {
    state: Mutex<PoolState>,
    /// Signalled when work is queued or workers should re-check their state
    condition: Condvar,
    /// Signalled when a worker starts or exits, or the persistent slot empties
    start_and_shutdown: Condvar,
}

impl Shared {
    /// Spawn one worker and wait until it has registered itself
    fn create_worker(self: &Arc<Self>, state: &mut MutexGuard<'_, PoolState>) -> Result<()> {
        while state.pending_worker_start {
            self.start_and_shutdown.wait(state);
        }

        if !state.attr.below_max(state.total_threads) {
            return Err(ThreadPoolError::TooManyThreads);
        }

        state.spawned_workers += 1;
        let name = format!("upnp-worker-{}", state.spawned_workers);
        let mut builder = thread::Builder::new().name(name);
        if state.attr.stack_size > 0 {
            builder = builder.stack_size(state.attr.stack_size);
        }

        let shared = Arc::clone(self);
        state.pending_worker_start = true;
        if let Err(e) = builder.spawn(move || run_worker(shared)) {
            state.pending_worker_start = false;
            self.start_and_shutdown.notify_all();
            return Err(ThreadPoolError::ResourceExhausted(e.to_string()));
        }

        while state.pending_worker_start {
            self.start_and_shutdown.wait(state);
        }

        Ok(())
    }

    /// Grow the pool while the queue outpaces the workers
    fn add_workers(self: &Arc<Self>, state: &mut MutexGuard<'_, PoolState>) {
        loop {
            let jobs = state.queued_jobs();
            let threads = state.total_threads - state.persistent_threads;
            let needs_worker = threads == 0
                || jobs / threads >= state.attr.jobs_per_thread
                || state.total_threads == state.busy_threads;

            if !needs_worker {
                break;
            }

            if let Err(e) = self.create_worker(state) {
                debug!("Not adding a worker ({} running): {}", state.total_threads, e);
                break;
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    state.total_threads += 1;
    state.stats.max_threads = state.stats.max_threads.max(state.total_threads);
    state.pending_worker_start = false;
    shared.start_and_shutdown.notify_all();
    debug!("Worker started, {} threads running", state.total_threads);

    'serve: loop {
        let idle_start = Instant::now();
        let mut timed_out = false;
        state.stats.idle_threads += 1;

        while !state.has_work() && !state.shutdown {
            let surplus = timed_out && state.total_threads > state.attr.min_threads;
            if surplus || state.attr.above_max(state.total_threads) {
                state.stats.idle_threads -= 1;
                state.stats.total_idle_time += idle_start.elapsed();
                break 'serve;
            }

            let max_idle = state.attr.max_idle_time;
            timed_out = shared.condition.wait_for(&mut state, max_idle).timed_out();
        }

        state.stats.idle_threads -= 1;
        state.stats.total_idle_time += idle_start.elapsed();

        state.bump_priority();

        if state.shutdown {
            break;
        }

        let (job, persistent) = match state.persistent.take() {
            Some(job) => {
                state.persistent_threads += 1;
                shared.start_and_shutdown.notify_all();
                (job, true)
            }
            None => match state.dequeue() {
                Some(job) => {
                    state.stats.worker_threads += 1;
                    (job, false)
                }
                None => continue,
            },
        };

        state.busy_threads += 1;
        let job_id = job.id();
        let started = Instant::now();

        MutexGuard::unlocked(&mut state, move || {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(move || job.run())) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Job {:?} panicked: {}", job_id, message);
            }
        });

        state.stats.total_work_time += started.elapsed();
        state.busy_threads -= 1;
        if persistent {
            state.persistent_threads -= 1;
        } else {
            state.stats.worker_threads -= 1;
        }
    }

    state.total_threads -= 1;
    debug!("Worker exiting, {} threads left", state.total_threads);
    shared.start_and_shutdown.notify_all();
}

/// A pool of worker threads serving prioritised jobs
///
/// The handle is cheap to clone; every clone drives the same workers.
/// Workers keep running until [`ThreadPool::shutdown`] is called.
#[derive(Clone)]
pub struct ThreadPool {
    shared: Arc<Shared>,
}

impl ThreadPool {
    /// Validate `attr`, apply its scheduling policy and start `min_threads` workers
    pub fn new(attr: ThreadPoolAttr) -> Result<Self> {
        attr.validate()?;
        apply_sched_policy(attr.sched_policy)?;

        let min_threads = attr.min_threads;
        let pool = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState::new(attr)),
                condition: Condvar::new(),
                start_and_shutdown: Condvar::new(),
            }),
        };

        let started = {
            let mut state = pool.shared.state.lock();
            let mut started = Ok(());
            while state.total_threads < min_threads {
                if let Err(e) = pool.shared.create_worker(&mut state) {
                    started = Err(e);
                    break;
                }
            }
            started
        };

        if let Err(e) = started {
            warn!("Failed to start thread pool: {}", e);
            pool.shutdown();
            return Err(e);
        }

        info!("Thread pool started with {} workers", min_threads);
        Ok(pool)
    }

    /// Queue `job` according to its priority
    ///
    /// On failure the job is handed back inside the error untouched.
    pub fn add(&self, mut job: Job) -> std::result::Result<JobId, AddError> {
        let mut state = self.shared.state.lock();

        if state.shutdown {
            return Err(AddError::new(ThreadPoolError::ShutDown, job));
        }

        let queued = state.queued_jobs();
        if queued >= state.attr.max_jobs_total {
            let limit = state.attr.max_jobs_total;
            warn!("Rejecting job, {} jobs already queued", queued);
            return Err(AddError::new(ThreadPoolError::TooManyJobs { queued, limit }, job));
        }

        let id = state.next_job_id();
        job.id = Some(id);
        job.request_time = Instant::now();
        let priority = job.priority();

        let block = state.job_free_list.alloc(job);
        state.queue_mut(priority).add_tail(block);
        trace!("Queued job {} at {:?} priority", id, priority);

        self.shared.add_workers(&mut state);
        self.shared.condition.notify_one();

        Ok(id)
    }

    /// Hand `job` to a dedicated worker for an open-ended amount of time
    ///
    /// Blocks until a worker has claimed the job. Fails with
    /// `TooManyThreads` when the pool is at its maximum and claiming a
    /// worker would leave none for ordinary jobs.
    pub fn add_persistent(&self, mut job: Job) -> std::result::Result<JobId, AddError> {
        let mut state = self.shared.state.lock();

        while state.persistent.is_some() && !state.shutdown {
            self.shared.start_and_shutdown.wait(&mut state);
        }

        if state.shutdown {
            return Err(AddError::new(ThreadPoolError::ShutDown, job));
        }

        if state.attr.below_max(state.total_threads) {
            if let Err(e) = self.shared.create_worker(&mut state) {
                debug!("No extra worker for persistent job: {}", e);
            }
        } else if state.total_threads - state.persistent_threads <= 1 {
            return Err(AddError::new(ThreadPoolError::TooManyThreads, job));
        }

        let id = state.next_job_id();
        job.id = Some(id);
        job.request_time = Instant::now();
        state.persistent = Some(job);
        self.shared.condition.notify_one();

        while state.persistent.as_ref().and_then(Job::id) == Some(id) {
            self.shared.start_and_shutdown.wait(&mut state);
        }

        debug!("Persistent job {} claimed", id);
        Ok(id)
    }

    /// Take a job that has not started running out of the pool
    pub fn remove(&self, id: JobId) -> Result<Job> {
        let mut state = self.shared.state.lock();

        for priority in [Priority::High, Priority::Med, Priority::Low] {
            let queue = state.queue_mut(priority);
            let Some(node) = queue.find(None, |job| job.id == Some(id)) else {
                continue;
            };
            if let Some(block) = queue.remove(node) {
                return Ok(state.job_free_list.free(block));
            }
        }

        if state.persistent.as_ref().and_then(Job::id) == Some(id) {
            if let Some(job) = state.persistent.take() {
                self.shared.start_and_shutdown.notify_all();
                return Ok(job);
            }
        }

        Err(ThreadPoolError::InvalidJobId(id))
    }

    /// Current attributes
    pub fn attr(&self) -> ThreadPoolAttr {
        self.shared.state.lock().attr.clone()
    }

    /// Replace the attributes
    ///
    /// Raising `min_threads` starts workers right away; lowering
    /// `max_threads` lets surplus workers exit once they go idle.
    pub fn set_attr(&self, attr: ThreadPoolAttr) -> Result<()> {
        attr.validate()?;

        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(ThreadPoolError::ShutDown);
        }

        if attr.sched_policy != state.attr.sched_policy {
            apply_sched_policy(attr.sched_policy)?;
        }

        state.attr = attr;
        while state.total_threads < state.attr.min_threads {
            self.shared.create_worker(&mut state)?;
        }

        self.shared.condition.notify_all();
        Ok(())
    }

    /// Snapshot of queue depths, thread counts and timing totals
    pub fn stats(&self) -> ThreadPoolStats {
        let state = self.shared.state.lock();
        let acc = &state.stats;

        ThreadPoolStats {
            current_jobs_high: state.high.len(),
            current_jobs_med: state.med.len(),
            current_jobs_low: state.low.len(),
            total_jobs_high: acc.total_jobs[2],
            total_jobs_med: acc.total_jobs[1],
            total_jobs_low: acc.total_jobs[0],
            avg_wait_high: acc.average_wait(Priority::High),
            avg_wait_med: acc.average_wait(Priority::Med),
            avg_wait_low: acc.average_wait(Priority::Low),
            max_threads: acc.max_threads,
            worker_threads: acc.worker_threads,
            persistent_threads: state.persistent_threads,
            idle_threads: acc.idle_threads,
            busy_threads: state.busy_threads,
            total_threads: state.total_threads,
            total_work_time: acc.total_work_time,
            total_idle_time: acc.total_idle_time,
        }
    }

    /// Whether [`ThreadPool::shutdown`] has been called
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Stop the pool
    ///
    /// Queued jobs and the persistent slot are discarded through their
    /// cleanup routines, then the call blocks until every worker has exited.
    /// Jobs already running are allowed to finish. Calling it again is a
    /// no-op. Must not be called from inside a pool job.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();

        if !state.shutdown {
            state.shutdown = true;
            let discarded = state.drain_jobs();
            self.shared.condition.notify_all();
            self.shared.start_and_shutdown.notify_all();

            if !discarded.is_empty() {
                debug!("Discarding {} queued jobs", discarded.len());
                MutexGuard::unlocked(&mut state, move || {
                    for job in discarded {
                        job.discard();
                    }
                });
            }
        }

        while state.total_threads > 0 {
            self.shared.start_and_shutdown.wait(&mut state);
        }

        state.job_free_list.clear();
        info!("Thread pool shut down");
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ThreadPool")
            .field("total_threads", &state.total_threads)
            .field("busy_threads", &state.busy_threads)
            .field("queued_jobs", &state.queued_jobs())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}
