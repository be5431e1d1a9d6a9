//! Timer thread
//!
//! A single persistent job on a [`ThreadPool`] that keeps a time-ordered
//! queue of events and submits each event's job to the pool once it is due.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::error::TimerError;
use crate::free_list::{Block, FreeList};
use crate::job::{Job, Priority};
use crate::linked_list::LinkedList;
use crate::thread_pool::ThreadPool;

/// Spare event blocks kept for reuse
const EVENT_FREE_LIST_SIZE: usize = 100;

/// Id of a scheduled timer event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// When a scheduled job becomes due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// At a wall-clock time; times in the past are due at once
    Absolute(SystemTime),
    /// After a delay from now
    Relative(Duration),
}

impl Timeout {
    fn due_instant(self) -> Instant {
        let now = Instant::now();
        match self {
            Timeout::Relative(delay) => saturating_add(now, delay),
            Timeout::Absolute(at) => match at.duration_since(SystemTime::now()) {
                Ok(delay) => saturating_add(now, delay),
                Err(_) => now,
            },
        }
    }
}

/// `now + delay`, clamped to the latest instant the clock can represent
fn saturating_add(now: Instant, mut delay: Duration) -> Instant {
    loop {
        if let Some(at) = now.checked_add(delay) {
            return at;
        }
        delay /= 2;
    }
}

/// How a due job is handed to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// Through the ordinary priority queues
    #[default]
    ShortTerm,
    /// Through the persistent slot, for jobs that run indefinitely
    Persistent,
}

struct TimerEvent {
    id: EventId,
    due: Instant,
    persistence: Persistence,
    job: Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Stopping,
    Stopped,
}

struct TimerState {
    events: LinkedList<Block<TimerEvent>>,
    free_list: FreeList<TimerEvent>,
    last_event_id: u64,
    lifecycle: Lifecycle,
}

struct Shared {
    state: Mutex<TimerState>,
    condition: Condvar,
}

impl Shared {
    fn stop(&self, state: &mut MutexGuard<'_, TimerState>) {
        state.lifecycle = Lifecycle::Stopped;
        self.condition.notify_all();
    }
}

fn run_loop(shared: Arc<Shared>, pool: ThreadPool) {
    let mut state = shared.state.lock();
    debug!("Timer loop running");

    loop {
        if state.lifecycle != Lifecycle::Running {
            shared.stop(&mut state);
            debug!("Timer loop stopped");
            return;
        }

        let now = Instant::now();
        match state.events.front().map(|event| event.due) {
            Some(due) if due <= now => {
                let Some(block) = state.events.pop_head() else {
                    continue;
                };
                let event = state.free_list.free(block);
                MutexGuard::unlocked(&mut state, || submit(&pool, event));
            }
            Some(due) => {
                shared.condition.wait_until(&mut state, due);
            }
            None => {
                shared.condition.wait(&mut state);
            }
        }
    }
}

fn submit(pool: &ThreadPool, event: TimerEvent) {
    let TimerEvent {
        id,
        persistence,
        job,
        ..
    } = event;

    let result = match persistence {
        Persistence::ShortTerm => pool.add(job),
        Persistence::Persistent => pool.add_persistent(job),
    };

    match result {
        Ok(job_id) => trace!("Timer event {} submitted as job {}", id, job_id),
        Err(e) => {
            warn!("Dropping timer event {}: {}", id, e);
            e.discard();
        }
    }
}

/// Runs jobs at a point in time on a [`ThreadPool`]
///
/// Cloning yields another handle to the same timer.
#[derive(Clone)]
pub struct TimerThread {
    shared: Arc<Shared>,
}

impl TimerThread {
    /// Start the timer loop as a high priority persistent job on `pool`
    pub fn new(pool: &ThreadPool) -> Result<Self, TimerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                events: LinkedList::new(),
                free_list: FreeList::new(EVENT_FREE_LIST_SIZE),
                last_event_id: 0,
                lifecycle: Lifecycle::Running,
            }),
            condition: Condvar::new(),
        });

        let job = Job::with_cleanup(
            (Arc::clone(&shared), pool.clone()),
            |(shared, pool)| run_loop(shared, pool),
            |(shared, _)| {
                let mut state = shared.state.lock();
                shared.stop(&mut state);
            },
        )
        .with_priority(Priority::High);

        pool.add_persistent(job).map_err(|e| TimerError::Pool(e.discard()))?;

        info!("Timer thread started");
        Ok(Self { shared })
    }

    /// Schedule `job` to be handed to the pool at `timeout`
    ///
    /// Events due at the same instant are submitted in the order they were
    /// scheduled. After shutdown the job is discarded and `ShutDown` returned.
    pub fn schedule(
        &self,
        timeout: Timeout,
        job: Job,
        persistence: Persistence,
    ) -> Result<EventId, TimerError> {
        let mut state = self.shared.state.lock();

        if state.lifecycle != Lifecycle::Running {
            drop(state);
            job.discard();
            return Err(TimerError::ShutDown);
        }

        state.last_event_id += 1;
        let id = EventId(state.last_event_id);
        let due = timeout.due_instant();

        let block = state.free_list.alloc(TimerEvent {
            id,
            due,
            persistence,
            job,
        });

        match state.events.find(None, |event| event.due > due) {
            Some(later) => {
                if let Err(block) = state.events.add_before(block, later) {
                    state.events.add_tail(block);
                }
            }
            None => {
                state.events.add_tail(block);
            }
        }

        trace!("Scheduled timer event {} ({:?})", id, timeout);
        self.shared.condition.notify_all();
        Ok(id)
    }

    /// Cancel an event that has not fired yet and take its job back
    pub fn remove(&self, id: EventId) -> Result<Job, TimerError> {
        let mut state = self.shared.state.lock();

        let node = state
            .events
            .find(None, |event| event.id == id)
            .ok_or(TimerError::InvalidEventId(id))?;
        let block = state
            .events
            .remove(node)
            .ok_or(TimerError::InvalidEventId(id))?;

        Ok(state.free_list.free(block).job)
    }

    /// Events waiting to fire
    pub fn pending(&self) -> usize {
        self.shared.state.lock().events.len()
    }

    /// Stop the timer loop
    ///
    /// Pending events are discarded through their jobs' cleanup routines and
    /// the call blocks until the loop has exited. Must be called before the
    /// pool the timer runs on is shut down. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();

        if state.lifecycle == Lifecycle::Running {
            state.lifecycle = Lifecycle::Stopping;
            let discarded: Vec<Job> = state
                .events
                .drain()
                .into_iter()
                .map(|block| block.into_inner().job)
                .collect();
            state.free_list.clear();
            self.shared.condition.notify_all();

            if !discarded.is_empty() {
                debug!("Discarding {} pending timer events", discarded.len());
                MutexGuard::unlocked(&mut state, move || {
                    for job in discarded {
                        job.discard();
                    }
                });
            }
        }

        while state.lifecycle != Lifecycle::Stopped {
            self.shared.condition.wait(&mut state);
        }

        info!("Timer thread shut down");
    }
}

impl fmt::Debug for TimerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TimerThread")
            .field("pending", &state.events.len())
            .field("lifecycle", &state.lifecycle)
            .finish()
    }
}
