//! Thread pool statistics

use std::fmt;
use std::time::Duration;

use crate::job::Priority;

/// Running totals kept under the pool mutex
#[derive(Debug, Default, Clone)]
pub(crate) struct StatsAccumulator {
    pub(crate) total_jobs: [u64; 3],
    pub(crate) total_wait: [Duration; 3],
    pub(crate) total_work_time: Duration,
    pub(crate) total_idle_time: Duration,
    pub(crate) worker_threads: usize,
    pub(crate) idle_threads: usize,
    pub(crate) max_threads: usize,
}

impl StatsAccumulator {
    /// Account for a job leaving the `priority` queue after `waited`
    pub(crate) fn account(&mut self, priority: Priority, waited: Duration) {
        let slot = slot(priority);
        self.total_jobs[slot] += 1;
        self.total_wait[slot] += waited;
    }

    pub(crate) fn average_wait(&self, priority: Priority) -> Duration {
        let slot = slot(priority);
        match u32::try_from(self.total_jobs[slot]) {
            Ok(0) => Duration::ZERO,
            Ok(jobs) => self.total_wait[slot] / jobs,
            Err(_) => Duration::from_secs_f64(
                self.total_wait[slot].as_secs_f64() / self.total_jobs[slot] as f64,
            ),
        }
    }
}

fn slot(priority: Priority) -> usize {
    match priority {
        Priority::Low => 0,
        Priority::Med => 1,
        Priority::High => 2,
    }
}

/// Snapshot of a pool's state, returned by [`ThreadPool::stats`](crate::ThreadPool::stats)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadPoolStats {
    pub current_jobs_high: usize,
    pub current_jobs_med: usize,
    pub current_jobs_low: usize,
    /// Jobs that left each queue so far (dequeued or promoted)
    pub total_jobs_high: u64,
    pub total_jobs_med: u64,
    pub total_jobs_low: u64,
    pub avg_wait_high: Duration,
    pub avg_wait_med: Duration,
    pub avg_wait_low: Duration,
    /// Highest number of threads the pool has run at once
    pub max_threads: usize,
    /// Threads currently running an ordinary job
    pub worker_threads: usize,
    pub persistent_threads: usize,
    pub idle_threads: usize,
    pub busy_threads: usize,
    pub total_threads: usize,
    pub total_work_time: Duration,
    pub total_idle_time: Duration,
}

impl ThreadPoolStats {
    /// Jobs waiting across all three queues
    pub fn queued_jobs(&self) -> usize {
        self.current_jobs_high + self.current_jobs_med + self.current_jobs_low
    }
}

impl fmt::Display for ThreadPoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Thread Pool Stats:")?;
        writeln!(f, "  High jobs pending: {}", self.current_jobs_high)?;
        writeln!(f, "  Med jobs pending: {}", self.current_jobs_med)?;
        writeln!(f, "  Low jobs pending: {}", self.current_jobs_low)?;
        writeln!(f, "  Average wait in high queue: {:?}", self.avg_wait_high)?;
        writeln!(f, "  Average wait in med queue: {:?}", self.avg_wait_med)?;
        writeln!(f, "  Average wait in low queue: {:?}", self.avg_wait_low)?;
        writeln!(f, "  Max threads active: {}", self.max_threads)?;
        writeln!(f, "  Current worker threads: {}", self.worker_threads)?;
        writeln!(f, "  Current persistent threads: {}", self.persistent_threads)?;
        writeln!(f, "  Current idle threads: {}", self.idle_threads)?;
        writeln!(f, "  Total threads: {}", self.total_threads)?;
        writeln!(f, "  Total time spent working: {:?}", self.total_work_time)?;
        write!(f, "  Total time spent idle: {:?}", self.total_idle_time)
    }
}
