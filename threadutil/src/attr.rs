//! Thread pool attributes
//!
//! Controls how many workers the pool keeps, how eagerly it grows, how long
//! idle workers linger and when waiting jobs get promoted.

use std::time::Duration;

use crate::error::ThreadPoolError;

/// Process scheduling policy requested for the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    /// Regular time-sharing scheduling
    #[default]
    Other,
    /// Real-time first-in first-out
    Fifo,
    /// Real-time round robin
    RoundRobin,
}

/// Configuration for a [`ThreadPool`](crate::ThreadPool)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolAttr {
    /// Workers kept alive even when idle
    /// Default: 1
    pub min_threads: usize,

    /// Upper bound on workers, `None` for unbounded
    /// Default: 10
    pub max_threads: Option<usize>,

    /// Stack size of worker threads, 0 for the OS default
    /// Default: 0
    pub stack_size: usize,

    /// Idle time after which a surplus worker exits. Also the wait after
    /// which a low priority job is promoted to medium.
    /// Default: 10 seconds
    pub max_idle_time: Duration,

    /// Queued jobs per worker above which the pool grows
    /// Default: 10
    pub jobs_per_thread: usize,

    /// Queued jobs across all priorities above which `add` fails
    /// Default: 100
    pub max_jobs_total: usize,

    /// Wait after which a medium priority job is promoted to high
    /// Default: 500 milliseconds
    pub starvation_time: Duration,

    /// Scheduling policy hint
    /// Default: `SchedPolicy::Other`
    pub sched_policy: SchedPolicy,
}

impl Default for ThreadPoolAttr {
    fn default() -> Self {
        Self {
            min_threads: 1,
            max_threads: Some(10),
            stack_size: 0,
            max_idle_time: Duration::from_secs(10),
            jobs_per_thread: 10,
            max_jobs_total: 100,
            starvation_time: Duration::from_millis(500),
            sched_policy: SchedPolicy::Other,
        }
    }
}

impl ThreadPoolAttr {
    /// Create attributes with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the attributes and return the first inconsistency found
    pub fn validate(&self) -> Result<(), ThreadPoolError> {
        if let Some(max) = self.max_threads {
            if max == 0 {
                return Err(ThreadPoolError::InvalidAttr(
                    "max_threads must be greater than 0".to_string(),
                ));
            }
            if self.min_threads > max {
                return Err(ThreadPoolError::InvalidAttr(format!(
                    "min_threads ({}) exceeds max_threads ({})",
                    self.min_threads, max
                )));
            }
        }

        if self.jobs_per_thread == 0 {
            return Err(ThreadPoolError::InvalidAttr(
                "jobs_per_thread must be greater than 0".to_string(),
            ));
        }

        if self.max_jobs_total == 0 {
            return Err(ThreadPoolError::InvalidAttr(
                "max_jobs_total must be greater than 0".to_string(),
            ));
        }

        if self.max_idle_time.is_zero() {
            return Err(ThreadPoolError::InvalidAttr(
                "max_idle_time must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether `total` threads leave room for one more
    pub(crate) fn below_max(&self, total: usize) -> bool {
        self.max_threads.map_or(true, |max| total < max)
    }

    /// Whether `total` threads is more than the pool may keep
    pub(crate) fn above_max(&self, total: usize) -> bool {
        self.max_threads.map_or(false, |max| total > max)
    }
}

/// Apply a scheduling policy to the calling thread
///
/// Lacking the privilege to change policy (EPERM) is not an error; the
/// policy is a hint.
#[cfg(target_os = "linux")]
pub(crate) fn apply_sched_policy(policy: SchedPolicy) -> Result<(), ThreadPoolError> {
    let raw = match policy {
        SchedPolicy::Other => libc::SCHED_OTHER,
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::RoundRobin => libc::SCHED_RR,
    };

    // SAFETY: plain syscalls on the calling thread with a fully initialised
    // sched_param.
    let rc = unsafe {
        let param = libc::sched_param {
            sched_priority: libc::sched_get_priority_min(raw),
        };
        libc::sched_setscheduler(0, raw, &param)
    };

    if rc == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(ThreadPoolError::InvalidPolicy(format!("{:?}: {}", policy, err)));
        }
        tracing::debug!("No permission to apply {:?} scheduling, keeping current policy", policy);
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn apply_sched_policy(policy: SchedPolicy) -> Result<(), ThreadPoolError> {
    tracing::debug!("Scheduling policy {:?} not applied on this platform", policy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let attr = ThreadPoolAttr::default();
        assert_eq!(attr.min_threads, 1);
        assert_eq!(attr.max_threads, Some(10));
        assert_eq!(attr.jobs_per_thread, 10);
        assert_eq!(attr.max_jobs_total, 100);
        assert_eq!(attr.starvation_time, Duration::from_millis(500));
        assert_eq!(attr.max_idle_time, Duration::from_secs(10));
        assert!(attr.validate().is_ok());
    }

    #[rstest]
    #[case(ThreadPoolAttr { min_threads: 5, max_threads: Some(4), ..Default::default() })]
    #[case(ThreadPoolAttr { max_threads: Some(0), min_threads: 0, ..Default::default() })]
    #[case(ThreadPoolAttr { jobs_per_thread: 0, ..Default::default() })]
    #[case(ThreadPoolAttr { max_jobs_total: 0, ..Default::default() })]
    #[case(ThreadPoolAttr { max_idle_time: Duration::ZERO, ..Default::default() })]
    fn test_invalid_attributes(#[case] attr: ThreadPoolAttr) {
        assert!(matches!(attr.validate(), Err(ThreadPoolError::InvalidAttr(_))));
    }

    #[test]
    fn test_unbounded_max_threads() {
        let attr = ThreadPoolAttr {
            min_threads: 50,
            max_threads: None,
            ..Default::default()
        };
        assert!(attr.validate().is_ok());
        assert!(attr.below_max(10_000));
        assert!(!attr.above_max(10_000));
    }

    #[test]
    fn test_default_policy_applies() {
        assert!(apply_sched_policy(SchedPolicy::Other).is_ok());
    }
}
