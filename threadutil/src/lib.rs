//! # UPnP SDK thread utilities
//!
//! Execution primitives shared by the SDK's networking layers.
//!
//! ## Overview
//!
//! - [`ThreadPool`]: detached worker threads serving high, medium and low
//!   priority FIFO queues plus one persistent slot, growing and shrinking
//!   between `min_threads` and `max_threads`
//! - [`TimerThread`]: a persistent pool job that hands jobs to the pool at an
//!   absolute or relative time
//! - [`LinkedList`]: arena-backed doubly linked list addressed by
//!   generation-checked handles
//! - [`FreeList`]: bounded recycler for heap blocks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use threadutil::{Job, Persistence, Priority, ThreadPool, ThreadPoolAttr, Timeout, TimerThread};
//!
//! let pool = ThreadPool::new(ThreadPoolAttr::default())?;
//! let timer = TimerThread::new(&pool)?;
//!
//! pool.add(Job::new(|| println!("now")).with_priority(Priority::High))
//!     .map_err(|e| e.discard())?;
//! timer.schedule(
//!     Timeout::Relative(Duration::from_secs(1)),
//!     Job::new(|| println!("later")),
//!     Persistence::ShortTerm,
//! )?;
//!
//! timer.shutdown();
//! pool.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Every [`Job`] is consumed exactly once: a worker runs it, or it is
//! discarded through its cleanup routine when removed, refused or dropped by
//! shutdown.

pub mod attr;
pub mod error;
pub mod free_list;
pub mod job;
pub mod linked_list;
pub mod stats;
pub mod thread_pool;
pub mod timer_thread;

pub use attr::{SchedPolicy, ThreadPoolAttr};
pub use error::{AddError, Result, ThreadPoolError, TimerError};
pub use free_list::{Block, FreeList};
pub use job::{Job, JobId, JobRoutine, Priority};
pub use linked_list::{LinkedList, NodeHandle};
pub use stats::ThreadPoolStats;
pub use thread_pool::ThreadPool;
pub use timer_thread::{EventId, Persistence, Timeout, TimerThread};
