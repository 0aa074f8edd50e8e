//! Job Scheduler
//!
//! The scheduler batches work that reactive writes request, most notably
//! component re-renders, into one flush per tick.
//!
//! # How It Works
//!
//! 1. `queue(job)` adds the job unless it is already pending. Queuing the
//!    same job any number of times before a flush runs it once.
//!
//! 2. The first job queued after a flush marks a flush as scheduled and
//!    calls the installed tick hook, which is where a host event loop posts
//!    its microtask. Without a hook, the owner calls [`Scheduler::flush_jobs`]
//!    itself.
//!
//! 3. `flush_jobs()` takes a snapshot of the queue, clears it and runs the
//!    snapshot in insertion order. Jobs queued while it runs belong to the
//!    next tick.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A unit of deferred work. Clones share the same id.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    run: Rc<dyn Fn()>,
}

impl Job {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            id: JobId::next(),
            run: Rc::new(run),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn run(&self) {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Ticks `flush_all` may run before giving up on a queue that keeps
    /// refilling itself.
    pub max_ticks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_ticks: 100 }
    }
}

#[derive(Default)]
struct SchedulerState {
    queue: IndexMap<JobId, Job>,
    flush_scheduled: bool,
    tick_hook: Option<Rc<dyn Fn()>>,
    config: SchedulerConfig,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// The thread-local job queue.
pub struct Scheduler;

impl Scheduler {
    fn with<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
        SCHEDULER.with(|s| f(&mut s.borrow_mut()))
    }

    /// Enqueue `job` unless it is already pending.
    pub fn queue(job: &Job) {
        let hook = Self::with(|s| {
            if s.queue.contains_key(&job.id) {
                return None;
            }
            s.queue.insert(job.id, job.clone());
            if s.flush_scheduled {
                return None;
            }
            s.flush_scheduled = true;
            s.tick_hook.clone()
        });
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Remove a pending job. Returns whether it was pending.
    pub fn cancel(id: JobId) -> bool {
        Self::with(|s| s.queue.shift_remove(&id).is_some())
    }

    pub fn is_queued(id: JobId) -> bool {
        Self::with(|s| s.queue.contains_key(&id))
    }

    /// Run one tick: every job pending right now, in queue order.
    ///
    /// Returns the number of jobs run.
    pub fn flush_jobs() -> usize {
        let jobs = Self::with(|s| {
            s.flush_scheduled = false;
            std::mem::take(&mut s.queue)
        });
        let count = jobs.len();
        for job in jobs.into_values() {
            job.run();
        }
        if count > 0 {
            debug!(jobs = count, "flushed job queue");
        }
        count
    }

    /// Run ticks until the queue stays empty.
    ///
    /// Fails with [`Error::FlushLimit`] if jobs are still pending after
    /// `max_ticks` ticks. Returns the total number of jobs run.
    pub fn flush_all() -> Result<usize> {
        let max_ticks = Self::with(|s| s.config.max_ticks);
        let mut total = 0;
        for _ in 0..max_ticks {
            if Self::pending_count() == 0 {
                return Ok(total);
            }
            total += Self::flush_jobs();
        }
        if Self::pending_count() == 0 {
            return Ok(total);
        }
        warn!(ticks = max_ticks, pending = Self::pending_count(), "job queue did not settle");
        Err(Error::FlushLimit { ticks: max_ticks })
    }

    pub fn pending_count() -> usize {
        Self::with(|s| s.queue.len())
    }

    pub fn is_flush_scheduled() -> bool {
        Self::with(|s| s.flush_scheduled)
    }

    /// Install the callback invoked when a flush becomes necessary.
    pub fn set_tick_hook(hook: Option<Rc<dyn Fn()>>) {
        Self::with(|s| s.tick_hook = hook);
    }

    pub fn configure(config: SchedulerConfig) {
        Self::with(|s| s.config = config);
    }

    pub fn config() -> SchedulerConfig {
        Self::with(|s| s.config)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_job() -> (Rc<Cell<u32>>, Job) {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        (runs, Job::new(move || counter.set(counter.get() + 1)))
    }

    #[test]
    fn queue_deduplicates() {
        let (runs, job) = counting_job();
        Scheduler::queue(&job);
        Scheduler::queue(&job);
        Scheduler::queue(&job.clone());
        assert_eq!(Scheduler::pending_count(), 1);

        assert_eq!(Scheduler::flush_jobs(), 1);
        assert_eq!(runs.get(), 1);
        assert_eq!(Scheduler::pending_count(), 0);
    }

    #[test]
    fn jobs_run_in_queue_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let jobs: Vec<Job> = (0..3)
            .map(|i| {
                let order = order.clone();
                Job::new(move || order.borrow_mut().push(i))
            })
            .collect();
        for job in jobs.iter().rev() {
            Scheduler::queue(job);
        }
        Scheduler::flush_jobs();
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn tick_hook_fires_once_per_tick() {
        let ticks = Rc::new(Cell::new(0));
        let counter = ticks.clone();
        Scheduler::set_tick_hook(Some(Rc::new(move || counter.set(counter.get() + 1))));

        let (_, a) = counting_job();
        let (_, b) = counting_job();
        Scheduler::queue(&a);
        Scheduler::queue(&b);
        assert_eq!(ticks.get(), 1);
        assert!(Scheduler::is_flush_scheduled());

        Scheduler::flush_jobs();
        assert!(!Scheduler::is_flush_scheduled());
        Scheduler::queue(&a);
        assert_eq!(ticks.get(), 2);
        Scheduler::set_tick_hook(None);
    }

    #[test]
    fn jobs_queued_during_flush_run_next_tick() {
        let (second_runs, second) = counting_job();
        let first = {
            let second = second.clone();
            Job::new(move || Scheduler::queue(&second))
        };
        Scheduler::queue(&first);

        assert_eq!(Scheduler::flush_jobs(), 1);
        assert_eq!(second_runs.get(), 0);
        assert_eq!(Scheduler::pending_count(), 1);

        assert_eq!(Scheduler::flush_jobs(), 1);
        assert_eq!(second_runs.get(), 1);
    }

    #[test]
    fn cancel_removes_pending_job() {
        let (runs, job) = counting_job();
        Scheduler::queue(&job);
        assert!(Scheduler::cancel(job.id()));
        assert!(!Scheduler::cancel(job.id()));
        Scheduler::flush_jobs();
        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn flush_all_gives_up_on_endless_requeue() {
        Scheduler::configure(SchedulerConfig { max_ticks: 5 });
        let slot: Rc<RefCell<Option<Job>>> = Rc::default();
        let handle = slot.clone();
        let job = Job::new(move || {
            if let Some(job) = handle.borrow().as_ref() {
                Scheduler::queue(job);
            }
        });
        *slot.borrow_mut() = Some(job.clone());
        Scheduler::queue(&job);

        assert_eq!(Scheduler::flush_all(), Err(Error::FlushLimit { ticks: 5 }));
        Scheduler::cancel(job.id());
        slot.borrow_mut().take();
        Scheduler::configure(SchedulerConfig::default());
    }

    #[test]
    fn flush_all_drains_follow_up_ticks() {
        let (second_runs, second) = counting_job();
        let first = {
            let second = second.clone();
            Job::new(move || Scheduler::queue(&second))
        };
        Scheduler::queue(&first);
        assert_eq!(Scheduler::flush_all(), Ok(2));
        assert_eq!(second_runs.get(), 1);
    }
}
