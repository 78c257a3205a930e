use super::task::DispatchTask;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Default number of idle dispatch tasks a channel keeps for reuse
pub const DEFAULT_MAX_IDLE_TASKS: usize = 1024;

/// Recycles [`DispatchTask`]s across requests.
///
/// `acquire` never blocks on capacity: an empty pool allocates a fresh task. `release`
/// resets the task and keeps it only while fewer than `max_idle` tasks are idle, so a
/// `max_idle` of 0 disables reuse. A task is reachable from at most one place at a time:
/// the idle list, or whoever holds the `Box`.
#[derive(Debug)]
pub struct TaskPool {
    idle: Mutex<Vec<Box<DispatchTask>>>,
    max_idle: usize,
    next_serial: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl TaskPool {
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle.min(64))),
            max_idle,
            next_serial: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Take an idle task, or allocate one, and mark it running
    #[must_use]
    pub fn acquire(&self) -> Box<DispatchTask> {
        let recycled = self.idle.lock().pop();
        let mut task = match recycled {
            Some(task) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                task
            }
            None => {
                let serial = self.next_serial.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(serial, "Allocating dispatch task");
                Box::new(DispatchTask::new(serial))
            }
        };
        task.begin();
        task
    }

    /// Reset `task` and return it to the idle list, or drop it when the list is full
    pub fn release(&self, mut task: Box<DispatchTask>) {
        task.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(task);
            return;
        }
        drop(idle);
        self.discarded.fetch_add(1, Ordering::Relaxed);
        trace!(serial = task.serial(), "Idle list full - discarding dispatch task");
    }

    #[must_use]
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Tasks created since the pool was built
    #[must_use]
    pub fn allocated_count(&self) -> u64 {
        self.next_serial.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn reused_count(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_TASKS)
    }
}
