//! # Worker Pool Module
//!
//! Bounded pools of worker coroutines. Gateways run their dispatch tasks on one, and the
//! in-process backend runs each service on one.
//!
//! ## Features
//!
//! - **Worker Pools**: N `may` coroutines share one request queue and load balance naturally
//! - **Bounded In-Flight Work**: at most `queue_bound` jobs may be queued or running at once
//! - **Shedding**: a submission beyond the bound is refused immediately and the job is handed
//!   back to the caller, so the submitting path never blocks
//! - **Panic Recovery**: a panicking job is logged and the worker keeps serving
//! - **Metrics**: in-flight depth, dispatched, completed and shed counters
//!
//! ## Configuration
//!
//! - `BRRTG_GATEWAY_WORKERS`: number of worker coroutines (default: 8)
//! - `BRRTG_GATEWAY_QUEUE_BOUND`: maximum in-flight jobs (default: 1024)
//! - `BRRTG_STACK_SIZE`: coroutine stack size, decimal or `0x` hex (default: 64 KiB)

use may::sync::mpsc;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default number of worker coroutines per pool
pub const DEFAULT_WORKERS: usize = 8;
/// Default maximum number of in-flight jobs per pool
pub const DEFAULT_QUEUE_BOUND: usize = 1024;
/// Default coroutine stack size (64 KiB)
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Parse a stack size given in decimal or `0x`-prefixed hex
#[must_use]
pub fn parse_stack_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Configuration for a worker pool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Maximum number of queued plus running jobs
    pub queue_bound: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    /// Load configuration from environment variables, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply any `BRRTG_*` environment overrides on top of `self`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = std::env::var("BRRTG_GATEWAY_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.num_workers = n;
        }
        if let Some(n) = std::env::var("BRRTG_GATEWAY_QUEUE_BOUND")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.queue_bound = n;
        }
        if let Some(n) = std::env::var("BRRTG_STACK_SIZE")
            .ok()
            .and_then(|s| parse_stack_size(&s))
        {
            self.stack_size = n;
        }
        self
    }

    #[must_use]
    pub fn new(num_workers: usize, queue_bound: usize, stack_size: usize) -> Self {
        Self {
            num_workers,
            queue_bound,
            stack_size,
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_WORKERS,
            queue_bound: DEFAULT_QUEUE_BOUND,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    /// Number of submissions refused because the pool was saturated
    pub shed_count: AtomicU64,
    /// Jobs queued or running
    pub in_flight: AtomicUsize,
    /// Total jobs accepted
    pub dispatched_count: AtomicU64,
    /// Total jobs finished (including panicked ones)
    pub completed_count: AtomicU64,
    /// Jobs that panicked
    pub panic_count: AtomicU64,
}

impl WorkerPoolMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an in-flight slot if fewer than `bound` jobs are outstanding
    fn try_reserve(&self, bound: usize) -> Result<usize, usize> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < bound).then_some(n + 1)
            })
    }

    fn release_slot(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn record_shed(&self) {
        self.shed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.release_slot();
    }

    #[must_use]
    pub fn get_shed_count(&self) -> u64 {
        self.shed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_panic_count(&self) -> u64 {
        self.panic_count.load(Ordering::Relaxed)
    }
}

/// A refused submission. The job is handed back untouched.
pub enum SubmitError<T> {
    /// Every in-flight slot is taken
    Saturated(T),
    /// All workers have exited
    Disconnected(T),
}

impl<T> SubmitError<T> {
    /// Recover the refused job
    pub fn into_inner(self) -> T {
        match self {
            SubmitError::Saturated(job) | SubmitError::Disconnected(job) => job,
        }
    }
}

impl<T> fmt::Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Saturated(_) => f.write_str("Saturated(..)"),
            SubmitError::Disconnected(_) => f.write_str("Disconnected(..)"),
        }
    }
}

impl<T> fmt::Display for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Saturated(_) => f.write_str("worker pool is saturated"),
            SubmitError::Disconnected(_) => f.write_str("worker pool has no running workers"),
        }
    }
}

impl<T> std::error::Error for SubmitError<T> {}

/// A pool of worker coroutines processing jobs of type `T`
pub struct WorkerPool<T: Send + 'static> {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<T>,
    metrics: Arc<WorkerPoolMetrics>,
    name: String,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool and spawn its workers.
    ///
    /// Every job is passed to `handler_fn` on one of the worker coroutines. Workers exit once
    /// the pool is dropped and the queue has drained.
    pub fn new<F>(name: impl Into<String>, config: WorkerPoolConfig, handler_fn: F) -> Self
    where
        F: Fn(T) + Send + Clone + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<T>();
        let metrics = Arc::new(WorkerPoolMetrics::new());

        // all workers share one receiver
        let rx = Arc::new(rx);

        info!(
            pool = %name,
            num_workers = config.num_workers,
            queue_bound = config.queue_bound,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let handler_fn = handler_fn.clone();
            let pool_name = name.clone();
            let metrics = Arc::clone(&metrics);

            // SAFETY: `Builder::spawn` is unsafe because a coroutine must not rely on
            // thread-local state or block its carrier thread indefinitely. Workers only touch
            // the shared receiver, the metrics and the `Send + 'static` handler, and every
            // blocking wait they perform goes through `may` primitives.
            let spawn_result = unsafe {
                may::coroutine::Builder::new()
                    .name(format!("{pool_name}-{worker_id}"))
                    .stack_size(config.stack_size)
                    .spawn(move || {
                        debug!(pool = %pool_name, worker_id, "Worker coroutine started");

                        while let Ok(job) = rx.recv() {
                            if let Err(panic) =
                                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                    handler_fn(job);
                                }))
                            {
                                metrics.panic_count.fetch_add(1, Ordering::Relaxed);
                                error!(
                                    pool = %pool_name,
                                    worker_id,
                                    panic_message = ?panic,
                                    "Job panicked - CRITICAL"
                                );
                            }
                            metrics.record_completion();
                        }

                        debug!(pool = %pool_name, worker_id, "Worker coroutine exiting");
                    })
            };

            if let Err(e) = spawn_result {
                error!(
                    pool = %name,
                    worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                );
            }
        }

        Self {
            config,
            sender: tx,
            metrics,
            name,
        }
    }

    /// Submit a job without blocking.
    ///
    /// Fails with [`SubmitError::Saturated`] when `queue_bound` jobs are already in flight,
    /// and with [`SubmitError::Disconnected`] if the workers are gone. Either way the job is
    /// returned to the caller.
    pub fn try_submit(&self, job: T) -> Result<(), SubmitError<T>> {
        if let Err(in_flight) = self.metrics.try_reserve(self.config.queue_bound) {
            self.metrics.record_shed();
            warn!(
                pool = %self.name,
                in_flight,
                queue_bound = self.config.queue_bound,
                "Worker pool saturated - shedding job"
            );
            return Err(SubmitError::Saturated(job));
        }

        if let Err(e) = self.sender.send(job) {
            self.metrics.release_slot();
            error!(pool = %self.name, "Worker pool channel disconnected");
            return Err(SubmitError::Disconnected(e.0));
        }

        self.metrics.record_dispatch();
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Jobs currently queued or running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.metrics.get_in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stack_size() {
        assert_eq!(parse_stack_size("0x4000"), Some(0x4000));
        assert_eq!(parse_stack_size("32768"), Some(32768));
        assert_eq!(parse_stack_size(" 1024 "), Some(1024));
        assert_eq!(parse_stack_size("lots"), None);
    }

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.queue_bound, 1024);
        assert_eq!(config.stack_size, 0x10000);
    }

    #[test]
    fn test_worker_pool_config_partial_yaml() {
        let config: WorkerPoolConfig = serde_yaml::from_str("num_workers: 2").unwrap();
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.queue_bound, DEFAULT_QUEUE_BOUND);
    }

    #[test]
    fn test_reserve_respects_bound() {
        let metrics = WorkerPoolMetrics::new();
        assert!(metrics.try_reserve(2).is_ok());
        assert!(metrics.try_reserve(2).is_ok());
        assert_eq!(metrics.try_reserve(2), Err(2));
        metrics.record_completion();
        assert_eq!(metrics.get_in_flight(), 1);
        assert!(metrics.try_reserve(2).is_ok());
    }

    #[test]
    fn test_submit_error_returns_job() {
        let err: SubmitError<u32> = SubmitError::Saturated(7);
        assert_eq!(err.to_string(), "worker pool is saturated");
        assert_eq!(err.into_inner(), 7);
    }
}
