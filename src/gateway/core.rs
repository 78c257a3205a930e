use super::error::DispatchError;
use super::pool::{TaskPool, DEFAULT_MAX_IDLE_TASKS};
use super::stats::{GatewayStats, GatewayStatsSnapshot};
use super::task::{DispatchMode, DispatchTask, TaskContext};
use crate::backend::BackendTransmitter;
use crate::message::InboundMessage;
use crate::recorder::ResponseTimeRecorder;
use crate::transport::ConnectionRef;
use crate::worker_pool::{SubmitError, WorkerPool, WorkerPoolConfig, WorkerPoolMetrics};
use arc_swap::ArcSwap;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a synchronous call may wait for the backend unless configured otherwise
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(5);

/// Longest synchronous deadline a channel accepts; larger values are clamped
pub const MAX_CALL_DEADLINE: Duration = Duration::from_secs(3600);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Settings for one [`ChannelGateway`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Backend channel name, used as-is when calling the transmitter
    pub name: String,
    /// Actions dispatched without a reply
    pub fire_and_forget: Vec<String>,
    pub call_deadline: Duration,
    pub workers: WorkerPoolConfig,
    pub max_idle_tasks: usize,
}

impl ChannelConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fire_and_forget: Vec::new(),
            call_deadline: DEFAULT_CALL_DEADLINE,
            workers: WorkerPoolConfig::default(),
            max_idle_tasks: DEFAULT_MAX_IDLE_TASKS,
        }
    }

    #[must_use]
    pub fn with_fire_and_forget<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fire_and_forget = actions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = deadline.min(MAX_CALL_DEADLINE);
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: WorkerPoolConfig) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_max_idle_tasks(mut self, max_idle_tasks: usize) -> Self {
        self.max_idle_tasks = max_idle_tasks;
        self
    }
}

/// Set of action names a channel dispatches as fire-and-forget.
///
/// Channels rarely list more than a handful, so lookups scan an inline vector.
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    fire_and_forget: SmallVec<[Arc<str>; 8]>,
}

impl ActionTable {
    pub fn new<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fire_and_forget: SmallVec<[Arc<str>; 8]> = SmallVec::new();
        for action in actions {
            let action = action.as_ref();
            if !fire_and_forget.iter().any(|known| &**known == action) {
                fire_and_forget.push(Arc::from(action));
            }
        }
        Self { fire_and_forget }
    }

    /// Exact, case-sensitive lookup
    #[must_use]
    pub fn classify(&self, action: &str) -> DispatchMode {
        if self.fire_and_forget.iter().any(|known| &**known == action) {
            DispatchMode::FireAndForget
        } else {
            DispatchMode::Synchronous
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fire_and_forget.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fire_and_forget.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.fire_and_forget.iter().map(|a| &**a)
    }
}

/// Receive-side entry point for one backend channel.
///
/// `on_message` runs on the transport's receive path: it classifies the action, takes the
/// response-time mark, prepares a [`DispatchTask`] and hands it to the channel's worker
/// coroutines without waiting for the backend. When every execution slot is taken the
/// request is refused at once with [`DispatchError::Overloaded`].
///
/// ```rust,no_run
/// use brrtgate::backend::{echo_service, LocalBackend};
/// use brrtgate::gateway::{ChannelConfig, ChannelGateway};
/// use brrtgate::message::{InboundMessage, Payload};
/// use brrtgate::recorder::ResponseTimeRecorder;
/// use brrtgate::transport::{connection_ref, MemoryConnection};
/// use brrtgate::worker_pool::WorkerPoolConfig;
/// use std::sync::Arc;
///
/// let mut backend = LocalBackend::new();
/// backend.register_service("Messaging", WorkerPoolConfig::default(), echo_service);
///
/// let gateway = ChannelGateway::new(
///     ChannelConfig::new("Messaging").with_fire_and_forget(["Typing"]),
///     Arc::new(backend),
///     Arc::new(ResponseTimeRecorder::new()),
/// );
///
/// let (conn, replies) = MemoryConnection::new(1);
/// gateway
///     .on_message(connection_ref(&conn), InboundMessage::new("SendText", 1, Payload::new()))
///     .unwrap();
/// let reply = replies.recv().unwrap();
/// assert_eq!(reply.correlation_id, 1);
/// ```
pub struct ChannelGateway {
    name: Arc<str>,
    actions: ArcSwap<ActionTable>,
    call_deadline: Duration,
    pool: Arc<TaskPool>,
    workers: WorkerPool<Box<DispatchTask>>,
    recorder: Arc<ResponseTimeRecorder>,
    stats: Arc<GatewayStats>,
    accepting: AtomicBool,
}

impl ChannelGateway {
    /// Build the gateway and start its worker coroutines
    pub fn new(
        config: ChannelConfig,
        backend: Arc<dyn BackendTransmitter>,
        recorder: Arc<ResponseTimeRecorder>,
    ) -> Self {
        let name: Arc<str> = Arc::from(config.name.as_str());
        let stats = Arc::new(GatewayStats::default());
        let pool = Arc::new(TaskPool::new(config.max_idle_tasks));
        let actions = ActionTable::new(&config.fire_and_forget);
        let call_deadline = config.call_deadline.min(MAX_CALL_DEADLINE);

        let ctx = Arc::new(TaskContext {
            channel: Arc::clone(&name),
            backend,
            recorder: Arc::clone(&recorder),
            call_deadline,
            stats: Arc::clone(&stats),
        });

        let workers = {
            let pool = Arc::clone(&pool);
            WorkerPool::new(
                format!("gateway-{name}"),
                config.workers,
                move |mut task: Box<DispatchTask>| {
                    task.execute(&ctx);
                    pool.release(task);
                },
            )
        };

        info!(
            channel = %name,
            fire_and_forget = actions.len(),
            call_deadline_ms = u64::try_from(call_deadline.as_millis()).unwrap_or(u64::MAX),
            max_idle_tasks = config.max_idle_tasks,
            "Channel gateway ready"
        );

        Self {
            name,
            actions: ArcSwap::from_pointee(actions),
            call_deadline,
            pool,
            workers,
            recorder,
            stats,
            accepting: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn call_deadline(&self) -> Duration {
        self.call_deadline
    }

    #[must_use]
    pub fn classify(&self, action: &str) -> DispatchMode {
        self.actions.load().classify(action)
    }

    /// Replace the fire-and-forget set; requests already dispatched keep their mode
    pub fn set_fire_and_forget<I, S>(&self, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = ActionTable::new(actions);
        info!(
            channel = %self.name,
            fire_and_forget = table.len(),
            "Fire-and-forget actions updated"
        );
        self.actions.store(Arc::new(table));
    }

    #[must_use]
    pub fn fire_and_forget_actions(&self) -> Vec<String> {
        self.actions.load().actions().map(str::to_string).collect()
    }

    /// Accept one inbound request.
    ///
    /// Returns as soon as the request is queued for a worker. The caller never waits for
    /// the backend; replies for synchronous actions arrive later through `connection`.
    pub fn on_message(
        &self,
        connection: ConnectionRef,
        message: InboundMessage,
    ) -> Result<DispatchMode, DispatchError> {
        let action = Arc::clone(message.action());
        let correlation_id = message.correlation_id();

        if !self.accepting.load(Ordering::Acquire) {
            self.stats.record_rejected();
            debug!(
                channel = %self.name,
                action = %action,
                correlation_id,
                "Gateway shut down - rejecting request"
            );
            return Err(DispatchError::ShuttingDown {
                channel: Arc::clone(&self.name),
                action,
                correlation_id,
            });
        }

        let mode = self.classify(&action);
        let mark = self.recorder.mark(&action);
        let mut task = self.pool.acquire();
        let dispatch_id = task.configure(connection, message, mode, mark);

        match self.workers.try_submit(task) {
            Ok(()) => {
                self.stats.record_accepted();
                debug!(
                    dispatch_id = %dispatch_id,
                    channel = %self.name,
                    action = %action,
                    correlation_id,
                    mode = ?mode,
                    "Request dispatched"
                );
                Ok(mode)
            }
            Err(err) => {
                self.stats.record_rejected();
                let overloaded = matches!(err, SubmitError::Saturated(_));
                // the unfinished mark is dropped with the task's contents
                self.pool.release(err.into_inner());
                let channel = Arc::clone(&self.name);
                if overloaded {
                    let in_flight = self.workers.in_flight();
                    warn!(
                        dispatch_id = %dispatch_id,
                        channel = %channel,
                        action = %action,
                        correlation_id,
                        in_flight,
                        "Channel overloaded - rejecting request"
                    );
                    Err(DispatchError::Overloaded {
                        channel,
                        action,
                        correlation_id,
                        in_flight,
                    })
                } else {
                    Err(DispatchError::WorkersUnavailable {
                        channel,
                        action,
                        correlation_id,
                    })
                }
            }
        }
    }

    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting requests and wait up to `drain` for in-flight tasks.
    ///
    /// Returns `true` once nothing is in flight, `false` if the drain window ran out.
    /// Calling it again only waits again.
    pub fn shutdown(&self, drain: Duration) -> bool {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!(
                channel = %self.name,
                in_flight = self.workers.in_flight(),
                "Gateway stopped accepting requests"
            );
        }

        let start = Instant::now();
        loop {
            let in_flight = self.workers.in_flight();
            if in_flight == 0 {
                info!(channel = %self.name, "Gateway drained");
                return true;
            }
            if start.elapsed() >= drain {
                warn!(
                    channel = %self.name,
                    in_flight,
                    drain_ms = u64::try_from(drain.as_millis()).unwrap_or(u64::MAX),
                    "Drain window elapsed with requests in flight"
                );
                return false;
            }
            may::coroutine::sleep(DRAIN_POLL_INTERVAL);
        }
    }

    /// Requests queued or executing
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.workers.in_flight()
    }

    #[must_use]
    pub fn stats(&self) -> GatewayStatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn task_pool(&self) -> &TaskPool {
        &self.pool
    }

    #[must_use]
    pub fn worker_metrics(&self) -> &Arc<WorkerPoolMetrics> {
        self.workers.metrics()
    }

    #[must_use]
    pub fn recorder(&self) -> &Arc<ResponseTimeRecorder> {
        &self.recorder
    }
}

impl std::fmt::Debug for ChannelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelGateway")
            .field("name", &self.name)
            .field("call_deadline", &self.call_deadline)
            .field("in_flight", &self.workers.in_flight())
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}
