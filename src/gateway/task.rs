//! Dispatch task: one request-to-response cycle.
//!
//! A task is configured by the gateway, moved onto a worker coroutine, executed, and handed
//! back to its [`TaskPool`](super::TaskPool). Because the task is moved rather than shared,
//! exactly one execution path owns its connection handle and message at any time.

use super::stats::GatewayStats;
use crate::backend::BackendTransmitter;
use crate::ids::DispatchId;
use crate::message::{InboundMessage, OutboundMessage, StateCode};
use crate::recorder::{ResponseTimeMark, ResponseTimeRecorder};
use crate::transport::ConnectionRef;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Whether the caller waits for a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DispatchMode {
    /// Call the backend and send exactly one reply
    Synchronous,
    /// Forward to the backend and never reply
    FireAndForget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// In the pool, holding nothing
    Idle,
    /// Acquired by a gateway and owned by one execution path
    Running,
}

/// What happened to a request once its task ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The backend reply was delivered to the client
    Replied(StateCode),
    /// The backend gave no result and a Gateway Error Response was delivered
    GatewayError,
    /// Fire-and-forget message handed to the backend
    Forwarded,
    /// A reply was built but the connection was gone or refused it
    Undeliverable,
    /// A failure was caught at the task boundary
    Faulted,
    /// The task held no message
    Empty,
}

/// Everything a task needs from its gateway while it runs
pub struct TaskContext {
    pub channel: Arc<str>,
    pub backend: Arc<dyn BackendTransmitter>,
    pub recorder: Arc<ResponseTimeRecorder>,
    pub call_deadline: Duration,
    pub stats: Arc<GatewayStats>,
}

/// Reusable unit executing one request-to-response cycle
#[derive(Debug)]
pub struct DispatchTask {
    serial: u64,
    state: TaskState,
    dispatch_id: Option<DispatchId>,
    connection: Option<ConnectionRef>,
    message: Option<InboundMessage>,
    mode: DispatchMode,
    mark: Option<ResponseTimeMark>,
}

impl DispatchTask {
    pub(crate) fn new(serial: u64) -> Self {
        Self {
            serial,
            state: TaskState::Idle,
            dispatch_id: None,
            connection: None,
            message: None,
            mode: DispatchMode::Synchronous,
            mark: None,
        }
    }

    /// Pool-unique allocation number; a reused task keeps its serial
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    #[must_use]
    pub fn message(&self) -> Option<&InboundMessage> {
        self.message.as_ref()
    }

    #[must_use]
    pub fn connection(&self) -> Option<&ConnectionRef> {
        self.connection.as_ref()
    }

    #[must_use]
    pub fn dispatch_id(&self) -> Option<DispatchId> {
        self.dispatch_id
    }

    /// When the request's response-time mark was taken
    #[must_use]
    pub fn started(&self) -> Option<Instant> {
        self.mark.as_ref().map(ResponseTimeMark::started)
    }

    /// Load one request into the task and return its dispatch id
    pub fn configure(
        &mut self,
        connection: ConnectionRef,
        message: InboundMessage,
        mode: DispatchMode,
        mark: ResponseTimeMark,
    ) -> DispatchId {
        let id = DispatchId::new();
        self.dispatch_id = Some(id);
        self.connection = Some(connection);
        self.message = Some(message);
        self.mode = mode;
        self.mark = Some(mark);
        id
    }

    pub(crate) fn begin(&mut self) {
        self.state = TaskState::Running;
    }

    /// Drop everything the task holds and mark it idle
    pub(crate) fn reset(&mut self) {
        self.state = TaskState::Idle;
        self.dispatch_id = None;
        self.connection = None;
        self.message = None;
        self.mode = DispatchMode::Synchronous;
        self.mark = None;
    }

    /// Run the request-to-response cycle.
    ///
    /// Never panics: failures are caught here, logged and counted. The response time is
    /// recorded whatever the outcome. The caller releases the task afterwards.
    pub fn execute(&mut self, ctx: &TaskContext) -> DispatchOutcome {
        let Some(message) = self.message.take() else {
            warn!(
                channel = %ctx.channel,
                serial = self.serial,
                "Dispatch task executed without a message"
            );
            return DispatchOutcome::Empty;
        };
        let connection = self.connection.take();
        let mark = self.mark.take();
        let dispatch_id = self.dispatch_id.unwrap_or_default();
        let mode = self.mode;

        debug!(
            dispatch_id = %dispatch_id,
            channel = %ctx.channel,
            action = %message.action_name(),
            correlation_id = message.correlation_id(),
            mode = ?mode,
            serial = self.serial,
            "Dispatch task start"
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| match mode {
            DispatchMode::FireAndForget => {
                ctx.backend.send_only(&ctx.channel, &message);
                ctx.stats.record_forwarded();
                DispatchOutcome::Forwarded
            }
            DispatchMode::Synchronous => call(ctx, &message, connection.as_ref(), dispatch_id),
        }));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                ctx.stats.record_internal_fault();
                error!(
                    dispatch_id = %dispatch_id,
                    channel = %ctx.channel,
                    action = %message.action_name(),
                    correlation_id = message.correlation_id(),
                    panic_message = ?panic,
                    "Dispatch task failed - internal fault"
                );
                DispatchOutcome::Faulted
            }
        };

        if let Some(mark) = mark {
            let elapsed = ctx.recorder.complete(mark);
            debug!(
                dispatch_id = %dispatch_id,
                channel = %ctx.channel,
                action = %message.action_name(),
                latency_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                outcome = ?outcome,
                "Dispatch task complete"
            );
        }

        outcome
    }
}

fn call(
    ctx: &TaskContext,
    message: &InboundMessage,
    connection: Option<&ConnectionRef>,
    dispatch_id: DispatchId,
) -> DispatchOutcome {
    let call_started = Instant::now();
    let backend_reply = panic::catch_unwind(AssertUnwindSafe(|| {
        ctx.backend
            .call_and_wait(&ctx.channel, message, ctx.call_deadline)
    }))
    .unwrap_or_else(|panic| {
        error!(
            dispatch_id = %dispatch_id,
            channel = %ctx.channel,
            action = %message.action_name(),
            panic_message = ?panic,
            "Backend transmitter panicked"
        );
        None
    });

    let call_elapsed = call_started.elapsed();
    if call_elapsed > ctx.call_deadline {
        warn!(
            dispatch_id = %dispatch_id,
            channel = %ctx.channel,
            action = %message.action_name(),
            elapsed_ms = u64::try_from(call_elapsed.as_millis()).unwrap_or(u64::MAX),
            deadline_ms = u64::try_from(ctx.call_deadline.as_millis()).unwrap_or(u64::MAX),
            "Backend transmitter overran the call deadline"
        );
    }

    let (reply, gateway_error) = match backend_reply {
        Some(reply) => (reply.answering(message), false),
        None => {
            ctx.stats.record_gateway_error();
            warn!(
                dispatch_id = %dispatch_id,
                channel = %ctx.channel,
                action = %message.action_name(),
                correlation_id = message.correlation_id(),
                deadline_ms = u64::try_from(ctx.call_deadline.as_millis()).unwrap_or(u64::MAX),
                "Backend gave no result - sending gateway error"
            );
            let reason = format!(
                "channel '{}' did not answer '{}' within {} ms",
                ctx.channel,
                message.action_name(),
                ctx.call_deadline.as_millis()
            );
            (OutboundMessage::gateway_error(message, reason), true)
        }
    };

    let state = reply.state;
    let Some(conn) = connection.and_then(|c| c.upgrade()) else {
        ctx.stats.record_undeliverable();
        debug!(
            dispatch_id = %dispatch_id,
            channel = %ctx.channel,
            correlation_id = message.correlation_id(),
            "Client connection gone - dropping reply"
        );
        return DispatchOutcome::Undeliverable;
    };

    match conn.send(reply) {
        Ok(()) => {
            ctx.stats.record_reply();
            if gateway_error {
                DispatchOutcome::GatewayError
            } else {
                DispatchOutcome::Replied(state)
            }
        }
        Err(e) => {
            ctx.stats.record_undeliverable();
            warn!(
                dispatch_id = %dispatch_id,
                channel = %ctx.channel,
                connection_id = conn.id(),
                correlation_id = message.correlation_id(),
                error = %e,
                "Failed to send reply"
            );
            DispatchOutcome::Undeliverable
        }
    }
}
