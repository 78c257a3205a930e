use super::BackendTransmitter;
use crate::message::{InboundMessage, OutboundMessage, Payload};
use crate::worker_pool::{SubmitError, WorkerPool, WorkerPoolConfig, WorkerPoolMetrics};
use may::sync::mpsc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Service function hosted by a [`LocalBackend`] channel
pub type ServiceFn = dyn Fn(&InboundMessage) -> anyhow::Result<Payload> + Send + Sync;

/// One forwarded request; `reply_tx` is absent for fire-and-forget sends
struct BackendRequest {
    message: InboundMessage,
    reply_tx: Option<mpsc::Sender<OutboundMessage>>,
}

/// In-process backend hosting one service per channel.
///
/// Each registered service runs on its own [`WorkerPool`]. Synchronous calls wait for the reply
/// on a per-call channel with a timed receive, so the caller's deadline holds even when the
/// service is stuck. A late reply is discarded with its channel.
///
/// ```rust,no_run
/// use brrtgate::backend::{echo_service, LocalBackend};
/// use brrtgate::worker_pool::WorkerPoolConfig;
///
/// let mut backend = LocalBackend::new();
/// backend.register_service("Messaging", WorkerPoolConfig::default(), echo_service);
/// ```
#[derive(Default)]
pub struct LocalBackend {
    services: HashMap<String, WorkerPool<BackendRequest>>,
}

impl LocalBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `channel` with `service`.
    ///
    /// A service returning `Err` is answered with a `502` backend-fault reply. A panicking
    /// service produces no reply, which the caller observes as an unreachable backend.
    /// Registering the same channel twice replaces the previous service; its workers exit
    /// once their queue drains.
    pub fn register_service<F>(&mut self, channel: &str, config: WorkerPoolConfig, service: F)
    where
        F: Fn(&InboundMessage) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        let service: Arc<ServiceFn> = Arc::new(service);
        let service_name = channel.to_string();

        let pool = WorkerPool::new(
            format!("backend-{channel}"),
            config,
            move |req: BackendRequest| {
                let result = service(&req.message);
                let Some(reply_tx) = req.reply_tx else {
                    if let Err(e) = result {
                        warn!(
                            channel = %service_name,
                            action = %req.message.action_name(),
                            correlation_id = req.message.correlation_id(),
                            error = %e,
                            "Fire-and-forget service call failed"
                        );
                    }
                    return;
                };
                let reply = match result {
                    Ok(payload) => OutboundMessage::ok(
                        Arc::clone(req.message.action()),
                        req.message.correlation_id(),
                        payload,
                    ),
                    Err(e) => {
                        warn!(
                            channel = %service_name,
                            action = %req.message.action_name(),
                            correlation_id = req.message.correlation_id(),
                            error = %e,
                            "Service call failed"
                        );
                        OutboundMessage::backend_fault(&req.message, e.to_string())
                    }
                };
                if reply_tx.send(reply).is_err() {
                    debug!(
                        channel = %service_name,
                        correlation_id = req.message.correlation_id(),
                        "Caller stopped waiting - discarding late reply"
                    );
                }
            },
        );

        if self.services.insert(channel.to_string(), pool).is_some() {
            warn!(channel = %channel, "Replaced existing backend service");
        } else {
            info!(
                channel = %channel,
                total_services = self.services.len(),
                "Backend service registered"
            );
        }
    }

    #[must_use]
    pub fn has_service(&self, channel: &str) -> bool {
        self.services.contains_key(channel)
    }

    /// Worker pool metrics for the service behind `channel`
    #[must_use]
    pub fn service_metrics(&self, channel: &str) -> Option<&Arc<WorkerPoolMetrics>> {
        self.services.get(channel).map(WorkerPool::metrics)
    }

    fn submit(&self, channel: &str, request: BackendRequest) -> bool {
        let Some(pool) = self.services.get(channel) else {
            warn!(
                channel = %channel,
                action = %request.message.action_name(),
                "No backend service registered for channel"
            );
            return false;
        };
        match pool.try_submit(request) {
            Ok(()) => true,
            Err(SubmitError::Saturated(req)) | Err(SubmitError::Disconnected(req)) => {
                warn!(
                    channel = %channel,
                    action = %req.message.action_name(),
                    correlation_id = req.message.correlation_id(),
                    "Backend service refused request"
                );
                false
            }
        }
    }
}

impl BackendTransmitter for LocalBackend {
    fn call_and_wait(
        &self,
        channel: &str,
        message: &InboundMessage,
        deadline: Duration,
    ) -> Option<OutboundMessage> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let request = BackendRequest {
            message: message.clone(),
            reply_tx: Some(reply_tx),
        };
        if !self.submit(channel, request) {
            return None;
        }

        let start = Instant::now();
        match reply_rx.recv_timeout(deadline) {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(
                    channel = %channel,
                    action = %message.action_name(),
                    correlation_id = message.correlation_id(),
                    elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Backend did not answer"
                );
                None
            }
        }
    }

    fn send_only(&self, channel: &str, message: &InboundMessage) {
        let request = BackendRequest {
            message: message.clone(),
            reply_tx: None,
        };
        self.submit(channel, request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StateCode;
    use serde_json::json;

    fn small_pool() -> WorkerPoolConfig {
        WorkerPoolConfig::new(2, 16, 0x8000)
    }

    #[test]
    fn test_call_and_wait_returns_service_payload() {
        let mut backend = LocalBackend::new();
        backend.register_service("Auth", small_pool(), |msg| {
            let mut out = Payload::new();
            out.insert("user".to_string(), json!(msg.correlation_id()));
            Ok(out)
        });
        let msg = InboundMessage::new("Login", 11, Payload::new());
        let reply = backend
            .call_and_wait("Auth", &msg, Duration::from_secs(2))
            .unwrap();
        assert_eq!(reply.state, StateCode::OK);
        assert_eq!(reply.correlation_id, 11);
        assert_eq!(reply.payload["user"], json!(11));
    }

    #[test]
    fn test_unknown_channel_is_unreachable() {
        let backend = LocalBackend::new();
        let msg = InboundMessage::new("Login", 1, Payload::new());
        assert!(backend
            .call_and_wait("Nowhere", &msg, Duration::from_millis(50))
            .is_none());
    }

    #[test]
    fn test_service_error_becomes_backend_fault() {
        let mut backend = LocalBackend::new();
        backend.register_service("CV", small_pool(), |_| anyhow::bail!("model not loaded"));
        let msg = InboundMessage::new("Detect", 2, Payload::new());
        let reply = backend
            .call_and_wait("CV", &msg, Duration::from_secs(2))
            .unwrap();
        assert_eq!(reply.state, StateCode::BACKEND_FAULT);
        assert_eq!(reply.reason.as_deref(), Some("model not loaded"));
    }

    #[test]
    fn test_slow_service_times_out_within_deadline() {
        let mut backend = LocalBackend::new();
        backend.register_service("Slow", small_pool(), |_| {
            may::coroutine::sleep(Duration::from_millis(500));
            Ok(Payload::new())
        });
        let msg = InboundMessage::new("Wait", 3, Payload::new());
        let start = Instant::now();
        let reply = backend.call_and_wait("Slow", &msg, Duration::from_millis(50));
        assert!(reply.is_none());
        assert!(start.elapsed() < Duration::from_millis(400));
    }
}
