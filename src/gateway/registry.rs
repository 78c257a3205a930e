use super::core::{ChannelConfig, ChannelGateway};
use super::error::DispatchError;
use super::stats::GatewayStatsSnapshot;
use super::task::DispatchMode;
use crate::backend::BackendTransmitter;
use crate::config::GatewayConfig;
use crate::message::InboundMessage;
use crate::recorder::ResponseTimeRecorder;
use crate::transport::ConnectionRef;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One gateway per backend channel, sharing a single response-time recorder
pub struct GatewayRegistry {
    recorder: Arc<ResponseTimeRecorder>,
    gateways: HashMap<String, Arc<ChannelGateway>>,
}

impl GatewayRegistry {
    #[must_use]
    pub fn new(recorder: Arc<ResponseTimeRecorder>) -> Self {
        Self {
            recorder,
            gateways: HashMap::new(),
        }
    }

    /// Build a gateway for every channel in `config`, all talking to `backend`
    #[must_use]
    pub fn from_config(config: &GatewayConfig, backend: Arc<dyn BackendTransmitter>) -> Self {
        let mut registry = Self::new(Arc::new(ResponseTimeRecorder::new()));
        for channel in config.channel_configs() {
            registry.add_channel(channel, Arc::clone(&backend));
        }
        info!(channels = registry.gateways.len(), "Gateway registry ready");
        registry
    }

    /// Start a gateway for `config.name`, replacing any existing one
    pub fn add_channel(
        &mut self,
        config: ChannelConfig,
        backend: Arc<dyn BackendTransmitter>,
    ) -> Arc<ChannelGateway> {
        let name = config.name.clone();
        let gateway = Arc::new(ChannelGateway::new(
            config,
            backend,
            Arc::clone(&self.recorder),
        ));
        if self
            .gateways
            .insert(name.clone(), Arc::clone(&gateway))
            .is_some()
        {
            warn!(channel = %name, "Replaced existing channel gateway");
        }
        gateway
    }

    #[must_use]
    pub fn gateway(&self, channel: &str) -> Option<&Arc<ChannelGateway>> {
        self.gateways.get(channel)
    }

    /// Registered channel names, sorted
    #[must_use]
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.gateways.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Route `message` to the gateway for `channel`
    pub fn dispatch(
        &self,
        channel: &str,
        connection: ConnectionRef,
        message: InboundMessage,
    ) -> Result<DispatchMode, DispatchError> {
        match self.gateways.get(channel) {
            Some(gateway) => gateway.on_message(connection, message),
            None => {
                warn!(
                    channel = %channel,
                    action = %message.action_name(),
                    correlation_id = message.correlation_id(),
                    "No gateway for channel"
                );
                Err(DispatchError::UnknownChannel {
                    channel: channel.to_string(),
                    action: Arc::clone(message.action()),
                    correlation_id: message.correlation_id(),
                })
            }
        }
    }

    #[must_use]
    pub fn recorder(&self) -> &Arc<ResponseTimeRecorder> {
        &self.recorder
    }

    /// Per-channel counters, sorted by channel name
    #[must_use]
    pub fn stats(&self) -> Vec<(String, GatewayStatsSnapshot)> {
        let mut stats: Vec<_> = self
            .gateways
            .iter()
            .map(|(name, gateway)| (name.clone(), gateway.stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Prometheus text: per-action latency followed by per-channel counters
    #[must_use]
    pub fn render_metrics(&self) -> String {
        let mut out = self.recorder.render_prometheus();
        let stats = self.stats();

        let counters: [(&str, &str, fn(&GatewayStatsSnapshot) -> u64); 7] = [
            (
                "brrtgate_requests_accepted_total",
                "Requests handed to workers",
                |s| s.accepted,
            ),
            (
                "brrtgate_requests_rejected_total",
                "Requests refused on receive",
                |s| s.rejected,
            ),
            (
                "brrtgate_replies_sent_total",
                "Replies delivered to clients",
                |s| s.replies_sent,
            ),
            (
                "brrtgate_gateway_errors_total",
                "Gateway error responses built",
                |s| s.gateway_errors,
            ),
            (
                "brrtgate_forwarded_total",
                "Fire-and-forget messages forwarded",
                |s| s.forwarded,
            ),
            (
                "brrtgate_internal_faults_total",
                "Failures caught by dispatch tasks",
                |s| s.internal_faults,
            ),
            (
                "brrtgate_undeliverable_replies_total",
                "Replies dropped on closed connections",
                |s| s.undeliverable,
            ),
        ];

        for (metric, help, value) in counters {
            let _ = writeln!(out, "# HELP {metric} {help}");
            let _ = writeln!(out, "# TYPE {metric} counter");
            for (channel, snapshot) in &stats {
                let _ = writeln!(out, "{metric}{{channel=\"{channel}\"}} {}", value(snapshot));
            }
        }

        let _ = writeln!(out, "# HELP brrtgate_in_flight Requests queued or executing");
        let _ = writeln!(out, "# TYPE brrtgate_in_flight gauge");
        for name in self.channel_names() {
            if let Some(gateway) = self.gateways.get(name) {
                let _ = writeln!(
                    out,
                    "brrtgate_in_flight{{channel=\"{name}\"}} {}",
                    gateway.in_flight()
                );
            }
        }
        out
    }

    /// Shut every gateway down within one overall `drain` window
    pub fn shutdown(&self, drain: Duration) -> bool {
        let start = Instant::now();
        let mut drained = true;
        for name in self.channel_names() {
            if let Some(gateway) = self.gateways.get(name) {
                let remaining = drain.saturating_sub(start.elapsed());
                drained &= gateway.shutdown(remaining);
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{echo_service, LocalBackend};
    use crate::message::Payload;
    use crate::transport::{connection_ref, MemoryConnection};
    use crate::worker_pool::WorkerPoolConfig;

    fn registry() -> GatewayRegistry {
        let mut backend = LocalBackend::new();
        backend.register_service("Messaging", WorkerPoolConfig::new(2, 16, 0x8000), echo_service);
        let backend: Arc<dyn BackendTransmitter> = Arc::new(backend);
        let mut registry = GatewayRegistry::new(Arc::new(ResponseTimeRecorder::new()));
        for name in ["Messaging", "Auth"] {
            registry.add_channel(
                ChannelConfig::new(name).with_workers(WorkerPoolConfig::new(2, 16, 0x8000)),
                Arc::clone(&backend),
            );
        }
        registry
    }

    #[test]
    fn test_channel_names_sorted() {
        let registry = registry();
        assert_eq!(registry.channel_names(), vec!["Auth", "Messaging"]);
        assert!(registry.gateway("Messaging").is_some());
        assert!(registry.gateway("Ferry").is_none());
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let registry = registry();
        let (conn, _rx) = MemoryConnection::new(1);
        let err = registry
            .dispatch(
                "Ferry",
                connection_ref(&conn),
                InboundMessage::new("Board", 4, Payload::new()),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownChannel { .. }));
        assert_eq!(err.correlation_id(), 4);
    }

    #[test]
    fn test_dispatch_and_render_metrics() {
        let registry = registry();
        let (conn, rx) = MemoryConnection::new(1);
        let mode = registry
            .dispatch(
                "Messaging",
                connection_ref(&conn),
                InboundMessage::new("SendText", 8, Payload::new()),
            )
            .unwrap();
        assert_eq!(mode, DispatchMode::Synchronous);
        assert_eq!(rx.recv().unwrap().correlation_id, 8);
        assert!(registry.shutdown(Duration::from_secs(2)));

        let text = registry.render_metrics();
        assert!(text.contains("brrtgate_action_requests_total{action=\"SendText\"} 1"));
        assert!(text.contains("brrtgate_replies_sent_total{channel=\"Messaging\"} 1"));
        assert!(text.contains("brrtgate_replies_sent_total{channel=\"Auth\"} 0"));
        assert!(text.contains("brrtgate_in_flight{channel=\"Messaging\"} 0"));
    }
}
