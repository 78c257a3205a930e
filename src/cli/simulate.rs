use crate::backend::{echo_service, BackendTransmitter, LocalBackend};
use crate::config::GatewayConfig;
use crate::gateway::{DispatchMode, GatewayRegistry, GatewayStatsSnapshot};
use crate::message::{InboundMessage, Payload, StateCode};
use crate::recorder::ActionLatency;
use crate::transport::{connection_ref, MemoryConnection};
use anyhow::{ensure, Result};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Load shape for [`simulate`]
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub requests: usize,
    pub connections: usize,
    /// Cycled per request; fire-and-forget classification comes from the config
    pub actions: Vec<String>,
    pub service_delay: Duration,
    pub drain: Duration,
}

#[derive(Debug, Default, Clone, Copy)]
struct ConnectionTally {
    synchronous: u64,
    fire_and_forget: u64,
    rejected: u64,
    replies: u64,
    ok_replies: u64,
    gateway_errors: u64,
    unmatched: u64,
    missing: u64,
}

impl ConnectionTally {
    fn merge(&mut self, other: &ConnectionTally) {
        self.synchronous += other.synchronous;
        self.fire_and_forget += other.fire_and_forget;
        self.rejected += other.rejected;
        self.replies += other.replies;
        self.ok_replies += other.ok_replies;
        self.gateway_errors += other.gateway_errors;
        self.unmatched += other.unmatched;
        self.missing += other.missing;
    }
}

/// Outcome of a simulation run
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub requests: usize,
    pub connections: usize,
    pub synchronous: u64,
    pub fire_and_forget: u64,
    pub rejected: u64,
    pub replies: u64,
    pub ok_replies: u64,
    pub gateway_errors: u64,
    /// Replies whose correlation id matched no outstanding request
    pub unmatched: u64,
    /// Synchronous requests that never got a reply
    pub missing: u64,
    pub elapsed_ms: u64,
    pub drained: bool,
    pub channels: Vec<(String, GatewayStatsSnapshot)>,
    pub latency: Vec<ActionLatency>,
}

/// Drive every configured channel with an echo backend and report what came back.
///
/// Returns the report and the Prometheus metrics text captured after shutdown.
pub fn simulate(
    config: &GatewayConfig,
    options: &SimulateOptions,
) -> Result<(SimulationReport, String)> {
    ensure!(options.connections > 0, "at least one connection is required");
    ensure!(!options.actions.is_empty(), "at least one action is required");

    let mut backend = LocalBackend::new();
    let delay = options.service_delay;
    for channel in config.channel_configs() {
        backend.register_service(&channel.name, channel.workers.clone(), move |msg| {
            if !delay.is_zero() {
                may::coroutine::sleep(delay);
            }
            echo_service(msg)
        });
    }
    let backend: Arc<dyn BackendTransmitter> = Arc::new(backend);
    let registry = GatewayRegistry::from_config(config, backend);
    let channels: Vec<&str> = registry.channel_names();

    // worst case a reply waits for the deadline plus the queue ahead of it
    let reply_wait = config
        .channel_configs()
        .iter()
        .map(|c| c.call_deadline)
        .max()
        .unwrap_or_default()
        + options.drain;

    info!(
        requests = options.requests,
        connections = options.connections,
        channels = channels.len(),
        "Simulation starting"
    );

    let start = Instant::now();
    let per_connection = options.requests.div_ceil(options.connections);
    let mut total = ConnectionTally::default();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..options.connections)
            .map(|conn_index| {
                let registry = &registry;
                let channels = &channels;
                scope.spawn(move || {
                    let first = conn_index * per_connection;
                    let last = options.requests.min(first + per_connection);
                    run_connection(registry, channels, options, conn_index, first..last, reply_wait)
                })
            })
            .collect();
        for handle in handles {
            match handle.join() {
                Ok(tally) => total.merge(&tally),
                Err(_) => warn!("Simulated connection thread panicked"),
            }
        }
    });

    let drained = registry.shutdown(options.drain);
    let elapsed = start.elapsed();

    let report = SimulationReport {
        requests: options.requests,
        connections: options.connections,
        synchronous: total.synchronous,
        fire_and_forget: total.fire_and_forget,
        rejected: total.rejected,
        replies: total.replies,
        ok_replies: total.ok_replies,
        gateway_errors: total.gateway_errors,
        unmatched: total.unmatched,
        missing: total.missing,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        drained,
        channels: registry.stats(),
        latency: registry.recorder().snapshot(),
    };
    info!(
        elapsed_ms = report.elapsed_ms,
        replies = report.replies,
        rejected = report.rejected,
        missing = report.missing,
        "Simulation finished"
    );
    Ok((report, registry.render_metrics()))
}

fn run_connection(
    registry: &GatewayRegistry,
    channels: &[&str],
    options: &SimulateOptions,
    conn_index: usize,
    range: std::ops::Range<usize>,
    reply_wait: Duration,
) -> ConnectionTally {
    let mut tally = ConnectionTally::default();
    let (conn, replies) = MemoryConnection::new(conn_index as u64 + 1);
    let mut outstanding = HashSet::new();

    for seq in range {
        let channel = channels[seq % channels.len()];
        let action = options.actions[seq % options.actions.len()].as_str();
        let correlation_id = seq as i64;
        let mut payload = Payload::new();
        payload.insert("seq".to_string(), json!(seq));

        match registry.dispatch(
            channel,
            connection_ref(&conn),
            InboundMessage::new(action, correlation_id, payload),
        ) {
            Ok(DispatchMode::Synchronous) => {
                tally.synchronous += 1;
                outstanding.insert(correlation_id);
            }
            Ok(DispatchMode::FireAndForget) => tally.fire_and_forget += 1,
            Err(_) => tally.rejected += 1,
        }
    }

    while !outstanding.is_empty() {
        let Ok(reply) = replies.recv_timeout(reply_wait) else {
            break;
        };
        tally.replies += 1;
        if !outstanding.remove(&reply.correlation_id) {
            tally.unmatched += 1;
        }
        match reply.state {
            StateCode::OK => tally.ok_replies += 1,
            StateCode::GATEWAY_ERROR => tally.gateway_errors += 1,
            _ => {}
        }
    }
    tally.missing = outstanding.len() as u64;
    tally
}
