//! # brrtgate
//!
//! **brrtgate** is the dispatching core of a protocol gateway: it sits between persistent client
//! connections and a set of named backend channels, powered by the `may` coroutine runtime.
//!
//! ## Overview
//!
//! Clients send action-tagged messages carrying a correlation id. For each backend channel a
//! [`gateway::ChannelGateway`] accepts those messages on the transport's receive path, hands each
//! one to a reusable [`gateway::DispatchTask`] running on a bounded pool of worker coroutines, and
//! never blocks the receive path on the backend. Synchronous actions get exactly one reply with
//! the request's correlation id; fire-and-forget actions are forwarded and never answered.
//! Every dispatch's response time is folded into a per-action running average.
//!
//! ## Architecture
//!
//! - **[`gateway`]** - Channel gateways, dispatch tasks, the task pool and the registry
//! - **[`recorder`]** - Per-action response-time statistics and Prometheus text rendering
//! - **[`backend`]** - The backend transmitter seam plus an in-process backend
//! - **[`transport`]** - Client connection handles and an in-memory connection
//! - **[`message`]** - Inbound/outbound message types and reserved state codes
//! - **[`worker_pool`]** - Bounded coroutine worker pools with load shedding
//! - **[`config`]** - YAML/JSON configuration with environment overrides
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `brrtgate` command line
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Transport
//!     participant Gateway as ChannelGateway
//!     participant Pool as TaskPool
//!     participant Worker as Worker<br/>(Coroutine)
//!     participant Backend as BackendTransmitter
//!     participant Recorder as ResponseTimeRecorder
//!
//!     Client->>Transport: {action, correlation_id, payload}
//!     Transport->>Gateway: on_message(connection, message)
//!     Gateway->>Gateway: classify(action)
//!     Gateway->>Recorder: mark(action)
//!     Gateway->>Pool: acquire()
//!     Gateway->>Worker: try_submit(task)
//!     alt Every slot taken
//!         Gateway-->>Transport: Err(Overloaded)
//!     end
//!     Gateway-->>Transport: Ok(mode)
//!
//!     alt Synchronous
//!         Worker->>Backend: call_and_wait(channel, message, deadline)
//!         alt Reply within deadline
//!             Backend-->>Worker: reply
//!         else No result
//!             Worker->>Worker: Gateway Error Response (504)
//!         end
//!         Worker->>Client: exactly one reply, same correlation_id
//!     else Fire-and-forget
//!         Worker->>Backend: send_only(channel, message)
//!     end
//!     Worker->>Recorder: complete(mark)
//!     Worker->>Pool: release(task)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use brrtgate::backend::{echo_service, BackendTransmitter, LocalBackend};
//! use brrtgate::config::GatewayConfig;
//! use brrtgate::gateway::GatewayRegistry;
//! use brrtgate::message::{InboundMessage, Payload};
//! use brrtgate::transport::{connection_ref, MemoryConnection};
//! use std::sync::Arc;
//!
//! let config = GatewayConfig::from_yaml_str("channels: [{ name: Messaging }]")?;
//! let mut backend = LocalBackend::new();
//! for channel in config.channel_configs() {
//!     backend.register_service(&channel.name, channel.workers.clone(), echo_service);
//! }
//! let backend: Arc<dyn BackendTransmitter> = Arc::new(backend);
//! let registry = GatewayRegistry::from_config(&config, backend);
//!
//! let (conn, replies) = MemoryConnection::new(1);
//! registry.dispatch(
//!     "Messaging",
//!     connection_ref(&conn),
//!     InboundMessage::new("SendText", 7, Payload::new()),
//! )?;
//! assert_eq!(replies.recv()?.correlation_id, 7);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod ids;
pub mod logging;
pub mod message;
pub mod recorder;
pub mod transport;
pub mod worker_pool;

pub use backend::BackendTransmitter;
pub use config::GatewayConfig;
pub use gateway::{ChannelGateway, DispatchError, DispatchMode, GatewayRegistry};
pub use message::{InboundMessage, OutboundMessage, StateCode};
pub use recorder::ResponseTimeRecorder;
pub use transport::{Connection, ConnectionRef};
