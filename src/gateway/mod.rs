//! # Gateway Module
//!
//! Receive-side dispatching between client connections and backend channels.
//!
//! ## Overview
//!
//! A [`ChannelGateway`] fronts one backend channel. For every inbound request it:
//!
//! 1. Classifies the action as synchronous or fire-and-forget ([`ActionTable`])
//! 2. Takes a response-time mark on the shared [`ResponseTimeRecorder`](crate::recorder::ResponseTimeRecorder)
//! 3. Acquires a [`DispatchTask`] from its [`TaskPool`] and loads the request into it
//! 4. Hands the task to a bounded worker pool, or rejects the request if every slot is taken
//!
//! A worker then runs the task: synchronous actions call the backend with the channel's
//! deadline and send exactly one reply (the backend's, or a Gateway Error Response carrying the
//! request's correlation id); fire-and-forget actions are forwarded and never answered. Either
//! way the response time is recorded and the task goes back to the pool.
//!
//! ## Concurrency
//!
//! The receive path never blocks on the backend. Tasks move between the pool and the workers
//! by value, so one request's connection handle and payload are never visible to another.
//! The fire-and-forget table sits behind an `ArcSwap` and can be replaced at runtime.
//!
//! [`GatewayRegistry`] owns one gateway per configured channel.

mod core;
mod error;
mod pool;
mod registry;
mod stats;
mod task;

pub use core::{
    ActionTable, ChannelConfig, ChannelGateway, DEFAULT_CALL_DEADLINE, MAX_CALL_DEADLINE,
};
pub use error::DispatchError;
pub use pool::{TaskPool, DEFAULT_MAX_IDLE_TASKS};
pub use registry::GatewayRegistry;
pub use stats::{GatewayStats, GatewayStatsSnapshot};
pub use task::{DispatchMode, DispatchOutcome, DispatchTask, TaskContext, TaskState};
