//! # Backend Module
//!
//! The [`BackendTransmitter`] trait is the gateway's only way to reach backend services.
//! Gateways never know how a channel is served; they hand the transmitter a channel name and
//! a message and either wait for a reply (synchronous actions) or return immediately
//! (fire-and-forget actions).
//!
//! [`LocalBackend`] is the in-process implementation: each channel is served by a named service
//! function running on its own pool of worker coroutines. Transports that forward to remote
//! services implement the trait themselves.

mod echo;
mod local;

pub use echo::echo_service;
pub use local::{LocalBackend, ServiceFn};

use crate::message::{InboundMessage, OutboundMessage};
use std::time::Duration;

/// Outbound primitives used by dispatch tasks to reach backend services
pub trait BackendTransmitter: Send + Sync {
    /// Forward `message` to `channel` and wait for its reply.
    ///
    /// Implementations must return within `deadline`: the gateway does not interrupt a call, so
    /// a transmitter that ignores the deadline holds one of the channel's worker coroutines
    /// until it returns. Overruns are logged by the caller.
    ///
    /// `None` means the backend was unreachable or did not answer in time; the caller then
    /// answers the client with a gateway error.
    fn call_and_wait(
        &self,
        channel: &str,
        message: &InboundMessage,
        deadline: Duration,
    ) -> Option<OutboundMessage>;

    /// Forward `message` to `channel` without waiting for any outcome
    fn send_only(&self, channel: &str, message: &InboundMessage);
}
