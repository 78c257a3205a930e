use crate::message::{CorrelationId, OutboundMessage};
use std::fmt;
use std::sync::Arc;

/// A request the gateway refused to dispatch.
///
/// Returned synchronously from the receive path; the request was never forwarded. Every
/// variant carries enough of the request to answer it with [`DispatchError::to_reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Every execution slot of the channel is taken
    Overloaded {
        channel: Arc<str>,
        action: Arc<str>,
        correlation_id: CorrelationId,
        /// Tasks queued or running when the request was refused
        in_flight: usize,
    },
    /// The gateway has been shut down and no longer accepts requests
    ShuttingDown {
        channel: Arc<str>,
        action: Arc<str>,
        correlation_id: CorrelationId,
    },
    /// The channel's worker coroutines have exited
    WorkersUnavailable {
        channel: Arc<str>,
        action: Arc<str>,
        correlation_id: CorrelationId,
    },
    /// No gateway is registered for the requested channel
    UnknownChannel {
        channel: String,
        action: Arc<str>,
        correlation_id: CorrelationId,
    },
}

impl DispatchError {
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            DispatchError::Overloaded { correlation_id, .. }
            | DispatchError::ShuttingDown { correlation_id, .. }
            | DispatchError::WorkersUnavailable { correlation_id, .. }
            | DispatchError::UnknownChannel { correlation_id, .. } => *correlation_id,
        }
    }

    #[must_use]
    pub fn action(&self) -> &Arc<str> {
        match self {
            DispatchError::Overloaded { action, .. }
            | DispatchError::ShuttingDown { action, .. }
            | DispatchError::WorkersUnavailable { action, .. }
            | DispatchError::UnknownChannel { action, .. } => action,
        }
    }

    #[must_use]
    pub fn is_overloaded(&self) -> bool {
        matches!(self, DispatchError::Overloaded { .. })
    }

    /// `503` reply a transport can send to tell the client its request was refused
    #[must_use]
    pub fn to_reply(&self) -> OutboundMessage {
        OutboundMessage::overloaded(
            Arc::clone(self.action()),
            self.correlation_id(),
            self.to_string(),
        )
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Overloaded {
                channel,
                action,
                in_flight,
                ..
            } => write!(
                f,
                "channel '{channel}' is overloaded ({in_flight} requests in flight); '{action}' was rejected"
            ),
            DispatchError::ShuttingDown {
                channel, action, ..
            } => write!(
                f,
                "channel '{channel}' is shutting down; '{action}' was rejected"
            ),
            DispatchError::WorkersUnavailable {
                channel, action, ..
            } => write!(
                f,
                "channel '{channel}' has no running workers; '{action}' was rejected"
            ),
            DispatchError::UnknownChannel {
                channel, action, ..
            } => write!(f, "unknown channel '{channel}' for '{action}'"),
        }
    }
}

impl std::error::Error for DispatchError {}
