use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one channel gateway
///
/// Relaxed atomics: the counters are monotonic and only read for monitoring.
#[derive(Debug, Default)]
pub struct GatewayStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    replies_sent: AtomicU64,
    gateway_errors: AtomicU64,
    forwarded: AtomicU64,
    internal_faults: AtomicU64,
    undeliverable: AtomicU64,
}

/// Point-in-time copy of [`GatewayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStatsSnapshot {
    /// Messages handed to the execution pool
    pub accepted: u64,
    /// Messages refused (overloaded, shutting down, no workers)
    pub rejected: u64,
    /// Replies accepted by the client connection
    pub replies_sent: u64,
    /// Gateway Error Responses built because the backend gave no result
    pub gateway_errors: u64,
    /// Fire-and-forget messages passed to the backend
    pub forwarded: u64,
    /// Failures caught at the task boundary
    pub internal_faults: u64,
    /// Replies dropped because the connection was gone or refused them
    pub undeliverable: u64,
}

impl GatewayStats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reply(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gateway_error(&self) {
        self.gateway_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_internal_fault(&self) {
        self.internal_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_undeliverable(&self) {
        self.undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            gateway_errors: self.gateway_errors.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            internal_faults: self.internal_faults.load(Ordering::Relaxed),
            undeliverable: self.undeliverable.load(Ordering::Relaxed),
        }
    }
}
