//! # Transport Module
//!
//! The gateway does not own sockets. The surrounding transport layer accepts connections,
//! decodes frames and hands each request to the gateway together with a [`ConnectionRef`].
//! The gateway answers through [`Connection::send`].
//!
//! A [`ConnectionRef`] is a `Weak` handle: an in-flight dispatch never keeps a client connection
//! alive. If the client is gone by the time the reply is ready, the upgrade fails and the reply
//! is dropped.
//!
//! [`MemoryConnection`] is an in-process connection that delivers replies to a `may` channel.
//! It backs the CLI simulator and the test-suite, and is a convenient adapter for transports
//! that already run a writer coroutine per connection.

use crate::message::OutboundMessage;
use may::sync::mpsc;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Transport-assigned connection identifier
pub type ConnectionId = u64;

/// A client connection able to receive replies
pub trait Connection: Send + Sync {
    /// Identifier used in log fields
    fn id(&self) -> ConnectionId;

    /// Queue one reply for delivery to the client
    fn send(&self, reply: OutboundMessage) -> Result<(), TransportError>;
}

/// Non-owning handle to a client connection
pub type ConnectionRef = Weak<dyn Connection>;

/// Downgrade an owned connection into the handle the gateway expects
#[must_use]
pub fn connection_ref<C: Connection + 'static>(connection: &Arc<C>) -> ConnectionRef {
    Arc::downgrade(connection) as Weak<dyn Connection>
}

/// Errors reported by a [`Connection`] while delivering a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection was closed by the client or the transport
    Closed {
        /// Connection the reply was addressed to
        connection_id: ConnectionId,
    },
    /// The transport failed to queue the frame
    Send {
        /// Connection the reply was addressed to
        connection_id: ConnectionId,
        /// Transport-specific description
        message: String,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed { connection_id } => {
                write!(f, "connection {connection_id} is closed")
            }
            TransportError::Send {
                connection_id,
                message,
            } => write!(f, "failed to send on connection {connection_id}: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// In-process connection delivering replies to a `may` channel receiver
pub struct MemoryConnection {
    id: ConnectionId,
    tx: mpsc::Sender<OutboundMessage>,
    sent: AtomicU64,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Create a connection and the receiver its replies are delivered to
    #[must_use]
    pub fn new(id: ConnectionId) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel();
        let conn = Arc::new(Self {
            id,
            tx,
            sent: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        (conn, rx)
    }

    /// Number of replies accepted for delivery
    #[must_use]
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Refuse any further replies
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, reply: OutboundMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed {
                connection_id: self.id,
            });
        }
        self.tx.send(reply).map_err(|e| TransportError::Send {
            connection_id: self.id,
            message: e.to_string(),
        })?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id)
            .field("sent", &self.sent_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;

    #[test]
    fn test_memory_connection_delivers_and_counts() {
        let (conn, rx) = MemoryConnection::new(7);
        conn.send(OutboundMessage::ok("Ping", 1, Payload::new()))
            .unwrap();
        assert_eq!(conn.sent_count(), 1);
        assert_eq!(rx.recv().unwrap().correlation_id, 1);
    }

    #[test]
    fn test_closed_connection_refuses_replies() {
        let (conn, _rx) = MemoryConnection::new(3);
        conn.close();
        let err = conn
            .send(OutboundMessage::ok("Ping", 1, Payload::new()))
            .unwrap_err();
        assert_eq!(err, TransportError::Closed { connection_id: 3 });
        assert_eq!(conn.sent_count(), 0);
    }

    #[test]
    fn test_connection_ref_does_not_extend_lifetime() {
        let (conn, _rx) = MemoryConnection::new(1);
        let weak = connection_ref(&conn);
        assert!(weak.upgrade().is_some());
        drop(conn);
        assert!(weak.upgrade().is_none());
    }
}
