//! # Message Module
//!
//! Decoded request and response values exchanged between the transport, the gateway and the
//! backend transmitter.
//!
//! The transport is responsible for framing; by the time a request reaches a
//! [`ChannelGateway`](crate::gateway::ChannelGateway) it has been decoded into an
//! [`InboundMessage`] with an action name, a caller-assigned correlation id and a payload map.
//! Every reply is an [`OutboundMessage`] carrying the same correlation id so that clients can
//! match replies that arrive out of order.
//!
//! ## State Codes
//!
//! | code | meaning                                                      |
//! |------|--------------------------------------------------------------|
//! | 200  | backend reply                                                |
//! | 502  | backend service fault                                        |
//! | 503  | gateway overloaded or shutting down                          |
//! | 504  | gateway error: backend unreachable or no answer before deadline |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Structured payload carried by inbound and outbound messages
pub type Payload = Map<String, Value>;

/// Caller-assigned request identifier, echoed back in every reply
pub type CorrelationId = i64;

/// State code carried by an [`OutboundMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateCode(pub u16);

impl StateCode {
    /// Backend answered normally
    pub const OK: StateCode = StateCode(200);
    /// Backend answered with a service fault
    pub const BACKEND_FAULT: StateCode = StateCode(502);
    /// Gateway refused the request (no execution slot, or shutting down)
    pub const OVERLOADED: StateCode = StateCode(503);
    /// Backend unreachable or did not answer before the deadline
    pub const GATEWAY_ERROR: StateCode = StateCode(504);

    /// Codes synthesized by the gateway itself rather than produced by a backend
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self == Self::OVERLOADED || self == Self::GATEWAY_ERROR
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One decoded client request.
///
/// Immutable once constructed: the fields are private and only exposed through accessors.
/// Cloning is cheap for the action name (`Arc<str>`), the payload is deep-copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "action")]
    action_name: Arc<str>,
    correlation_id: CorrelationId,
    #[serde(default)]
    payload: Payload,
}

impl InboundMessage {
    #[must_use]
    pub fn new(
        action_name: impl Into<Arc<str>>,
        correlation_id: CorrelationId,
        payload: Payload,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            correlation_id,
            payload,
        }
    }

    /// Decode a JSON frame of the form `{"action": .., "correlation_id": .., "payload": {..}}`
    pub fn from_json_slice(frame: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(frame)
    }

    #[inline]
    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Shared handle to the action name, used as the response-time key without reallocating
    #[inline]
    #[must_use]
    pub fn action(&self) -> &Arc<str> {
        &self.action_name
    }

    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Reply addressed to one client connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "action")]
    pub action_name: Arc<str>,
    pub correlation_id: CorrelationId,
    pub state: StateCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub payload: Payload,
}

impl OutboundMessage {
    /// Successful reply carrying a backend payload
    #[must_use]
    pub fn ok(
        action_name: impl Into<Arc<str>>,
        correlation_id: CorrelationId,
        payload: Payload,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            correlation_id,
            state: StateCode::OK,
            reason: None,
            payload,
        }
    }

    /// Reply for a backend service that failed while handling the request
    #[must_use]
    pub fn backend_fault(request: &InboundMessage, reason: impl Into<String>) -> Self {
        Self {
            action_name: Arc::clone(request.action()),
            correlation_id: request.correlation_id(),
            state: StateCode::BACKEND_FAULT,
            reason: Some(reason.into()),
            payload: Payload::new(),
        }
    }

    /// Gateway Error Response for a request whose backend call produced no result
    #[must_use]
    pub fn gateway_error(request: &InboundMessage, reason: impl Into<String>) -> Self {
        Self {
            action_name: Arc::clone(request.action()),
            correlation_id: request.correlation_id(),
            state: StateCode::GATEWAY_ERROR,
            reason: Some(reason.into()),
            payload: Payload::new(),
        }
    }

    /// Rejection reply a transport may send when the gateway refused a request
    #[must_use]
    pub fn overloaded(
        action_name: impl Into<Arc<str>>,
        correlation_id: CorrelationId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            correlation_id,
            state: StateCode::OVERLOADED,
            reason: Some(reason.into()),
            payload: Payload::new(),
        }
    }

    /// Normalize a backend reply so it is addressed to `request`.
    ///
    /// Backends are not trusted to echo the correlation id or action name; both are taken from
    /// the original request. State, reason and payload are kept.
    #[must_use]
    pub fn answering(mut self, request: &InboundMessage) -> Self {
        self.action_name = Arc::clone(request.action());
        self.correlation_id = request.correlation_id();
        self
    }

    /// Encode as a JSON frame
    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    #[test]
    fn test_inbound_decodes_json_frame() {
        let frame = br#"{"action":"SendText","correlation_id":17,"payload":{"to":"bob"}}"#;
        let msg = InboundMessage::from_json_slice(frame).unwrap();
        assert_eq!(msg.action_name(), "SendText");
        assert_eq!(msg.correlation_id(), 17);
        assert_eq!(msg.payload().get("to"), Some(&json!("bob")));
    }

    #[test]
    fn test_inbound_payload_defaults_to_empty() {
        let msg =
            InboundMessage::from_json_slice(br#"{"action":"Ping","correlation_id":1}"#).unwrap();
        assert!(msg.payload().is_empty());
    }

    #[test]
    fn test_gateway_error_keeps_request_identity() {
        let req = InboundMessage::new("Login", 99, Payload::new());
        let reply = OutboundMessage::gateway_error(&req, "no answer");
        assert_eq!(reply.correlation_id, 99);
        assert_eq!(&*reply.action_name, "Login");
        assert_eq!(reply.state, StateCode::GATEWAY_ERROR);
        assert!(reply.state.is_reserved());
        assert_eq!(reply.reason.as_deref(), Some("no answer"));
    }

    #[test]
    fn test_answering_overrides_backend_identity() {
        let req = InboundMessage::new("Fetch", 5, Payload::new());
        let backend = OutboundMessage::ok("Other", 12345, payload(json!({"k": 1})));
        let reply = backend.answering(&req);
        assert_eq!(reply.correlation_id, 5);
        assert_eq!(&*reply.action_name, "Fetch");
        assert_eq!(reply.state, StateCode::OK);
        assert_eq!(reply.payload.get("k"), Some(&json!(1)));
    }

    #[test]
    fn test_outbound_json_omits_missing_reason() {
        let reply = OutboundMessage::ok("Ping", 3, Payload::new());
        let text = String::from_utf8(reply.to_json_vec().unwrap()).unwrap();
        assert!(!text.contains("reason"));
        assert!(text.contains("\"state\":200"));
    }

    #[test]
    fn test_state_code_classification() {
        assert!(StateCode::OK.is_success());
        assert!(!StateCode::OK.is_reserved());
        assert!(!StateCode::BACKEND_FAULT.is_success());
        assert!(!StateCode::BACKEND_FAULT.is_reserved());
        assert!(StateCode::OVERLOADED.is_reserved());
    }
}
