use crate::message::{InboundMessage, Payload};
use serde_json::Value;

/// Built-in service that echoes the request back to the caller
pub fn echo_service(message: &InboundMessage) -> anyhow::Result<Payload> {
    let mut reply = Payload::new();
    reply.insert(
        "action".to_string(),
        Value::String(message.action_name().to_string()),
    );
    reply.insert(
        "correlation_id".to_string(),
        Value::from(message.correlation_id()),
    );
    reply.insert("echo".to_string(), Value::Object(message.payload().clone()));
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_echo_service_reflects_request() {
        let mut payload = Payload::new();
        payload.insert("text".to_string(), json!("hi"));
        let msg = InboundMessage::new("SendText", 4, payload);
        let reply = echo_service(&msg).unwrap();
        assert_eq!(reply["action"], json!("SendText"));
        assert_eq!(reply["correlation_id"], json!(4));
        assert_eq!(reply["echo"]["text"], json!("hi"));
    }
}
