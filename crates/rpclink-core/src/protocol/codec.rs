//! JSON codec for rpclink messages.
//!
//! Wire format: one JSON object per datagram (discovery) or per framed link
//! message (transport).  Byte framing on the link is owned by the transport;
//! this module only turns bytes or JSON values into [`WireMessage`]s.
//!
//! # Classification order
//!
//! ```text
//! has "where"                   -> DiscoveryRequest
//! "name" == "connectSuccess"    -> Handshake
//! has "name" and "port"         -> DiscoveryResponse
//! any other object              -> Application
//! ```
//!
//! Anything that is not a JSON object is rejected.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{DiscoveryResponse, MessageKind, WireMessage, HANDSHAKE_NAME};

/// Errors that can occur while decoding or encoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The bytes are not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// The object was recognised as `kind` but a field is missing or invalid.
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    /// A well-formed message arrived where a different kind was required.
    #[error("unexpected {0} message")]
    Unexpected(MessageKind),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one datagram into a [`WireMessage`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are not a JSON object or a
/// recognised message has invalid fields.
///
/// # Examples
///
/// ```rust
/// use rpclink_core::protocol::{decode_datagram, WireMessage};
///
/// let msg = decode_datagram(br#"{"name":"db","port":7000}"#).unwrap();
/// assert!(matches!(msg, WireMessage::DiscoveryResponse(r) if r.port == 7000));
/// ```
pub fn decode_datagram(bytes: &[u8]) -> Result<WireMessage, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::InvalidJson)?;
    decode_value(value)
}

/// Decodes one datagram that must be a discovery response.
///
/// # Errors
///
/// Returns [`ProtocolError::Unexpected`] when the datagram is a well-formed
/// message of another kind, otherwise the same errors as [`decode_datagram`].
pub fn decode_response(bytes: &[u8]) -> Result<DiscoveryResponse, ProtocolError> {
    match decode_datagram(bytes)? {
        WireMessage::DiscoveryResponse(response) => Ok(response),
        other => Err(ProtocolError::Unexpected(other.kind())),
    }
}

/// Classifies an already-parsed JSON value into a [`WireMessage`].
///
/// # Errors
///
/// Returns [`ProtocolError::NotAnObject`] for non-object values and
/// [`ProtocolError::Malformed`] when a recognised message has bad fields.
pub fn decode_value(value: Value) -> Result<WireMessage, ProtocolError> {
    let Value::Object(map) = &value else {
        return Err(ProtocolError::NotAnObject(json_type_name(&value)));
    };

    if map.contains_key("where") {
        return serde_json::from_value(value)
            .map(WireMessage::DiscoveryRequest)
            .map_err(|source| ProtocolError::Malformed {
                kind: MessageKind::DiscoveryRequest,
                source,
            });
    }

    if map.get("name").and_then(Value::as_str) == Some(HANDSHAKE_NAME) {
        return Ok(WireMessage::Handshake);
    }

    if map.contains_key("name") && map.contains_key("port") {
        return serde_json::from_value(value)
            .map(WireMessage::DiscoveryResponse)
            .map_err(|source| ProtocolError::Malformed {
                kind: MessageKind::DiscoveryResponse,
                source,
            });
    }

    Ok(WireMessage::Application(value))
}

/// Encodes a [`WireMessage`] into the bytes of a single JSON object.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    let value = msg.to_value().map_err(ProtocolError::Encode)?;
    serde_json::to_vec(&value).map_err(ProtocolError::Encode)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::DiscoveryRequest;
    use serde_json::json;

    #[test]
    fn test_decode_datagram_recognises_discovery_response() {
        // Arrange
        let bytes = br#"{"name":"db","port":7000}"#;

        // Act
        let msg = decode_datagram(bytes).unwrap();

        // Assert
        match msg {
            WireMessage::DiscoveryResponse(resp) => {
                assert_eq!(resp.name, "db");
                assert_eq!(resp.port, 7000);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_datagram_recognises_discovery_request() {
        let msg = decode_datagram(br#"{"where":"cache"}"#).unwrap();
        assert_eq!(msg, WireMessage::DiscoveryRequest(DiscoveryRequest::new("cache")));
    }

    #[test]
    fn test_decode_value_recognises_handshake_before_response() {
        // A handshake carrying a port field is still a handshake.
        let msg = decode_value(json!({ "name": "connectSuccess", "port": 1 })).unwrap();
        assert_eq!(msg, WireMessage::Handshake);
    }

    #[test]
    fn test_decode_value_passes_other_objects_through_as_application() {
        let value = json!({ "name": "query", "args": [1, 2] });
        let msg = decode_value(value.clone()).unwrap();
        assert_eq!(msg, WireMessage::Application(value));
    }

    #[test]
    fn test_decode_datagram_rejects_invalid_json() {
        let result = decode_datagram(b"{not json");
        assert!(matches!(result, Err(ProtocolError::InvalidJson(_))));
    }

    #[test]
    fn test_decode_value_rejects_non_object() {
        let result = decode_value(json!([1, 2, 3]));
        assert!(matches!(result, Err(ProtocolError::NotAnObject("array"))));
    }

    #[test]
    fn test_decode_datagram_rejects_response_with_out_of_range_port() {
        let result = decode_datagram(br#"{"name":"db","port":70000}"#);
        assert!(matches!(
            result,
            Err(ProtocolError::Malformed {
                kind: MessageKind::DiscoveryResponse,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_datagram_rejects_response_with_string_port() {
        let result = decode_datagram(br#"{"name":"db","port":"7000"}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed { .. })));
    }

    #[test]
    fn test_decode_response_rejects_other_kinds_as_unexpected() {
        let request = decode_response(br#"{"where":"db"}"#);
        let handshake = decode_response(br#"{"name":"connectSuccess"}"#);

        assert!(matches!(
            request,
            Err(ProtocolError::Unexpected(MessageKind::DiscoveryRequest))
        ));
        assert!(matches!(
            handshake,
            Err(ProtocolError::Unexpected(MessageKind::Handshake))
        ));
    }

    #[test]
    fn test_decode_response_accepts_response() {
        let response = decode_response(br#"{"name":"db","port":7000}"#).unwrap();

        assert_eq!(response.port, 7000);
    }

    #[test]
    fn test_encode_message_handshake_decodes_back_to_handshake() {
        let bytes = encode_message(&WireMessage::Handshake).unwrap();
        assert_eq!(decode_datagram(&bytes).unwrap(), WireMessage::Handshake);
    }

    #[test]
    fn test_encode_message_request_omits_absent_proof() {
        let bytes = encode_message(&WireMessage::DiscoveryRequest(DiscoveryRequest::new("db")))
            .unwrap();
        assert_eq!(bytes, br#"{"where":"db"}"#.to_vec());
    }
}
