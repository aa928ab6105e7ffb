//! Integration tests for the rpclink-core wire format.
//!
//! These tests feed raw datagrams, exactly as an rpclink server would put them
//! on the network, through the public codec API and check which
//! [`WireMessage`] variant comes out.

use rpclink_core::{
    decode_datagram, decode_value, encode_message, DiscoveryRequest, MessageKind, ProtocolError,
    WireMessage,
};
use serde_json::json;

#[test]
fn test_server_response_with_proof_fields_decodes() {
    // Arrange: a response from a server configured with a shared secret
    let bytes = br#"{"name":"db","port":7000,"encrypted":"c2VjcmV0","hash":"abcd"}"#;

    // Act
    let msg = decode_datagram(bytes).expect("decode must succeed");

    // Assert
    let WireMessage::DiscoveryResponse(resp) = msg else {
        panic!("expected a discovery response");
    };
    assert_eq!(resp.name, "db");
    assert_eq!(resp.encrypted.as_deref(), Some("c2VjcmV0"));
    assert_eq!(resp.hash.as_deref(), Some("abcd"));
}

#[test]
fn test_server_response_with_extra_fields_still_decodes() {
    // Servers may add fields the client does not know about.
    let msg = decode_datagram(br#"{"name":"db","port":7000,"pid":4242}"#).unwrap();
    assert_eq!(msg.kind(), MessageKind::DiscoveryResponse);
}

#[test]
fn test_client_request_encodes_to_where_object() {
    // Arrange
    let req = WireMessage::DiscoveryRequest(DiscoveryRequest::new("db"));

    // Act
    let bytes = encode_message(&req).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    // Assert
    assert_eq!(value, json!({ "where": "db" }));
}

#[test]
fn test_own_broadcast_echo_is_classified_as_request() {
    // A client on the same host can receive its own broadcast; it must not be
    // mistaken for a response.
    let msg = decode_datagram(br#"{"where":"db"}"#).unwrap();
    assert_eq!(msg.kind(), MessageKind::DiscoveryRequest);
}

#[test]
fn test_handshake_from_server_is_recognised() {
    let msg = decode_value(json!({ "name": "connectSuccess" })).unwrap();
    assert_eq!(msg, WireMessage::Handshake);
}

#[test]
fn test_garbage_datagram_is_rejected_without_panic() {
    let result = decode_datagram(&[0xff, 0x00, 0x13, 0x37]);
    assert!(matches!(result, Err(ProtocolError::InvalidJson(_))));
}

#[test]
fn test_response_missing_port_is_application_message() {
    // Without a port, a named object is not a discovery response.
    let msg = decode_datagram(br#"{"name":"db"}"#).unwrap();
    assert_eq!(msg.kind(), MessageKind::Application);
}
