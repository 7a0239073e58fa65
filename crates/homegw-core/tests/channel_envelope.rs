//! Integration tests for the channel envelope through the crate's public API.
//!
//! These mirror how the gateway uses the envelope: parse an inbound frame,
//! build the response from the parsed `msgid`, and serialize it back to text.

use homegw_core::{ChannelRequest, CommandResponse, ProtocolViolation, PushEvent};
use serde_json::Value;

/// The response to any parsed request carries the request's `msgid`.
#[test]
fn test_response_msgid_matches_request_for_many_ids() {
    for msgid in [0u64, 1, 42, 1 << 40, u64::MAX] {
        // Arrange
        let frame = format!(r#"{{"msgid":{msgid},"msg":"anything"}}"#);
        let request = ChannelRequest::parse(&frame).unwrap();

        // Act
        let text = CommandResponse::new(request.msgid).to_text();
        let echoed: Value = serde_json::from_str(&text).unwrap();

        // Assert
        assert_eq!(echoed["msgid"].as_u64(), Some(msgid));
    }
}

/// Push events and responses are distinguishable by the presence of `msgid`.
#[test]
fn test_push_events_and_responses_are_distinguishable() {
    let push: Value = serde_json::from_str(&PushEvent::new("devicechanged").to_text()).unwrap();
    let resp: Value = serde_json::from_str(&CommandResponse::new(3).to_text()).unwrap();

    assert!(push.get("msgid").is_none());
    assert!(resp.get("msgid").is_some());
}

/// Every violation renders a human-readable reason for the close frame.
#[test]
fn test_violations_render_reason_strings() {
    let reasons = [
        ProtocolViolation::NotAnObject.to_string(),
        ProtocolViolation::InvalidMsgId.to_string(),
        ProtocolViolation::InvalidCommand.to_string(),
        ProtocolViolation::NonTextFrame.to_string(),
        ProtocolViolation::InvalidUtf8.to_string(),
    ];
    for reason in reasons {
        assert!(!reason.is_empty());
        // Close-frame reasons are limited to 123 bytes by RFC 6455.
        assert!(reason.len() <= 123, "reason too long: {reason}");
    }
}

/// A nack with a list of error codes serializes the list unchanged.
#[test]
fn test_nack_with_error_list() {
    let mut resp = CommandResponse::new(8);
    resp.fail(vec!["name", "state"]);

    let json = resp.to_json();

    assert_eq!(json["msg"], "nack");
    assert_eq!(json["error"], serde_json::json!(["name", "state"]));
}
