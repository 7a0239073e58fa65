//! JSON envelopes for the bidirectional channel protocol.
//!
//! Every channel frame is a UTF-8 JSON text frame holding one object.
//!
//! ```text
//! client → server   {"msgid": 7, "msg": "setdevice", "name": "lamp", ...}
//! server → client   {"msgid": 7, "msg": "ack", ...result}
//!                   {"msgid": 7, "msg": "nack", "error": "invalid arguments"}
//! server push       {"msg": "devicechanged", ...payload}        (no msgid)
//! ```
//!
//! A frame that is not an object with a non-negative integer `msgid` and a
//! string `msg` is a [`ProtocolViolation`]; the channel session answers it by
//! closing the connection rather than with a `nack`.

use serde_json::{Map, Value};
use thiserror::Error;

/// Reason string attached to the close frame sent for a protocol violation.
pub const BAD_PAYLOAD_REASON: &str = "bad payload";

/// A malformed channel frame.
///
/// These are per-message faults that terminate the offending session.  They
/// are never reported in-band.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolViolation {
    /// The text frame is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    /// The frame parsed but is not a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// `msgid` is absent or not a non-negative integer.
    #[error("missing or invalid \"msgid\"")]
    InvalidMsgId,

    /// `msg` is absent or not a string.
    #[error("missing or invalid \"msg\"")]
    InvalidCommand,

    /// A binary (or otherwise non-text) frame arrived.
    #[error("unexpected non-text frame")]
    NonTextFrame,

    /// A text frame whose payload is not valid UTF-8.
    #[error("text frame is not valid UTF-8")]
    InvalidUtf8,
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// A validated inbound channel request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRequest {
    /// Correlation id copied verbatim into the response.
    pub msgid: u64,
    /// Command name looked up in the dispatch table.
    pub command: String,
    /// The full request object, including `msgid` and `msg`.
    pub params: Map<String, Value>,
}

impl ChannelRequest {
    /// Parses and validates one complete text message.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] describing the first check that failed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use homegw_core::ChannelRequest;
    ///
    /// let req = ChannelRequest::parse(r#"{"msgid":3,"msg":"ping"}"#).unwrap();
    /// assert_eq!(req.msgid, 3);
    /// assert_eq!(req.command, "ping");
    /// ```
    pub fn parse(text: &str) -> Result<Self, ProtocolViolation> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolViolation::InvalidJson(e.to_string()))?;

        let Value::Object(params) = value else {
            return Err(ProtocolViolation::NotAnObject);
        };

        // `as_u64` rejects negative numbers and floats.
        let msgid = params
            .get("msgid")
            .and_then(Value::as_u64)
            .ok_or(ProtocolViolation::InvalidMsgId)?;

        let command = params
            .get("msg")
            .and_then(Value::as_str)
            .ok_or(ProtocolViolation::InvalidCommand)?
            .to_string();

        Ok(Self {
            msgid,
            command,
            params,
        })
    }

    /// Returns the named parameter, if present.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Returns the named parameter as a string slice, if it is a string.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// The reply to exactly one [`ChannelRequest`].
///
/// A response starts out as an `ack`.  Handlers add result fields with
/// [`insert`](Self::insert) or turn it into a `nack` with [`fail`](Self::fail).
/// The `msgid`, `msg` and `error` keys are owned by the envelope: a handler
/// inserting a field with one of those names cannot override them.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    msgid: u64,
    error: Option<Value>,
    fields: Map<String, Value>,
}

impl CommandResponse {
    /// Creates an `ack` response for the request with `msgid`.
    pub fn new(msgid: u64) -> Self {
        Self {
            msgid,
            error: None,
            fields: Map::new(),
        }
    }

    /// The correlation id this response answers.
    pub fn msgid(&self) -> u64 {
        self.msgid
    }

    /// Returns `true` unless [`fail`](Self::fail) has been called.
    pub fn is_ack(&self) -> bool {
        self.error.is_none()
    }

    /// Adds a result field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Marks the response as a `nack` carrying `error` (a code or a list).
    pub fn fail(&mut self, error: impl Into<Value>) {
        self.error = Some(error.into());
    }

    /// Builds the JSON object sent on the wire.
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("msgid".to_string(), Value::from(self.msgid));
        match &self.error {
            None => {
                object.insert("msg".to_string(), Value::from("ack"));
                object.remove("error");
            }
            Some(error) => {
                object.insert("msg".to_string(), Value::from("nack"));
                object.insert("error".to_string(), error.clone());
            }
        }
        Value::Object(object)
    }

    /// Serializes the response into a text-frame payload.
    pub fn to_text(&self) -> String {
        self.to_json().to_string()
    }
}

// ── Push events ───────────────────────────────────────────────────────────────

/// A server-initiated notification fanned out to every channel.
///
/// Push events never carry a `msgid`; clients tell them apart from responses
/// by its absence.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    name: String,
    payload: Map<String, Value>,
}

impl PushEvent {
    /// Creates an event named `name` with an empty payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// The event name carried in `msg`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds the JSON object sent on the wire.
    pub fn to_json(&self) -> Value {
        let mut object = self.payload.clone();
        object.remove("msgid");
        object.insert("msg".to_string(), Value::from(self.name.clone()));
        Value::Object(object)
    }

    /// Serializes the event into a text-frame payload.
    pub fn to_text(&self) -> String {
        self.to_json().to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accepts_minimal_request() {
        // Arrange
        let text = r#"{"msgid":1,"msg":"nonexistent"}"#;

        // Act
        let req = ChannelRequest::parse(text).unwrap();

        // Assert
        assert_eq!(req.msgid, 1);
        assert_eq!(req.command, "nonexistent");
    }

    #[test]
    fn test_parse_keeps_extra_params() {
        let req =
            ChannelRequest::parse(r#"{"msgid":9,"msg":"setdevice","name":"lamp","state":true}"#)
                .unwrap();
        assert_eq!(req.str_param("name"), Some("lamp"));
        assert_eq!(req.param("state"), Some(&json!(true)));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let result = ChannelRequest::parse("hello there");
        assert!(matches!(result, Err(ProtocolViolation::InvalidJson(_))));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert_eq!(
            ChannelRequest::parse("[1,2,3]"),
            Err(ProtocolViolation::NotAnObject)
        );
    }

    #[test]
    fn test_parse_rejects_negative_msgid() {
        assert_eq!(
            ChannelRequest::parse(r#"{"msgid":-1,"msg":"ping"}"#),
            Err(ProtocolViolation::InvalidMsgId)
        );
    }

    #[test]
    fn test_parse_rejects_string_msgid() {
        assert_eq!(
            ChannelRequest::parse(r#"{"msgid":"1","msg":"ping"}"#),
            Err(ProtocolViolation::InvalidMsgId)
        );
    }

    #[test]
    fn test_parse_rejects_missing_msg() {
        assert_eq!(
            ChannelRequest::parse(r#"{"msgid":1}"#),
            Err(ProtocolViolation::InvalidCommand)
        );
    }

    #[test]
    fn test_parse_accepts_msgid_at_u64_max() {
        let req = ChannelRequest::parse(r#"{"msgid":18446744073709551615,"msg":"x"}"#).unwrap();
        assert_eq!(req.msgid, u64::MAX);
    }

    #[test]
    fn test_new_response_is_ack_with_msgid() {
        let resp = CommandResponse::new(42);
        assert!(resp.is_ack());
        assert_eq!(resp.to_json(), json!({"msgid": 42, "msg": "ack"}));
    }

    #[test]
    fn test_failed_response_is_nack_with_error() {
        // Arrange
        let mut resp = CommandResponse::new(1);

        // Act
        resp.fail("invalid arguments");

        // Assert
        assert_eq!(
            resp.to_json(),
            json!({"msgid": 1, "msg": "nack", "error": "invalid arguments"})
        );
    }

    #[test]
    fn test_handler_fields_cannot_override_envelope_keys() {
        // Arrange: a handler tries to smuggle its own msgid and msg
        let mut resp = CommandResponse::new(5);
        resp.insert("msgid", 999);
        resp.insert("msg", "hijack");
        resp.insert("result", 3);

        // Act
        let json = resp.to_json();

        // Assert
        assert_eq!(json["msgid"], 5);
        assert_eq!(json["msg"], "ack");
        assert_eq!(json["result"], 3);
    }

    #[test]
    fn test_push_event_has_no_msgid() {
        // Arrange
        let event = PushEvent::new("devicechanged")
            .with("name", "lamp")
            .with("msgid", 3);

        // Act
        let json = event.to_json();

        // Assert
        assert_eq!(json, json!({"msg": "devicechanged", "name": "lamp"}));
    }

    #[test]
    fn test_to_text_is_compact_json() {
        let text = PushEvent::new("hello").to_text();
        assert_eq!(text, r#"{"msg":"hello"}"#);
    }
}
