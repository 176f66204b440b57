//! Incoming message parsing.
//!
//! One pure function classifies each frame read off the transport into an
//! event or a command response. BiDi responses, which travel as
//! `Runtime.bindingCalled` events, are recognized here and their payload
//! is decoded in place so that downstream listeners never redo the parse.
//!
//! # Format
//!
//! | Shape | Classified as |
//! |-------|---------------|
//! | `{"method": m, "params": {...}, "sessionId"?: s}` | [`InspectorMessage::Event`] |
//! | `{"id": n, "result"?: {...}, "error"?: {...}, "sessionId"?: s}` | [`InspectorMessage::Response`] |
//!
//! A response with neither `result` nor `error` yields an empty result
//! object; `Tracing.start` and `Tracing.end` respond that way.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::command::MAX_CHANNEL_COUNT;

// ============================================================================
// Constants
// ============================================================================

/// Event carrying tunnelled BiDi traffic.
const BIDI_EVENT_METHOD: &str = "Runtime.bindingCalled";

/// Binding name marking a BiDi response.
const BIDI_RESPONSE_BINDING: &str = "sendBidiResponse";

// ============================================================================
// Types
// ============================================================================

/// Replaceable parser, the testing seam for the event pump.
///
/// `expected_id` is the command id the pump is waiting for, or `-1`; the
/// default parser ignores it.
pub type ParserFunc = Box<dyn Fn(&str, i64) -> Option<InspectorMessage>>;

/// An asynchronous event from the remote end.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectorEvent {
    /// Event name in `Domain.event` format.
    pub method: String,
    /// Event payload; always an object.
    pub params: Value,
}

/// A response to a previously sent command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectorCommandResponse {
    /// Id of the command this responds to.
    pub id: i64,
    /// Result object on success.
    pub result: Option<Value>,
    /// Raw error JSON on failure; empty when `result` is set.
    pub error: String,
}

/// A classified incoming frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectorMessage {
    /// An event, addressed to the session it names.
    Event {
        /// Originating session; empty for the root's own session.
        session_id: String,
        /// The event itself.
        event: InspectorEvent,
    },
    /// A command response, addressed to the session it names.
    Response {
        /// Originating session; empty for the root's own session.
        session_id: String,
        /// The response itself.
        response: InspectorCommandResponse,
    },
}

impl InspectorMessage {
    /// Returns the session the frame is addressed to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Event { session_id, .. } | Self::Response { session_id, .. } => session_id,
        }
    }
}

// ============================================================================
// Raw Shape
// ============================================================================

/// Undiscriminated frame shape as read off the wire.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default, rename = "sessionId")]
    session_id: String,
    id: Option<i64>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<Value>,
}

// ============================================================================
// Parser
// ============================================================================

/// Parses one frame into an event or a command response.
///
/// Returns `None` for anything that is neither: non-JSON input, frames
/// without `method` or integer `id`, and BiDi frames whose payload cannot
/// be decoded.
pub fn parse_inspector_message(message: &str, _expected_id: i64) -> Option<InspectorMessage> {
    let raw: RawMessage = serde_json::from_str(message).ok()?;

    match raw.id {
        None => {
            let method = raw.method?;
            // Non-object params are treated the same as absent ones; the
            // BiDi check applies only when params actually came in.
            let params = match raw.params.filter(Value::is_object) {
                Some(mut params) => {
                    if is_bidi_message(&method, &params)? {
                        decode_bidi_payload(&mut params)?;
                    }
                    params
                }
                None => empty_object(),
            };

            Some(InspectorMessage::Event {
                session_id: raw.session_id,
                event: InspectorEvent { method, params },
            })
        }
        Some(id) => {
            let mut response = InspectorCommandResponse {
                id,
                ..Default::default()
            };
            if let Some(result) = raw.result.filter(Value::is_object) {
                response.result = Some(result);
            } else if let Some(error) = raw.error.filter(Value::is_object) {
                response.error = error.to_string();
            } else {
                response.result = Some(empty_object());
            }
            Some(InspectorMessage::Response {
                session_id: raw.session_id,
                response,
            })
        }
    }
}

/// Decides whether an event is a tunnelled BiDi response.
///
/// Returns `None` when the event claims to be a binding call but carries
/// no binding name.
fn is_bidi_message(method: &str, params: &Value) -> Option<bool> {
    if method != BIDI_EVENT_METHOD {
        return Some(false);
    }
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        warn!("name is missing in the {BIDI_EVENT_METHOD} params");
        return None;
    };
    Some(name == BIDI_RESPONSE_BINDING)
}

/// Decodes the BiDi payload string and replaces it in place.
///
/// A payload carrying an `id` is a BiDi command response whose id was
/// multiplied onto a channel on the way out; the caller's original id is
/// restored here.
fn decode_bidi_payload(params: &mut Value) -> Option<()> {
    let Some(payload) = params.get("payload").and_then(Value::as_str) else {
        warn!("payload is missing in the {BIDI_EVENT_METHOD} params");
        return None;
    };
    let mut decoded: Value = match serde_json::from_str(payload) {
        Ok(value @ Value::Object(_)) => value,
        _ => {
            warn!("unable to deserialize the BiDi payload");
            return None;
        }
    };
    if let Some(cmd_id) = decoded.get("id").and_then(Value::as_i64) {
        // The channel in the low bits is reserved for future use.
        decoded["id"] = Value::from(cmd_id / MAX_CHANNEL_COUNT);
    }
    params["payload"] = decoded;
    Some(())
}

/// A fresh empty JSON object.
fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(message: &str) -> Option<InspectorMessage> {
        parse_inspector_message(message, -1)
    }

    #[test]
    fn test_non_json() {
        assert!(parse("hi").is_none());
    }

    #[test]
    fn test_neither_command_nor_event() {
        assert!(parse("{}").is_none());
    }

    #[test]
    fn test_event_no_params() {
        let Some(InspectorMessage::Event { session_id, event }) = parse("{\"method\":\"method\"}")
        else {
            panic!("expected event");
        };
        assert_eq!(session_id, "");
        assert_eq!(event.method, "method");
        assert_eq!(event.params, json!({}));
    }

    #[test]
    fn test_event_with_session_id() {
        let Some(InspectorMessage::Event { session_id, .. }) =
            parse("{\"method\":\"method\",\"sessionId\":\"B221AF2\"}")
        else {
            panic!("expected event");
        };
        assert_eq!(session_id, "B221AF2");
    }

    #[test]
    fn test_event_with_params() {
        let Some(InspectorMessage::Event { session_id, event }) =
            parse("{\"method\":\"method\",\"params\":{\"key\":100},\"sessionId\":\"AB3A\"}")
        else {
            panic!("expected event");
        };
        assert_eq!(session_id, "AB3A");
        assert_eq!(event.params["key"], json!(100));
    }

    #[test]
    fn test_response_without_result_or_error() {
        // DevTools does not return a result dictionary for every valid
        // response; Tracing.start and Tracing.end respond bare.
        let Some(InspectorMessage::Response {
            session_id,
            response,
        }) = parse("{\"id\":1,\"sessionId\":\"AB2AF3C\"}")
        else {
            panic!("expected response");
        };
        assert_eq!(session_id, "AB2AF3C");
        assert_eq!(response.result, Some(json!({})));
        assert!(response.error.is_empty());
    }

    #[test]
    fn test_response_with_error() {
        let Some(InspectorMessage::Response { response, .. }) = parse("{\"id\":1,\"error\":{}}")
        else {
            panic!("expected response");
        };
        assert_eq!(response.id, 1);
        assert!(!response.error.is_empty());
        assert!(response.result.is_none());
    }

    #[test]
    fn test_response_with_result() {
        let Some(InspectorMessage::Response { response, .. }) =
            parse("{\"id\":1,\"result\":{\"key\":1}}")
        else {
            panic!("expected response");
        };
        assert_eq!(response.id, 1);
        assert!(response.error.is_empty());
        assert_eq!(response.result, Some(json!({"key": 1})));
    }

    #[test]
    fn test_non_integer_id_rejected() {
        assert!(parse("{\"id\":\"x\",\"result\":{}}").is_none());
    }

    #[test]
    fn test_bidi_binding_without_name_rejected() {
        let message = json!({
            "method": "Runtime.bindingCalled",
            "params": {"payload": "{}"}
        });
        assert!(parse(&message.to_string()).is_none());
    }

    #[test]
    fn test_binding_called_without_params_is_plain_event() {
        let Some(InspectorMessage::Event { event, .. }) =
            parse("{\"method\":\"Runtime.bindingCalled\"}")
        else {
            panic!("expected event");
        };
        assert_eq!(event.params, json!({}));
    }

    #[test]
    fn test_other_binding_left_alone() {
        let message = json!({
            "method": "Runtime.bindingCalled",
            "params": {"name": "other", "payload": "not json"}
        });
        let Some(InspectorMessage::Event { event, .. }) = parse(&message.to_string()) else {
            panic!("expected event");
        };
        assert_eq!(event.params["payload"], json!("not json"));
    }

    #[test]
    fn test_bidi_payload_decoded_in_place() {
        let payload = json!({"id": 223, "result": {"pong": 196}}).to_string();
        let message = json!({
            "method": "Runtime.bindingCalled",
            "params": {"name": "sendBidiResponse", "payload": payload},
            "sessionId": "mapper"
        });
        let Some(InspectorMessage::Event { event, .. }) = parse(&message.to_string()) else {
            panic!("expected event");
        };
        // 223 = 111 * 2 + 1: channel bits stripped on the way in.
        assert_eq!(event.params["payload"]["id"], json!(111));
        assert_eq!(event.params["payload"]["result"]["pong"], json!(196));
    }

    #[test]
    fn test_bidi_id_round_trip() {
        for cmd_id in [2i64, 3, 11, 1_000_021, 1_000_022, 1_000_023] {
            for channel in 0..MAX_CHANNEL_COUNT {
                let wire_id = cmd_id * MAX_CHANNEL_COUNT + channel;
                let payload = json!({"id": wire_id}).to_string();
                let message = json!({
                    "method": "Runtime.bindingCalled",
                    "params": {"name": "sendBidiResponse", "payload": payload}
                });
                let Some(InspectorMessage::Event { event, .. }) = parse(&message.to_string())
                else {
                    panic!("expected event");
                };
                assert_eq!(event.params["payload"]["id"], json!(cmd_id));
            }
        }
    }

    #[test]
    fn test_bidi_event_without_id_kept_verbatim() {
        let payload = json!({"method": "log.entryAdded", "params": {}}).to_string();
        let message = json!({
            "method": "Runtime.bindingCalled",
            "params": {"name": "sendBidiResponse", "payload": payload}
        });
        let Some(InspectorMessage::Event { event, .. }) = parse(&message.to_string()) else {
            panic!("expected event");
        };
        assert_eq!(event.params["payload"]["method"], json!("log.entryAdded"));
        assert!(event.params["payload"].get("id").is_none());
    }

    #[test]
    fn test_undecodable_bidi_payload_rejected() {
        let message = json!({
            "method": "Runtime.bindingCalled",
            "params": {"name": "sendBidiResponse", "payload": "not json"}
        });
        assert!(parse(&message.to_string()).is_none());
    }
}
