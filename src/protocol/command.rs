//! Outgoing command frames.
//!
//! Defines the wire shape of a CDP command and the BiDi tunnel envelope.
//!
//! # Format
//!
//! ```json
//! {
//!   "id": 12,
//!   "method": "Runtime.evaluate",
//!   "params": { "expression": "1+1" },
//!   "sessionId": "AB12CD"
//! }
//! ```
//!
//! `sessionId` is present only for commands sent on behalf of a session
//! (any client whose session id is non-empty).

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Channels reserved for internal use.
pub const RESERVED_CHANNEL_COUNT: i64 = 1;

/// Channels available to callers.
pub const USER_CHANNEL_COUNT: i64 = 1;

/// Total BiDi channel count.
///
/// A BiDi command id `n` sent on channel `c` travels as
/// `n * MAX_CHANNEL_COUNT + c`; the low bits carve the id space into
/// independent streams.
pub const MAX_CHANNEL_COUNT: i64 = RESERVED_CHANNEL_COUNT + USER_CHANNEL_COUNT;

// ============================================================================
// Command
// ============================================================================

/// A single outgoing CDP command frame.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// Correlation id, unique within the root client.
    pub id: i64,

    /// Method in `Domain.method` format.
    pub method: String,

    /// Method parameters; an object, possibly empty.
    pub params: Value,

    /// Target session, omitted for the root's own session.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Command {
    /// Creates a command frame.
    ///
    /// An empty `session_id` means the frame carries no `sessionId`
    /// field.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Value, session_id: &str) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            session_id: if session_id.is_empty() {
                None
            } else {
                Some(session_id.to_owned())
            },
        }
    }

    /// Serializes the frame to its wire representation.
    pub fn to_json(&self) -> Result<String> {
        serialize_as_json(self)
    }
}

// ============================================================================
// BiDi Envelope
// ============================================================================

/// Rewrites a BiDi command id onto the given channel.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if the command has no integer `id`
/// - [`Error::UnknownError`] if `channel` is out of range
pub fn multiplex_bidi_id(command: &mut Value, channel: i64) -> Result<()> {
    let Some(cmd_id) = command.get("id").and_then(Value::as_i64) else {
        return Err(Error::invalid_argument("BiDi command id not found"));
    };
    if !(0..MAX_CHANNEL_COUNT).contains(&channel) {
        return Err(Error::unknown("BiDi channel id is out of range"));
    }
    command["id"] = Value::from(cmd_id * MAX_CHANNEL_COUNT + channel);
    Ok(())
}

/// Builds the `Runtime.evaluate` expression tunnelling a BiDi command.
///
/// The command is JSON-encoded, that string is JSON-encoded again (the
/// remote end receives it as a string literal), and the result is passed
/// to `onBidiMessage`.
pub fn bidi_expression(command: &Value) -> Result<String> {
    let json = serialize_as_json(command)?;
    let arg = serialize_as_json(&json)?;
    Ok(format!("onBidiMessage({arg})"))
}

// ============================================================================
// Helpers
// ============================================================================

/// Serializes any value, mapping codec failures onto the crate error.
pub(crate) fn serialize_as_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|_| Error::unknown("cannot serialize the argument as JSON"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_root_frame_has_no_session_id() {
        let command = Command::new(1, "Runtime.evaluate", json!({"expression": "1+1"}), "");
        let wire = command.to_json().expect("serialize");
        assert!(wire.contains("\"id\":1"));
        assert!(wire.contains("\"method\":\"Runtime.evaluate\""));
        assert!(!wire.contains("sessionId"));
    }

    #[test]
    fn test_session_frame_carries_session_id() {
        let command = Command::new(7, "Page.navigate", json!({"url": "about:blank"}), "S1");
        let wire = command.to_json().expect("serialize");
        assert!(wire.contains("\"sessionId\":\"S1\""));
    }

    #[test]
    fn test_multiplex_bidi_id() {
        let mut command = json!({"id": 111, "method": "method", "params": {}});
        multiplex_bidi_id(&mut command, RESERVED_CHANNEL_COUNT).expect("multiplex");
        assert_eq!(command["id"], json!(111 * MAX_CHANNEL_COUNT + 1));
    }

    #[test]
    fn test_multiplex_missing_id() {
        let mut command = json!({"method": "method"});
        let err = multiplex_bidi_id(&mut command, 0).expect_err("must fail");
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_multiplex_channel_out_of_range() {
        let mut command = json!({"id": 1});
        let err = multiplex_bidi_id(&mut command, MAX_CHANNEL_COUNT).expect_err("must fail");
        assert!(matches!(err, Error::UnknownError { .. }));
        let err = multiplex_bidi_id(&mut command, -1).expect_err("must fail");
        assert!(matches!(err, Error::UnknownError { .. }));
    }

    #[test]
    fn test_bidi_expression_double_encodes() {
        let command = json!({"id": 3, "method": "m"});
        let expression = bidi_expression(&command).expect("wrap");
        assert!(expression.starts_with("onBidiMessage(\""));
        assert!(expression.ends_with(')'));

        // The argument is a JSON string literal holding the command.
        let arg = &expression["onBidiMessage(".len()..expression.len() - 1];
        let literal: String = serde_json::from_str(arg).expect("string literal");
        let decoded: Value = serde_json::from_str(&literal).expect("inner json");
        assert_eq!(decoded, command);
    }
}
