//! Inspector error classification.
//!
//! Responses carry their failure as a raw error object. This module maps
//! the known code/message patterns onto the crate's error taxonomy; the
//! patterns come from what the inspector actually emits, including the
//! `-32000` server errors that are distinguishable only by message text.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Error;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_CONTEXT_ERROR: &str = "Cannot find default execution context";
const CONTEXT_ERROR: &str = "Cannot find context with specified id";
const INVALID_URL_ERROR: &str = "Cannot navigate to invalid URL";
const INSECURE_CONTEXT_ERROR: &str = "Permission can't be granted in current context.";
const OPAQUE_ORIGINS_ERROR: &str = "Permission can't be granted to opaque origins.";
const PUSH_PERMISSION_ERROR: &str = "Push Permission without userVisibleOnly:true isn't supported";
const NO_SUCH_FRAME_ERROR: &str = "Frame with the given id was not found.";
const NO_TARGET_WITH_GIVEN_ID_ERROR: &str = "No target with given id found";

/// Inspector code for a session that no longer exists.
const SESSION_NOT_FOUND_CODE: i64 = -32001;
/// Inspector code for an unimplemented method.
const METHOD_NOT_FOUND_CODE: i64 = -32601;
/// Inspector code for rejected parameters.
const INVALID_PARAMS_CODE: i64 = -32602;

// ============================================================================
// Classifier
// ============================================================================

/// Maps a raw inspector error JSON object onto a domain error.
///
/// The input is the serialized `error` member of a response frame.
/// Anything unparseable classifies as [`Error::UnknownError`].
pub fn classify_inspector_error(error_json: &str) -> Error {
    let Ok(error @ Value::Object(_)) = serde_json::from_str::<Value>(error_json) else {
        return Error::unknown("inspector error with no error message");
    };

    let code = error.get("code").and_then(Value::as_i64);
    let message = error.get("message").and_then(Value::as_str);

    match code {
        Some(METHOD_NOT_FOUND_CODE) => {
            return Error::unknown_command(message.unwrap_or("UnknownCommand"));
        }
        Some(SESSION_NOT_FOUND_CODE) => {
            return Error::no_such_frame(message.unwrap_or("inspector detached"));
        }
        _ => {}
    }

    if let Some(message) = message {
        match message {
            DEFAULT_CONTEXT_ERROR | CONTEXT_ERROR => {
                return Error::no_such_window(message);
            }
            INVALID_URL_ERROR => {
                return Error::invalid_argument(message);
            }
            INSECURE_CONTEXT_ERROR => {
                return Error::invalid_argument("feature cannot be used in insecure context");
            }
            PUSH_PERMISSION_ERROR | OPAQUE_ORIGINS_ERROR => {
                return Error::invalid_argument(message);
            }
            // The server reports this under the generic -32000 code, so
            // the message content is the only discriminator.
            NO_SUCH_FRAME_ERROR => {
                return Error::no_such_frame(message);
            }
            _ => {}
        }
        if code == Some(INVALID_PARAMS_CODE) {
            if message == NO_TARGET_WITH_GIVEN_ID_ERROR {
                return Error::no_such_window(message);
            }
            return Error::invalid_argument(message);
        }
    }

    Error::unknown(format!("unhandled inspector error: {error_json}"))
}

// ============================================================================
// Tests
// ============================================================================
