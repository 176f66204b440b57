//! Listener and owner seams of the client.
//!
//! Listeners are the extension point for everything built on top of the
//! client: navigation tracking, frame tracking, log collection, BiDi
//! response delivery. The client does not own them; it holds shared
//! handles and notifies them in insertion order.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Result;
use crate::timeout::Timeout;

use super::core::DevToolsClient;

// ============================================================================
// DevToolsEventListener
// ============================================================================

/// Observer of a client's connection, events and command responses.
///
/// All notifications run on the client thread, inside the event pump. A
/// listener may send commands from within a notification; the pump nests.
/// Returning an error from any notification aborts the pump and the
/// error surfaces to the blocked caller of the affected session.
///
/// After a reconnect only listeners whose
/// [`listens_to_connections`](Self::listens_to_connections) is `true` are
/// re-notified; listeners that rebuild state from events alone will not
/// hear about the new connection.
pub trait DevToolsEventListener {
    /// Returns `true` if the listener wants connect notifications.
    fn listens_to_connections(&self) -> bool {
        true
    }

    /// Called once per (re)connection of the client's transport.
    fn on_connected(&self, _client: &DevToolsClient) -> Result<()> {
        Ok(())
    }

    /// Called for every event delivered to the client's session.
    fn on_event(&self, _client: &DevToolsClient, _method: &str, _params: &Value) -> Result<()> {
        Ok(())
    }

    /// Called for every successful command response on the client's
    /// session, with the timeout the command was sent under.
    fn on_command_success(
        &self,
        _client: &DevToolsClient,
        _method: &str,
        _result: &Value,
        _command_timeout: Option<&Timeout>,
    ) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// ClientOwner
// ============================================================================

/// The higher-level view a client serves.
///
/// The client consults its owner in exactly two places: whether the
/// target is a service worker (which skips the document prelude on
/// connect) and the current dialog text when a command comes back
/// blocked by a modal dialog.
pub trait ClientOwner {
    /// Returns `true` if the owning view is a service worker target.
    fn is_service_worker(&self) -> bool {
        false
    }

    /// Returns the text of the currently open dialog.
    ///
    /// # Errors
    ///
    /// An error means no dialog is open or its text is unavailable; the
    /// client then reports the blocked command without dialog text.
    fn dialog_message(&self) -> Result<String>;
}
