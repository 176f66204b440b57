//! Blocking WebSocket transport layer.
//!
//! The client core is a pull-style pump running on the caller thread, so
//! the transport it consumes is a *blocking* façade: send and receive
//! block the caller, a background delivery thread feeds the receive queue
//! and raises the notification callback on asynchronous arrival.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                   WebSocketConnection                     │
//! │                                                           │
//! │  caller thread            delivery thread                 │
//! │  send ──────────────►  ┌───────────────┐                  │
//! │  receive_next ◄──────  │ receive queue │ ◄── socket read  │
//! │  (condvar wait)        └───────────────┘        │         │
//! │                          notification callback ─┘         │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tungstenite`-backed [`SyncWebSocket`] implementation |

// ============================================================================
// Imports
// ============================================================================

use crate::timeout::Timeout;

// ============================================================================
// Submodules
// ============================================================================

/// Blocking WebSocket connection backed by `tungstenite`.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::WebSocketConnection;

// ============================================================================
// Types
// ============================================================================

/// Callback raised by the delivery thread when a message arrives while no
/// receive is in flight.
///
/// Fires on the delivery thread. The embedder is responsible for
/// marshalling the signal onto the client thread, where it typically ends
/// in a non-blocking `handle_received_events` drain.
pub type NotificationCallback = Box<dyn Fn() + Send>;

/// Factory yielding a fresh transport per root client.
pub type SyncWebSocketFactory = Box<dyn Fn() -> Box<dyn SyncWebSocket>>;

// ============================================================================
// SocketMessage
// ============================================================================

/// Outcome of a single blocking receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// A complete text message.
    Message(String),
    /// The deadline passed before a message arrived.
    Timeout,
    /// The connection is closed; no further messages will arrive.
    Disconnected,
}

// ============================================================================
// SyncWebSocket
// ============================================================================

/// A blocking, single-connection message channel.
///
/// One instance serves exactly one root client. Implementations other
/// than [`WebSocketConnection`] exist only in tests.
pub trait SyncWebSocket {
    /// Returns `true` while the underlying connection is usable.
    fn is_connected(&self) -> bool;

    /// Connects to `url`, returning `false` on refusal.
    fn connect(&self, url: &str) -> bool;

    /// Sends one text message, returning `false` on failure.
    fn send(&self, message: &str) -> bool;

    /// Blocks until the next message, the deadline, or disconnect.
    fn receive_next(&self, timeout: &Timeout) -> SocketMessage;

    /// Returns `true` if a message is already buffered.
    fn has_next(&self) -> bool;

    /// Tags the connection for log correlation.
    fn set_id(&self, _id: &str) {}

    /// Installs or clears the asynchronous-arrival callback.
    ///
    /// See [`NotificationCallback`] for the threading contract.
    fn set_notification_callback(&self, _callback: Option<NotificationCallback>) {}
}
