//! Chrome DevTools Protocol client core.
//!
//! This library is the wire-facing heart of a browser-automation driver:
//! it multiplexes a tree of CDP sessions over a single WebSocket,
//! correlates command responses with blocking waits, and delivers
//! asynchronous events to pluggable listeners in order, including while
//! a synchronous command is in flight.
//!
//! # Architecture
//!
//! One root client owns the transport. Each attached child addresses one
//! CDP session (a page, frame or worker); the tree is flat. Commands
//! drawn anywhere use the root's id counter; responses route back to the
//! sending node by `sessionId`. The event pump runs on the caller
//! thread and is re-entrant: listeners may send commands from inside a
//! notification.
//!
//! Intrusive protocol side effects are handled in the core: a modal
//! dialog turns blocked commands into `UnexpectedAlertOpen`, target
//! crashes and detachment abort waiting callers, and a refused connect
//! is retried once after closing DevTools frontends.
//!
//! # Quick Start
//!
//! ```no_run
//! use chrome_cdp::{DevToolsClient, SyncWebSocketFactory, WebSocketConnection, Result};
//!
//! fn main() -> Result<()> {
//!     let factory: SyncWebSocketFactory =
//!         Box::new(|| Box::new(WebSocketConnection::new()));
//!     let client = DevToolsClient::with_transport(
//!         "page-1",
//!         "",
//!         "ws://127.0.0.1:9222/devtools/page/ABC",
//!         &factory,
//!     );
//!     client.connect_if_necessary()?;
//!
//!     let result = client.send_command_and_get_result(
//!         "Runtime.evaluate",
//!         serde_json::json!({ "expression": "1+1", "returnByValue": true }),
//!     )?;
//!     println!("result: {result}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Session tree, command sending, event pump |
//! | [`error`] | Error taxonomy and [`Result`] alias |
//! | [`protocol`] | Wire frames, parsing, inspector error classification |
//! | [`timeout`] | Deadline type shared by all blocking calls |
//! | [`transport`] | Blocking WebSocket façade and implementation |

// ============================================================================
// Modules
// ============================================================================

/// Session tree, command sending, event pump.
pub mod client;

/// Error types and result alias.
pub mod error;

/// CDP wire protocol types and parsing.
pub mod protocol;

/// Deadline tracking for blocking operations.
pub mod timeout;

/// Blocking WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ClientOwner, DevToolsClient, DevToolsEventListener, FrontendCloserFunc, BROWSER_CLIENT_ID,
};

// Error types
pub use error::{Error, ErrorCode, Result};

// Protocol types
pub use protocol::{
    InspectorCommandResponse, InspectorEvent, InspectorMessage, ParserFunc, MAX_CHANNEL_COUNT,
};

// Timeout
pub use timeout::Timeout;

// Transport types
pub use transport::{
    NotificationCallback, SocketMessage, SyncWebSocket, SyncWebSocketFactory, WebSocketConnection,
};
