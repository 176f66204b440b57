//! DevTools client: session tree, command correlation, event pump.
//!
//! The client multiplexes a tree of CDP sessions over one transport. The
//! root owns the connection; children address sessions by id and share
//! the root's command id counter, pump and delivery ordering.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`DevToolsClient`] node and the event pump |
//! | `listener` | [`DevToolsEventListener`] and [`ClientOwner`] seams |

// ============================================================================
// Submodules
// ============================================================================

/// Client node and event pump.
pub mod core;

/// Listener and owner traits.
pub mod listener;


// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{DevToolsClient, FrontendCloserFunc, BROWSER_CLIENT_ID};
pub use self::listener::{ClientOwner, DevToolsEventListener};
