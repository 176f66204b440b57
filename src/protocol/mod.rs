//! CDP wire protocol types.
//!
//! This module defines the message format exchanged with the remote end:
//! outgoing command frames, incoming events and responses, and the
//! classification of inspector errors.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Command`] | Local → Remote | Command request |
//! | [`InspectorCommandResponse`] | Remote → Local | Command response |
//! | [`InspectorEvent`] | Remote → Local | Browser notification |
//!
//! BiDi traffic is tunnelled over the same channel: outgoing BiDi
//! commands ride inside `Runtime.evaluate`, incoming BiDi responses
//! arrive as `Runtime.bindingCalled` events. See [`command`] and
//! [`message`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outgoing frame building and the BiDi envelope |
//! | `message` | Incoming frame parsing and BiDi payload decoding |
//! | `inspector` | Inspector error classification |

// ============================================================================
// Submodules
// ============================================================================

/// Outgoing command frames and the BiDi envelope.
pub mod command;

/// Inspector error classification.
pub mod inspector;

/// Incoming message parsing.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    bidi_expression, multiplex_bidi_id, Command, MAX_CHANNEL_COUNT, RESERVED_CHANNEL_COUNT,
    USER_CHANNEL_COUNT,
};
pub use inspector::classify_inspector_error;
pub use message::{
    parse_inspector_message, InspectorCommandResponse, InspectorEvent, InspectorMessage,
    ParserFunc,
};
