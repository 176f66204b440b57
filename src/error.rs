//! Error types for the DevTools client.
//!
//! This module defines all error types used throughout the crate.
//! The taxonomy mirrors the WebDriver-facing status codes that DevTools
//! failures are reported under.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use chrome_cdp::{Result, Error};
//!
//! fn example(client: &DevToolsClient) -> Result<()> {
//!     client.send_command("Page.enable", serde_json::json!({}))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport | [`Error::Disconnected`], [`Error::Timeout`] |
//! | Inspector | [`Error::UnknownCommand`], [`Error::InvalidArgument`] |
//! | Target | [`Error::TabCrashed`], [`Error::TargetDetached`], [`Error::NoSuchFrame`], [`Error::NoSuchWindow`] |
//! | Session | [`Error::SessionNotCreated`], [`Error::UnexpectedAlertOpen`] |
//! | Fallback | [`Error::UnknownError`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging. Use
/// [`Error::code`] when a call site needs to branch on the kind rather
/// than the payload.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Fallback
    // ========================================================================
    /// Unclassified failure.
    ///
    /// Returned for protocol violations, broken invariants and inspector
    /// errors that match no known pattern.
    #[error("unknown error: {message}")]
    UnknownError {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Inspector Errors
    // ========================================================================
    /// The remote end does not implement the requested method.
    #[error("unknown command: {message}")]
    UnknownCommand {
        /// Error message from the inspector.
        message: String,
    },

    /// Command parameters were rejected by the remote end.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message from the inspector.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The transport is not connected or the connection was lost.
    #[error("disconnected: {message}")]
    Disconnected {
        /// Description of the disconnect.
        message: String,
    },

    /// A blocking operation exceeded its deadline.
    #[error("timeout: {message}")]
    Timeout {
        /// Description of the operation that timed out.
        message: String,
    },

    // ========================================================================
    // Target Errors
    // ========================================================================
    /// The target crashed while the client was attached.
    #[error("tab crashed")]
    TabCrashed,

    /// The client was detached from its target.
    #[error("target detached")]
    TargetDetached,

    /// The referenced frame no longer exists, or the CDP session behind
    /// it was dropped.
    #[error("no such frame: {message}")]
    NoSuchFrame {
        /// Error message from the inspector.
        message: String,
    },

    /// The referenced window or execution context no longer exists.
    #[error("no such window: {message}")]
    NoSuchWindow {
        /// Error message from the inspector.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// A modal dialog opened and blocked the command's response.
    #[error("unexpected alert open{}", text.as_ref().map(|t| format!(": {{Alert text : {t}}}")).unwrap_or_default())]
    UnexpectedAlertOpen {
        /// Current dialog text, when the owning view could supply it.
        text: Option<String>,
    },

    /// A session could not be established.
    #[error("session not created: {message}")]
    SessionNotCreated {
        /// Description of the failure.
        message: String,
    },
}

// ============================================================================
// ErrorCode
// ============================================================================

/// Discriminant of [`enum@Error`], for call sites that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// See [`Error::UnknownError`].
    UnknownError,
    /// See [`Error::UnknownCommand`].
    UnknownCommand,
    /// See [`Error::InvalidArgument`].
    InvalidArgument,
    /// See [`Error::Disconnected`].
    Disconnected,
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::TabCrashed`].
    TabCrashed,
    /// See [`Error::TargetDetached`].
    TargetDetached,
    /// See [`Error::NoSuchFrame`].
    NoSuchFrame,
    /// See [`Error::NoSuchWindow`].
    NoSuchWindow,
    /// See [`Error::UnexpectedAlertOpen`].
    UnexpectedAlertOpen,
    /// See [`Error::SessionNotCreated`].
    SessionNotCreated,
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an unknown error.
    #[inline]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::UnknownError {
            message: message.into(),
        }
    }

    /// Creates an unknown command error.
    #[inline]
    pub fn unknown_command(message: impl Into<String>) -> Self {
        Self::UnknownCommand {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a disconnected error.
    #[inline]
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::Disconnected {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a no-such-frame error.
    #[inline]
    pub fn no_such_frame(message: impl Into<String>) -> Self {
        Self::NoSuchFrame {
            message: message.into(),
        }
    }

    /// Creates a no-such-window error.
    #[inline]
    pub fn no_such_window(message: impl Into<String>) -> Self {
        Self::NoSuchWindow {
            message: message.into(),
        }
    }

    /// Creates an unexpected-alert-open error without dialog text.
    #[inline]
    pub fn unexpected_alert_open() -> Self {
        Self::UnexpectedAlertOpen { text: None }
    }

    /// Creates an unexpected-alert-open error carrying the dialog text.
    #[inline]
    pub fn unexpected_alert_open_with_text(text: impl Into<String>) -> Self {
        Self::UnexpectedAlertOpen {
            text: Some(text.into()),
        }
    }

    /// Creates a session-not-created error.
    #[inline]
    pub fn session_not_created(message: impl Into<String>) -> Self {
        Self::SessionNotCreated {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the discriminant of this error.
    #[inline]
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownError { .. } => ErrorCode::UnknownError,
            Self::UnknownCommand { .. } => ErrorCode::UnknownCommand,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Disconnected { .. } => ErrorCode::Disconnected,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::TabCrashed => ErrorCode::TabCrashed,
            Self::TargetDetached => ErrorCode::TargetDetached,
            Self::NoSuchFrame { .. } => ErrorCode::NoSuchFrame,
            Self::NoSuchWindow { .. } => ErrorCode::NoSuchWindow,
            Self::UnexpectedAlertOpen { .. } => ErrorCode::UnexpectedAlertOpen,
            Self::SessionNotCreated { .. } => ErrorCode::SessionNotCreated,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Returns `true` if the target backing this client is gone.
    ///
    /// Crashed and detached targets cannot serve further commands.
    #[inline]
    #[must_use]
    pub fn is_target_gone(&self) -> bool {
        matches!(self, Self::TabCrashed | Self::TargetDetached)
    }
}

// ============================================================================
// Tests
// ============================================================================
