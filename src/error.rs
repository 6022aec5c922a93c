//! Error types for the driver core
//!
//! This module defines all error types that can occur during statement
//! execution and result materialization, from low-level wire faults to
//! caller programming errors.

use std::io;
use thiserror::Error;

use crate::dispatch::RowOutcome;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the driver core
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    // =========================================================================
    // Caller Programming Errors
    // =========================================================================
    /// Bind ordinal outside the template's declared placeholder range
    #[error("parameter index {index} out of range (statement declares {count} placeholders)")]
    ParameterIndex { index: usize, count: usize },

    /// Dispatch attempted with an unbound placeholder
    #[error("no value bound for placeholder {ordinal}")]
    MissingParameter { ordinal: usize },

    // =========================================================================
    // Value Format Errors
    // =========================================================================
    /// Malformed literal for an extended type
    #[error("malformed {type_name} literal {input:?}: {reason}")]
    Format {
        type_name: &'static str,
        input: String,
        reason: String,
    },

    /// Narrowing coercion failed (value exceeds target range)
    #[error("value {value} overflows {target} (error code {code})")]
    Overflow {
        value: String,
        target: &'static str,
        code: u16,
    },

    /// Requested coercion has no mapping in the matrix
    #[error("cannot convert {from} to {to}")]
    Conversion { from: &'static str, to: &'static str },

    // =========================================================================
    // Cursor Errors
    // =========================================================================
    /// Navigation call illegal for the cursor's mode
    #[error("{operation} is not supported on a {mode} cursor")]
    UnsupportedNavigation {
        operation: &'static str,
        mode: &'static str,
    },

    /// Operation not available in the current cursor configuration
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Cursor handle was invalidated by a later cursor or re-execution
    #[error("cursor is no longer valid (superseded or statement re-executed)")]
    CursorInvalidated,

    /// Cursor has been closed
    #[error("cursor is closed")]
    CursorClosed,

    /// No current row to operate on
    #[error("cursor is not positioned on a row")]
    NoCurrentRow,

    // =========================================================================
    // LOB Errors
    // =========================================================================
    /// LOB mutation attempted without holding the owning row's lock
    #[error("row {table}({key}) is not locked; LOB mutation requires a row lock")]
    RowNotLocked { table: String, key: String },

    /// Operation requires a locator-backed LOB
    #[error("operation requires a locator-backed LOB: {0}")]
    LobNotLocator(&'static str),

    // =========================================================================
    // Batch Errors
    // =========================================================================
    /// Batch aborted; carries the partial outcome sequence
    #[error("batch failed at row {row_index}: {source}")]
    Batch {
        row_index: usize,
        outcomes: Vec<RowOutcome>,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Server Errors
    // =========================================================================
    /// Error reported by the server
    #[error("server error {code} ({sqlstate}): {message}")]
    Server {
        code: u16,
        sqlstate: String,
        message: String,
    },

    // =========================================================================
    // Session / Transport Errors
    // =========================================================================
    /// Caller-initiated cancel observed by the transport
    #[error("operation cancelled; session must be reset")]
    Cancelled,

    /// Network timeout observed by the transport
    #[error("operation timed out; session must be reset")]
    Timeout,

    /// Session was poisoned by a previous Cancelled/Timeout
    #[error("session must be reset before further use")]
    SessionMustReset,

    /// Statement handle unknown to this session
    #[error("unknown statement handle: {0}")]
    UnknownStatement(u32),

    // =========================================================================
    // Wire / Buffer Errors
    // =========================================================================
    /// Buffer underflow - not enough data to read
    #[error("buffer underflow: need {needed} bytes but only {available} available")]
    BufferUnderflow { needed: usize, available: usize },

    /// Buffer overflow - not enough space to write
    #[error("buffer overflow: need {needed} bytes but only {available} available")]
    BufferOverflow { needed: usize, available: usize },

    /// Invalid column/parameter type tag on the wire
    #[error("invalid wire type tag: {0}")]
    InvalidTypeTag(u8),

    /// General protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a format error for an extended-type literal
    pub fn format(
        type_name: &'static str,
        input: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Format {
            type_name,
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a server error
    pub fn server(code: u16, sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Server {
            code,
            sqlstate: sqlstate.into(),
            message: message.into(),
        }
    }

    /// Check if this error poisons the session (caller's pool must discard/reset)
    pub fn poisons_session(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout | Error::Io(_))
    }

    /// Check if this is a per-call fault that leaves the statement usable
    pub fn statement_remains_usable(&self) -> bool {
        matches!(
            self,
            Error::ParameterIndex { .. }
                | Error::Format { .. }
                | Error::Overflow { .. }
                | Error::UnsupportedNavigation { .. }
                | Error::NotSupported(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_index_display() {
        let err = Error::ParameterIndex { index: 5, count: 3 };
        assert_eq!(
            err.to_string(),
            "parameter index 5 out of range (statement declares 3 placeholders)"
        );
    }

    #[test]
    fn test_format_error_display() {
        let err = Error::format(
            "INTERVAL DAY TO SECOND",
            "+100 24:10:10.10",
            "hour 24 out of range 0..=23",
        );
        let text = err.to_string();
        assert!(text.contains("hour 24"));
        assert!(text.contains("+100 24:10:10.10"));
    }

    #[test]
    fn test_poisons_session() {
        assert!(Error::Cancelled.poisons_session());
        assert!(Error::Timeout.poisons_session());
        assert!(!Error::MissingParameter { ordinal: 1 }.poisons_session());
    }

    #[test]
    fn test_statement_remains_usable() {
        assert!(Error::ParameterIndex { index: 9, count: 2 }.statement_remains_usable());
        assert!(!Error::Cancelled.statement_remains_usable());
    }
}
