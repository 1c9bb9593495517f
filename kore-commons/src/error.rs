//! Shared error taxonomy used across every Kore crate.
//!
//! One variant per error kind named in the runtime's error handling design:
//! validation, security, transport, protocol, tool, cancellation, not-found,
//! conflict, storage, and fatal invariant violations. Keeping a single enum
//! at the crate boundary lets the session server map kinds to RPC status
//! codes without re-deriving the taxonomy per component.

use std::path::PathBuf;

use thiserror::Error;

/// Security-tier violations raised by the interceptor (C1).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("path `{path}` escapes allowed root `{root}`")]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("command `{command}` is blocked: {reason}")]
    CommandBlocked { command: String, reason: String },

    #[error("command `{command}` contains shell injection metacharacters")]
    CommandInjection { command: String },

    #[error("filename `{name}` is invalid: {reason}")]
    InvalidFilename { name: String, reason: String },
}

/// The top-level error type returned by Kore's public APIs.
#[derive(Debug, Error)]
pub enum KoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("tool `{tool}` failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

impl KoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolError { tool: tool.into(), message: message.into() }
    }

    /// Whether the Agent Loop may recover from this error locally by
    /// synthesising a transcript message and continuing, rather than
    /// surfacing it to the RPC/UI caller.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ToolError { .. })
    }
}

pub type KoreResult<T> = Result<T, KoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_tool_errors_are_locally_recoverable() {
        assert!(KoreError::Transport("reset".into()).is_locally_recoverable());
        assert!(KoreError::tool("read_file", "denied").is_locally_recoverable());
    }

    #[test]
    fn security_and_storage_errors_are_not_locally_recoverable() {
        let err = KoreError::Security(SecurityError::PathEscape {
            path: "/tmp/../etc/passwd".into(),
            root: "/tmp".into(),
        });
        assert!(!err.is_locally_recoverable());
        assert!(!KoreError::Storage("disk full".into()).is_locally_recoverable());
    }

    #[test]
    fn not_found_formats_kind_and_id() {
        let err = KoreError::not_found("session", "abc123");
        assert_eq!(err.to_string(), "session `abc123` not found");
    }
}
