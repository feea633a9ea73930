//! Shared error taxonomy across the engine, tools, and storage.
//!
//! Recoverable agent conditions (validation failures, API errors, aborts,
//! exhausted limits) are encoded as message-log entries and never surface
//! here; these types cover caller contract violations and genuine runtime
//! failures only.

use thiserror::Error;

use crate::message::ToolState;

/// Contract violations and unexpected failures raised by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No model id survived option layering.
    #[error("no model provided")]
    MissingModel,

    /// A tool message in a non-terminal state reached the wire-format
    /// converter outside summary mode.
    #[error("unresolved tool state in conversation: {state:?}")]
    UnresolvedTool { state: ToolState },

    /// An approval-lifecycle operation was applied to a message in the
    /// wrong state.
    #[error("invalid tool state transition: {from:?} -> {attempted}")]
    InvalidToolState { from: ToolState, attempted: &'static str },

    /// The message a lifecycle operation targeted is not a tool message.
    #[error("expected a tool message")]
    NotAToolMessage,

    /// A summarize call failed at the transport or API layer.
    #[error("summarize request failed: {0}")]
    Summarize(anyhow::Error),
}

/// Failures raised by tool handlers.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("path escapes workspace: {path}")]
    PathEscape { path: String },

    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("tool not available: {message}")]
    NotAvailable { message: String },
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn path_escape(path: impl Into<String>) -> Self {
        Self::PathEscape { path: path.into() }
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    pub fn not_available(message: impl Into<String>) -> Self {
        Self::NotAvailable {
            message: message.into(),
        }
    }
}

/// Failures raised by task storage providers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no storage directory available")]
    NoStorageDir,
}
