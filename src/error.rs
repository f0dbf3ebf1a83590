//! Defines the custom `Error` and `Result` types for docmcp.

use crate::types::{
    ErrorData, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, RESOURCE_NOT_FOUND,
};

/// The primary error type for docmcp.
///
/// This enum consolidates all possible failures that can occur within a session,
/// allowing users to programmatically handle different error conditions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error that occurred during network I/O operations (e.g., connection refused,
    /// connection reset).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that occurred during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer answered a request with a JSON-RPC error response. The request was
    /// delivered, but the remote side reported a failure while handling it.
    #[error("Remote error (code {}): {}", .0.code, .0.message)]
    Remote(ErrorData),

    /// The session or the individual call was torn down before it resolved.
    #[error("Request cancelled")]
    Cancelled,

    /// A resource, document or prompt lookup missed.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The peer has no handler for a required sub-request kind.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A message or an elicitation result did not have the required shape.
    #[error("Malformed: {0}")]
    Malformed(String),

    /// An internal channel for asynchronous operations was closed unexpectedly.
    #[error("Internal communication channel closed")]
    ChannelClosed,

    /// The future waiting for a response timed out.
    #[error("Operation timed out")]
    Timeout,

    /// A general-purpose error for miscellaneous issues.
    #[error("An internal error occurred: {0}")]
    Other(String),
}

/// A specialized `Result` type for docmcp.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Converts this error into the payload of a JSON-RPC error response.
    ///
    /// A `Remote` error is forwarded unchanged so that relayed failures keep their
    /// original code.
    pub fn to_error_data(&self) -> ErrorData {
        let code = match self {
            Error::Remote(data) => return data.clone(),
            Error::NotFound(_) => RESOURCE_NOT_FOUND,
            Error::Malformed(_) | Error::Serialization(_) => INVALID_PARAMS,
            Error::Unsupported(_) => METHOD_NOT_FOUND,
            _ => INTERNAL_ERROR,
        };
        ErrorData {
            code,
            message: self.to_string(),
            data: None,
        }
    }
}

impl From<ErrorData> for Error {
    fn from(err: ErrorData) -> Self {
        Error::Remote(err)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
