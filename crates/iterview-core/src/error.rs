//! Error types for stream consumption

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can end (or prevent) a streaming session
#[derive(Error, Debug)]
pub enum StreamError {
    /// Server answered the submission with a non-2xx status
    #[error("Server responded with HTTP status {status}")]
    HttpStatus { status: u16 },

    /// Request or body read failed in the transport
    #[error("Transport failed: {0}")]
    Transport(String),

    /// No chunk arrived within the configured idle timeout
    #[error("No data received for {secs} seconds")]
    IdleTimeout { secs: u64 },

    /// Decoded text is not well-formed structured data
    #[error("Malformed fragment at line {line}, column {column}: {message}")]
    MalformedFragment {
        line: usize,
        column: usize,
        message: String,
    },

    /// Well-formed JSON that does not have the message shape
    #[error("Unexpected message shape: {0}")]
    UnexpectedShape(String),

    /// Stream ended in the middle of a message
    #[error("Stream ended with {pending_bytes} bytes of an unterminated message")]
    UnterminatedFragment { pending_bytes: usize },

    /// Buffered message exceeded the configured limit
    #[error("Fragment of {size} bytes exceeds limit of {limit} bytes")]
    FragmentTooLarge { size: usize, limit: usize },

    /// Stream ended inside a multi-byte character
    #[error("Stream ended inside a multi-byte sequence ({pending} bytes pending)")]
    IncompleteSequence { pending: usize },

    /// Submission could not be built
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// Session phase change that the state machine does not allow
    #[error("Invalid session transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

/// Coarse classification of a session failure, as reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-2xx response to the submission
    Network,
    /// Malformed or truncated stream content
    StreamProcessing,
    /// Request, body read or timeout failure
    Transport,
    /// Bug in the session state machine
    Internal,
}

impl StreamError {
    /// Classify this error for the terminal status of a session.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StreamError::HttpStatus { .. } => FailureKind::Network,
            StreamError::MalformedFragment { .. }
            | StreamError::UnexpectedShape(_)
            | StreamError::UnterminatedFragment { .. }
            | StreamError::FragmentTooLarge { .. } => FailureKind::StreamProcessing,
            StreamError::InvalidTransition { .. } => FailureKind::Internal,
            StreamError::Transport(_)
            | StreamError::IdleTimeout { .. }
            | StreamError::IncompleteSequence { .. }
            | StreamError::InvalidSubmission(_)
            | StreamError::Io(_) => FailureKind::Transport,
        }
    }

    /// Short, human-readable status text. Never includes raw error detail.
    pub fn status_message(&self) -> String {
        match self {
            StreamError::HttpStatus { status } => {
                format!("A network error occurred (HTTP {status}). Please try again.")
            }
            _ => match self.failure_kind() {
                FailureKind::StreamProcessing => {
                    "An error occurred during stream processing. Please check the results."
                        .to_string()
                }
                _ => "An error occurred. Please try again.".to_string(),
            },
        }
    }
}

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;
