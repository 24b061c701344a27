//! Error types for the chat client

use reqwest::StatusCode;
use thiserror::Error;

/// Chat client error types
///
/// Every variant ends a request as a transport failure. Frames that merely
/// arrive split across network chunks never surface here; they are
/// re-buffered inside the decoder.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chat function returned {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("response carried no body")]
    MissingBody,

    #[error("frame still malformed after {attempts} attempts: {line}")]
    MalformedFrame { attempts: u32, line: String },

    #[error("buffered frame data exceeded {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;
