//! Error taxonomy for the client engine.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the client engine.
#[derive(Clone, Debug, Error)]
pub enum ClientError {
    /// Channel-level I/O failure, including directory service failures and
    /// sends on a closed channel.
    #[error("transport failure: {detail}")]
    Transport { detail: String },

    /// No matching response arrived within the command window.
    #[error("command '{method}' timed out after {duration:?}")]
    CommandTimeout { method: String, duration: Duration },

    /// The remote end explicitly returned an error object.
    #[error("remote error {code}: {message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// No directory entry matched the selector; raised before any channel is
    /// opened.
    #[error("no target matches selector '{selector}'")]
    TargetNotFound { selector: String },

    /// An inbound payload failed to decode or lacked required fields. For
    /// notifications this is swallowed by the dispatch loop, never surfaced.
    #[error("malformed payload: {detail}")]
    Format { detail: String },
}

impl ClientError {
    pub fn transport(detail: impl Into<String>) -> Self {
        ClientError::Transport {
            detail: detail.into(),
        }
    }

    pub fn format(detail: impl Into<String>) -> Self {
        ClientError::Format {
            detail: detail.into(),
        }
    }
}
