//! Normalized error surface for the mutation dispatch layer.
//!
//! Every failed mutation yields a message suitable for direct display:
//! the server-provided message when one exists, otherwise a per-operation
//! fallback. Transport-level detail stays in [`crate::remote::RemoteError`]
//! and is logged, not shown.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::RemoteError;

/// Server-provided error body attached to a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Message as sent by the server.
    pub message: String,
}

/// A normalized remote rejection: `{ data?: { message }, message }`.
///
/// `message` is always populated and displayable; `data` carries the raw
/// server body when the server provided one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRejection {
    /// Displayable message (server-provided, or the operation fallback).
    pub message: String,
    /// Raw server error body, when present.
    pub data: Option<ErrorBody>,
}

impl RemoteRejection {
    /// Normalize a transport error, preferring the server's message over
    /// the operation's fallback.
    #[must_use]
    pub fn normalize(fallback: &str, source: &RemoteError) -> Self {
        let data = source.server_message().map(|message| ErrorBody {
            message: message.to_string(),
        });
        let message = data
            .as_ref()
            .map_or_else(|| fallback.to_string(), |body| body.message.clone());
        Self { message, data }
    }
}

/// Errors surfaced by the mutation dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Client-detected validation failure; rejected before any remote call.
    #[error("{0}")]
    Validation(String),

    /// Remote call failed during a mutation. Any optimistic patches were
    /// rolled back before this was raised.
    #[error("{}", .0.message)]
    Remote(RemoteRejection),
}

impl EngineError {
    /// Shorthand for normalizing a remote failure.
    #[must_use]
    pub fn remote(fallback: &str, source: &RemoteError) -> Self {
        Self::Remote(RemoteRejection::normalize(fallback, source))
    }

    /// Displayable message for this error.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message) => message,
            Self::Remote(rejection) => &rejection.message,
        }
    }
}

/// Result type alias for [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
