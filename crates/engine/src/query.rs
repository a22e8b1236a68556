//! Subscription-style query results exposed to the UI layer.
//!
//! Each named cache publishes a [`QueryState`] through a `tokio::sync::watch`
//! channel; UI surfaces hold receivers and re-render on change.

use crate::cache::CacheValue;

/// The UI-visible state of one named query:
/// `{ data, is_loading, is_error, error }`.
///
/// `data` keeps the last successfully fetched value while a refetch is in
/// flight or after a failed refetch, so the UI never flashes empty.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    /// Current result, if any fetch has succeeded.
    pub data: Option<CacheValue>,
    /// A fetch is currently in flight.
    pub is_loading: bool,
    /// The most recent fetch failed.
    pub is_error: bool,
    /// Displayable message for the most recent failure.
    pub error: Option<String>,
}

impl QueryState {
    /// Initial state before any fetch.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_error: false,
            error: None,
        }
    }

    /// A fetch is in flight; previous data remains visible.
    #[must_use]
    pub const fn loading(data: Option<CacheValue>) -> Self {
        Self {
            data,
            is_loading: true,
            is_error: false,
            error: None,
        }
    }

    /// A fetch (or optimistic patch) produced a current value.
    #[must_use]
    pub const fn ready(value: CacheValue) -> Self {
        Self {
            data: Some(value),
            is_loading: false,
            is_error: false,
            error: None,
        }
    }

    /// The most recent fetch failed; previous data remains visible.
    #[must_use]
    pub const fn failed(data: Option<CacheValue>, message: String) -> Self {
        Self {
            data,
            is_loading: false,
            is_error: true,
            error: Some(message),
        }
    }
}
