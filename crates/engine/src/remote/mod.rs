//! Remote collaborator interface.
//!
//! The engine treats the server as a generic JSON request/response
//! collaborator behind the [`RemoteApi`] trait. [`HttpRemote`] is the
//! default `reqwest`-backed implementation; tests substitute an in-memory
//! mock. Payloads are validated at this boundary - malformed entities are
//! rejected with [`RemoteError::Payload`] and never reach a cache.

mod http;
pub mod payloads;

pub use http::{HttpRemote, RemoteConfig};
pub use payloads::{
    CartLinePayload, CartPayload, CommentPayload, ContentPayload, CouponPayload, PostPayload,
};

use async_trait::async_trait;
use thiserror::Error;

use tidemark_core::{CommentId, LineId, PostContent, PostId, ProductId, UserId};

/// Errors at the remote transport boundary.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, empty when the body carried none.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Response parsed but failed entity validation.
    #[error("Malformed payload: {0}")]
    Payload(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Server-supplied message suitable for direct display, when present.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

/// Parameters for the post-list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPostsParams {
    /// Maximum number of posts to return.
    pub limit: Option<u32>,
    /// Number of posts to skip (pagination offset).
    pub skip: Option<u32>,
    /// Restrict to posts authored by this user.
    pub user_id: Option<UserId>,
    /// Restrict to posts carrying this topic tag.
    pub tag: Option<String>,
}

/// The remote JSON API consumed by the engine.
///
/// One method per consumed endpoint. Cart mutations return the canonical
/// server cart; post mutations return the canonical post where the server
/// produces one.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    // =========================================================================
    // Cart
    // =========================================================================

    /// Fetch the current cart.
    async fn get_cart(&self) -> Result<CartPayload, RemoteError>;

    /// Add a product to the cart.
    async fn add_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartPayload, RemoteError>;

    /// Set the quantity of an existing line.
    async fn update_cart_item(
        &self,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<CartPayload, RemoteError>;

    /// Remove a line from the cart.
    async fn remove_cart_item(&self, line_id: &LineId) -> Result<CartPayload, RemoteError>;

    /// Remove every line from the cart.
    async fn clear_cart(&self) -> Result<CartPayload, RemoteError>;

    /// Validate a coupon code and return its discount.
    async fn apply_coupon(&self, code: &str) -> Result<CouponPayload, RemoteError>;

    // =========================================================================
    // Posts
    // =========================================================================

    /// List posts, optionally filtered by author.
    async fn list_posts(&self, params: &ListPostsParams) -> Result<Vec<PostPayload>, RemoteError>;

    /// Fetch a single post by ID.
    async fn get_post(&self, id: &PostId) -> Result<PostPayload, RemoteError>;

    /// Create a post; the server issues its ID.
    async fn create_post(&self, content: &PostContent) -> Result<PostPayload, RemoteError>;

    /// Edit a post's content.
    async fn edit_post(
        &self,
        id: &PostId,
        content: &PostContent,
    ) -> Result<PostPayload, RemoteError>;

    /// Delete a post.
    async fn delete_post(&self, id: &PostId) -> Result<(), RemoteError>;

    /// Toggle the acting user's like on a post.
    async fn toggle_like(&self, id: &PostId) -> Result<PostPayload, RemoteError>;

    /// Add a top-level comment to a post.
    async fn add_comment(&self, id: &PostId, text: &str) -> Result<PostPayload, RemoteError>;

    /// Delete a comment (or nested reply).
    async fn delete_comment(
        &self,
        id: &PostId,
        comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError>;

    /// Toggle the acting user's like on a comment.
    async fn toggle_comment_like(
        &self,
        id: &PostId,
        comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError>;

    /// Reply to a comment.
    async fn reply_comment(
        &self,
        id: &PostId,
        comment_id: &CommentId,
        text: &str,
    ) -> Result<PostPayload, RemoteError>;

    /// Report a post for moderation.
    async fn report_post(&self, id: &PostId) -> Result<(), RemoteError>;

    /// Toggle the acting user's save on a post.
    async fn toggle_save(&self, id: &PostId) -> Result<PostPayload, RemoteError>;

    /// List the acting user's saved posts.
    async fn list_saved(&self) -> Result<Vec<PostPayload>, RemoteError>;

    /// List reported posts (privileged).
    async fn list_reported(&self) -> Result<Vec<PostPayload>, RemoteError>;
}
