//! Wire payloads and boundary validation.
//!
//! These types mirror the remote's JSON shapes. They are converted into
//! the domain types from `tidemark-core` via `TryFrom`, which rejects
//! malformed entities (empty IDs, zero-quantity lines, negative amounts)
//! so they never propagate into a cache.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tidemark_core::{
    CartLine, CartState, CartStatus, Comment, CommentId, LineId, Post, PostContent, PostId,
    ProductId, UserId,
};

use crate::cart::totals::Totals;
use crate::remote::RemoteError;

// =============================================================================
// Cart Payloads
// =============================================================================

/// A cart line as sent by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLinePayload {
    /// Line identifier.
    pub id: String,
    /// Product identifier.
    pub product_id: String,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Quantity; zero-quantity lines are rejected.
    pub quantity: u32,
}

/// The canonical cart as sent by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartPayload {
    /// Ordered line items.
    pub items: Vec<CartLinePayload>,
    /// Server-reported subtotal (recomputed locally on merge).
    #[serde(default)]
    pub subtotal: Decimal,
    /// Server-reported tax (recomputed locally on merge).
    #[serde(default)]
    pub tax: Decimal,
    /// Server-reported shipping (recomputed locally on merge).
    #[serde(default)]
    pub shipping: Decimal,
    /// Server-reported total (recomputed locally on merge).
    #[serde(default)]
    pub total: Decimal,
    /// Discount from the applied coupon.
    #[serde(default)]
    pub discount: Decimal,
    /// Applied coupon code, if any.
    #[serde(default)]
    pub coupon: Option<String>,
}

/// Response to a coupon validation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponPayload {
    /// The validated coupon code.
    pub code: String,
    /// Discount granted by the coupon.
    pub discount: Decimal,
}

impl CouponPayload {
    /// Reject coupons the server should never send.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Payload`] for an empty code or a negative
    /// discount.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.code.trim().is_empty() {
            return Err(RemoteError::Payload("coupon has an empty code".to_string()));
        }
        if self.discount < Decimal::ZERO {
            return Err(RemoteError::Payload(format!(
                "coupon {} has a negative discount",
                self.code
            )));
        }
        Ok(())
    }
}

impl TryFrom<CartLinePayload> for CartLine {
    type Error = RemoteError;

    fn try_from(payload: CartLinePayload) -> Result<Self, Self::Error> {
        if payload.id.is_empty() {
            return Err(RemoteError::Payload("cart line has an empty id".to_string()));
        }
        if payload.product_id.is_empty() {
            return Err(RemoteError::Payload(format!(
                "cart line {} has an empty product id",
                payload.id
            )));
        }
        if payload.quantity == 0 {
            return Err(RemoteError::Payload(format!(
                "cart line {} has zero quantity",
                payload.id
            )));
        }
        if payload.unit_price < Decimal::ZERO {
            return Err(RemoteError::Payload(format!(
                "cart line {} has a negative unit price",
                payload.id
            )));
        }
        Ok(Self {
            line_id: LineId::new(payload.id),
            product_id: ProductId::new(payload.product_id),
            unit_price: payload.unit_price,
            quantity: payload.quantity,
        })
    }
}

impl TryFrom<CartPayload> for CartState {
    type Error = RemoteError;

    /// Convert the canonical server cart into local state.
    ///
    /// Server-reported totals are discarded and recomputed locally so the
    /// totals invariant holds even against a remote that reports
    /// inconsistent numbers.
    fn try_from(payload: CartPayload) -> Result<Self, Self::Error> {
        if payload.discount < Decimal::ZERO {
            return Err(RemoteError::Payload("cart has a negative discount".to_string()));
        }
        let items = payload
            .items
            .into_iter()
            .map(CartLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let totals = Totals::compute(&items, payload.discount);
        Ok(Self {
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping: totals.shipping,
            discount: payload.discount,
            total: totals.total,
            coupon: payload.coupon,
            status: CartStatus::Ready,
            last_updated: Utc::now(),
        })
    }
}

// =============================================================================
// Post Payloads
// =============================================================================

/// Post content as sent by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    /// Body text.
    pub text: String,
    /// Optional attached image URL.
    #[serde(default)]
    pub image_url: Option<String>,
}

impl From<ContentPayload> for PostContent {
    fn from(payload: ContentPayload) -> Self {
        Self {
            text: payload.text,
            image_url: payload.image_url,
        }
    }
}

impl From<&PostContent> for ContentPayload {
    fn from(content: &PostContent) -> Self {
        Self {
            text: content.text.clone(),
            image_url: content.image_url.clone(),
        }
    }
}

/// A comment as sent by the remote, with recursive replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    /// Comment identifier.
    pub id: String,
    /// Comment author.
    pub author: String,
    /// Comment text.
    pub text: String,
    /// Users who liked this comment.
    #[serde(default)]
    pub likes: Vec<String>,
    /// Nested replies.
    #[serde(default)]
    pub replies: Vec<CommentPayload>,
}

impl TryFrom<CommentPayload> for Comment {
    type Error = RemoteError;

    fn try_from(payload: CommentPayload) -> Result<Self, Self::Error> {
        if payload.id.is_empty() {
            return Err(RemoteError::Payload("comment has an empty id".to_string()));
        }
        if payload.author.is_empty() {
            return Err(RemoteError::Payload(format!(
                "comment {} has an empty author",
                payload.id
            )));
        }
        let replies = payload
            .replies
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: CommentId::new(payload.id),
            author: UserId::new(payload.author),
            text: payload.text,
            likes: payload.likes.into_iter().map(UserId::new).collect(),
            replies,
        })
    }
}

/// A post as sent by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    /// Post identifier.
    pub id: String,
    /// Post author.
    pub author: String,
    /// Post body.
    pub content: ContentPayload,
    /// Users who liked this post.
    #[serde(default)]
    pub likes: Vec<String>,
    /// Top-level comments.
    #[serde(default)]
    pub comments: Vec<CommentPayload>,
    /// Free-form topic tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Users who saved this post. Omitted by most endpoints.
    #[serde(default)]
    pub saved_by: Vec<String>,
}

impl TryFrom<PostPayload> for Post {
    type Error = RemoteError;

    fn try_from(payload: PostPayload) -> Result<Self, Self::Error> {
        if payload.id.is_empty() {
            return Err(RemoteError::Payload("post has an empty id".to_string()));
        }
        if payload.author.is_empty() {
            return Err(RemoteError::Payload(format!(
                "post {} has an empty author",
                payload.id
            )));
        }
        let comments = payload
            .comments
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: PostId::new(payload.id),
            author: UserId::new(payload.author),
            content: payload.content.into(),
            likes: payload.likes.into_iter().map(UserId::new).collect(),
            comments,
            tags: payload.tags,
            saved_by: payload.saved_by.into_iter().map(UserId::new).collect(),
        })
    }
}

/// Convert a batch of post payloads, rejecting the batch on the first
/// malformed entry.
pub(crate) fn convert_posts(payloads: Vec<PostPayload>) -> Result<Vec<Post>, RemoteError> {
    payloads.into_iter().map(Post::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_payload(id: &str) -> PostPayload {
        PostPayload {
            id: id.to_string(),
            author: "u-1".to_string(),
            content: ContentPayload {
                text: "hello".to_string(),
                image_url: None,
            },
            likes: vec!["u-2".to_string()],
            comments: vec![CommentPayload {
                id: "c-1".to_string(),
                author: "u-2".to_string(),
                text: "first".to_string(),
                likes: vec![],
                replies: vec![CommentPayload {
                    id: "c-2".to_string(),
                    author: "u-3".to_string(),
                    text: "reply".to_string(),
                    likes: vec![],
                    replies: vec![],
                }],
            }],
            tags: vec!["history".to_string()],
            saved_by: vec![],
        }
    }

    #[test]
    fn test_content_payload_from_a_domain_reference() {
        let content = PostContent {
            text: "hello".to_string(),
            image_url: Some("https://img".to_string()),
        };
        let payload = ContentPayload::from(&content);
        assert_eq!(payload.text, "hello");
        assert_eq!(payload.image_url.as_deref(), Some("https://img"));
    }

    #[test]
    fn test_post_conversion_preserves_nested_replies() {
        let post = Post::try_from(post_payload("p-1")).expect("valid payload");
        assert_eq!(post.id, PostId::new("p-1"));
        assert_eq!(post.comments.len(), 1);
        assert_eq!(
            post.comments.first().map(|c| c.replies.len()),
            Some(1)
        );
    }

    #[test]
    fn test_post_with_empty_id_is_rejected() {
        let result = Post::try_from(post_payload(""));
        assert!(matches!(result, Err(RemoteError::Payload(_))));
    }

    #[test]
    fn test_malformed_nested_comment_rejects_the_post() {
        let mut payload = post_payload("p-1");
        if let Some(comment) = payload.comments.first_mut() {
            comment.author = String::new();
        }
        assert!(matches!(
            Post::try_from(payload),
            Err(RemoteError::Payload(_))
        ));
    }

    #[test]
    fn test_cart_totals_are_recomputed_on_merge() {
        let payload = CartPayload {
            items: vec![CartLinePayload {
                id: "l-1".to_string(),
                product_id: "prod-1".to_string(),
                unit_price: Decimal::new(1000, 2),
                quantity: 1,
            }],
            // Server reports nonsense totals; the merge must fix them.
            subtotal: Decimal::new(999_99, 2),
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total: Decimal::ZERO,
            discount: Decimal::ZERO,
            coupon: None,
        };
        let cart = CartState::try_from(payload).expect("valid payload");
        assert_eq!(cart.subtotal, Decimal::new(1000, 2));
        assert!(cart.totals_consistent());
    }

    #[test]
    fn test_zero_quantity_line_is_rejected() {
        let payload = CartPayload {
            items: vec![CartLinePayload {
                id: "l-1".to_string(),
                product_id: "prod-1".to_string(),
                unit_price: Decimal::new(1000, 2),
                quantity: 0,
            }],
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total: Decimal::ZERO,
            discount: Decimal::ZERO,
            coupon: None,
        };
        assert!(matches!(
            CartState::try_from(payload),
            Err(RemoteError::Payload(_))
        ));
    }

    #[test]
    fn test_coupon_validation() {
        let valid = CouponPayload {
            code: "SAVE10".to_string(),
            discount: Decimal::new(1000, 2),
        };
        assert!(valid.validate().is_ok());

        let negative = CouponPayload {
            code: "SAVE10".to_string(),
            discount: Decimal::new(-1, 0),
        };
        assert!(negative.validate().is_err());
    }
}
