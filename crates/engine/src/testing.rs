//! Scripted remote for unit tests.
//!
//! Returns preconfigured payloads and injects failures per endpoint; it
//! performs no real server logic. The integration-tests crate carries a
//! stateful fake server for end-to-end flows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;

use tidemark_core::{CommentId, LineId, PostContent, PostId, ProductId};

use crate::remote::{
    CartLinePayload, CartPayload, ContentPayload, CouponPayload, ListPostsParams, PostPayload,
    RemoteApi, RemoteError,
};

#[derive(Clone)]
pub(crate) struct ScriptedRemote {
    inner: Arc<ScriptedInner>,
}

#[derive(Default)]
struct ScriptedInner {
    cart: StdMutex<Option<CartPayload>>,
    coupon: StdMutex<Option<CouponPayload>>,
    post: StdMutex<Option<PostPayload>>,
    posts: StdMutex<Vec<PostPayload>>,
    saved: StdMutex<Vec<PostPayload>>,
    reported: StdMutex<Vec<PostPayload>>,
    failures: StdMutex<HashMap<&'static str, Option<String>>>,
    calls: StdMutex<Vec<&'static str>>,
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ScriptedInner::default()),
        }
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    pub(crate) fn set_cart_response(&self, cart: CartPayload) {
        *lock(&self.inner.cart) = Some(cart);
    }

    pub(crate) fn set_coupon_response(&self, coupon: CouponPayload) {
        *lock(&self.inner.coupon) = Some(coupon);
    }

    pub(crate) fn set_post_response(&self, post: PostPayload) {
        *lock(&self.inner.post) = Some(post);
    }

    pub(crate) fn set_posts_response(&self, posts: Vec<PostPayload>) {
        *lock(&self.inner.posts) = posts;
    }

    pub(crate) fn set_saved_response(&self, posts: Vec<PostPayload>) {
        *lock(&self.inner.saved) = posts;
    }

    pub(crate) fn set_reported_response(&self, posts: Vec<PostPayload>) {
        *lock(&self.inner.reported) = posts;
    }

    /// Make `endpoint` fail with HTTP 400 and an optional server message.
    pub(crate) fn fail(&self, endpoint: &'static str, message: Option<&str>) {
        lock(&self.inner.failures).insert(endpoint, message.map(String::from));
    }

    /// Stop failing `endpoint`.
    pub(crate) fn succeed(&self, endpoint: &'static str) {
        lock(&self.inner.failures).remove(endpoint);
    }

    pub(crate) fn last_call(&self) -> Option<String> {
        lock(&self.inner.calls).last().map(ToString::to_string)
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        lock(&self.inner.calls)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn check(&self, endpoint: &'static str) -> Result<(), RemoteError> {
        lock(&self.inner.calls).push(endpoint);
        if let Some(message) = lock(&self.inner.failures).get(endpoint) {
            return Err(RemoteError::Status {
                status: 400,
                message: message.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn cart(&self) -> Result<CartPayload, RemoteError> {
        lock(&self.inner.cart)
            .clone()
            .ok_or_else(|| RemoteError::Payload("no scripted cart response".to_string()))
    }

    fn post(&self) -> Result<PostPayload, RemoteError> {
        lock(&self.inner.post)
            .clone()
            .ok_or_else(|| RemoteError::Payload("no scripted post response".to_string()))
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    pub(crate) fn empty_cart() -> CartPayload {
        CartPayload {
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total: Decimal::ZERO,
            discount: Decimal::ZERO,
            coupon: None,
        }
    }

    pub(crate) fn cart_with_line(
        line_id: &str,
        product_id: &str,
        price_cents: i64,
        quantity: u32,
    ) -> CartPayload {
        CartPayload {
            items: vec![CartLinePayload {
                id: line_id.to_string(),
                product_id: product_id.to_string(),
                unit_price: Decimal::new(price_cents, 2),
                quantity,
            }],
            ..Self::empty_cart()
        }
    }

    pub(crate) fn post_payload(id: &str, author: &str) -> PostPayload {
        PostPayload {
            id: id.to_string(),
            author: author.to_string(),
            content: ContentPayload {
                text: format!("post {id}"),
                image_url: None,
            },
            likes: Vec::new(),
            comments: Vec::new(),
            tags: Vec::new(),
            saved_by: Vec::new(),
        }
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn get_cart(&self) -> Result<CartPayload, RemoteError> {
        self.check("get_cart")?;
        self.cart()
    }

    async fn add_cart_item(
        &self,
        _product_id: &ProductId,
        _quantity: u32,
    ) -> Result<CartPayload, RemoteError> {
        self.check("add_cart_item")?;
        self.cart()
    }

    async fn update_cart_item(
        &self,
        _line_id: &LineId,
        _quantity: u32,
    ) -> Result<CartPayload, RemoteError> {
        self.check("update_cart_item")?;
        self.cart()
    }

    async fn remove_cart_item(&self, _line_id: &LineId) -> Result<CartPayload, RemoteError> {
        self.check("remove_cart_item")?;
        self.cart()
    }

    async fn clear_cart(&self) -> Result<CartPayload, RemoteError> {
        self.check("clear_cart")?;
        self.cart()
    }

    async fn apply_coupon(&self, _code: &str) -> Result<CouponPayload, RemoteError> {
        self.check("apply_coupon")?;
        lock(&self.inner.coupon)
            .clone()
            .ok_or_else(|| RemoteError::Payload("no scripted coupon response".to_string()))
    }

    async fn list_posts(&self, params: &ListPostsParams) -> Result<Vec<PostPayload>, RemoteError> {
        self.check("list_posts")?;
        let posts = lock(&self.inner.posts)
            .iter()
            .filter(|p| {
                params
                    .user_id
                    .as_ref()
                    .is_none_or(|user| p.author == user.as_str())
            })
            .filter(|p| params.tag.as_ref().is_none_or(|tag| p.tags.contains(tag)))
            .cloned()
            .collect();
        Ok(posts)
    }

    async fn get_post(&self, id: &PostId) -> Result<PostPayload, RemoteError> {
        self.check("get_post")?;
        lock(&self.inner.posts)
            .iter()
            .find(|p| p.id == id.as_str())
            .cloned()
            .map_or_else(|| self.post(), Ok)
    }

    async fn create_post(&self, _content: &PostContent) -> Result<PostPayload, RemoteError> {
        self.check("create_post")?;
        self.post()
    }

    async fn edit_post(
        &self,
        _id: &PostId,
        _content: &PostContent,
    ) -> Result<PostPayload, RemoteError> {
        self.check("edit_post")?;
        self.post()
    }

    async fn delete_post(&self, _id: &PostId) -> Result<(), RemoteError> {
        self.check("delete_post")
    }

    async fn toggle_like(&self, _id: &PostId) -> Result<PostPayload, RemoteError> {
        self.check("toggle_like")?;
        self.post()
    }

    async fn add_comment(&self, _id: &PostId, _text: &str) -> Result<PostPayload, RemoteError> {
        self.check("add_comment")?;
        self.post()
    }

    async fn delete_comment(
        &self,
        _id: &PostId,
        _comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError> {
        self.check("delete_comment")?;
        self.post()
    }

    async fn toggle_comment_like(
        &self,
        _id: &PostId,
        _comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError> {
        self.check("toggle_comment_like")?;
        self.post()
    }

    async fn reply_comment(
        &self,
        _id: &PostId,
        _comment_id: &CommentId,
        _text: &str,
    ) -> Result<PostPayload, RemoteError> {
        self.check("reply_comment")?;
        self.post()
    }

    async fn report_post(&self, _id: &PostId) -> Result<(), RemoteError> {
        self.check("report_post")
    }

    async fn toggle_save(&self, _id: &PostId) -> Result<PostPayload, RemoteError> {
        self.check("toggle_save")?;
        self.post()
    }

    async fn list_saved(&self) -> Result<Vec<PostPayload>, RemoteError> {
        self.check("list_saved")?;
        Ok(lock(&self.inner.saved).clone())
    }

    async fn list_reported(&self) -> Result<Vec<PostPayload>, RemoteError> {
        self.check("list_reported")?;
        Ok(lock(&self.inner.reported).clone())
    }
}
