//! Integration tests for Tidemark.
//!
//! The engine under test runs against [`FakeServer`], a stateful in-memory
//! implementation of the remote API. Unlike the scripted mocks used in unit
//! tests, the fake server applies real server-side logic (line merging, ID
//! issuance, nested comment trees, saved/reported projections), so the
//! end-to-end flows in `tests/` exercise the full
//! dispatch / optimistic-apply / settle loop.
//!
//! # Test Categories
//!
//! - `cart_flow` - cart mutations, totals, rollback
//! - `feed_flow` - feed queries, patches, tag invalidation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;

use tidemark_core::{CommentId, LineId, PostContent, PostId, ProductId};
use tidemark_engine::remote::{
    CartLinePayload, CartPayload, CommentPayload, ContentPayload, CouponPayload, ListPostsParams,
    PostPayload, RemoteApi, RemoteError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find_comment<'a>(
    comments: &'a mut Vec<CommentPayload>,
    id: &str,
) -> Option<&'a mut CommentPayload> {
    for comment in comments {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_comment(&mut comment.replies, id) {
            return Some(found);
        }
    }
    None
}

fn remove_comment(comments: &mut Vec<CommentPayload>, id: &str) -> bool {
    let before = comments.len();
    comments.retain(|c| c.id != id);
    if comments.len() < before {
        return true;
    }
    comments
        .iter_mut()
        .any(|c| remove_comment(&mut c.replies, id))
}

#[derive(Default)]
struct CartModel {
    items: Vec<CartLinePayload>,
    coupon: Option<(String, Decimal)>,
}

impl CartModel {
    fn payload(&self) -> CartPayload {
        // Totals are reported as zero on purpose; the engine recomputes
        // them on merge and must not trust these fields.
        CartPayload {
            items: self.items.clone(),
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total: Decimal::ZERO,
            discount: self.coupon.as_ref().map_or(Decimal::ZERO, |(_, d)| *d),
            coupon: self.coupon.as_ref().map(|(code, _)| code.clone()),
        }
    }
}

struct ServerState {
    user: String,
    catalog: Mutex<HashMap<String, Decimal>>,
    cart: Mutex<CartModel>,
    posts: Mutex<Vec<PostPayload>>,
    saved: Mutex<Vec<String>>,
    reported: Mutex<Vec<String>>,
    coupons: Mutex<HashMap<String, Decimal>>,
    failures: Mutex<HashMap<&'static str, Option<String>>>,
    seq: AtomicU64,
}

/// In-memory fake of the remote API with real server-side state.
///
/// Failure injection is per endpoint name: a failing endpoint returns
/// HTTP 400 with an optional display message and leaves server state
/// untouched.
#[derive(Clone)]
pub struct FakeServer {
    inner: Arc<ServerState>,
}

impl FakeServer {
    /// A server acting for `user` (the authenticated caller).
    #[must_use]
    pub fn new(user: &str) -> Self {
        Self {
            inner: Arc::new(ServerState {
                user: user.to_string(),
                catalog: Mutex::new(HashMap::new()),
                cart: Mutex::new(CartModel::default()),
                posts: Mutex::new(Vec::new()),
                saved: Mutex::new(Vec::new()),
                reported: Mutex::new(Vec::new()),
                coupons: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(1),
            }),
        }
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Make `product_id` purchasable at `unit_price`.
    pub fn stock(&self, product_id: &str, unit_price: Decimal) {
        lock(&self.inner.catalog).insert(product_id.to_string(), unit_price);
    }

    /// Accept `code` with the given discount.
    pub fn seed_coupon(&self, code: &str, discount: Decimal) {
        lock(&self.inner.coupons).insert(code.to_string(), discount);
    }

    /// Append an existing post to the feed.
    pub fn seed_post(&self, id: &str, author: &str, text: &str) {
        lock(&self.inner.posts).push(PostPayload {
            id: id.to_string(),
            author: author.to_string(),
            content: ContentPayload {
                text: text.to_string(),
                image_url: None,
            },
            likes: Vec::new(),
            comments: Vec::new(),
            tags: Vec::new(),
            saved_by: Vec::new(),
        });
    }

    /// Attach a topic tag to an existing post.
    pub fn tag_post(&self, id: &str, tag: &str) {
        let mut posts = lock(&self.inner.posts);
        if let Some(post) = posts.iter_mut().find(|p| p.id == id) {
            post.tags.push(tag.to_string());
        }
    }

    /// Make `endpoint` fail with HTTP 400 and an optional server message.
    pub fn fail(&self, endpoint: &'static str, message: Option<&str>) {
        lock(&self.inner.failures).insert(endpoint, message.map(String::from));
    }

    /// Stop failing `endpoint`.
    pub fn succeed(&self, endpoint: &'static str) {
        lock(&self.inner.failures).remove(endpoint);
    }

    /// Server-side cart contents.
    #[must_use]
    pub fn cart_snapshot(&self) -> CartPayload {
        lock(&self.inner.cart).payload()
    }

    /// Server-side copy of a post.
    #[must_use]
    pub fn stored_post(&self, id: &str) -> Option<PostPayload> {
        lock(&self.inner.posts).iter().find(|p| p.id == id).cloned()
    }

    /// IDs of posts saved by the acting user, in save order.
    #[must_use]
    pub fn saved_ids(&self) -> Vec<String> {
        lock(&self.inner.saved).clone()
    }

    fn check(&self, endpoint: &'static str) -> Result<(), RemoteError> {
        if let Some(message) = lock(&self.inner.failures).get(endpoint) {
            return Err(RemoteError::Status {
                status: 400,
                message: message.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    fn with_post<T>(
        &self,
        id: &PostId,
        apply: impl FnOnce(&mut PostPayload) -> T,
    ) -> Result<T, RemoteError> {
        let mut posts = lock(&self.inner.posts);
        posts
            .iter_mut()
            .find(|p| p.id == id.as_str())
            .map(apply)
            .ok_or_else(|| RemoteError::NotFound(format!("post {id}")))
    }

    fn posts_for(&self, ids: &[String]) -> Vec<PostPayload> {
        let posts = lock(&self.inner.posts);
        ids.iter()
            .filter_map(|id| posts.iter().find(|p| &p.id == id).cloned())
            .collect()
    }
}

#[async_trait]
impl RemoteApi for FakeServer {
    async fn get_cart(&self) -> Result<CartPayload, RemoteError> {
        self.check("get_cart")?;
        Ok(lock(&self.inner.cart).payload())
    }

    async fn add_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartPayload, RemoteError> {
        self.check("add_cart_item")?;
        let unit_price = lock(&self.inner.catalog)
            .get(product_id.as_str())
            .copied()
            .ok_or_else(|| RemoteError::NotFound(format!("product {product_id}")))?;
        let mut cart = lock(&self.inner.cart);
        if let Some(line) = cart
            .items
            .iter_mut()
            .find(|l| l.product_id == product_id.as_str())
        {
            line.quantity += quantity;
        } else {
            let id = self.next_id("line");
            cart.items.push(CartLinePayload {
                id,
                product_id: product_id.to_string(),
                unit_price,
                quantity,
            });
        }
        Ok(cart.payload())
    }

    async fn update_cart_item(
        &self,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<CartPayload, RemoteError> {
        self.check("update_cart_item")?;
        let mut cart = lock(&self.inner.cart);
        let line = cart
            .items
            .iter_mut()
            .find(|l| l.id == line_id.as_str())
            .ok_or_else(|| RemoteError::NotFound(format!("line {line_id}")))?;
        line.quantity = quantity;
        Ok(cart.payload())
    }

    async fn remove_cart_item(&self, line_id: &LineId) -> Result<CartPayload, RemoteError> {
        self.check("remove_cart_item")?;
        let mut cart = lock(&self.inner.cart);
        cart.items.retain(|l| l.id != line_id.as_str());
        Ok(cart.payload())
    }

    async fn clear_cart(&self) -> Result<CartPayload, RemoteError> {
        self.check("clear_cart")?;
        let mut cart = lock(&self.inner.cart);
        cart.items.clear();
        cart.coupon = None;
        Ok(cart.payload())
    }

    async fn apply_coupon(&self, code: &str) -> Result<CouponPayload, RemoteError> {
        self.check("apply_coupon")?;
        let discount = lock(&self.inner.coupons)
            .get(code)
            .copied()
            .ok_or_else(|| RemoteError::Status {
                status: 400,
                message: "Invalid coupon code".to_string(),
            })?;
        lock(&self.inner.cart).coupon = Some((code.to_string(), discount));
        Ok(CouponPayload {
            code: code.to_string(),
            discount,
        })
    }

    async fn list_posts(&self, params: &ListPostsParams) -> Result<Vec<PostPayload>, RemoteError> {
        self.check("list_posts")?;
        let filtered: Vec<PostPayload> = lock(&self.inner.posts)
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
        let skip = params.skip.unwrap_or(0) as usize;
        let limit = params.limit.map_or(usize::MAX, |l| l as usize);
        Ok(filtered.into_iter().skip(skip).take(limit).collect())
    }

    async fn get_post(&self, id: &PostId) -> Result<PostPayload, RemoteError> {
        self.check("get_post")?;
        self.with_post(id, |post| post.clone())
    }

    async fn create_post(&self, content: &PostContent) -> Result<PostPayload, RemoteError> {
        self.check("create_post")?;
        let post = PostPayload {
            id: self.next_id("post"),
            author: self.inner.user.clone(),
            content: ContentPayload::from(content),
            likes: Vec::new(),
            comments: Vec::new(),
            tags: Vec::new(),
            saved_by: Vec::new(),
        };
        lock(&self.inner.posts).insert(0, post.clone());
        Ok(post)
    }

    async fn edit_post(
        &self,
        id: &PostId,
        content: &PostContent,
    ) -> Result<PostPayload, RemoteError> {
        self.check("edit_post")?;
        self.with_post(id, |post| {
            post.content = ContentPayload::from(content);
            post.clone()
        })
    }

    async fn delete_post(&self, id: &PostId) -> Result<(), RemoteError> {
        self.check("delete_post")?;
        let mut posts = lock(&self.inner.posts);
        let before = posts.len();
        posts.retain(|p| p.id != id.as_str());
        if posts.len() == before {
            return Err(RemoteError::NotFound(format!("post {id}")));
        }
        lock(&self.inner.saved).retain(|saved| saved != id.as_str());
        lock(&self.inner.reported).retain(|reported| reported != id.as_str());
        Ok(())
    }

    async fn toggle_like(&self, id: &PostId) -> Result<PostPayload, RemoteError> {
        self.check("toggle_like")?;
        let user = self.inner.user.clone();
        self.with_post(id, |post| {
            if post.likes.iter().any(|u| u == &user) {
                post.likes.retain(|u| u != &user);
            } else {
                post.likes.push(user);
            }
            post.clone()
        })
    }

    async fn add_comment(&self, id: &PostId, text: &str) -> Result<PostPayload, RemoteError> {
        self.check("add_comment")?;
        let comment = CommentPayload {
            id: self.next_id("comment"),
            author: self.inner.user.clone(),
            text: text.to_string(),
            likes: Vec::new(),
            replies: Vec::new(),
        };
        self.with_post(id, |post| {
            post.comments.push(comment);
            post.clone()
        })
    }

    async fn delete_comment(
        &self,
        id: &PostId,
        comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError> {
        self.check("delete_comment")?;
        self.with_post(id, |post| {
            remove_comment(&mut post.comments, comment_id.as_str());
            post.clone()
        })
    }

    async fn toggle_comment_like(
        &self,
        id: &PostId,
        comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError> {
        self.check("toggle_comment_like")?;
        let user = self.inner.user.clone();
        self.with_post(id, |post| {
            if let Some(comment) = find_comment(&mut post.comments, comment_id.as_str()) {
                if comment.likes.iter().any(|u| u == &user) {
                    comment.likes.retain(|u| u != &user);
                } else {
                    comment.likes.push(user);
                }
            }
            post.clone()
        })
    }

    async fn reply_comment(
        &self,
        id: &PostId,
        comment_id: &CommentId,
        text: &str,
    ) -> Result<PostPayload, RemoteError> {
        self.check("reply_comment")?;
        let reply = CommentPayload {
            id: self.next_id("comment"),
            author: self.inner.user.clone(),
            text: text.to_string(),
            likes: Vec::new(),
            replies: Vec::new(),
        };
        self.with_post(id, |post| {
            if let Some(parent) = find_comment(&mut post.comments, comment_id.as_str()) {
                parent.replies.push(reply);
            }
            post.clone()
        })
    }

    async fn report_post(&self, id: &PostId) -> Result<(), RemoteError> {
        self.check("report_post")?;
        self.with_post(id, |_| ())?;
        let mut reported = lock(&self.inner.reported);
        if !reported.iter().any(|r| r == id.as_str()) {
            reported.push(id.to_string());
        }
        Ok(())
    }

    async fn toggle_save(&self, id: &PostId) -> Result<PostPayload, RemoteError> {
        self.check("toggle_save")?;
        let user = self.inner.user.clone();
        let post = self.with_post(id, |post| {
            if post.saved_by.iter().any(|u| u == &user) {
                post.saved_by.retain(|u| u != &user);
            } else {
                post.saved_by.push(user);
            }
            post.clone()
        })?;
        let mut saved = lock(&self.inner.saved);
        if saved.iter().any(|s| s == id.as_str()) {
            saved.retain(|s| s != id.as_str());
        } else {
            saved.push(id.to_string());
        }
        Ok(post)
    }

    async fn list_saved(&self) -> Result<Vec<PostPayload>, RemoteError> {
        self.check("list_saved")?;
        let ids = lock(&self.inner.saved).clone();
        Ok(self.posts_for(&ids))
    }

    async fn list_reported(&self) -> Result<Vec<PostPayload>, RemoteError> {
        self.check("list_reported")?;
        let ids = lock(&self.inner.reported).clone();
        Ok(self.posts_for(&ids))
    }
}
