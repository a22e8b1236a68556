//! Feed coordinator: queries and mutations for posts.
//!
//! Queries serve from the five named caches and refetch when an entry is
//! stale, missing, or was fetched with a different parameter. Mutations
//! follow the patch table: selected operations apply immediate optimistic
//! patches through a [`PendingMutation`] (undone on failure), the rest rely
//! on tag invalidation plus refetch only.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{instrument, warn};

use tidemark_core::{CommentId, Post, PostContent, PostId, UserId};

use crate::cache::{CacheId, CacheRegistry, CacheValue, QueryParam, Tag};
use crate::error::{EngineError, Result};
use crate::locks::EntityLocks;
use crate::patch::{CachePatch, PendingMutation};
use crate::query::QueryState;
use crate::remote::payloads::convert_posts;
use crate::remote::{ListPostsParams, PostPayload, RemoteApi, RemoteError};

const MSG_LOAD_POSTS: &str = "Failed to load posts. Please try again.";
const MSG_LOAD_POST: &str = "Failed to load post. Please try again.";
const MSG_CREATE: &str = "Failed to create post. Please try again.";
const MSG_EDIT: &str = "Failed to update post. Please try again.";
const MSG_DELETE: &str = "Failed to delete post. Please try again.";
const MSG_LIKE: &str = "Failed to update like. Please try again.";
const MSG_SAVE: &str = "Failed to update saved posts. Please try again.";
const MSG_COMMENT: &str = "Failed to add comment. Please try again.";
const MSG_DELETE_COMMENT: &str = "Failed to delete comment. Please try again.";
const MSG_REPLY: &str = "Failed to add reply. Please try again.";
const MSG_REPORT: &str = "Failed to report post. Please try again.";

/// Caches that hold an independent copy of a liked post.
const LIKE_CACHES: [CacheId; 3] = [CacheId::FeedList, CacheId::SinglePost, CacheId::SavedPosts];

/// Coordinator for feed queries and post mutations.
#[derive(Clone)]
pub struct FeedCoordinator {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    remote: Arc<dyn RemoteApi>,
    registry: StdMutex<CacheRegistry>,
    locks: Arc<EntityLocks>,
    user: UserId,
}

/// Tags carried by a freshly fetched list entry: one per contained post
/// and author, plus the cache's fixed marker.
fn list_tags(posts: &[Post], marker: Option<Tag>) -> HashSet<Tag> {
    let mut tags: HashSet<Tag> = posts
        .iter()
        .flat_map(|p| [Tag::Post(p.id.clone()), Tag::Author(p.author.clone())])
        .collect();
    tags.extend(marker);
    tags
}

fn post_lock_key(id: &PostId) -> String {
    format!("post:{id}")
}

impl FeedCoordinator {
    pub(crate) fn new(remote: Arc<dyn RemoteApi>, locks: Arc<EntityLocks>, user: UserId) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                remote,
                registry: StdMutex::new(CacheRegistry::new()),
                locks,
                user,
            }),
        }
    }

    /// The user on whose behalf mutations are issued.
    #[must_use]
    pub fn acting_user(&self) -> &UserId {
        &self.inner.user
    }

    fn registry(&self) -> MutexGuard<'_, CacheRegistry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to a named query's state stream.
    #[must_use]
    pub fn subscribe(&self, cache: CacheId) -> watch::Receiver<QueryState> {
        self.registry().subscribe(cache)
    }

    /// Current cached value for a named query, if populated.
    #[must_use]
    pub fn cached(&self, cache: CacheId) -> Option<CacheValue> {
        self.registry().get(cache).map(|entry| entry.value.clone())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Store a fetched list and return it, or publish the failure.
    fn settle_list(
        &self,
        cache: CacheId,
        param: QueryParam,
        marker: Option<Tag>,
        outcome: std::result::Result<Vec<PostPayload>, RemoteError>,
        fallback: &str,
    ) -> Result<Vec<Post>> {
        match outcome.and_then(convert_posts) {
            Ok(posts) => {
                let tags = list_tags(&posts, marker);
                self.registry()
                    .insert(cache, CacheValue::Posts(posts.clone()), tags, param);
                Ok(posts)
            }
            Err(err) => {
                warn!(cache = ?cache, error = %err, "list refetch failed");
                let rejection = EngineError::remote(fallback, &err);
                self.registry()
                    .publish_error(cache, rejection.message().to_string());
                Err(rejection)
            }
        }
    }

    /// The main feed list, refetched when stale.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when a required refetch fails.
    #[instrument(skip(self))]
    pub async fn feed_list(&self, limit: u32, skip: u32) -> Result<Vec<Post>> {
        let param = QueryParam::Page { limit, skip };
        {
            let reg = self.registry();
            if let Some(CacheValue::Posts(posts)) = reg.fresh(CacheId::FeedList, &param) {
                return Ok(posts);
            }
            reg.mark_loading(CacheId::FeedList);
        }
        let params = ListPostsParams {
            limit: Some(limit),
            skip: Some(skip),
            user_id: None,
            tag: None,
        };
        let outcome = self.inner.remote.list_posts(&params).await;
        self.settle_list(CacheId::FeedList, param, Some(Tag::List), outcome, MSG_LOAD_POSTS)
    }

    /// Posts authored by one user.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when a required refetch fails.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn user_posts(&self, user: &UserId) -> Result<Vec<Post>> {
        let param = QueryParam::User(user.clone());
        {
            let reg = self.registry();
            if let Some(CacheValue::Posts(posts)) = reg.fresh(CacheId::UserPosts, &param) {
                return Ok(posts);
            }
            reg.mark_loading(CacheId::UserPosts);
        }
        let params = ListPostsParams {
            limit: None,
            skip: None,
            user_id: Some(user.clone()),
            tag: None,
        };
        let outcome = self.inner.remote.list_posts(&params).await;
        self.settle_list(
            CacheId::UserPosts,
            param,
            Some(Tag::Author(user.clone())),
            outcome,
            MSG_LOAD_POSTS,
        )
    }

    /// The acting user's saved posts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when a required refetch fails.
    #[instrument(skip(self))]
    pub async fn saved_posts(&self) -> Result<Vec<Post>> {
        {
            let reg = self.registry();
            if let Some(CacheValue::Posts(posts)) = reg.fresh(CacheId::SavedPosts, &QueryParam::None)
            {
                return Ok(posts);
            }
            reg.mark_loading(CacheId::SavedPosts);
        }
        let outcome = self.inner.remote.list_saved().await;
        self.settle_list(
            CacheId::SavedPosts,
            QueryParam::None,
            Some(Tag::Saved),
            outcome,
            MSG_LOAD_POSTS,
        )
    }

    /// Reported posts (privileged).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when a required refetch fails.
    #[instrument(skip(self))]
    pub async fn reported_posts(&self) -> Result<Vec<Post>> {
        {
            let reg = self.registry();
            if let Some(CacheValue::Posts(posts)) =
                reg.fresh(CacheId::ReportedPosts, &QueryParam::None)
            {
                return Ok(posts);
            }
            reg.mark_loading(CacheId::ReportedPosts);
        }
        let outcome = self.inner.remote.list_reported().await;
        self.settle_list(
            CacheId::ReportedPosts,
            QueryParam::None,
            Some(Tag::Reported),
            outcome,
            MSG_LOAD_POSTS,
        )
    }

    /// A single post, refetched when stale or when a different post is
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when a required refetch fails.
    #[instrument(skip(self), fields(post = %id))]
    pub async fn single_post(&self, id: &PostId) -> Result<Post> {
        let param = QueryParam::Post(id.clone());
        {
            let reg = self.registry();
            if let Some(CacheValue::Post(post)) = reg.fresh(CacheId::SinglePost, &param) {
                return Ok(*post);
            }
            reg.mark_loading(CacheId::SinglePost);
        }
        match self.inner.remote.get_post(id).await.and_then(Post::try_from) {
            Ok(post) => {
                let tags = HashSet::from([
                    Tag::Post(post.id.clone()),
                    Tag::Author(post.author.clone()),
                ]);
                self.registry().insert(
                    CacheId::SinglePost,
                    CacheValue::Post(Box::new(post.clone())),
                    tags,
                    param,
                );
                Ok(post)
            }
            Err(err) => {
                warn!(post = %id, error = %err, "single post refetch failed");
                let rejection = EngineError::remote(MSG_LOAD_POST, &err);
                self.registry()
                    .publish_error(CacheId::SinglePost, rejection.message().to_string());
                Err(rejection)
            }
        }
    }

    // =========================================================================
    // Mutations with optimistic patches
    // =========================================================================

    /// Create a post.
    ///
    /// A provisional placeholder is prepended to the feed list immediately;
    /// on success it is replaced by the server-issued entity, on failure it
    /// is removed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for empty text and
    /// [`EngineError::Remote`] (after rollback) when the remote rejects.
    #[instrument(skip(self, content))]
    pub async fn create_post(&self, content: PostContent) -> Result<Post> {
        if content.text.trim().is_empty() {
            return Err(EngineError::Validation("Post text cannot be empty.".to_string()));
        }
        let placeholder = Post::provisional(self.inner.user.clone(), content.clone());
        let placeholder_id = placeholder.id.clone();
        let _guard = self.inner.locks.acquire(&post_lock_key(&placeholder_id)).await;

        let mut pending = PendingMutation::new();
        pending.apply(
            &mut self.registry(),
            CacheId::FeedList,
            CachePatch::Prepend(Box::new(placeholder)),
        );

        match self
            .inner
            .remote
            .create_post(&content)
            .await
            .and_then(Post::try_from)
        {
            Ok(post) => {
                let mut reg = self.registry();
                // Invalidate before the commit: entries that merely listed
                // this author refetch, while the entry that receives the
                // canonical entity stays fresh (and gains its tags)
                reg.invalidate(&[Tag::Author(self.inner.user.clone())]);
                pending.commit(&mut reg, Some((&placeholder_id, &post)));
                Ok(post)
            }
            Err(err) => {
                pending.roll_back(&mut self.registry());
                Err(EngineError::remote(MSG_CREATE, &err))
            }
        }
    }

    /// Toggle the acting user's like on a post.
    ///
    /// The toggle is applied immediately to every cached copy of the post
    /// (feed list, single post, saved posts) and toggled back on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] (after rollback) when the remote
    /// rejects.
    #[instrument(skip(self), fields(post = %id))]
    pub async fn toggle_like(&self, id: &PostId) -> Result<Post> {
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;

        let mut pending = PendingMutation::new();
        {
            let mut reg = self.registry();
            for cache in LIKE_CACHES {
                pending.apply(
                    &mut reg,
                    cache,
                    CachePatch::ToggleLike {
                        post: id.clone(),
                        user: self.inner.user.clone(),
                    },
                );
            }
        }

        match self
            .inner
            .remote
            .toggle_like(id)
            .await
            .and_then(Post::try_from)
        {
            Ok(post) => {
                pending.commit(&mut self.registry(), None);
                Ok(post)
            }
            Err(err) => {
                pending.roll_back(&mut self.registry());
                Err(EngineError::remote(MSG_LIKE, &err))
            }
        }
    }

    /// Edit a post's content.
    ///
    /// The new fields are shallow-merged into every cached copy
    /// immediately; prior values are restored on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for empty text and
    /// [`EngineError::Remote`] (after rollback) when the remote rejects.
    #[instrument(skip(self, content), fields(post = %id))]
    pub async fn edit_post(&self, id: &PostId, content: PostContent) -> Result<Post> {
        if content.text.trim().is_empty() {
            return Err(EngineError::Validation("Post text cannot be empty.".to_string()));
        }
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;

        let mut pending = PendingMutation::new();
        {
            let mut reg = self.registry();
            for cache in CacheId::ALL {
                pending.apply(
                    &mut reg,
                    cache,
                    CachePatch::SetContent {
                        post: id.clone(),
                        content: content.clone(),
                    },
                );
            }
        }

        match self
            .inner
            .remote
            .edit_post(id, &content)
            .await
            .and_then(Post::try_from)
        {
            Ok(post) => {
                let mut reg = self.registry();
                pending.commit(&mut reg, None);
                reg.invalidate(&[Tag::Post(id.clone())]);
                Ok(post)
            }
            Err(err) => {
                pending.roll_back(&mut self.registry());
                Err(EngineError::remote(MSG_EDIT, &err))
            }
        }
    }

    /// Delete a post.
    ///
    /// The post is removed from every list-shaped cache immediately and
    /// re-inserted at its original index on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] (after rollback) when the remote
    /// rejects.
    #[instrument(skip(self), fields(post = %id))]
    pub async fn delete_post(&self, id: &PostId) -> Result<()> {
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;

        let mut pending = PendingMutation::new();
        {
            let mut reg = self.registry();
            for cache in CacheId::ALL.into_iter().filter(|c| c.is_list()) {
                pending.apply(&mut reg, cache, CachePatch::Remove(id.clone()));
            }
        }

        match self.inner.remote.delete_post(id).await {
            Ok(()) => {
                let mut reg = self.registry();
                pending.commit(&mut reg, None);
                reg.invalidate(&[Tag::Post(id.clone())]);
                Ok(())
            }
            Err(err) => {
                pending.roll_back(&mut self.registry());
                Err(EngineError::remote(MSG_DELETE, &err))
            }
        }
    }

    /// Toggle the acting user's save on a post.
    ///
    /// The unsave path removes the post from the saved cache immediately.
    /// The save path applies no optimistic patch - the full entity
    /// projection the saved cache needs is unavailable at mutation time, so
    /// the post only appears after tag invalidation triggers a refetch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] (after rollback) when the remote
    /// rejects.
    #[instrument(skip(self), fields(post = %id))]
    pub async fn toggle_save(&self, id: &PostId) -> Result<Post> {
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;

        let mut pending = PendingMutation::new();
        {
            let mut reg = self.registry();
            let currently_saved = reg
                .get(CacheId::SavedPosts)
                .is_some_and(|entry| entry.value.post(id).is_some());
            if currently_saved {
                pending.apply(&mut reg, CacheId::SavedPosts, CachePatch::Remove(id.clone()));
            }
        }

        match self
            .inner
            .remote
            .toggle_save(id)
            .await
            .and_then(Post::try_from)
        {
            Ok(post) => {
                let mut reg = self.registry();
                pending.commit(&mut reg, None);
                reg.invalidate(&[Tag::Saved, Tag::Post(id.clone())]);
                Ok(post)
            }
            Err(err) => {
                pending.roll_back(&mut self.registry());
                Err(EngineError::remote(MSG_SAVE, &err))
            }
        }
    }

    // =========================================================================
    // Mutations settled by invalidation only
    // =========================================================================

    /// Invalidate `tags` after a successful patch-free mutation, or
    /// normalize the failure. With no patch applied there is nothing to
    /// undo; the UI keeps showing the last fetched state.
    fn settle_by_invalidation(
        &self,
        tags: &[Tag],
        outcome: std::result::Result<PostPayload, RemoteError>,
        fallback: &str,
    ) -> Result<Post> {
        match outcome.and_then(Post::try_from) {
            Ok(post) => {
                self.registry().invalidate(tags);
                Ok(post)
            }
            Err(err) => Err(EngineError::remote(fallback, &err)),
        }
    }

    /// Add a top-level comment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for empty text and
    /// [`EngineError::Remote`] when the remote rejects.
    #[instrument(skip(self, text), fields(post = %id))]
    pub async fn add_comment(&self, id: &PostId, text: &str) -> Result<Post> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::Validation("Comment cannot be empty.".to_string()));
        }
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;
        let outcome = self.inner.remote.add_comment(id, text).await;
        self.settle_by_invalidation(&[Tag::Post(id.clone())], outcome, MSG_COMMENT)
    }

    /// Delete a comment (or nested reply).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when the remote rejects.
    #[instrument(skip(self), fields(post = %id, comment = %comment_id))]
    pub async fn delete_comment(&self, id: &PostId, comment_id: &CommentId) -> Result<Post> {
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;
        let outcome = self.inner.remote.delete_comment(id, comment_id).await;
        self.settle_by_invalidation(&[Tag::Post(id.clone())], outcome, MSG_DELETE_COMMENT)
    }

    /// Toggle the acting user's like on a comment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when the remote rejects.
    #[instrument(skip(self), fields(post = %id, comment = %comment_id))]
    pub async fn toggle_comment_like(&self, id: &PostId, comment_id: &CommentId) -> Result<Post> {
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;
        let outcome = self.inner.remote.toggle_comment_like(id, comment_id).await;
        self.settle_by_invalidation(&[Tag::Post(id.clone())], outcome, MSG_LIKE)
    }

    /// Reply to a comment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for empty text and
    /// [`EngineError::Remote`] when the remote rejects.
    #[instrument(skip(self, text), fields(post = %id, comment = %comment_id))]
    pub async fn reply_comment(
        &self,
        id: &PostId,
        comment_id: &CommentId,
        text: &str,
    ) -> Result<Post> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::Validation("Reply cannot be empty.".to_string()));
        }
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;
        let outcome = self.inner.remote.reply_comment(id, comment_id, text).await;
        self.settle_by_invalidation(&[Tag::Post(id.clone())], outcome, MSG_REPLY)
    }

    /// Report a post for moderation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when the remote rejects.
    #[instrument(skip(self), fields(post = %id))]
    pub async fn report_post(&self, id: &PostId) -> Result<()> {
        let _guard = self.inner.locks.acquire(&post_lock_key(id)).await;
        match self.inner.remote.report_post(id).await {
            Ok(()) => {
                self.registry()
                    .invalidate(&[Tag::Reported, Tag::Post(id.clone())]);
                Ok(())
            }
            Err(err) => Err(EngineError::remote(MSG_REPORT, &err)),
        }
    }
}
