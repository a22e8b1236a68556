//! Named query caches with tag-based invalidation.
//!
//! Five named caches each hold an independent projection of the feed: the
//! main list, a single post, a per-user list, saved posts, and reported
//! posts. Every entry carries the set of tags it depends on; a mutation
//! declares the tags it invalidates, and any entry whose tag set intersects
//! them is marked stale and refetched on next access.

use std::collections::{HashMap, HashSet};

use tokio::sync::watch;
use tracing::debug;

use tidemark_core::{Post, PostId, UserId};

use crate::query::QueryState;

/// The five named query caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheId {
    /// Main feed list.
    FeedList,
    /// Single-post view.
    SinglePost,
    /// Posts authored by one user.
    UserPosts,
    /// The acting user's saved posts.
    SavedPosts,
    /// Reported posts (privileged).
    ReportedPosts,
}

impl CacheId {
    /// Every named cache, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::FeedList,
        Self::SinglePost,
        Self::UserPosts,
        Self::SavedPosts,
        Self::ReportedPosts,
    ];

    /// Caches that hold an ordered list of posts (everything but
    /// [`CacheId::SinglePost`]).
    #[must_use]
    pub const fn is_list(self) -> bool {
        !matches!(self, Self::SinglePost)
    }
}

/// A dependency tag carried by cache entries and declared by mutations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// A specific post.
    Post(PostId),
    /// Posts authored by a specific user.
    Author(UserId),
    /// The main feed list.
    List,
    /// The saved-posts projection.
    Saved,
    /// The reported-posts projection.
    Reported,
}

/// The value held by a cache entry: a single post or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    /// A single post (the [`CacheId::SinglePost`] shape).
    Post(Box<Post>),
    /// An ordered list of posts.
    Posts(Vec<Post>),
}

impl CacheValue {
    /// Borrow the copy of `id` held by this value, if present.
    #[must_use]
    pub fn post(&self, id: &PostId) -> Option<&Post> {
        match self {
            Self::Post(post) => (&post.id == id).then_some(post.as_ref()),
            Self::Posts(posts) => posts.iter().find(|p| &p.id == id),
        }
    }

    /// Mutably borrow the copy of `id` held by this value, if present.
    pub fn post_mut(&mut self, id: &PostId) -> Option<&mut Post> {
        match self {
            Self::Post(post) => (&post.id == id).then_some(post.as_mut()),
            Self::Posts(posts) => posts.iter_mut().find(|p| &p.id == id),
        }
    }

    /// Position of `id` within a list-shaped value.
    #[must_use]
    pub fn position(&self, id: &PostId) -> Option<usize> {
        match self {
            Self::Post(_) => None,
            Self::Posts(posts) => posts.iter().position(|p| &p.id == id),
        }
    }

    /// The list of posts, when list-shaped.
    #[must_use]
    pub fn as_posts(&self) -> Option<&[Post]> {
        match self {
            Self::Post(_) => None,
            Self::Posts(posts) => Some(posts),
        }
    }
}

/// The query parameter a cache entry was last populated for.
///
/// A new access with a different parameter bypasses the cached value and
/// refetches, the same way a stale entry does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    /// Parameterless query (saved, reported).
    None,
    /// Feed pagination window.
    Page {
        /// Maximum number of posts.
        limit: u32,
        /// Pagination offset.
        skip: u32,
    },
    /// Single post by ID.
    Post(PostId),
    /// Posts authored by one user.
    User(UserId),
}

/// One named query's current result plus the tags it depends on.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached result.
    pub value: CacheValue,
    /// Tags this entry depends on.
    pub tags: HashSet<Tag>,
    /// Marked by tag invalidation; forces a refetch on next access.
    pub stale: bool,
    /// Parameter the entry was fetched with.
    pub param: QueryParam,
}

/// Registry of the five named caches and their subscription channels.
///
/// All mutation flows through the coordinators; the registry itself is
/// `pub(crate)`-mutable only.
pub struct CacheRegistry {
    entries: HashMap<CacheId, CacheEntry>,
    channels: HashMap<CacheId, watch::Sender<QueryState>>,
}

impl CacheRegistry {
    /// Create an empty registry with one subscription channel per cache.
    #[must_use]
    pub fn new() -> Self {
        let channels = CacheId::ALL
            .into_iter()
            .map(|id| (id, watch::channel(QueryState::idle()).0))
            .collect();
        Self {
            entries: HashMap::new(),
            channels,
        }
    }

    /// Subscribe to a named query's `{ data, is_loading, is_error, error }`
    /// stream.
    #[must_use]
    pub fn subscribe(&self, id: CacheId) -> watch::Receiver<QueryState> {
        self.channel(id).subscribe()
    }

    fn channel(&self, id: CacheId) -> &watch::Sender<QueryState> {
        // Every CacheId is inserted in new(); the map never shrinks.
        self.channels
            .get(&id)
            .unwrap_or_else(|| unreachable!("channel missing for {id:?}"))
    }

    /// Current entry for a cache, if populated.
    #[must_use]
    pub fn get(&self, id: CacheId) -> Option<&CacheEntry> {
        self.entries.get(&id)
    }

    /// Mutable entry access for the patch manager.
    pub(crate) fn entry_mut(&mut self, id: CacheId) -> Option<&mut CacheEntry> {
        self.entries.get_mut(&id)
    }

    /// The cached value for `param`, unless the entry is stale, missing,
    /// or was fetched with a different parameter.
    #[must_use]
    pub fn fresh(&self, id: CacheId, param: &QueryParam) -> Option<CacheValue> {
        self.entries
            .get(&id)
            .filter(|entry| !entry.stale && &entry.param == param)
            .map(|entry| entry.value.clone())
    }

    /// Replace a cache entry with a freshly fetched value and publish it.
    pub(crate) fn insert(
        &mut self,
        id: CacheId,
        value: CacheValue,
        tags: HashSet<Tag>,
        param: QueryParam,
    ) {
        self.channel(id).send_replace(QueryState::ready(value.clone()));
        self.entries.insert(
            id,
            CacheEntry {
                value,
                tags,
                stale: false,
                param,
            },
        );
    }

    /// Mark every entry whose tag set intersects `tags` as stale.
    ///
    /// Returns the number of entries invalidated. Stale entries keep
    /// serving their current data to subscribers until the next access
    /// triggers a refetch.
    pub(crate) fn invalidate(&mut self, tags: &[Tag]) -> usize {
        let mut count = 0;
        for (id, entry) in &mut self.entries {
            if !entry.stale && tags.iter().any(|t| entry.tags.contains(t)) {
                entry.stale = true;
                count += 1;
                debug!(cache = ?id, "cache entry invalidated");
            }
        }
        count
    }

    /// Publish a loading state for a cache, keeping existing data visible.
    pub(crate) fn mark_loading(&self, id: CacheId) {
        let data = self.entries.get(&id).map(|e| e.value.clone());
        self.channel(id).send_replace(QueryState::loading(data));
    }

    /// Publish the current value of a cache (after a patch or commit).
    pub(crate) fn publish(&self, id: CacheId) {
        if let Some(entry) = self.entries.get(&id) {
            self.channel(id)
                .send_replace(QueryState::ready(entry.value.clone()));
        }
    }

    /// Publish a failed refetch, keeping existing data visible.
    pub(crate) fn publish_error(&self, id: CacheId, message: String) {
        let data = self.entries.get(&id).map(|e| e.value.clone());
        self.channel(id)
            .send_replace(QueryState::failed(data, message));
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tidemark_core::PostContent;

    fn post(id: &str) -> Post {
        Post {
            id: PostId::new(id),
            author: UserId::new("u-1"),
            content: PostContent {
                text: format!("post {id}"),
                image_url: None,
            },
            likes: BTreeSet::new(),
            comments: Vec::new(),
            tags: Vec::new(),
            saved_by: BTreeSet::new(),
        }
    }

    fn feed_entry(registry: &mut CacheRegistry, ids: &[&str]) {
        let posts: Vec<Post> = ids.iter().map(|id| post(id)).collect();
        let mut tags: HashSet<Tag> = posts.iter().map(|p| Tag::Post(p.id.clone())).collect();
        tags.insert(Tag::List);
        registry.insert(
            CacheId::FeedList,
            CacheValue::Posts(posts),
            tags,
            QueryParam::Page { limit: 10, skip: 0 },
        );
    }

    #[test]
    fn test_invalidation_by_tag_intersection() {
        let mut registry = CacheRegistry::new();
        feed_entry(&mut registry, &["p-1", "p-2"]);

        // A tag the entry does not carry leaves it fresh
        assert_eq!(registry.invalidate(&[Tag::Saved]), 0);
        assert!(registry
            .fresh(CacheId::FeedList, &QueryParam::Page { limit: 10, skip: 0 })
            .is_some());

        // A carried tag marks it stale
        assert_eq!(registry.invalidate(&[Tag::Post(PostId::new("p-2"))]), 1);
        assert!(registry
            .fresh(CacheId::FeedList, &QueryParam::Page { limit: 10, skip: 0 })
            .is_none());
    }

    #[test]
    fn test_param_mismatch_bypasses_cache() {
        let mut registry = CacheRegistry::new();
        feed_entry(&mut registry, &["p-1"]);
        assert!(registry
            .fresh(CacheId::FeedList, &QueryParam::Page { limit: 10, skip: 10 })
            .is_none());
    }

    #[test]
    fn test_subscribers_see_inserts_and_errors() {
        let mut registry = CacheRegistry::new();
        let rx = registry.subscribe(CacheId::FeedList);
        assert!(rx.borrow().data.is_none());

        feed_entry(&mut registry, &["p-1"]);
        assert!(rx.borrow().data.is_some());
        assert!(!rx.borrow().is_error);

        registry.publish_error(CacheId::FeedList, "Failed to load posts.".to_string());
        let state = rx.borrow();
        assert!(state.is_error);
        // Previous data stays visible through a failed refetch
        assert!(state.data.is_some());
    }

    #[test]
    fn test_cache_value_position_and_lookup() {
        let value = CacheValue::Posts(vec![post("p-1"), post("p-2")]);
        assert_eq!(value.position(&PostId::new("p-2")), Some(1));
        assert!(value.post(&PostId::new("p-1")).is_some());
        assert!(value.post(&PostId::new("p-9")).is_none());

        let single = CacheValue::Post(Box::new(post("p-1")));
        assert_eq!(single.position(&PostId::new("p-1")), None);
        assert!(single.post(&PostId::new("p-1")).is_some());
    }
}
