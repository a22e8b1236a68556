//! Optimistic patch/undo manager.
//!
//! A mutation that wants immediate UI feedback applies reversible patches
//! to one or more caches through a [`PendingMutation`], which records the
//! inverse of every patch that actually changed something. On remote
//! success the mutation commits (optionally swapping a provisional
//! placeholder for the canonical server entity); on failure every recorded
//! inverse is replayed in reverse order of application.

use tracing::{debug, warn};
use uuid::Uuid;

use tidemark_core::{Post, PostContent, PostId, UserId};

use crate::cache::{CacheId, CacheRegistry, CacheValue, Tag};

/// Settlement state of one in-flight mutation.
///
/// `Idle -> PatchesApplied -> { Committed | RolledBack }`; both end states
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// No patch applied yet.
    Idle,
    /// At least one patch is live in a cache.
    PatchesApplied,
    /// Remote confirmed; patches are permanent.
    Committed,
    /// Remote rejected; every patch was undone.
    RolledBack,
}

impl Settlement {
    /// Whether this is an end state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// A reversible in-memory operation against one cache value.
///
/// Applying a patch returns the inverse that undoes it, or `None` when the
/// patch was a no-op for that cache (e.g. the post is not held there).
#[derive(Debug, Clone)]
pub enum CachePatch {
    /// Prepend a post to a list-shaped cache.
    Prepend(Box<Post>),
    /// Insert a post at a specific index (inverse of a removal).
    InsertAt {
        /// Original position, clamped to the current length.
        index: usize,
        /// The post to restore.
        post: Box<Post>,
    },
    /// Remove a post from a list-shaped cache.
    Remove(PostId),
    /// Toggle a user's membership in a post's likes (self-inverse).
    ToggleLike {
        /// Target post.
        post: PostId,
        /// Acting user.
        user: UserId,
    },
    /// Shallow-merge new content into a post (inverse restores the prior
    /// content).
    SetContent {
        /// Target post.
        post: PostId,
        /// Content to write.
        content: PostContent,
    },
}

impl CachePatch {
    /// Apply this patch to a cache value, returning the inverse if the
    /// value changed.
    fn apply(self, value: &mut CacheValue) -> Option<Self> {
        match self {
            Self::Prepend(post) => match value {
                CacheValue::Posts(posts) => {
                    let id = post.id.clone();
                    posts.insert(0, *post);
                    Some(Self::Remove(id))
                }
                CacheValue::Post(_) => None,
            },
            Self::InsertAt { index, post } => match value {
                CacheValue::Posts(posts) => {
                    let id = post.id.clone();
                    let index = index.min(posts.len());
                    posts.insert(index, *post);
                    Some(Self::Remove(id))
                }
                CacheValue::Post(_) => None,
            },
            Self::Remove(id) => match value {
                CacheValue::Posts(posts) => {
                    let index = posts.iter().position(|p| p.id == id)?;
                    let post = posts.remove(index);
                    Some(Self::InsertAt {
                        index,
                        post: Box::new(post),
                    })
                }
                CacheValue::Post(_) => None,
            },
            Self::ToggleLike { post, user } => {
                let copy = value.post_mut(&post)?;
                copy.toggle_like(&user);
                Some(Self::ToggleLike { post, user })
            }
            Self::SetContent { post, content } => {
                let copy = value.post_mut(&post)?;
                let prior = std::mem::replace(&mut copy.content, content);
                Some(Self::SetContent {
                    post,
                    content: prior,
                })
            }
        }
    }
}

/// The undo stack for one in-flight mutation.
///
/// Records `(cache, inverse)` pairs in application order; rollback replays
/// them in reverse.
pub struct PendingMutation {
    id: Uuid,
    patches: Vec<(CacheId, CachePatch)>,
    settlement: Settlement,
}

impl PendingMutation {
    /// Start tracking a new mutation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            patches: Vec::new(),
            settlement: Settlement::Idle,
        }
    }

    /// Current settlement state.
    #[must_use]
    pub const fn settlement(&self) -> Settlement {
        self.settlement
    }

    /// Apply a patch to one cache and record its inverse.
    ///
    /// A patch against a missing cache entry, or one that does not change
    /// the entry, records nothing.
    pub fn apply(&mut self, registry: &mut CacheRegistry, cache: CacheId, patch: CachePatch) {
        if self.settlement.is_terminal() {
            warn!(mutation = %self.id, "patch after settlement ignored");
            return;
        }
        let inverse = registry
            .entry_mut(cache)
            .and_then(|entry| patch.apply(&mut entry.value));
        if let Some(inverse) = inverse {
            self.patches.push((cache, inverse));
            self.settlement = Settlement::PatchesApplied;
            registry.publish(cache);
        }
    }

    /// Commit: drop the undo stack and, when `canonical` is given, replace
    /// every cached copy of that post (by its pre-commit ID) with the
    /// canonical server entity.
    ///
    /// Entries that received the canonical entity also gain its `Post` and
    /// `Author` tags, so later invalidations against the server-issued ID
    /// reach them.
    pub fn commit(&mut self, registry: &mut CacheRegistry, canonical: Option<(&PostId, &Post)>) {
        if self.settlement.is_terminal() {
            warn!(mutation = %self.id, "commit after settlement ignored");
            return;
        }
        if let Some((prior_id, post)) = canonical {
            for cache in CacheId::ALL {
                let replaced = registry.entry_mut(cache).is_some_and(|entry| {
                    let Some(copy) = entry.value.post_mut(prior_id) else {
                        return false;
                    };
                    *copy = post.clone();
                    entry.tags.insert(Tag::Post(post.id.clone()));
                    entry.tags.insert(Tag::Author(post.author.clone()));
                    true
                });
                if replaced {
                    registry.publish(cache);
                }
            }
        }
        self.patches.clear();
        self.settlement = Settlement::Committed;
        debug!(mutation = %self.id, "mutation committed");
    }

    /// Roll back: replay every recorded inverse in reverse order of
    /// application.
    pub fn roll_back(&mut self, registry: &mut CacheRegistry) {
        if self.settlement.is_terminal() {
            warn!(mutation = %self.id, "rollback after settlement ignored");
            return;
        }
        for (cache, inverse) in self.patches.drain(..).rev() {
            if let Some(entry) = registry.entry_mut(cache) {
                let _ = inverse.apply(&mut entry.value);
            }
            registry.publish(cache);
        }
        self.settlement = Settlement::RolledBack;
        debug!(mutation = %self.id, "mutation rolled back");
    }
}

impl Default for PendingMutation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryParam;
    use std::collections::{BTreeSet, HashSet};

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

    fn registry_with_feed(ids: &[&str]) -> CacheRegistry {
        let mut registry = CacheRegistry::new();
        registry.insert(
            CacheId::FeedList,
            CacheValue::Posts(ids.iter().map(|id| post(id)).collect()),
            HashSet::from([Tag::List]),
            QueryParam::Page { limit: 10, skip: 0 },
        );
        registry
    }

    fn feed_ids(registry: &CacheRegistry) -> Vec<String> {
        registry
            .get(CacheId::FeedList)
            .and_then(|e| e.value.as_posts().map(|p| p.to_vec()))
            .unwrap_or_default()
            .iter()
            .map(|p| p.id.to_string())
            .collect()
    }

    #[test]
    fn test_prepend_then_rollback_restores_the_list() {
        let mut registry = registry_with_feed(&["p-1", "p-2", "p-3"]);
        let mut pending = PendingMutation::new();
        assert_eq!(pending.settlement(), Settlement::Idle);

        let placeholder = post("provisional-x");
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::Prepend(Box::new(placeholder)),
        );
        assert_eq!(pending.settlement(), Settlement::PatchesApplied);
        assert_eq!(feed_ids(&registry).len(), 4);
        assert_eq!(feed_ids(&registry).first().map(String::as_str), Some("provisional-x"));

        pending.roll_back(&mut registry);
        assert_eq!(pending.settlement(), Settlement::RolledBack);
        assert_eq!(feed_ids(&registry), vec!["p-1", "p-2", "p-3"]);
    }

    #[test]
    fn test_commit_replaces_placeholder_with_canonical() {
        let mut registry = registry_with_feed(&["p-1"]);
        let mut pending = PendingMutation::new();
        let placeholder = post("provisional-x");
        let placeholder_id = placeholder.id.clone();
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::Prepend(Box::new(placeholder)),
        );

        let canonical = post("p-99");
        pending.commit(&mut registry, Some((&placeholder_id, &canonical)));
        assert_eq!(pending.settlement(), Settlement::Committed);
        assert_eq!(feed_ids(&registry), vec!["p-99", "p-1"]);
    }

    #[test]
    fn test_commit_tags_entries_with_the_canonical_entity() {
        let mut registry = registry_with_feed(&["p-1"]);
        let mut pending = PendingMutation::new();
        let placeholder = post("provisional-x");
        let placeholder_id = placeholder.id.clone();
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::Prepend(Box::new(placeholder)),
        );

        let canonical = post("p-99");
        pending.commit(&mut registry, Some((&placeholder_id, &canonical)));

        // The entry now depends on the server-issued entity: invalidating
        // its tags must mark the feed stale
        assert_eq!(registry.invalidate(&[Tag::Post(PostId::new("p-99"))]), 1);
    }

    #[test]
    fn test_remove_rolls_back_to_original_index() {
        let mut registry = registry_with_feed(&["p-1", "p-2", "p-3"]);
        let mut pending = PendingMutation::new();
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::Remove(PostId::new("p-2")),
        );
        assert_eq!(feed_ids(&registry), vec!["p-1", "p-3"]);

        pending.roll_back(&mut registry);
        assert_eq!(feed_ids(&registry), vec!["p-1", "p-2", "p-3"]);
    }

    #[test]
    fn test_toggle_like_is_self_inverse() {
        let mut registry = registry_with_feed(&["p-1"]);
        let mut pending = PendingMutation::new();
        let user = UserId::new("u-9");
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::ToggleLike {
                post: PostId::new("p-1"),
                user: user.clone(),
            },
        );
        let liked = registry
            .get(CacheId::FeedList)
            .and_then(|e| e.value.post(&PostId::new("p-1")).map(|p| p.likes.contains(&user)));
        assert_eq!(liked, Some(true));

        pending.roll_back(&mut registry);
        let liked = registry
            .get(CacheId::FeedList)
            .and_then(|e| e.value.post(&PostId::new("p-1")).map(|p| p.likes.contains(&user)));
        assert_eq!(liked, Some(false));
    }

    #[test]
    fn test_set_content_rollback_restores_prior_fields() {
        let mut registry = registry_with_feed(&["p-1"]);
        let mut pending = PendingMutation::new();
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::SetContent {
                post: PostId::new("p-1"),
                content: PostContent {
                    text: "edited".to_string(),
                    image_url: Some("https://img".to_string()),
                },
            },
        );
        let text = registry
            .get(CacheId::FeedList)
            .and_then(|e| e.value.post(&PostId::new("p-1")).map(|p| p.content.text.clone()));
        assert_eq!(text.as_deref(), Some("edited"));

        pending.roll_back(&mut registry);
        let restored = registry
            .get(CacheId::FeedList)
            .and_then(|e| e.value.post(&PostId::new("p-1")).map(|p| p.content.clone()));
        assert_eq!(
            restored,
            Some(PostContent {
                text: "post p-1".to_string(),
                image_url: None
            })
        );
    }

    #[test]
    fn test_patch_against_missing_entry_records_nothing() {
        let mut registry = CacheRegistry::new();
        let mut pending = PendingMutation::new();
        pending.apply(
            &mut registry,
            CacheId::SavedPosts,
            CachePatch::Remove(PostId::new("p-1")),
        );
        // Nothing was recorded, so the mutation never left Idle
        assert_eq!(pending.settlement(), Settlement::Idle);
    }

    #[test]
    fn test_terminal_states_reject_further_transitions() {
        let mut registry = registry_with_feed(&["p-1"]);
        let mut pending = PendingMutation::new();
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::Remove(PostId::new("p-1")),
        );
        pending.roll_back(&mut registry);
        assert_eq!(pending.settlement(), Settlement::RolledBack);

        // A commit after rollback must not resurrect the mutation
        pending.commit(&mut registry, None);
        assert_eq!(pending.settlement(), Settlement::RolledBack);
        assert_eq!(feed_ids(&registry), vec!["p-1"]);
    }

    #[test]
    fn test_rollback_replays_inverses_in_reverse_order() {
        let mut registry = registry_with_feed(&["p-1", "p-2"]);
        let mut pending = PendingMutation::new();
        // Remove p-1 (index 0), then p-2 (now index 0)
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::Remove(PostId::new("p-1")),
        );
        pending.apply(
            &mut registry,
            CacheId::FeedList,
            CachePatch::Remove(PostId::new("p-2")),
        );
        assert!(feed_ids(&registry).is_empty());

        // Replaying in application order would scramble the indices;
        // reverse order restores the original sequence
        pending.roll_back(&mut registry);
        assert_eq!(feed_ids(&registry), vec!["p-1", "p-2"]);
    }
}
