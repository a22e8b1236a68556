//! Feed posts and recursive comment trees.
//!
//! Multiple caches may each hold an independent copy of the same `Post`;
//! the engine's patch manager is responsible for keeping those copies in
//! step during optimistic mutations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::id::{CommentId, PostId, UserId};

/// User-authored post content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    /// Body text.
    pub text: String,
    /// Optional attached image URL.
    pub image_url: Option<String>,
}

/// A comment on a post, with recursive replies.
///
/// Comments are owned by their parent [`Post`] and have no independent
/// lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Server-issued comment identifier.
    pub id: CommentId,
    /// Comment author.
    pub author: UserId,
    /// Comment text.
    pub text: String,
    /// Users who liked this comment.
    pub likes: BTreeSet<UserId>,
    /// Nested replies, oldest first.
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Toggle `user`'s like on this comment. Returns `true` if the user
    /// likes the comment after the toggle.
    pub fn toggle_like(&mut self, user: &UserId) -> bool {
        if self.likes.remove(user) {
            false
        } else {
            self.likes.insert(user.clone());
            true
        }
    }

    /// Depth-first search for a comment anywhere in a comment forest.
    pub fn find_mut<'a>(comments: &'a mut [Comment], id: &CommentId) -> Option<&'a mut Comment> {
        for comment in comments {
            if &comment.id == id {
                return Some(comment);
            }
            if let Some(found) = Self::find_mut(&mut comment.replies, id) {
                return Some(found);
            }
        }
        None
    }

    /// Remove a comment (by ID) anywhere in a comment forest.
    ///
    /// Returns the removed comment, replies included.
    pub fn remove(comments: &mut Vec<Comment>, id: &CommentId) -> Option<Comment> {
        if let Some(pos) = comments.iter().position(|c| &c.id == id) {
            return Some(comments.remove(pos));
        }
        for comment in comments {
            if let Some(removed) = Self::remove(&mut comment.replies, id) {
                return Some(removed);
            }
        }
        None
    }
}

/// A post in the social feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Server-issued (or provisional) post identifier.
    pub id: PostId,
    /// Post author.
    pub author: UserId,
    /// Post body.
    pub content: PostContent,
    /// Users who liked this post.
    pub likes: BTreeSet<UserId>,
    /// Top-level comments, oldest first.
    pub comments: Vec<Comment>,
    /// Free-form topic tags used by the list endpoint's tag filter.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Users who saved this post. Optional projection; empty when the
    /// serving endpoint does not include it.
    #[serde(default)]
    pub saved_by: BTreeSet<UserId>,
}

impl Post {
    /// Build the provisional placeholder for an optimistic create.
    #[must_use]
    pub fn provisional(author: UserId, content: PostContent) -> Self {
        Self {
            id: PostId::provisional(),
            author,
            content,
            likes: BTreeSet::new(),
            comments: Vec::new(),
            tags: Vec::new(),
            saved_by: BTreeSet::new(),
        }
    }

    /// Toggle `user`'s like on this post. Returns `true` if the user
    /// likes the post after the toggle.
    pub fn toggle_like(&mut self, user: &UserId) -> bool {
        if self.likes.remove(user) {
            false
        } else {
            self.likes.insert(user.clone());
            true
        }
    }

    /// Find a comment anywhere in this post's comment tree.
    pub fn find_comment_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        Comment::find_mut(&mut self.comments, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, replies: Vec<Comment>) -> Comment {
        Comment {
            id: CommentId::new(id),
            author: UserId::new("u-1"),
            text: format!("comment {id}"),
            likes: BTreeSet::new(),
            replies,
        }
    }

    #[test]
    fn test_toggle_like_round_trip() {
        let mut post = Post::provisional(
            UserId::new("u-1"),
            PostContent {
                text: "hello".to_string(),
                image_url: None,
            },
        );
        let user = UserId::new("u-2");
        assert!(post.toggle_like(&user));
        assert!(post.likes.contains(&user));
        assert!(!post.toggle_like(&user));
        assert!(post.likes.is_empty());
    }

    #[test]
    fn test_find_comment_in_nested_replies() {
        let mut post = Post::provisional(
            UserId::new("u-1"),
            PostContent {
                text: "hello".to_string(),
                image_url: None,
            },
        );
        post.comments = vec![comment("c-1", vec![comment("c-2", vec![comment("c-3", vec![])])])];

        let found = post.find_comment_mut(&CommentId::new("c-3"));
        assert!(found.is_some());
        assert!(post.find_comment_mut(&CommentId::new("c-9")).is_none());
    }

    #[test]
    fn test_remove_nested_comment() {
        let mut comments = vec![comment("c-1", vec![comment("c-2", vec![])])];
        let removed = Comment::remove(&mut comments, &CommentId::new("c-2"));
        assert_eq!(removed.map(|c| c.id), Some(CommentId::new("c-2")));
        assert!(comments.first().is_some_and(|c| c.replies.is_empty()));
    }
}
