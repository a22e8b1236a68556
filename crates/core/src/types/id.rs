//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. IDs are backed by
//! `String` because every remote endpoint issues opaque string identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`
/// - `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use tidemark_core::define_id;
/// define_id!(UserId);
/// define_id!(PostId);
///
/// let user_id = UserId::new("u-1");
/// let post_id = PostId::new("p-1");
///
/// // These are different types, so this won't compile:
/// // let _: UserId = post_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from a string value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

// Define standard entity IDs
define_id!(UserId);
define_id!(PostId);
define_id!(CommentId);
define_id!(ProductId);
define_id!(LineId);

/// Prefix used for locally minted post IDs awaiting a server-issued one.
const PROVISIONAL_PREFIX: &str = "provisional-";

impl PostId {
    /// Mint a provisional ID for an optimistically created post.
    ///
    /// The placeholder is replaced with the server-issued ID on commit,
    /// or removed entirely on rollback.
    #[must_use]
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this ID was minted locally and not yet confirmed.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_round_trip() {
        let id = PostId::new("p-42");
        assert_eq!(id.to_string(), "p-42");
        assert_eq!(PostId::from("p-42"), id);
    }

    #[test]
    fn test_provisional_ids_are_unique_and_flagged() {
        let a = PostId::provisional();
        let b = PostId::provisional();
        assert_ne!(a, b);
        assert!(a.is_provisional());
        assert!(!PostId::new("p-1").is_provisional());
    }
}
