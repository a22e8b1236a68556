//! Domain types shared across Tidemark components.
//!
//! # Modules
//!
//! - [`id`] - Newtype wrappers for type-safe entity IDs
//! - [`cart`] - Cart state and line items
//! - [`post`] - Feed posts and recursive comment trees

pub mod cart;
pub mod id;
pub mod post;

pub use cart::*;
pub use id::*;
pub use post::*;
