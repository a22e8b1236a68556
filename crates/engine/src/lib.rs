//! Tidemark Engine - client-side state synchronization.
//!
//! Keeps a local, UI-visible copy of server-owned entities (a shopping
//! cart and a social feed of posts and comments) consistent with a remote
//! JSON service, while giving the UI immediate optimistic feedback before
//! the remote confirms a change.
//!
//! # Architecture
//!
//! - The remote is a generic request/response collaborator behind the
//!   [`remote::RemoteApi`] trait; [`remote::HttpRemote`] is the default
//!   `reqwest`-backed implementation.
//! - Cart mutations flow through [`cart::CartCoordinator`]: snapshot,
//!   optimistic apply, remote call, then commit or rollback.
//! - Feed queries live in a [`cache::CacheRegistry`] of five named caches
//!   annotated with invalidation tags; selected mutations apply reversible
//!   patches through [`patch::PendingMutation`] and undo them on failure.
//! - [`SyncEngine`] is the uniform dispatch surface UI components call.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidemark_core::UserId;
//! use tidemark_engine::{SyncEngine, remote::{HttpRemote, RemoteConfig}};
//!
//! let remote = Arc::new(HttpRemote::new(&config));
//! let engine = SyncEngine::new(remote, UserId::new("u-1"));
//!
//! engine.cart().initialize().await?;
//! engine.cart().add_item(product_id, price, 1).await?;
//!
//! let feed = engine.feed().feed_list(20, 0).await?;
//! engine.feed().toggle_like(&feed[0].id).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod cart;
mod engine;
pub mod error;
pub mod feed;
mod locks;
pub mod patch;
pub mod query;
pub mod remote;
#[cfg(test)]
pub(crate) mod testing;

pub use engine::SyncEngine;
pub use error::{EngineError, ErrorBody, RemoteRejection, Result};
