//! Tidemark Core - Shared domain types.
//!
//! This crate provides the entity types mirrored by the sync engine:
//! the shopping cart (`CartState`, `CartLine`) and the social feed
//! (`Post`, `Comment`).
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! caches. Everything here is plain data that the engine snapshots,
//! patches, and rolls back; all types are `Clone` and serde-serializable
//! so a full snapshot is always a deep copy.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, cart state, and feed entities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
