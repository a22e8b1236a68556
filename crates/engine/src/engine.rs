use std::sync::Arc;

use tidemark_core::UserId;

use crate::cart::CartCoordinator;
use crate::feed::FeedCoordinator;
use crate::locks::EntityLocks;
use crate::remote::RemoteApi;

/// The uniform dispatch surface UI components call.
///
/// Owns one coordinator per domain; both share the per-entity mutation
/// queue, so cart and feed mutations against the same key settle in
/// dispatch order. Cloning is cheap and every clone observes the same
/// state.
#[derive(Clone)]
pub struct SyncEngine {
    cart: CartCoordinator,
    feed: FeedCoordinator,
}

impl SyncEngine {
    /// Build an engine acting on behalf of `user` against `remote`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteApi>, user: UserId) -> Self {
        let locks = Arc::new(EntityLocks::new());
        Self {
            cart: CartCoordinator::new(Arc::clone(&remote), Arc::clone(&locks)),
            feed: FeedCoordinator::new(remote, locks, user),
        }
    }

    /// Cart operations.
    #[must_use]
    pub fn cart(&self) -> &CartCoordinator {
        &self.cart
    }

    /// Feed queries and post mutations.
    #[must_use]
    pub fn feed(&self) -> &FeedCoordinator {
        &self.feed
    }
}
