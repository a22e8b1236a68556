//! Per-entity mutation queue.
//!
//! Mutations targeting the same entity (a post ID, or the cart as a whole)
//! acquire that entity's async mutex for their full dispatch-to-settlement
//! span. `tokio::sync::Mutex` queues waiters in FIFO order, so concurrent
//! mutations against the same entity settle in dispatch order instead of
//! last-settled-wins; mutations against different entities still interleave
//! freely.

use std::collections::HashMap;
use std::sync::{Mutex as StdMutex, PoisonError};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Queue key for cart-scope mutations.
pub(crate) const CART_SCOPE: &str = "cart";

/// Lazily allocated map of per-entity async mutexes.
pub(crate) struct EntityLocks {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub(crate) fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the queue slot for `key`, waiting behind any mutation
    /// already holding it.
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // A slot with no holder and no waiter is only referenced by the
            // map itself; purge those so the map tracks live entities only
            map.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
