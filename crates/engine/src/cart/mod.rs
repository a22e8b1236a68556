//! Cart mutation coordinator.
//!
//! Orchestrates snapshot, optimistic apply, remote call, and
//! commit/rollback for every cart operation:
//!
//! 1. snapshot the current [`CartState`];
//! 2. apply the mutation synchronously to local state and recompute totals;
//! 3. issue the corresponding remote call;
//! 4. on success merge the canonical server cart, on failure restore the
//!    snapshot and raise a normalized error.
//!
//! `apply_coupon` is the exception: the coupon is validated remotely first
//! and only a successful response touches local state. An incorrect
//! discount briefly shown to the user is worse than a short wait.

pub mod totals;

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{instrument, warn};
use uuid::Uuid;

use tidemark_core::{CartLine, CartState, CartStatus, LineId, ProductId};

use crate::error::{EngineError, Result};
use crate::locks::{CART_SCOPE, EntityLocks};
use crate::remote::{CartPayload, RemoteApi, RemoteError};

const MSG_LOAD: &str = "Failed to load cart. Please try again.";
const MSG_ADD: &str = "Failed to add item to cart. Please try again.";
const MSG_UPDATE: &str = "Failed to update item quantity. Please try again.";
const MSG_REMOVE: &str = "Failed to remove item from cart. Please try again.";
const MSG_CLEAR: &str = "Failed to clear cart. Please try again.";
const MSG_COUPON: &str = "Failed to apply coupon. Please try again.";

/// Mint a line ID for an optimistically added line. The canonical server
/// cart replaces it on commit.
fn provisional_line_id() -> LineId {
    LineId::new(format!("provisional-{}", Uuid::new_v4()))
}

/// Coordinator for all cart mutations.
///
/// The cart is a single shared resource, so every mutation runs through
/// one cart-scope queue slot; concurrent calls settle in dispatch order.
#[derive(Clone)]
pub struct CartCoordinator {
    inner: Arc<CartInner>,
}

struct CartInner {
    remote: Arc<dyn RemoteApi>,
    state: StdMutex<CartState>,
    updates: watch::Sender<CartState>,
    locks: Arc<EntityLocks>,
}

impl CartCoordinator {
    pub(crate) fn new(remote: Arc<dyn RemoteApi>, locks: Arc<EntityLocks>) -> Self {
        let initial = CartState::empty();
        let (updates, _) = watch::channel(initial.clone());
        Self {
            inner: Arc::new(CartInner {
                remote,
                state: StdMutex::new(initial),
                updates,
                locks,
            }),
        }
    }

    /// Current cart state (deep copy).
    #[must_use]
    pub fn state(&self) -> CartState {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to cart state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.updates.subscribe()
    }

    /// Mutate local state and publish the result to subscribers.
    fn with_state<T>(&self, mutate: impl FnOnce(&mut CartState) -> T) -> T {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let out = mutate(&mut state);
        self.inner.updates.send_replace(state.clone());
        out
    }

    /// Settle a cart mutation: merge the canonical server cart on success,
    /// restore the snapshot on failure.
    fn settle(
        &self,
        snapshot: CartState,
        outcome: std::result::Result<CartPayload, RemoteError>,
        fallback: &str,
    ) -> Result<CartState> {
        match outcome.and_then(CartState::try_from) {
            Ok(canonical) => {
                self.with_state(|state| *state = canonical.clone());
                Ok(canonical)
            }
            Err(err) => {
                warn!(error = %err, "cart mutation rejected, restoring snapshot");
                self.with_state(|state| *state = snapshot.clone());
                Err(EngineError::remote(fallback, &err))
            }
        }
    }

    /// Hydrate the cart from the remote.
    ///
    /// On failure the local cart is reset to an explicit well-formed empty
    /// state (never left partially populated) and the error is surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] when the fetch fails.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<CartState> {
        let _guard = self.inner.locks.acquire(CART_SCOPE).await;
        match self
            .inner
            .remote
            .get_cart()
            .await
            .and_then(CartState::try_from)
        {
            Ok(canonical) => {
                self.with_state(|state| *state = canonical.clone());
                Ok(canonical)
            }
            Err(err) => {
                warn!(error = %err, "cart hydration failed, falling back to empty cart");
                self.with_state(|state| {
                    *state = CartState::empty();
                    state.status = CartStatus::Unavailable;
                });
                Err(EngineError::remote(MSG_LOAD, &err))
            }
        }
    }

    /// Add a product to the cart.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a zero quantity and
    /// [`EngineError::Remote`] (after rollback) when the remote rejects.
    #[instrument(skip(self), fields(product = %product_id))]
    pub async fn add_item(
        &self,
        product_id: ProductId,
        unit_price: Decimal,
        quantity: u32,
    ) -> Result<CartState> {
        if quantity == 0 {
            return Err(EngineError::Validation(
                "Quantity must be at least 1.".to_string(),
            ));
        }
        let _guard = self.inner.locks.acquire(CART_SCOPE).await;
        let snapshot = self.state();
        self.with_state(|state| {
            if let Some(line) = state
                .items
                .iter_mut()
                .find(|line| line.product_id == product_id)
            {
                line.quantity += quantity;
            } else {
                state.items.push(CartLine {
                    line_id: provisional_line_id(),
                    product_id: product_id.clone(),
                    unit_price,
                    quantity,
                });
            }
            totals::recompute(state);
            state.last_updated = Utc::now();
        });
        let outcome = self.inner.remote.add_cart_item(&product_id, quantity).await;
        self.settle(snapshot, outcome, MSG_ADD)
    }

    /// Set the quantity of an existing line. A quantity of zero removes
    /// the line.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when the line does not exist and
    /// [`EngineError::Remote`] (after rollback) when the remote rejects.
    #[instrument(skip(self), fields(line = %line_id))]
    pub async fn update_quantity(&self, line_id: LineId, quantity: u32) -> Result<CartState> {
        let _guard = self.inner.locks.acquire(CART_SCOPE).await;
        let snapshot = self.state();
        if snapshot.line(&line_id).is_none() {
            return Err(EngineError::Validation("Item not found in cart.".to_string()));
        }
        if quantity == 0 {
            // Quantity below 1 removes the line rather than keeping a
            // zero-quantity entry
            self.with_state(|state| {
                state.items.retain(|line| line.line_id != line_id);
                totals::recompute(state);
                state.last_updated = Utc::now();
            });
            let outcome = self.inner.remote.remove_cart_item(&line_id).await;
            return self.settle(snapshot, outcome, MSG_UPDATE);
        }
        self.with_state(|state| {
            if let Some(line) = state.line_mut(&line_id) {
                line.quantity = quantity;
            }
            totals::recompute(state);
            state.last_updated = Utc::now();
        });
        let outcome = self.inner.remote.update_cart_item(&line_id, quantity).await;
        self.settle(snapshot, outcome, MSG_UPDATE)
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when the line does not exist and
    /// [`EngineError::Remote`] (after rollback) when the remote rejects.
    #[instrument(skip(self), fields(line = %line_id))]
    pub async fn remove_item(&self, line_id: LineId) -> Result<CartState> {
        let _guard = self.inner.locks.acquire(CART_SCOPE).await;
        let snapshot = self.state();
        if snapshot.line(&line_id).is_none() {
            return Err(EngineError::Validation("Item not found in cart.".to_string()));
        }
        self.with_state(|state| {
            state.items.retain(|line| line.line_id != line_id);
            totals::recompute(state);
            state.last_updated = Utc::now();
        });
        let outcome = self.inner.remote.remove_cart_item(&line_id).await;
        self.settle(snapshot, outcome, MSG_REMOVE)
    }

    /// Remove every line, coupon included.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] (after rollback) when the remote
    /// rejects.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<CartState> {
        let _guard = self.inner.locks.acquire(CART_SCOPE).await;
        let snapshot = self.state();
        self.with_state(|state| {
            state.items.clear();
            state.coupon = None;
            state.discount = Decimal::ZERO;
            totals::recompute(state);
            state.last_updated = Utc::now();
        });
        let outcome = self.inner.remote.clear_cart().await;
        self.settle(snapshot, outcome, MSG_CLEAR)
    }

    /// Validate a coupon remotely, then apply its discount.
    ///
    /// No optimistic update: the discount only appears after the remote
    /// confirms it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an empty code and
    /// [`EngineError::Remote`] when validation fails remotely.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<CartState> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EngineError::Validation(
                "Please enter a coupon code.".to_string(),
            ));
        }
        let _guard = self.inner.locks.acquire(CART_SCOPE).await;
        let outcome = self.inner.remote.apply_coupon(code).await;
        match outcome.and_then(|payload| payload.validate().map(|()| payload)) {
            Ok(payload) => Ok(self.with_state(|state| {
                state.coupon = Some(payload.code.clone());
                state.discount = payload.discount;
                totals::recompute(state);
                state.last_updated = Utc::now();
                state.clone()
            })),
            Err(err) => {
                warn!(error = %err, "coupon rejected");
                Err(EngineError::remote(MSG_COUPON, &err))
            }
        }
    }
}
