//! Cart state and line items.
//!
//! `CartState` is the engine's local mirror of the server-owned cart. All
//! monetary fields use `rust_decimal::Decimal` so the totals invariant
//! (`total == subtotal + tax + shipping - discount`) holds exactly, not
//! within a float tolerance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::id::{LineId, ProductId};

/// A single line in the cart.
///
/// Lines are owned exclusively by [`CartState`]; a quantity update below 1
/// removes the line instead of keeping a zero-quantity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Server-issued line identifier.
    pub line_id: LineId,
    /// Product this line refers to.
    pub product_id: ProductId,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Quantity, always >= 1.
    pub quantity: u32,
}

impl CartLine {
    /// Extended price for this line (`unit_price * quantity`).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Lifecycle status of the local cart mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// No hydration attempt has completed yet.
    #[default]
    Uninitialized,
    /// Hydrated from the remote (or reset to a well-formed empty cart).
    Ready,
    /// The last hydration attempt failed; the empty fallback is in place.
    Unavailable,
}

/// The local mirror of the server-owned cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    /// Ordered line items.
    pub items: Vec<CartLine>,
    /// Sum of line totals.
    pub subtotal: Decimal,
    /// Tax computed from the subtotal.
    pub tax: Decimal,
    /// Flat-rate shipping, waived above the free-shipping threshold.
    pub shipping: Decimal,
    /// Discount from the applied coupon, if any.
    pub discount: Decimal,
    /// `subtotal + tax + shipping - discount`.
    pub total: Decimal,
    /// Applied coupon code, if any.
    pub coupon: Option<String>,
    /// Hydration status.
    pub status: CartStatus,
    /// Timestamp of the last local mutation or merge.
    pub last_updated: DateTime<Utc>,
}

impl CartState {
    /// A well-formed empty cart.
    ///
    /// Used both as the pre-hydration default and as the explicit fallback
    /// when hydration fails (the cart is never left partially populated).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            coupon: None,
            status: CartStatus::Uninitialized,
            last_updated: Utc::now(),
        }
    }

    /// Find a line by its ID.
    #[must_use]
    pub fn line(&self, line_id: &LineId) -> Option<&CartLine> {
        self.items.iter().find(|l| &l.line_id == line_id)
    }

    /// Find a line by its ID, mutably.
    pub fn line_mut(&mut self, line_id: &LineId) -> Option<&mut CartLine> {
        self.items.iter_mut().find(|l| &l.line_id == line_id)
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    /// Whether the monetary fields satisfy the totals invariant.
    #[must_use]
    pub fn totals_consistent(&self) -> bool {
        self.total == self.subtotal + self.tax + self.shipping - self.discount
    }
}

impl Default for CartState {
    fn default() -> Self {
        Self::empty()
    }
}
