//! Pure totals calculator for the cart.
//!
//! Recomputes every monetary field from the line items and the current
//! discount. Deterministic, no side effects; called after every structural
//! change to the items or the discount so the invariant
//! `total == subtotal + tax + shipping - discount` always holds.

use rust_decimal::Decimal;

use tidemark_core::{CartLine, CartState};

/// Sales tax rate applied to the subtotal (8%).
fn tax_rate() -> Decimal {
    Decimal::new(8, 2)
}

/// Subtotal above which shipping is free.
fn free_shipping_threshold() -> Decimal {
    Decimal::new(50, 0)
}

/// Flat shipping rate below the free-shipping threshold.
fn flat_shipping() -> Decimal {
    Decimal::new(499, 2)
}

/// Recomputed monetary fields for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    /// Sum of line totals.
    pub subtotal: Decimal,
    /// `subtotal * 0.08`, rounded to cents.
    pub tax: Decimal,
    /// Flat rate, waived above the threshold and for an empty cart.
    pub shipping: Decimal,
    /// `subtotal + tax + shipping - discount`.
    pub total: Decimal,
}

impl Totals {
    /// All-zero totals, used for the empty fallback cart.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    /// Compute totals from line items and a discount.
    ///
    /// An empty cart yields zero subtotal, tax, and shipping; shipping is
    /// only charged when there is something to ship.
    #[must_use]
    pub fn compute(items: &[CartLine], discount: Decimal) -> Self {
        let subtotal: Decimal = items.iter().map(CartLine::line_total).sum();
        let tax = (subtotal * tax_rate()).round_dp(2);
        let shipping = if subtotal == Decimal::ZERO || subtotal > free_shipping_threshold() {
            Decimal::ZERO
        } else {
            flat_shipping()
        };
        let total = subtotal + tax + shipping - discount;
        Self {
            subtotal,
            tax,
            shipping,
            total,
        }
    }
}

/// Recompute and write the monetary fields of `cart` in place.
pub fn recompute(cart: &mut CartState) {
    let totals = Totals::compute(&cart.items, cart.discount);
    cart.subtotal = totals.subtotal;
    cart.tax = totals.tax;
    cart.shipping = totals.shipping;
    cart.total = totals.total;
}
