//! Read models returned by the services.

use common::{CartId, Money, UserId};
use persistence::{CartItemDetail, Order, OrderItemDetail};
use serde::Serialize;

/// A user's cart with its active lines and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItemDetail>,
    /// Sum of line totals at the locked prices.
    pub subtotal: Money,
    /// Sum of line quantities.
    pub total_items: u64,
}

impl CartView {
    pub(crate) fn new(cart_id: CartId, user_id: UserId, items: Vec<CartItemDetail>) -> Self {
        let subtotal = items.iter().map(|item| item.line_total).sum();
        let total_items = items.iter().map(|item| u64::from(item.count)).sum();
        Self {
            cart_id,
            user_id,
            items,
            subtotal,
            total_items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// An order header with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemDetail>,
}
