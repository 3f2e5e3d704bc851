//! Rows exchanged between the services and the stores.

use chrono::{DateTime, Utc};
use common::{
    BookId, CartId, Discount, Money, OrderId, OrderStatus, PaymentMethod, PaymentStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// Catalog data the checkout pipeline reads for a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: BookId,
    pub name: String,
    pub author_name: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub discount: Discount,
    pub available_stock: u32,
    pub is_active: bool,
}

impl BookRecord {
    /// Current selling price: list price minus discount, rounded half up to cents.
    pub fn unit_price(&self) -> Money {
        self.price.discounted(self.discount)
    }
}

/// A user's cart. Exactly one exists per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An active cart line joined with catalog display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemDetail {
    pub book_id: BookId,
    pub name: String,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Price locked when the line was last added or updated.
    pub unit_price: Money,
    pub count: u32,
    pub line_total: Money,
}

/// An active cart line with the book's stock as of this read, used by checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartItemRecord {
    pub book_id: BookId,
    pub count: u32,
    pub unit_price: Money,
    pub available_stock: u32,
}

/// An order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub total_price: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable order line as written at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub book_id: BookId,
    pub purchase_count: u32,
    pub purchase_price: Money,
    pub total_price: Money,
}

/// An order line joined with catalog display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemDetail {
    pub book_id: BookId,
    pub name: String,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub unit_price: Money,
    pub count: u32,
    pub line_total: Money,
}

/// A quantity to remove from a book's available stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub book_id: BookId,
    pub count: u32,
}

/// Outcome of decrementing stock for a whole order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOutcome {
    /// Every decrement affected its row.
    Applied,
    /// The decrement for this book matched no row with enough stock.
    Insufficient(BookId),
}

/// Limit/offset pagination for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a page, clamping the limit to `1..=MAX_LIMIT`.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}
