//! Domain error types.

use common::{BookId, OrderId, OrderStatus};
use persistence::StoreError;
use thiserror::Error;

/// Errors raised while mutating a cart.
#[derive(Debug, Error)]
pub enum CartError {
    /// Requested quantity was zero or negative.
    #[error("Invalid count: {count} (must be greater than 0)")]
    InvalidCount { count: i32 },

    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    #[error("Book is not available for purchase: {0}")]
    BookInactive(BookId),

    /// Requested quantity exceeds the book's current stock.
    #[error("Insufficient stock for book {book_id}: requested {requested}, available {available}")]
    InsufficientStock {
        book_id: BookId,
        requested: u32,
        available: u32,
    },
}

/// Errors raised by checkout, payment confirmation and order queries.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    /// A line's quantity is no longer covered by the book's stock.
    #[error("Insufficient stock for book {0}")]
    InsufficientStock(BookId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The caller does not own the order.
    #[error("Not allowed to access order {0}")]
    Forbidden(OrderId),

    /// Listing every user's orders requires the ADMIN role.
    #[error("Admin role required")]
    AdminRequired,

    #[error("Order {order_id} is {status}, expected PENDING")]
    OrderNotPending {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// Every generated order number was already taken.
    #[error("Could not allocate a unique order number after {attempts} attempts")]
    OrderNumberConflict { attempts: u32 },
}

/// Coarse classification used by outer layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// The caller may not perform the operation.
    Forbidden,
    /// The current state does not allow the operation.
    State,
    /// A uniqueness constraint could not be satisfied.
    Conflict,
    /// The store is temporarily unreachable.
    Transient,
    Internal,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Cart(CartError::InvalidCount { .. }) => ErrorKind::Validation,
            DomainError::Cart(CartError::BookNotFound(_)) => ErrorKind::NotFound,
            DomainError::Cart(CartError::BookInactive(_))
            | DomainError::Cart(CartError::InsufficientStock { .. }) => ErrorKind::State,
            DomainError::Order(OrderError::OrderNotFound(_)) => ErrorKind::NotFound,
            DomainError::Order(OrderError::Forbidden(_) | OrderError::AdminRequired) => {
                ErrorKind::Forbidden
            }
            DomainError::Order(
                OrderError::EmptyCart
                | OrderError::InsufficientStock(_)
                | OrderError::OrderNotPending { .. },
            ) => ErrorKind::State,
            DomainError::Order(OrderError::OrderNumberConflict { .. }) => ErrorKind::Conflict,
            DomainError::Store(err) if err.is_transient() => ErrorKind::Transient,
            DomainError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DomainError::Cart(CartError::InvalidCount { .. }) => "invalid_count",
            DomainError::Cart(CartError::BookNotFound(_)) => "book_not_found",
            DomainError::Cart(CartError::BookInactive(_)) => "book_inactive",
            DomainError::Cart(CartError::InsufficientStock { .. })
            | DomainError::Order(OrderError::InsufficientStock(_)) => "insufficient_stock",
            DomainError::Order(OrderError::EmptyCart) => "empty_cart",
            DomainError::Order(OrderError::OrderNotFound(_)) => "order_not_found",
            DomainError::Order(OrderError::Forbidden(_) | OrderError::AdminRequired) => {
                "forbidden"
            }
            DomainError::Order(OrderError::OrderNotPending { .. }) => "order_not_pending",
            DomainError::Order(OrderError::OrderNumberConflict { .. }) => "order_number_conflict",
            DomainError::Store(_) => "store",
        }
    }
}
