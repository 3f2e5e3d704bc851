//! Checkout domain services.
//!
//! This crate provides:
//! - [`CartManager`] for the per-user cart with locked prices
//! - [`CheckoutCoordinator`] turning a cart into a pending order
//! - [`PaymentConfirmation`] completing or cancelling pending orders
//! - [`OrderQueries`] for order history
//! - [`Notifier`] implementations for post-commit notifications
//!
//! Each service is generic over the persistence traits and runs every
//! operation in a single transaction of the store.

pub mod cart;
pub mod checkout;
pub mod error;
pub mod notification;
pub mod payment;
pub mod queries;
pub mod views;

pub use cart::{CartItemInput, CartManager};
pub use checkout::{
    CheckoutCoordinator, CheckoutInput, MAX_ORDER_NUMBER_ATTEMPTS, OrderNumberGenerator,
    generate_order_number,
};
pub use error::{CartError, DomainError, ErrorKind, OrderError};
pub use notification::{
    ChannelNotifier, NoopNotifier, Notification, Notifier, NotifyError, RecordingNotifier,
};
pub use payment::{PaymentConfirmInput, PaymentConfirmation};
pub use queries::OrderQueries;
pub use views::{CartView, OrderView};
