//! Shared types for the bookstore checkout pipeline.
//!
//! Identifiers, money arithmetic, the authenticated principal and the order
//! status enums live here so the persistence layer and the domain services
//! agree on one vocabulary.

pub mod ids;
pub mod money;
pub mod principal;
pub mod status;

pub use ids::{BookId, CartId, OrderId, UserId};
pub use money::{Discount, InvalidDiscount, Money};
pub use principal::{Principal, Role};
pub use status::{OrderStatus, ParseStatusError, PaymentMethod, PaymentStatus};
