//! Persistence layer for carts, orders and the catalog stock they consume.
//!
//! Every store operation takes the transaction handle of the enclosing
//! [`TransactionScope`] explicitly, so a checkout or payment confirmation
//! either commits all of its writes or none of them.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{BookId, CartId, Money, OrderId, UserId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, MemoryTx};
pub use postgres::PostgresStore;
pub use records::{
    BookRecord, Cart, CartItemDetail, CartItemRecord, Order, OrderItemDetail, OrderLineItem, Page,
    StockDecrement, StockOutcome,
};
pub use store::{CartStore, InventoryLookup, OrderStore, TransactionScope};
