use async_trait::async_trait;
use common::{BookId, CartId, Money, OrderId, OrderStatus, PaymentStatus, UserId};

use crate::{
    BookRecord, Cart, CartItemDetail, CartItemRecord, Order, OrderItemDetail, OrderLineItem, Page,
    Result, StockDecrement, StockOutcome, StoreError,
};

/// Unit-of-work boundary.
///
/// `begin` hands out a transaction handle that every participating store call
/// receives explicitly. Writes made through the handle become visible to other
/// transactions only on `commit`. Dropping a handle without committing rolls
/// it back. Scopes do not nest.
#[async_trait]
pub trait TransactionScope: Send + Sync {
    /// Transaction handle threaded through store calls.
    type Tx: Send + 'static;

    /// Starts a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Makes all writes of the transaction durable.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Discards all writes of the transaction.
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    /// Commits if `outcome` is `Ok`, rolls back otherwise.
    ///
    /// A failed rollback is logged and the original error is returned.
    async fn settle<T, E>(
        &self,
        tx: Self::Tx,
        outcome: std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<StoreError> + std::fmt::Display + Send,
    {
        match outcome {
            Ok(value) => {
                self.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(error = %err, "rolling back transaction");
                if let Err(rollback_err) = self.rollback(tx).await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Read access to the external catalog plus its atomic stock decrement.
#[async_trait]
pub trait InventoryLookup: TransactionScope {
    /// Loads a book's pricing, stock and active flag.
    async fn find_book(&self, tx: &mut Self::Tx, book_id: BookId) -> Result<Option<BookRecord>>;

    /// Subtracts `count` from the book's available stock only if at least
    /// `count` units are available. Returns false if no row was affected.
    async fn decrement_stock(&self, tx: &mut Self::Tx, book_id: BookId, count: u32)
    -> Result<bool>;
}

/// Persistence for carts and their line items.
#[async_trait]
pub trait CartStore: TransactionScope {
    /// Returns the user's cart, creating it on first access.
    async fn get_or_create_cart(&self, tx: &mut Self::Tx, user_id: UserId) -> Result<Cart>;

    /// Active lines joined with catalog display data, in the order they were first added.
    async fn cart_items(&self, tx: &mut Self::Tx, cart_id: CartId) -> Result<Vec<CartItemDetail>>;

    /// Active lines with the books' current stock levels.
    async fn cart_item_records(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
    ) -> Result<Vec<CartItemRecord>>;

    /// Inserts or overwrites the line keyed on (cart, book), reviving it if it
    /// was soft-deleted.
    async fn upsert_cart_item(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
        book_id: BookId,
        count: u32,
        unit_price: Money,
    ) -> Result<()>;

    /// Soft-deletes the line. Returns false if there was no active line.
    async fn remove_cart_item(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
        book_id: BookId,
    ) -> Result<bool>;

    /// Soft-deletes every active line. Returns the number of lines removed.
    async fn clear_cart(&self, tx: &mut Self::Tx, cart_id: CartId) -> Result<u64>;
}

/// Persistence for orders and their line items.
#[async_trait]
pub trait OrderStore: InventoryLookup {
    /// Inserts the order header unless its order number is already taken.
    /// Returns false on an order number collision.
    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<bool>;

    async fn insert_order_items(&self, tx: &mut Self::Tx, items: &[OrderLineItem]) -> Result<()>;

    async fn find_order(&self, tx: &mut Self::Tx, order_id: OrderId) -> Result<Option<Order>>;

    /// Order lines joined with catalog display data.
    async fn order_items(&self, tx: &mut Self::Tx, order_id: OrderId)
    -> Result<Vec<OrderItemDetail>>;

    /// Moves the order from `from` to `to`/`payment_status`. Returns false if
    /// the stored status was no longer `from`.
    async fn transition_order(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<bool>;

    /// A user's orders, newest first.
    async fn list_orders_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>>;

    /// All orders, newest first.
    async fn list_orders(&self, tx: &mut Self::Tx, page: Page) -> Result<Vec<Order>>;

    /// Applies conditional decrements in order, stopping at the first book
    /// without enough stock. The caller must roll back on `Insufficient`.
    async fn decrement_stock_for(
        &self,
        tx: &mut Self::Tx,
        items: &[StockDecrement],
    ) -> Result<StockOutcome> {
        for item in items {
            if !self.decrement_stock(tx, item.book_id, item.count).await? {
                return Ok(StockOutcome::Insufficient(item.book_id));
            }
        }
        Ok(StockOutcome::Applied)
    }
}
