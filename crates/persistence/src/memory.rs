use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{BookId, CartId, Money, OrderId, OrderStatus, PaymentStatus, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    BookRecord, Cart, CartItemDetail, CartItemRecord, Order, OrderItemDetail, OrderLineItem, Page,
    Result, StoreError,
    store::{CartStore, InventoryLookup, OrderStore, TransactionScope},
};

#[derive(Debug, Clone)]
struct CartLine {
    count: u32,
    unit_price: Money,
    /// Insertion sequence of the line's first add; preserved across updates.
    seq: u64,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    books: HashMap<BookId, BookRecord>,
    carts: HashMap<UserId, Cart>,
    cart_lines: BTreeMap<(CartId, BookId), CartLine>,
    orders: HashMap<OrderId, Order>,
    order_numbers: HashSet<String>,
    order_lines: Vec<OrderLineItem>,
    next_seq: u64,
}

impl MemoryState {
    fn book(&self, book_id: BookId) -> Result<&BookRecord> {
        self.books
            .get(&book_id)
            .ok_or_else(|| StoreError::corrupt("cart_items", format!("unknown book {book_id}")))
    }

    fn active_lines(&self, cart_id: CartId) -> Vec<(BookId, &CartLine)> {
        let mut lines: Vec<_> = self
            .cart_lines
            .iter()
            .filter(|((cart, _), line)| *cart == cart_id && !line.deleted)
            .map(|((_, book_id), line)| (*book_id, line))
            .collect();
        lines.sort_by_key(|(_, line)| line.seq);
        lines
    }

    fn newest_first<'a>(orders: impl Iterator<Item = &'a Order>, page: Page) -> Vec<Order> {
        let mut orders: Vec<_> = orders.cloned().collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.id.as_uuid().cmp(&b.id.as_uuid()))
        });
        orders
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect()
    }
}

/// In-memory store implementation for testing and local runs.
///
/// A transaction holds an exclusive lock over the whole state, so
/// transactions are fully serialized. Rollback restores a snapshot taken at
/// `begin`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

/// Transaction handle of [`InMemoryStore`].
pub struct MemoryTx {
    state: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog book.
    pub async fn insert_book(&self, book: BookRecord) {
        self.state.lock().await.books.insert(book.id, book);
    }

    /// Returns a catalog book.
    pub async fn book(&self, book_id: BookId) -> Option<BookRecord> {
        self.state.lock().await.books.get(&book_id).cloned()
    }

    /// Changes a book's list price, as the catalog admin would.
    pub async fn set_book_price(&self, book_id: BookId, price: Money) {
        if let Some(book) = self.state.lock().await.books.get_mut(&book_id) {
            book.price = price;
        }
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the number of order lines stored.
    pub async fn order_item_count(&self) -> usize {
        self.state.lock().await.order_lines.len()
    }
}

#[async_trait]
impl TransactionScope for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let state = self.state.clone().lock_owned().await;
        let snapshot = Some(state.clone());
        Ok(MemoryTx { state, snapshot })
    }

    async fn commit(&self, mut tx: MemoryTx) -> Result<()> {
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl InventoryLookup for InMemoryStore {
    async fn find_book(&self, tx: &mut MemoryTx, book_id: BookId) -> Result<Option<BookRecord>> {
        Ok(tx.state.books.get(&book_id).cloned())
    }

    async fn decrement_stock(&self, tx: &mut MemoryTx, book_id: BookId, count: u32) -> Result<bool> {
        match tx.state.books.get_mut(&book_id) {
            Some(book) if book.available_stock >= count => {
                book.available_stock -= count;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_or_create_cart(&self, tx: &mut MemoryTx, user_id: UserId) -> Result<Cart> {
        let cart = tx.state.carts.entry(user_id).or_insert_with(|| {
            let now = Utc::now();
            Cart {
                id: CartId::new(),
                user_id,
                created_at: now,
                updated_at: now,
            }
        });
        Ok(cart.clone())
    }

    async fn cart_items(&self, tx: &mut MemoryTx, cart_id: CartId) -> Result<Vec<CartItemDetail>> {
        let state = &*tx.state;
        state
            .active_lines(cart_id)
            .into_iter()
            .map(|(book_id, line)| {
                let book = state.book(book_id)?;
                Ok(CartItemDetail {
                    book_id,
                    name: book.name.clone(),
                    author_name: book.author_name.clone(),
                    image_url: book.image_url.clone(),
                    unit_price: line.unit_price,
                    count: line.count,
                    line_total: line.unit_price.multiply(line.count),
                })
            })
            .collect()
    }

    async fn cart_item_records(
        &self,
        tx: &mut MemoryTx,
        cart_id: CartId,
    ) -> Result<Vec<CartItemRecord>> {
        let state = &*tx.state;
        state
            .active_lines(cart_id)
            .into_iter()
            .map(|(book_id, line)| {
                Ok(CartItemRecord {
                    book_id,
                    count: line.count,
                    unit_price: line.unit_price,
                    available_stock: state.book(book_id)?.available_stock,
                })
            })
            .collect()
    }

    async fn upsert_cart_item(
        &self,
        tx: &mut MemoryTx,
        cart_id: CartId,
        book_id: BookId,
        count: u32,
        unit_price: Money,
    ) -> Result<()> {
        let state = &mut *tx.state;
        let seq = state.next_seq;
        let line = state
            .cart_lines
            .entry((cart_id, book_id))
            .or_insert_with(|| CartLine {
                count,
                unit_price,
                seq,
                deleted: false,
            });
        if line.seq == seq {
            state.next_seq += 1;
        }
        line.count = count;
        line.unit_price = unit_price;
        line.deleted = false;
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        tx: &mut MemoryTx,
        cart_id: CartId,
        book_id: BookId,
    ) -> Result<bool> {
        match tx.state.cart_lines.get_mut(&(cart_id, book_id)) {
            Some(line) if !line.deleted => {
                line.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_cart(&self, tx: &mut MemoryTx, cart_id: CartId) -> Result<u64> {
        let mut removed = 0;
        for ((cart, _), line) in tx.state.cart_lines.iter_mut() {
            if *cart == cart_id && !line.deleted {
                line.deleted = true;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, tx: &mut MemoryTx, order: &Order) -> Result<bool> {
        if !tx.state.order_numbers.insert(order.order_number.clone()) {
            return Ok(false);
        }
        tx.state.orders.insert(order.id, order.clone());
        Ok(true)
    }

    async fn insert_order_items(&self, tx: &mut MemoryTx, items: &[OrderLineItem]) -> Result<()> {
        tx.state.order_lines.extend_from_slice(items);
        Ok(())
    }

    async fn find_order(&self, tx: &mut MemoryTx, order_id: OrderId) -> Result<Option<Order>> {
        Ok(tx.state.orders.get(&order_id).cloned())
    }

    async fn order_items(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemDetail>> {
        let state = &*tx.state;
        state
            .order_lines
            .iter()
            .filter(|line| line.order_id == order_id)
            .map(|line| {
                let book = state.book(line.book_id)?;
                Ok(OrderItemDetail {
                    book_id: line.book_id,
                    name: book.name.clone(),
                    author_name: book.author_name.clone(),
                    image_url: book.image_url.clone(),
                    unit_price: line.purchase_price,
                    count: line.purchase_count,
                    line_total: line.total_price,
                })
            })
            .collect()
    }

    async fn transition_order(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<bool> {
        match tx.state.orders.get_mut(&order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.payment_status = payment_status;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_orders_by_user(
        &self,
        tx: &mut MemoryTx,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>> {
        let orders = tx.state.orders.values().filter(|o| o.user_id == user_id);
        Ok(MemoryState::newest_first(orders, page))
    }

    async fn list_orders(&self, tx: &mut MemoryTx, page: Page) -> Result<Vec<Order>> {
        Ok(MemoryState::newest_first(tx.state.orders.values(), page))
    }
}
