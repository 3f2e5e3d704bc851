//! Cart operations.

use common::{BookId, Principal, UserId};
use persistence::{CartStore, InventoryLookup};
use serde::Deserialize;

use crate::error::{CartError, DomainError};
use crate::views::CartView;

/// Request to place `count` copies of a book in the cart.
///
/// `count` is signed so that zero and negative quantities reach validation
/// instead of failing deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CartItemInput {
    pub book_id: BookId,
    pub count: i32,
}

impl CartItemInput {
    pub fn new(book_id: BookId, count: i32) -> Self {
        Self { book_id, count }
    }
}

/// Service for managing a user's cart.
///
/// Every operation runs in its own transaction, so the returned view reflects
/// exactly the state the operation wrote.
pub struct CartManager<S> {
    store: S,
}

impl<S> CartManager<S>
where
    S: CartStore + InventoryLookup,
{
    /// Creates a new cart manager over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the caller's cart, creating it on first access.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn get_cart(&self, principal: &Principal) -> Result<CartView, DomainError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.load_view(&mut tx, principal.user_id).await;
        self.store.settle(tx, outcome).await
    }

    /// Adds a book to the cart. Adding a book already in the cart overwrites
    /// its quantity.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id, book_id = %input.book_id))]
    pub async fn add_item(
        &self,
        principal: &Principal,
        input: CartItemInput,
    ) -> Result<CartView, DomainError> {
        self.upsert_item(principal.user_id, input, "add").await
    }

    /// Sets the quantity of a book in the cart, re-locking its price.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id, book_id = %input.book_id))]
    pub async fn update_item(
        &self,
        principal: &Principal,
        input: CartItemInput,
    ) -> Result<CartView, DomainError> {
        self.upsert_item(principal.user_id, input, "update").await
    }

    /// Removes a book from the cart. Removing a book that is not in the cart
    /// leaves the cart unchanged.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn remove_item(
        &self,
        principal: &Principal,
        book_id: BookId,
    ) -> Result<CartView, DomainError> {
        let mut tx = self.store.begin().await?;
        let outcome: Result<_, DomainError> = async {
            let cart = self.store.get_or_create_cart(&mut tx, principal.user_id).await?;
            if self.store.remove_cart_item(&mut tx, cart.id, book_id).await? {
                metrics::counter!("cart_mutations_total", "operation" => "remove").increment(1);
            } else {
                tracing::debug!("book not in cart");
            }
            self.load_view(&mut tx, principal.user_id).await
        }
        .await;
        self.store.settle(tx, outcome).await
    }

    /// Removes every line from the cart.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn clear(&self, principal: &Principal) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let outcome: Result<_, DomainError> = async {
            let cart = self.store.get_or_create_cart(&mut tx, principal.user_id).await?;
            let removed = self.store.clear_cart(&mut tx, cart.id).await?;
            tracing::debug!(removed, "cart cleared");
            Ok(())
        }
        .await;
        self.store.settle(tx, outcome).await?;
        metrics::counter!("cart_mutations_total", "operation" => "clear").increment(1);
        Ok(())
    }

    async fn upsert_item(
        &self,
        user_id: UserId,
        input: CartItemInput,
        operation: &'static str,
    ) -> Result<CartView, DomainError> {
        let count = match u32::try_from(input.count) {
            Ok(count) if count > 0 => count,
            _ => return Err(CartError::InvalidCount { count: input.count }.into()),
        };

        let mut tx = self.store.begin().await?;
        let outcome: Result<_, DomainError> = async {
            let book = self
                .store
                .find_book(&mut tx, input.book_id)
                .await?
                .ok_or(CartError::BookNotFound(input.book_id))?;
            if !book.is_active {
                return Err(CartError::BookInactive(book.id).into());
            }
            // Early check only; stock is re-validated at checkout and payment.
            if count > book.available_stock {
                return Err(CartError::InsufficientStock {
                    book_id: book.id,
                    requested: count,
                    available: book.available_stock,
                }
                .into());
            }

            let unit_price = book.unit_price();
            let cart = self.store.get_or_create_cart(&mut tx, user_id).await?;
            self.store
                .upsert_cart_item(&mut tx, cart.id, book.id, count, unit_price)
                .await?;
            tracing::info!(count, %unit_price, "cart line saved");
            self.load_view(&mut tx, user_id).await
        }
        .await;

        let view = self.store.settle(tx, outcome).await?;
        metrics::counter!("cart_mutations_total", "operation" => operation).increment(1);
        Ok(view)
    }

    async fn load_view(&self, tx: &mut S::Tx, user_id: UserId) -> Result<CartView, DomainError> {
        let cart = self.store.get_or_create_cart(tx, user_id).await?;
        let items = self.store.cart_items(tx, cart.id).await?;
        Ok(CartView::new(cart.id, cart.user_id, items))
    }
}
