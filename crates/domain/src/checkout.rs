//! Cart to order conversion.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, OrderStatus, PaymentMethod, PaymentStatus, Principal, UserId};
use persistence::{CartStore, Order, OrderLineItem, OrderStore};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{DomainError, OrderError};
use crate::notification::{Notification, Notifier, dispatch};
use crate::views::OrderView;

/// Attempts at finding a free order number before giving up.
pub const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Produces candidate order numbers.
pub type OrderNumberGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Builds `BN-<UTC yyyymmddHHMMSS>-<8 uppercase hex digits>`.
pub fn generate_order_number() -> String {
    let suffix = (Uuid::new_v4().as_u128() >> 96) as u32;
    format!("BN-{}-{:08X}", Utc::now().format("%Y%m%d%H%M%S"), suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CheckoutInput {
    pub payment_method: PaymentMethod,
}

/// Turns the caller's cart into a pending order.
///
/// Checkout snapshots prices and quantities into order lines. It neither
/// decrements stock nor clears the cart; both happen on successful payment.
pub struct CheckoutCoordinator<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
    order_numbers: OrderNumberGenerator,
}

impl<S> CheckoutCoordinator<S>
where
    S: CartStore + OrderStore,
{
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_order_numbers(store, notifier, Arc::new(generate_order_number))
    }

    /// Uses `order_numbers` instead of the default generator.
    pub fn with_order_numbers(
        store: S,
        notifier: Arc<dyn Notifier>,
        order_numbers: OrderNumberGenerator,
    ) -> Self {
        Self {
            store,
            notifier,
            order_numbers,
        }
    }

    /// Creates a PENDING order from the caller's active cart lines.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn checkout(
        &self,
        principal: &Principal,
        input: CheckoutInput,
    ) -> Result<OrderView, DomainError> {
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let outcome = self
            .place_order(&mut tx, principal.user_id, input.payment_method)
            .await;
        let result = self.store.settle(tx, outcome).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(view) => {
                metrics::counter!("checkouts_total").increment(1);
                tracing::info!(
                    order_id = %view.order.id,
                    order_number = %view.order.order_number,
                    total = %view.order.total_price,
                    "order placed"
                );
                dispatch(
                    self.notifier.as_ref(),
                    Notification::OrderPlaced {
                        order_id: view.order.id,
                        order_number: view.order.order_number.clone(),
                        user_id: view.order.user_id,
                        total_price: view.order.total_price,
                    },
                );
            }
            Err(err) => {
                metrics::counter!("checkout_failures_total", "reason" => err.reason())
                    .increment(1);
                tracing::warn!(error = %err, "checkout failed");
            }
        }
        result
    }

    async fn place_order(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        payment_method: PaymentMethod,
    ) -> Result<OrderView, DomainError> {
        let cart = self.store.get_or_create_cart(tx, user_id).await?;
        let lines = self.store.cart_item_records(tx, cart.id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart.into());
        }
        if let Some(short) = lines.iter().find(|line| line.available_stock < line.count) {
            return Err(OrderError::InsufficientStock(short.book_id).into());
        }

        let now = Utc::now();
        let mut order = Order {
            id: OrderId::new(),
            order_number: String::new(),
            user_id,
            total_price: lines
                .iter()
                .map(|line| line.unit_price.multiply(line.count))
                .sum(),
            payment_method: Some(payment_method),
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.insert_with_fresh_number(tx, &mut order).await?;

        let items: Vec<OrderLineItem> = lines
            .iter()
            .map(|line| OrderLineItem {
                order_id: order.id,
                book_id: line.book_id,
                purchase_count: line.count,
                purchase_price: line.unit_price,
                total_price: line.unit_price.multiply(line.count),
            })
            .collect();
        self.store.insert_order_items(tx, &items).await?;

        let items = self.store.order_items(tx, order.id).await?;
        Ok(OrderView { order, items })
    }

    async fn insert_with_fresh_number(
        &self,
        tx: &mut S::Tx,
        order: &mut Order,
    ) -> Result<(), DomainError> {
        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            order.order_number = (self.order_numbers)();
            if self.store.insert_order(tx, order).await? {
                return Ok(());
            }
            tracing::debug!(attempt, order_number = %order.order_number, "order number taken");
        }
        Err(OrderError::OrderNumberConflict {
            attempts: MAX_ORDER_NUMBER_ATTEMPTS,
        }
        .into())
    }
}
