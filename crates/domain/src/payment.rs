//! Payment confirmation.

use std::sync::Arc;

use common::{OrderId, OrderStatus, PaymentStatus, Principal};
use persistence::{CartStore, Order, OrderStore, StockDecrement, StockOutcome};
use serde::Deserialize;

use crate::error::{DomainError, OrderError};
use crate::notification::{Notification, Notifier, dispatch};
use crate::views::OrderView;

/// Outcome reported by the payment provider for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmInput {
    pub order_id: OrderId,
    pub success: bool,
}

/// Applies payment outcomes to pending orders.
///
/// A successful payment completes the order, decrements stock for every line
/// and clears the owner's cart in one transaction. A failed payment cancels
/// the order and touches nothing else.
pub struct PaymentConfirmation<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
}

impl<S> PaymentConfirmation<S>
where
    S: CartStore + OrderStore,
{
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Records the payment outcome for one of the caller's pending orders.
    #[tracing::instrument(
        skip(self),
        fields(user_id = %principal.user_id, order_id = %input.order_id, success = input.success)
    )]
    pub async fn confirm_payment(
        &self,
        principal: &Principal,
        input: PaymentConfirmInput,
    ) -> Result<OrderView, DomainError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.apply(&mut tx, principal, input).await;
        let result = self.store.settle(tx, outcome).await;

        let label = match (&result, input.success) {
            (Ok(_), true) => "paid",
            (Ok(_), false) => "failed",
            (Err(_), _) => "rejected",
        };
        metrics::counter!("payment_confirmations_total", "outcome" => label).increment(1);

        match &result {
            Ok(view) => {
                tracing::info!(status = %view.order.status, "payment recorded");
                dispatch(self.notifier.as_ref(), notification_for(&view.order));
            }
            Err(err) => tracing::warn!(error = %err, "payment confirmation rejected"),
        }
        result
    }

    async fn apply(
        &self,
        tx: &mut S::Tx,
        principal: &Principal,
        input: PaymentConfirmInput,
    ) -> Result<OrderView, DomainError> {
        let order_id = input.order_id;
        let order = self
            .store
            .find_order(tx, order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        if order.user_id != principal.user_id {
            return Err(OrderError::Forbidden(order_id).into());
        }
        if !order.status.can_confirm() {
            return Err(OrderError::OrderNotPending {
                order_id,
                status: order.status,
            }
            .into());
        }

        let (status, payment_status) = if input.success {
            (OrderStatus::Completed, PaymentStatus::Paid)
        } else {
            (OrderStatus::Cancelled, PaymentStatus::Failed)
        };
        let moved = self
            .store
            .transition_order(tx, order_id, OrderStatus::Pending, status, payment_status)
            .await?;
        if !moved {
            // Another confirmation won the race since the read above.
            let current = self
                .store
                .find_order(tx, order_id)
                .await?
                .map_or(order.status, |o| o.status);
            return Err(OrderError::OrderNotPending {
                order_id,
                status: current,
            }
            .into());
        }

        if input.success {
            let items = self.store.order_items(tx, order_id).await?;
            let mut decrements: Vec<StockDecrement> = items
                .iter()
                .map(|item| StockDecrement {
                    book_id: item.book_id,
                    count: item.count,
                })
                .collect();
            // Lock book rows in a fixed order so concurrent confirmations cannot deadlock.
            decrements.sort_by_key(|d| d.book_id);
            if let StockOutcome::Insufficient(book_id) =
                self.store.decrement_stock_for(tx, &decrements).await?
            {
                return Err(OrderError::InsufficientStock(book_id).into());
            }

            let cart = self.store.get_or_create_cart(tx, order.user_id).await?;
            let cleared = self.store.clear_cart(tx, cart.id).await?;
            tracing::debug!(cleared, "cart cleared after payment");
        }

        let order = self
            .store
            .find_order(tx, order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        let items = self.store.order_items(tx, order_id).await?;
        Ok(OrderView { order, items })
    }
}

fn notification_for(order: &Order) -> Notification {
    if order.status == OrderStatus::Completed {
        Notification::OrderConfirmed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
        }
    } else {
        Notification::PaymentFailed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
        }
    }
}
