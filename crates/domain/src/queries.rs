//! Read-only order lookups.

use common::{OrderId, Principal};
use persistence::{Order, OrderStore, Page};

use crate::error::{DomainError, OrderError};
use crate::views::OrderView;

pub struct OrderQueries<S> {
    store: S,
}

impl<S: OrderStore> OrderQueries<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The caller's orders, newest first.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn list_user_orders(
        &self,
        principal: &Principal,
        page: Page,
    ) -> Result<Vec<OrderView>, DomainError> {
        let mut tx = self.store.begin().await?;
        let outcome: Result<_, DomainError> = async {
            let orders = self
                .store
                .list_orders_by_user(&mut tx, principal.user_id, page)
                .await?;
            self.with_items(&mut tx, orders).await
        }
        .await;
        self.store.settle(tx, outcome).await
    }

    /// Every user's orders, newest first. Requires the ADMIN role.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn list_all_orders(
        &self,
        principal: &Principal,
        page: Page,
    ) -> Result<Vec<OrderView>, DomainError> {
        if !principal.is_admin() {
            return Err(OrderError::AdminRequired.into());
        }

        let mut tx = self.store.begin().await?;
        let outcome: Result<_, DomainError> = async {
            let orders = self.store.list_orders(&mut tx, page).await?;
            self.with_items(&mut tx, orders).await
        }
        .await;
        self.store.settle(tx, outcome).await
    }

    /// A single order, visible to its owner and to admins.
    #[tracing::instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn get_order(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<OrderView, DomainError> {
        let mut tx = self.store.begin().await?;
        let outcome: Result<_, DomainError> = async {
            let order = self
                .store
                .find_order(&mut tx, order_id)
                .await?
                .ok_or(OrderError::OrderNotFound(order_id))?;
            if !principal.can_access(order.user_id) {
                return Err(OrderError::Forbidden(order_id).into());
            }
            let items = self.store.order_items(&mut tx, order_id).await?;
            Ok(OrderView { order, items })
        }
        .await;
        self.store.settle(tx, outcome).await
    }

    async fn with_items(
        &self,
        tx: &mut S::Tx,
        orders: Vec<Order>,
    ) -> Result<Vec<OrderView>, DomainError> {
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.store.order_items(tx, order.id).await?;
            views.push(OrderView { order, items });
        }
        Ok(views)
    }
}
