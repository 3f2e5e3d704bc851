//! Shared application state.

use std::sync::Arc;

use domain::{CartManager, CheckoutCoordinator, Notifier, OrderQueries, PaymentConfirmation};
use persistence::{CartStore, OrderStore};

/// Stores that can back every route.
pub trait CheckoutStore: CartStore + OrderStore + Clone + 'static {}

impl<T> CheckoutStore for T where T: CartStore + OrderStore + Clone + 'static {}

/// Services accessible from all handlers.
pub struct AppState<S: CheckoutStore> {
    pub carts: CartManager<S>,
    pub checkout: CheckoutCoordinator<S>,
    pub payments: PaymentConfirmation<S>,
    pub orders: OrderQueries<S>,
}

impl<S: CheckoutStore> AppState<S> {
    /// Wires every service to the same store and notifier.
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            carts: CartManager::new(store.clone()),
            checkout: CheckoutCoordinator::new(store.clone(), notifier.clone()),
            payments: PaymentConfirmation::new(store.clone(), notifier),
            orders: OrderQueries::new(store),
        }
    }
}
