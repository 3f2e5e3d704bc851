//! Integration tests for the cart → order → payment pipeline.
//!
//! These tests drive the services over the in-memory store and verify
//! pricing, all-or-nothing persistence and the stock race on confirmation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use common::{
    BookId, Discount, Money, OrderStatus, PaymentMethod, PaymentStatus, Principal, UserId,
};
use domain::{
    CartItemInput, CartManager, CheckoutCoordinator, CheckoutInput, DomainError, ErrorKind,
    Notification, OrderError, OrderQueries, PaymentConfirmInput, PaymentConfirmation,
    RecordingNotifier,
};
use persistence::{BookRecord, InMemoryStore, Page};

struct Harness {
    store: InMemoryStore,
    notifier: RecordingNotifier,
    carts: CartManager<InMemoryStore>,
    checkout: CheckoutCoordinator<InMemoryStore>,
    payments: PaymentConfirmation<InMemoryStore>,
    queries: OrderQueries<InMemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let notifier = RecordingNotifier::new();
        Self {
            carts: CartManager::new(store.clone()),
            checkout: CheckoutCoordinator::new(store.clone(), Arc::new(notifier.clone())),
            payments: PaymentConfirmation::new(store.clone(), Arc::new(notifier.clone())),
            queries: OrderQueries::new(store.clone()),
            store,
            notifier,
        }
    }

    fn with_order_numbers(numbers: impl Fn() -> String + Send + Sync + 'static) -> Self {
        let mut harness = Self::new();
        harness.checkout = CheckoutCoordinator::with_order_numbers(
            harness.store.clone(),
            Arc::new(harness.notifier.clone()),
            Arc::new(numbers),
        );
        harness
    }

    async fn book(&self, price_cents: i64, discount: Discount, stock: u32) -> BookId {
        let id = BookId::new();
        self.store
            .insert_book(BookRecord {
                id,
                name: format!("Book {id}"),
                author_name: "Ursula K. Le Guin".to_string(),
                image_url: Some("https://covers.example/1.jpg".to_string()),
                price: Money::from_cents(price_cents),
                discount,
                available_stock: stock,
                is_active: true,
            })
            .await;
        id
    }

    async fn stock(&self, book_id: BookId) -> u32 {
        self.store.book(book_id).await.unwrap().available_stock
    }

    async fn set_stock(&self, book_id: BookId, stock: u32) {
        let mut book = self.store.book(book_id).await.unwrap();
        book.available_stock = stock;
        self.store.insert_book(book).await;
    }

    async fn add(&self, principal: &Principal, book_id: BookId, count: i32) {
        self.carts
            .add_item(principal, CartItemInput::new(book_id, count))
            .await
            .unwrap();
    }
}

fn cod() -> CheckoutInput {
    CheckoutInput {
        payment_method: PaymentMethod::Cod,
    }
}

/// Book A at 40.00 and book B at 15.50, both with plenty of stock.
async fn two_book_cart(h: &Harness, principal: &Principal) -> (BookId, BookId) {
    let a = h.book(5000, Discount::from_percent(20).unwrap(), 10).await;
    let b = h.book(1550, Discount::NONE, 5).await;
    h.add(principal, a, 2).await;
    h.add(principal, b, 1).await;
    (a, b)
}

mod cart {
    use super::*;

    #[tokio::test]
    async fn unit_price_rounds_half_up() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let book = h
            .book(1999, Discount::from_basis_points(1500).unwrap(), 10)
            .await;

        h.add(&user, book, 3).await;
        let view = h.carts.get_cart(&user).await.unwrap();

        assert_eq!(view.items[0].count, 3);
        assert_eq!(view.items[0].unit_price, Money::from_cents(1699));
        assert_eq!(view.subtotal, Money::from_cents(5097));
    }

    #[tokio::test]
    async fn locked_price_survives_catalog_change() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let book = h.book(4000, Discount::NONE, 10).await;
        h.add(&user, book, 1).await;

        h.store.set_book_price(book, Money::from_cents(9900)).await;
        let view = h.carts.get_cart(&user).await.unwrap();
        assert_eq!(view.items[0].unit_price, Money::from_cents(4000));

        let view = h
            .carts
            .update_item(&user, CartItemInput::new(book, 1))
            .await
            .unwrap();
        assert_eq!(view.items[0].unit_price, Money::from_cents(9900));
    }

    #[tokio::test]
    async fn add_twice_overwrites() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let book = h.book(1000, Discount::NONE, 10).await;

        h.add(&user, book, 4).await;
        h.add(&user, book, 2).await;
        let view = h.carts.get_cart(&user).await.unwrap();

        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].count, 2);
    }

    #[tokio::test]
    async fn removing_absent_book_is_a_noop() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());

        let view = h.carts.remove_item(&user, BookId::new()).await.unwrap();

        assert!(view.is_empty());
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn totals_locked_prices() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        two_book_cart(&h, &user).await;

        let view = h.checkout.checkout(&user, cod()).await.unwrap();

        assert_eq!(view.order.total_price, Money::from_cents(9550));
        assert_eq!(view.order.total_price.to_string(), "95.50");
        assert_eq!(view.order.status, OrderStatus::Pending);
        assert_eq!(view.order.payment_status, PaymentStatus::Pending);
        assert_eq!(view.order.payment_method, Some(PaymentMethod::Cod));
        assert!(view.order.order_number.starts_with("BN-"));
        assert_eq!(view.items.len(), 2);
        assert_eq!(
            view.items.iter().map(|i| i.line_total).sum::<Money>(),
            Money::from_cents(9550)
        );
    }

    #[tokio::test]
    async fn leaves_stock_and_cart_untouched() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let (a, _) = two_book_cart(&h, &user).await;

        h.checkout.checkout(&user, cod()).await.unwrap();

        assert_eq!(h.stock(a).await, 10);
        assert_eq!(h.carts.get_cart(&user).await.unwrap().total_items, 3);
    }

    #[tokio::test]
    async fn empty_cart_persists_nothing() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());

        let err = h.checkout.checkout(&user, cod()).await.unwrap_err();

        assert!(matches!(err, DomainError::Order(OrderError::EmptyCart)));
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn insufficient_stock_persists_nothing() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let (a, _) = two_book_cart(&h, &user).await;
        h.set_stock(a, 1).await;

        let err = h.checkout.checkout(&user, cod()).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::InsufficientStock(id)) if id == a
        ));
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.store.order_item_count().await, 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn retries_taken_order_number() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let h = Harness::with_order_numbers(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 3 {
                "BN-TAKEN".to_string()
            } else {
                format!("BN-FRESH-{n}")
            }
        });
        let first = Principal::user(UserId::new());
        let second = Principal::user(UserId::new());
        let book = h.book(1000, Discount::NONE, 10).await;
        h.add(&first, book, 1).await;
        h.add(&second, book, 1).await;

        let taken = h.checkout.checkout(&first, cod()).await.unwrap();
        let fresh = h.checkout.checkout(&second, cod()).await.unwrap();

        assert_eq!(taken.order.order_number, "BN-TAKEN");
        assert_eq!(fresh.order.order_number, "BN-FRESH-3");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_order_numbers_conflict() {
        let h = Harness::with_order_numbers(|| "BN-ALWAYS".to_string());
        let first = Principal::user(UserId::new());
        let second = Principal::user(UserId::new());
        let book = h.book(1000, Discount::NONE, 10).await;
        h.add(&first, book, 1).await;
        h.add(&second, book, 1).await;
        h.checkout.checkout(&first, cod()).await.unwrap();

        let err = h.checkout.checkout(&second, cod()).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::OrderNumberConflict { attempts: 5 })
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn notifies_order_placed() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        two_book_cart(&h, &user).await;

        let view = h.checkout.checkout(&user, cod()).await.unwrap();

        assert!(matches!(
            h.notifier.sent().as_slice(),
            [Notification::OrderPlaced { order_id, .. }] if *order_id == view.order.id
        ));
    }
}

mod payment {
    use super::*;

    fn confirm(order: &domain::OrderView, success: bool) -> PaymentConfirmInput {
        PaymentConfirmInput {
            order_id: order.order.id,
            success,
        }
    }

    #[tokio::test]
    async fn success_completes_order() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let (a, b) = two_book_cart(&h, &user).await;
        let order = h.checkout.checkout(&user, cod()).await.unwrap();

        let view = h
            .payments
            .confirm_payment(&user, confirm(&order, true))
            .await
            .unwrap();

        assert_eq!(view.order.status, OrderStatus::Completed);
        assert_eq!(view.order.payment_status, PaymentStatus::Paid);
        assert_eq!(h.stock(a).await, 8);
        assert_eq!(h.stock(b).await, 4);
        assert!(h.carts.get_cart(&user).await.unwrap().is_empty());
        assert!(matches!(
            h.notifier.sent().last(),
            Some(Notification::OrderConfirmed { .. })
        ));
    }

    #[tokio::test]
    async fn failure_cancels_order_only() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let (a, b) = two_book_cart(&h, &user).await;
        let order = h.checkout.checkout(&user, cod()).await.unwrap();

        let view = h
            .payments
            .confirm_payment(&user, confirm(&order, false))
            .await
            .unwrap();

        assert_eq!(view.order.status, OrderStatus::Cancelled);
        assert_eq!(view.order.payment_status, PaymentStatus::Failed);
        assert_eq!(h.stock(a).await, 10);
        assert_eq!(h.stock(b).await, 5);
        assert_eq!(h.carts.get_cart(&user).await.unwrap().total_items, 3);
        assert!(matches!(
            h.notifier.sent().last(),
            Some(Notification::PaymentFailed { .. })
        ));
    }

    #[tokio::test]
    async fn reconfirming_terminal_order_is_rejected() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let (a, _) = two_book_cart(&h, &user).await;
        let order = h.checkout.checkout(&user, cod()).await.unwrap();
        h.payments
            .confirm_payment(&user, confirm(&order, true))
            .await
            .unwrap();

        for success in [true, false] {
            let err = h
                .payments
                .confirm_payment(&user, confirm(&order, success))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DomainError::Order(OrderError::OrderNotPending {
                    status: OrderStatus::Completed,
                    ..
                })
            ));
        }
        assert_eq!(h.stock(a).await, 8);
    }

    #[tokio::test]
    async fn other_users_order_is_forbidden() {
        let h = Harness::new();
        let owner = Principal::user(UserId::new());
        let intruder = Principal::admin(UserId::new());
        two_book_cart(&h, &owner).await;
        let order = h.checkout.checkout(&owner, cod()).await.unwrap();

        let err = h
            .payments
            .confirm_payment(&intruder, confirm(&order, true))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let stored = h.queries.get_order(&owner, order.order.id).await.unwrap();
        assert_eq!(stored.order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());

        let err = h
            .payments
            .confirm_payment(
                &user,
                PaymentConfirmInput {
                    order_id: common::OrderId::new(),
                    success: true,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn stock_shortfall_rolls_back_everything() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let (a, b) = two_book_cart(&h, &user).await;
        let order = h.checkout.checkout(&user, cod()).await.unwrap();
        h.set_stock(b, 0).await;

        let err = h
            .payments
            .confirm_payment(&user, confirm(&order, true))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::InsufficientStock(id)) if id == b
        ));
        assert_eq!(h.stock(a).await, 10);
        assert_eq!(h.carts.get_cart(&user).await.unwrap().total_items, 3);
        let stored = h.queries.get_order(&user, order.order.id).await.unwrap();
        assert_eq!(stored.order.status, OrderStatus::Pending);
        assert_eq!(stored.order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_confirmations_never_oversell() {
        let h = Arc::new(Harness::new());
        let book = h.book(2500, Discount::NONE, 1).await;

        let mut pending = Vec::new();
        for _ in 0..2 {
            let user = Principal::user(UserId::new());
            h.add(&user, book, 1).await;
            let order = h.checkout.checkout(&user, cod()).await.unwrap();
            pending.push((user, order));
        }

        let handles: Vec<_> = pending
            .into_iter()
            .map(|(user, order)| {
                let h = h.clone();
                tokio::spawn(async move {
                    h.payments
                        .confirm_payment(&user, confirm(&order, true))
                        .await
                })
            })
            .collect();

        let mut paid = 0;
        let mut short = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(view) => {
                    assert_eq!(view.order.status, OrderStatus::Completed);
                    paid += 1;
                }
                Err(DomainError::Order(OrderError::InsufficientStock(id))) => {
                    assert_eq!(id, book);
                    short += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((paid, short), (1, 1));
        assert_eq!(h.stock(book).await, 0);
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn lists_callers_orders_newest_first() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        let book = h.book(1000, Discount::NONE, 10).await;

        h.add(&user, book, 1).await;
        let older = h.checkout.checkout(&user, cod()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = h.checkout.checkout(&user, cod()).await.unwrap();

        let orders = h
            .queries
            .list_user_orders(&user, Page::default())
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order.id, newer.order.id);
        assert_eq!(orders[1].order.id, older.order.id);
        assert_eq!(orders[0].items.len(), 1);

        let stranger = Principal::user(UserId::new());
        assert!(
            h.queries
                .list_user_orders(&stranger, Page::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn list_all_requires_admin() {
        let h = Harness::new();
        let user = Principal::user(UserId::new());
        two_book_cart(&h, &user).await;
        h.checkout.checkout(&user, cod()).await.unwrap();

        let err = h
            .queries
            .list_all_orders(&user, Page::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::AdminRequired)));

        let admin = Principal::admin(UserId::new());
        let all = h
            .queries
            .list_all_orders(&admin, Page::new(Some(10), None))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn get_order_checks_ownership() {
        let h = Harness::new();
        let owner = Principal::user(UserId::new());
        two_book_cart(&h, &owner).await;
        let order = h.checkout.checkout(&owner, cod()).await.unwrap();

        let stranger = Principal::user(UserId::new());
        let err = h
            .queries
            .get_order(&stranger, order.order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::Forbidden(_))));

        let admin = Principal::admin(UserId::new());
        let seen = h.queries.get_order(&admin, order.order.id).await.unwrap();
        assert_eq!(seen.order.order_number, order.order.order_number);
    }
}
