use async_trait::async_trait;
use common::{
    BookId, CartId, Discount, Money, OrderId, OrderStatus, PaymentMethod, PaymentStatus, UserId,
};
use sqlx::{
    PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    BookRecord, Cart, CartItemDetail, CartItemRecord, Order, OrderItemDetail, OrderLineItem, Page,
    Result, StoreError,
    store::{CartStore, InventoryLookup, OrderStore, TransactionScope},
};

const ORDER_COLUMNS: &str = "id, order_number, user_id, total_price_cents, payment_method, \
     payment_status, status, created_at, updated_at";

/// PostgreSQL-backed store implementation.
///
/// Transactions run at the server's default isolation (read committed);
/// stock safety relies on the conditional `UPDATE ... WHERE available_stock >= $n`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn count(row: &PgRow, column: &'static str) -> Result<u32> {
        let value: i32 = row.try_get(column)?;
        u32::try_from(value).map_err(|_| StoreError::corrupt(column, format!("negative {value}")))
    }

    fn row_to_book(row: PgRow) -> Result<BookRecord> {
        let discount_bps = Self::count(&row, "discount_bps")?;
        Ok(BookRecord {
            id: BookId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            author_name: row.try_get("author_name")?,
            image_url: row.try_get("image_url")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            discount: Discount::from_basis_points(discount_bps)
                .map_err(|e| StoreError::corrupt("books", e))?,
            available_stock: Self::count(&row, "available_stock")?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let payment_method: Option<String> = row.try_get("payment_method")?;
        let payment_status: String = row.try_get("payment_status")?;
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            payment_method: payment_method
                .map(|m| m.parse::<PaymentMethod>())
                .transpose()
                .map_err(|e| StoreError::corrupt("orders", e))?,
            payment_status: payment_status
                .parse::<PaymentStatus>()
                .map_err(|e| StoreError::corrupt("orders", e))?,
            status: status
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::corrupt("orders", e))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Maps a display row shared by cart and order line queries.
    fn row_to_line(row: &PgRow) -> Result<(BookId, String, String, Option<String>, Money, u32)> {
        Ok((
            BookId::from_uuid(row.try_get::<Uuid, _>("book_id")?),
            row.try_get("name")?,
            row.try_get("author_name")?,
            row.try_get("image_url")?,
            Money::from_cents(row.try_get("price_cents")?),
            Self::count(row, "count")?,
        ))
    }
}

#[async_trait]
impl TransactionScope for PostgresStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        Ok(tx.rollback().await?)
    }
}

#[async_trait]
impl InventoryLookup for PostgresStore {
    async fn find_book(&self, tx: &mut Self::Tx, book_id: BookId) -> Result<Option<BookRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, author_name, image_url, price_cents, discount_bps, available_stock, is_active
            FROM books
            WHERE id = $1
            "#,
        )
        .bind(book_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_book).transpose()
    }

    async fn decrement_stock(&self, tx: &mut Self::Tx, book_id: BookId, count: u32) -> Result<bool> {
        let count = i32::try_from(count)
            .map_err(|_| StoreError::corrupt("books", format!("decrement of {count} units")))?;

        let result = sqlx::query(
            r#"
            UPDATE books
            SET available_stock = available_stock - $2
            WHERE id = $1 AND available_stock >= $2
            "#,
        )
        .bind(book_id.as_uuid())
        .bind(count)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_or_create_cart(&self, tx: &mut Self::Tx, user_id: UserId) -> Result<Cart> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"
            INSERT INTO carts (id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING id, user_id, created_at, updated_at
            "#,
        )
        .bind(CartId::new().as_uuid())
        .bind(user_id.as_uuid())
        .fetch_one(&mut **tx)
        .await?;

        Self::row_to_cart(row)
    }

    async fn cart_items(&self, tx: &mut Self::Tx, cart_id: CartId) -> Result<Vec<CartItemDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.book_id, b.name, b.author_name, b.image_url,
                   ci.locked_price_cents AS price_cents, ci.count
            FROM cart_items ci
            JOIN books b ON b.id = ci.book_id
            WHERE ci.cart_id = $1 AND ci.deleted_at IS NULL
            ORDER BY ci.created_at ASC, ci.book_id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        rows.iter()
            .map(|row| {
                let (book_id, name, author_name, image_url, unit_price, count) =
                    Self::row_to_line(row)?;
                Ok(CartItemDetail {
                    book_id,
                    name,
                    author_name,
                    image_url,
                    unit_price,
                    count,
                    line_total: unit_price.multiply(count),
                })
            })
            .collect()
    }

    async fn cart_item_records(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
    ) -> Result<Vec<CartItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.book_id, ci.count, ci.locked_price_cents, b.available_stock
            FROM cart_items ci
            JOIN books b ON b.id = ci.book_id
            WHERE ci.cart_id = $1 AND ci.deleted_at IS NULL
            ORDER BY ci.created_at ASC, ci.book_id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CartItemRecord {
                    book_id: BookId::from_uuid(row.try_get::<Uuid, _>("book_id")?),
                    count: Self::count(row, "count")?,
                    unit_price: Money::from_cents(row.try_get("locked_price_cents")?),
                    available_stock: Self::count(row, "available_stock")?,
                })
            })
            .collect()
    }

    async fn upsert_cart_item(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
        book_id: BookId,
        count: u32,
        unit_price: Money,
    ) -> Result<()> {
        let count = i32::try_from(count)
            .map_err(|_| StoreError::corrupt("cart_items", format!("count {count}")))?;

        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, book_id, count, locked_price_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cart_id, book_id) DO UPDATE SET
                count = EXCLUDED.count,
                locked_price_cents = EXCLUDED.locked_price_cents,
                updated_at = now(),
                deleted_at = NULL
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(book_id.as_uuid())
        .bind(count)
        .bind(unit_price.cents())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn remove_cart_item(
        &self,
        tx: &mut Self::Tx,
        cart_id: CartId,
        book_id: BookId,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items
            SET deleted_at = now(), updated_at = now()
            WHERE cart_id = $1 AND book_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(book_id.as_uuid())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&self, tx: &mut Self::Tx, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items
            SET deleted_at = now(), updated_at = now()
            WHERE cart_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(cart_id.as_uuid())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<bool> {
        // Only the order number conflict is swallowed; a duplicate id still errors.
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, total_price_cents, payment_method,
                                payment_status, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (order_number) DO NOTHING
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.as_uuid())
        .bind(order.total_price.cents())
        .bind(order.payment_method.map(|m| m.as_str()))
        .bind(order.payment_status.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_order_items(&self, tx: &mut Self::Tx, items: &[OrderLineItem]) -> Result<()> {
        for item in items {
            let count = i32::try_from(item.purchase_count).map_err(|_| {
                StoreError::corrupt("order_items", format!("count {}", item.purchase_count))
            })?;

            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, book_id, purchase_count, purchase_price_cents, total_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.order_id.as_uuid())
            .bind(item.book_id.as_uuid())
            .bind(count)
            .bind(item.purchase_price.cents())
            .bind(item.total_price.cents())
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn find_order(&self, tx: &mut Self::Tx, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(order_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn order_items(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT oi.book_id, b.name, b.author_name, b.image_url,
                   oi.purchase_price_cents AS price_cents, oi.purchase_count AS count,
                   oi.total_price_cents
            FROM order_items oi
            JOIN books b ON b.id = oi.book_id
            WHERE oi.order_id = $1
            ORDER BY oi.created_at ASC, oi.book_id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        rows.iter()
            .map(|row| {
                let (book_id, name, author_name, image_url, unit_price, count) =
                    Self::row_to_line(row)?;
                Ok(OrderItemDetail {
                    book_id,
                    name,
                    author_name,
                    image_url,
                    unit_price,
                    count,
                    line_total: Money::from_cents(row.try_get("total_price_cents")?),
                })
            })
            .collect()
    }

    async fn transition_order(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, payment_status = $4, updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(payment_status.as_str())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_orders_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.as_uuid())
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_orders(&self, tx: &mut Self::Tx, page: Page) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
