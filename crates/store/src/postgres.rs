use std::collections::HashMap;

use async_trait::async_trait;
use common::{LineItemId, Money, OrderId, PaymentEventId, PaymentId, ProductId, StallId, UserId};
use domain::{
    LineItem, Order, OrderSnapshot, OrderState, Payment, PaymentEvent, PaymentStatus,
    ProcessingStatus, ProductStock, Stall,
};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Store, StoreTx},
};

const ORDER_COLUMNS: &str =
    "o.id, o.client_id, o.state, o.total, o.notes, o.courier_id, o.created_at, o.updated_at";

const PRODUCT_COLUMNS: &str =
    "p.id, p.stall_id, p.name, p.price, p.stock, p.active, s.active AS stall_active";

const PAYMENT_COLUMNS: &str =
    "id, order_id, amount, status, provider, provider_reference, created_at, updated_at";

const EVENT_COLUMNS: &str =
    "id, provider, provider_reference, received_at, raw_payload, processing_status, handled";

const PAYMENT_REFERENCE_KEY: &str = "payments_provider_reference_key";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a bounded pool.
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
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::debug!("Database migrations applied");
        Ok(())
    }

    async fn fetch_orders(&self, sql: &str, user: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(sql)
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        let ids = row_ids(&rows)?;
        let items = load_items(&self.pool, &ids).await?;
        assemble_orders(rows, items)
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = load_items(&self.pool, &[id.as_uuid()]).await?;
                Ok(Some(row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_orders_for_client(&self, client_id: UserId) -> Result<Vec<Order>> {
        self.fetch_orders(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.client_id = $1 \
                 ORDER BY o.created_at DESC, o.id"
            ),
            client_id,
        )
        .await
    }

    async fn list_orders_for_courier(&self, courier_id: UserId) -> Result<Vec<Order>> {
        self.fetch_orders(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.courier_id = $1 \
                 ORDER BY o.created_at DESC, o.id"
            ),
            courier_id,
        )
        .await
    }

    async fn list_orders_for_vendor(&self, vendor_id: UserId) -> Result<Vec<Order>> {
        self.fetch_orders(
            &format!(
                r#"
                SELECT {ORDER_COLUMNS} FROM orders o
                WHERE EXISTS (
                    SELECT 1 FROM order_line_items li
                    JOIN products p ON p.id = li.product_id
                    JOIN stalls s ON s.id = p.stall_id
                    WHERE li.order_id = o.id AND s.vendor_id = $1
                )
                ORDER BY o.created_at DESC, o.id
                "#
            ),
            vendor_id,
        )
        .await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductStock>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p JOIN stalls s ON s.id = p.stall_id \
             WHERE p.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at, id"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_payment).collect()
    }

    async fn find_payment(&self, provider: &str, reference: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider = $1 AND provider_reference = $2"
        ))
        .bind(provider)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn find_payment_event(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<PaymentEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM payment_events \
             WHERE provider = $1 AND provider_reference = $2"
        ))
        .bind(provider)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_event).transpose()
    }

    async fn stalls_for_order(&self, order_id: OrderId) -> Result<Vec<Stall>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT s.id, s.vendor_id, s.name, s.active
            FROM order_line_items li
            JOIN products p ON p.id = li.product_id
            JOIN stalls s ON s.id = p.stall_id
            WHERE li.order_id = $1
            ORDER BY s.id
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stall).collect()
    }

    async fn put_stall(&self, stall: &Stall) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stalls (id, vendor_id, name, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET vendor_id = EXCLUDED.vendor_id, name = EXCLUDED.name, active = EXCLUDED.active
            "#,
        )
        .bind(stall.id.as_uuid())
        .bind(stall.vendor_id.as_uuid())
        .bind(&stall.name)
        .bind(stall.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_product(&self, product: &ProductStock) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, stall_id, name, price, stock, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET stall_id = EXCLUDED.stall_id, name = EXCLUDED.name, price = EXCLUDED.price,
                stock = EXCLUDED.stock, active = EXCLUDED.active
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.stall_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.amount())
        .bind(encode_count(product.stock, "stock")?)
        .bind(product.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A PostgreSQL transaction. Rolled back on drop unless committed.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<HashMap<ProductId, ProductStock>> {
        let mut ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        ids.sort();
        ids.dedup();

        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p JOIN stalls s ON s.id = p.stall_id \
             WHERE p.id = ANY($1) ORDER BY p.id FOR UPDATE OF p"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| row_to_product(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn update_stock(&mut self, id: ProductId, stock: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(encode_count(stock, "stock")?)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, client_id, state, total, notes, courier_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.client_id().as_uuid())
        .bind(order.state().as_str())
        .bind(order.total().amount())
        .bind(order.notes())
        .bind(order.courier_id().map(|c| c.as_uuid()))
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_line_items (id, order_id, product_id, quantity, unit_price, subtotal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(encode_count(item.quantity, "quantity")?)
        .bind(item.unit_price.amount())
        .bind(item.subtotal().amount())
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let items = load_items(&mut *self.tx, &[id.as_uuid()]).await?;
                Ok(Some(row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET state = $2, total = $3, notes = $4, courier_id = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.state().as_str())
        .bind(order.total().amount())
        .bind(order.notes())
        .bind(order.courier_id().map(|c| c.as_uuid()))
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Order", order.id()));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount, status, provider, provider_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (provider, provider_reference) WHERE provider_reference IS NOT NULL
            DO NOTHING
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.map(|o| o.as_uuid()))
        .bind(payment.amount.amount())
        .bind(payment.status.as_str())
        .bind(payment.provider.as_deref())
        .bind(payment.provider_reference.as_deref())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                constraint: PAYMENT_REFERENCE_KEY.to_string(),
            });
        }
        Ok(())
    }

    async fn find_payment_for_update(
        &mut self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE provider = $1 AND provider_reference = $2 FOR UPDATE"
        ))
        .bind(provider)
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn pending_unreferenced_payment(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = $1 AND status = 'PENDING' AND provider_reference IS NULL \
             ORDER BY created_at, id LIMIT 1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET order_id = $2, amount = $3, status = $4, provider = $5,
                provider_reference = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.map(|o| o.as_uuid()))
        .bind(payment.amount.amount())
        .bind(payment.status.as_str())
        .bind(payment.provider.as_deref())
        .bind(payment.provider_reference.as_deref())
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(PAYMENT_REFERENCE_KEY)
            {
                return StoreError::Duplicate {
                    constraint: PAYMENT_REFERENCE_KEY.to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Payment", payment.id));
        }
        Ok(())
    }

    async fn insert_payment_event(&mut self, event: &PaymentEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (id, provider, provider_reference, received_at, raw_payload, processing_status, handled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider, provider_reference) DO NOTHING
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.provider)
        .bind(&event.provider_reference)
        .bind(event.received_at)
        .bind(&event.raw_payload)
        .bind(event.processing_status.as_str())
        .bind(event.handled)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_payment_event(&mut self, event: &PaymentEvent) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payment_events SET processing_status = $2, handled = $3 WHERE id = $1",
        )
        .bind(event.id.as_uuid())
        .bind(event.processing_status.as_str())
        .bind(event.handled)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Payment event", event.id));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn load_items<'e, E>(executor: E, order_ids: &[Uuid]) -> Result<Vec<LineItem>>
where
    E: PgExecutor<'e>,
{
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT id, order_id, product_id, quantity, unit_price, created_at
        FROM order_line_items
        WHERE order_id = ANY($1)
        ORDER BY created_at, id
        "#,
    )
    .bind(order_ids.to_vec())
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_item).collect()
}

fn row_ids(rows: &[PgRow]) -> Result<Vec<Uuid>> {
    rows.iter()
        .map(|row| row.try_get::<Uuid, _>("id").map_err(StoreError::from))
        .collect()
}

fn assemble_orders(rows: Vec<PgRow>, items: Vec<LineItem>) -> Result<Vec<Order>> {
    let mut by_order: HashMap<OrderId, Vec<LineItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    rows.iter()
        .map(|row| {
            let id = OrderId::from_uuid(row.try_get("id")?);
            row_to_order(row, by_order.remove(&id).unwrap_or_default())
        })
        .collect()
}

fn row_to_order(row: &PgRow, items: Vec<LineItem>) -> Result<Order> {
    let state: String = row.try_get("state")?;
    let state: OrderState = state
        .parse()
        .map_err(|e: domain::UnknownState| StoreError::Corrupt(e.to_string()))?;

    Ok(Order::from_snapshot(OrderSnapshot {
        id: OrderId::from_uuid(row.try_get("id")?),
        client_id: UserId::from_uuid(row.try_get("client_id")?),
        state,
        total: Money::new(row.try_get::<Decimal, _>("total")?),
        notes: row.try_get("notes")?,
        courier_id: row
            .try_get::<Option<Uuid>, _>("courier_id")?
            .map(UserId::from_uuid),
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn row_to_item(row: &PgRow) -> Result<LineItem> {
    Ok(LineItem::restore(
        LineItemId::from_uuid(row.try_get("id")?),
        OrderId::from_uuid(row.try_get("order_id")?),
        ProductId::from_uuid(row.try_get("product_id")?),
        decode_count(row.try_get("quantity")?, "quantity")?,
        Money::new(row.try_get::<Decimal, _>("unit_price")?),
        row.try_get("created_at")?,
    ))
}

fn row_to_product(row: &PgRow) -> Result<ProductStock> {
    Ok(ProductStock {
        id: ProductId::from_uuid(row.try_get("id")?),
        stall_id: StallId::from_uuid(row.try_get("stall_id")?),
        name: row.try_get("name")?,
        price: Money::new(row.try_get::<Decimal, _>("price")?),
        stock: decode_count(row.try_get("stock")?, "stock")?,
        active: row.try_get("active")?,
        stall_active: row.try_get("stall_active")?,
    })
}

fn row_to_stall(row: &PgRow) -> Result<Stall> {
    Ok(Stall {
        id: StallId::from_uuid(row.try_get("id")?),
        vendor_id: UserId::from_uuid(row.try_get("vendor_id")?),
        name: row.try_get("name")?,
        active: row.try_get("active")?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    let status: PaymentStatus = status
        .parse()
        .map_err(|e: domain::UnknownState| StoreError::Corrupt(e.to_string()))?;

    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id")?),
        order_id: row
            .try_get::<Option<Uuid>, _>("order_id")?
            .map(OrderId::from_uuid),
        amount: Money::new(row.try_get::<Decimal, _>("amount")?),
        status,
        provider: row.try_get("provider")?,
        provider_reference: row.try_get("provider_reference")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_event(row: &PgRow) -> Result<PaymentEvent> {
    let status: String = row.try_get("processing_status")?;
    let processing_status: ProcessingStatus = status
        .parse()
        .map_err(|e: domain::UnknownState| StoreError::Corrupt(e.to_string()))?;

    Ok(PaymentEvent {
        id: PaymentEventId::from_uuid(row.try_get("id")?),
        provider: row.try_get("provider")?,
        provider_reference: row.try_get("provider_reference")?,
        received_at: row.try_get("received_at")?,
        raw_payload: row.try_get("raw_payload")?,
        processing_status,
        handled: row.try_get("handled")?,
    })
}

fn decode_count(value: i32, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {field}: {value}")))
}

fn encode_count(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}
