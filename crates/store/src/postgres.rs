use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, OrderId, OrderItemId, ProductId, ReservationId};
use domain::{
    Address, CompensationOutcome, CustomerIdentity, FulfillmentStatus, ItemFulfillmentStatus,
    ItemSource, Money, Order, OrderItem, OrderStatus, Reservation, ReservationStatus, StockFlow,
    StockLevels,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{OrderStore, OrderUpdate, ReservationStore, StockLedger},
};

const PRODUCT_COLUMNS: &str = "id, stock_quantity, available_quantity, reserved_quantity";

const ORDER_COLUMNS: &str = r#"
    id, order_number, customer_id, guest_email, status, payment_status, fulfillment_status,
    payment_method, transaction_id, subtotal_cents, shipping_cents, total_cents,
    shipping_address, billing_address, vendor_order_id, internal_notes, cancellation_reason,
    created_at, updated_at, paid_at, cancelled_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, source, vendor_article_id, sku, name, quantity, unit_price_cents,
    fulfillment_status, stock_held, reserved_at, stock_deducted_at, vendor_ordered_at, shipped_at
"#;

const RESERVATION_COLUMNS: &str = r#"
    id, order_id, order_item_id, product_id, vendor_article_id, quantity, status,
    external_reservation_id, error_message, stock_held, compensation, created_at, updated_at,
    reserved_at
"#;

/// PostgreSQL-backed fulfillment store.
///
/// Stock moves are single conditional `UPDATE` statements. Operations that
/// flip a `stock_held` flag lock the owning row first and run in one
/// transaction with the ledger change.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn reserve_stock(
        conn: &mut PgConnection,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        let amount = to_db_quantity(quantity)?;
        let reserved_delta = match flow {
            StockFlow::Vendor => amount,
            StockFlow::Own => 0,
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET available_quantity = available_quantity - $2,
                reserved_quantity = reserved_quantity + $3,
                updated_at = NOW()
            WHERE id = $1 AND available_quantity >= $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id.as_str())
        .bind(amount)
        .bind(reserved_delta)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => row_to_levels(&row),
            None => {
                let current = Self::fetch_levels(conn, product_id).await?;
                tracing::debug!(
                    product_id = %product_id,
                    requested = quantity,
                    available = current.available_quantity,
                    "Stock reservation rejected"
                );
                Err(StoreError::NotAvailable {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available: current.available_quantity,
                })
            }
        }
    }

    async fn release_stock(
        conn: &mut PgConnection,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        let amount = to_db_quantity(quantity)?;
        let reserved_delta = match flow {
            StockFlow::Vendor => amount,
            StockFlow::Own => 0,
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET available_quantity = available_quantity + $2,
                reserved_quantity = GREATEST(reserved_quantity - $3, 0),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id.as_str())
        .bind(amount)
        .bind(reserved_delta)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        row_to_levels(&row)
    }

    async fn fetch_levels(conn: &mut PgConnection, product_id: &ProductId) -> Result<StockLevels> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        row_to_levels(&row)
    }

    async fn lock_item(conn: &mut PgConnection, item_id: OrderItemId) -> Result<OrderItem> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1 FOR UPDATE"
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::ItemNotFound(item_id))?;

        row_to_item(&row)
    }

    async fn write_item(conn: &mut PgConnection, item: &OrderItem) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_items
            SET fulfillment_status = $2, stock_held = $3, reserved_at = $4,
                stock_deducted_at = $5, vendor_ordered_at = $6, shipped_at = $7
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.fulfillment_status.as_str())
        .bind(item.stock_held)
        .bind(item.reserved_at)
        .bind(item.stock_deducted_at)
        .bind(item.vendor_ordered_at)
        .bind(item.shipped_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn lock_reservation(
        conn: &mut PgConnection,
        reservation_id: ReservationId,
    ) -> Result<Reservation> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::ReservationNotFound(reservation_id))?;

        row_to_reservation(&row)
    }

    async fn write_reservation(conn: &mut PgConnection, reservation: &Reservation) -> Result<()> {
        let compensation = reservation
            .compensation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE reservations
            SET status = $2, external_reservation_id = $3, error_message = $4, stock_held = $5,
                compensation = $6, updated_at = $7, reserved_at = $8
            WHERE id = $1
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.status.as_str())
        .bind(&reservation.external_reservation_id)
        .bind(&reservation.error_message)
        .bind(reservation.stock_held)
        .bind(compensation)
        .bind(reservation.updated_at)
        .bind(reservation.reserved_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn current_status(&self, order_id: OrderId) -> Result<OrderStatus> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let status = status.ok_or(StoreError::OrderNotFound(order_id))?;
        Ok(status.parse()?)
    }
}

fn to_db_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::Corrupt(format!("quantity {quantity} out of range")))
}

fn quantity(row: &PgRow, column: &str) -> Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn row_to_levels(row: &PgRow) -> Result<StockLevels> {
    Ok(StockLevels {
        product_id: ProductId::new(row.try_get::<String, _>("id")?),
        stock_quantity: quantity(row, "stock_quantity")?,
        available_quantity: quantity(row, "available_quantity")?,
        reserved_quantity: quantity(row, "reserved_quantity")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let customer_id: Option<Uuid> = row.try_get("customer_id")?;
    let guest_email: Option<String> = row.try_get("guest_email")?;
    let customer = match (customer_id, guest_email) {
        (Some(id), _) => CustomerIdentity::Registered {
            customer_id: CustomerId::from_uuid(id),
        },
        (None, Some(email)) => CustomerIdentity::Guest { email },
        (None, None) => return Err(StoreError::Corrupt("order without customer".to_string())),
    };

    let shipping_address: Address = serde_json::from_value(row.try_get("shipping_address")?)?;
    let billing_address: Address = serde_json::from_value(row.try_get("billing_address")?)?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        order_number: row.try_get("order_number")?,
        customer,
        status: row.try_get::<String, _>("status")?.parse()?,
        payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
        fulfillment_status: row.try_get::<String, _>("fulfillment_status")?.parse()?,
        payment_method: row.try_get("payment_method")?,
        transaction_id: row.try_get("transaction_id")?,
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        shipping_cost: Money::from_cents(row.try_get("shipping_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        shipping_address,
        billing_address,
        vendor_order_id: row.try_get("vendor_order_id")?,
        internal_notes: row.try_get("internal_notes")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        paid_at: row.try_get("paid_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    let source = ItemSource::from_parts(
        &row.try_get::<String, _>("source")?,
        row.try_get("vendor_article_id")?,
    )?;

    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        source,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        quantity: quantity(row, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        fulfillment_status: row.try_get::<String, _>("fulfillment_status")?.parse()?,
        stock_held: row.try_get("stock_held")?,
        reserved_at: row.try_get("reserved_at")?,
        stock_deducted_at: row.try_get("stock_deducted_at")?,
        vendor_ordered_at: row.try_get("vendor_ordered_at")?,
        shipped_at: row.try_get("shipped_at")?,
    })
}

fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
    let compensation: Option<serde_json::Value> = row.try_get("compensation")?;
    let compensation: Option<CompensationOutcome> =
        compensation.map(serde_json::from_value).transpose()?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        order_item_id: OrderItemId::from_uuid(row.try_get("order_item_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        vendor_article_id: row.try_get("vendor_article_id")?,
        quantity: quantity(row, "quantity")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        external_reservation_id: row.try_get("external_reservation_id")?,
        error_message: row.try_get("error_message")?,
        stock_held: row.try_get("stock_held")?,
        compensation,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        reserved_at: row.try_get("reserved_at")?,
    })
}

#[async_trait]
impl StockLedger for PostgresStore {
    async fn register_product(&self, levels: StockLevels) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, stock_quantity, available_quantity, reserved_quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(levels.product_id.as_str())
        .bind(to_db_quantity(levels.stock_quantity)?)
        .bind(to_db_quantity(levels.available_quantity)?)
        .bind(to_db_quantity(levels.reserved_quantity)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stock_levels(&self, product_id: &ProductId) -> Result<StockLevels> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_levels(&mut conn, product_id).await
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        let mut conn = self.pool.acquire().await?;
        Self::reserve_stock(&mut conn, product_id, quantity, flow).await
    }

    async fn release(
        &self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        let mut conn = self.pool.acquire().await?;
        Self::release_stock(&mut conn, product_id, quantity, flow).await
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, customer_id, guest_email, status, payment_status,
                fulfillment_status, payment_method, transaction_id, subtotal_cents,
                shipping_cents, total_cents, shipping_address, billing_address,
                vendor_order_id, internal_notes, cancellation_reason, created_at, updated_at,
                paid_at, cancelled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.customer.customer_id().map(|id| id.as_uuid()))
        .bind(order.customer.guest_email())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.fulfillment_status.as_str())
        .bind(&order.payment_method)
        .bind(&order.transaction_id)
        .bind(order.subtotal.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.total.cents())
        .bind(serde_json::to_value(&order.shipping_address)?)
        .bind(serde_json::to_value(&order.billing_address)?)
        .bind(&order.vendor_order_id)
        .bind(&order.internal_notes)
        .bind(&order.cancellation_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.paid_at)
        .bind(order.cancelled_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, position, product_id, source, vendor_article_id, sku, name,
                    quantity, unit_price_cents, fulfillment_status, stock_held
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(item.source.kind())
            .bind(item.vendor_article_id())
            .bind(&item.sku)
            .bind(&item.name)
            .bind(to_db_quantity(item.quantity)?)
            .bind(item.unit_price.cents())
            .bind(item.fulfillment_status.as_str())
            .bind(item.stock_held)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY position ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn record_payment(&self, order_id: OrderId, transaction_id: &str) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = 'pending', payment_status = 'paid', fulfillment_status = 'pending',
                transaction_id = $2, paid_at = NOW(), updated_at = NOW()
            WHERE id = $1
              AND ((status = 'pending' AND payment_status <> 'paid') OR status = 'payment_pending')
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_uuid())
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_order(&row),
            None => Err(StoreError::StatusConflict {
                order_id,
                current: self.current_status(order_id).await?,
            }),
        }
    }

    async fn update_order(
        &self,
        order_id: OrderId,
        expected: &[OrderStatus],
        update: OrderUpdate,
    ) -> Result<Order> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = COALESCE($2, status),
                payment_status = COALESCE($3, payment_status),
                fulfillment_status = COALESCE($4, fulfillment_status),
                transaction_id = COALESCE($5, transaction_id),
                cancellation_reason = COALESCE($6, cancellation_reason),
                paid_at = CASE WHEN $3 = 'paid' THEN NOW() ELSE paid_at END,
                cancelled_at = CASE WHEN $2 = 'cancelled' THEN NOW() ELSE cancelled_at END,
                updated_at = NOW()
            WHERE id = $1 AND (cardinality($7::text[]) = 0 OR status = ANY($7::text[]))
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_uuid())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.payment_status.map(|s| s.as_str()))
        .bind(update.fulfillment_status.map(|s| s.as_str()))
        .bind(update.transaction_id)
        .bind(update.cancellation_reason)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_order(&row),
            None => Err(StoreError::StatusConflict {
                order_id,
                current: self.current_status(order_id).await?,
            }),
        }
    }

    async fn set_item_status(
        &self,
        item_id: OrderItemId,
        status: ItemFulfillmentStatus,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut item = Self::lock_item(&mut tx, item_id).await?;
        item.transition(status, Utc::now());
        Self::write_item(&mut tx, &item).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn deduct_item_stock(&self, item_id: OrderItemId) -> Result<StockLevels> {
        let mut tx = self.pool.begin().await?;
        let mut item = Self::lock_item(&mut tx, item_id).await?;
        if item.is_vendor() {
            return Err(StoreError::NotOwnItem(item_id));
        }
        if item.stock_held {
            return Self::fetch_levels(&mut tx, &item.product_id).await;
        }

        let levels =
            Self::reserve_stock(&mut tx, &item.product_id, item.quantity, StockFlow::Own).await?;
        item.stock_held = true;
        item.transition(ItemFulfillmentStatus::StockDeducted, Utc::now());
        Self::write_item(&mut tx, &item).await?;

        tx.commit().await?;
        Ok(levels)
    }

    async fn restore_item_stock(
        &self,
        item_id: OrderItemId,
        next_status: ItemFulfillmentStatus,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut item = Self::lock_item(&mut tx, item_id).await?;
        if !item.stock_held {
            return Ok(false);
        }

        Self::release_stock(&mut tx, &item.product_id, item.quantity, StockFlow::Own).await?;
        item.stock_held = false;
        item.transition(next_status, Utc::now());
        Self::write_item(&mut tx, &item).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn vendor_batch_candidates(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders o
            WHERE o.status IN ('reserved', 'processing')
              AND o.payment_status = 'paid'
              AND o.vendor_order_id IS NULL
              AND EXISTS (
                  SELECT 1 FROM order_items i
                  WHERE i.order_id = o.id
                    AND i.source = 'vendor'
                    AND i.fulfillment_status = 'reserved'
              )
            ORDER BY o.created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn record_vendor_submission(
        &self,
        order_id: OrderId,
        vendor_order_id: &str,
        fulfillment_status: FulfillmentStatus,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::OrderNotFound(order_id))?;
        let current = row_to_order(&row)?;

        if let Some(existing) = &current.vendor_order_id {
            return Err(StoreError::VendorOrderAlreadySet {
                order_id,
                existing: existing.clone(),
            });
        }
        if !current.awaits_vendor_order() {
            return Err(StoreError::StatusConflict {
                order_id,
                current: current.status,
            });
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET vendor_order_id = $2, fulfillment_status = $3, status = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_uuid())
        .bind(vendor_order_id)
        .bind(fulfillment_status.as_str())
        .bind(OrderStatus::Processing.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let order = row_to_order(&row)?;

        sqlx::query(
            r#"
            UPDATE reservations
            SET status = 'ordered', updated_at = NOW()
            WHERE order_id = $1 AND status = 'reserved'
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE order_items
            SET fulfillment_status = 'vendor_ordered', vendor_ordered_at = NOW()
            WHERE order_id = $1 AND source = 'vendor' AND fulfillment_status = 'reserved'
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }
}

#[async_trait]
impl ReservationStore for PostgresStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let compensation = reservation
            .compensation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, order_id, order_item_id, product_id, vendor_article_id, quantity, status,
                external_reservation_id, error_message, stock_held, compensation, created_at,
                updated_at, reserved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.order_item_id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(&reservation.vendor_article_id)
        .bind(to_db_quantity(reservation.quantity)?)
        .bind(reservation.status.as_str())
        .bind(&reservation.external_reservation_id)
        .bind(&reservation.error_message)
        .bind(reservation.stock_held)
        .bind(compensation)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .bind(reservation.reserved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_reservation).transpose()
    }

    async fn order_reservations(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reservation).collect()
    }

    async fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        external_reservation_id: &str,
    ) -> Result<StockLevels> {
        let mut tx = self.pool.begin().await?;
        let mut reservation = Self::lock_reservation(&mut tx, reservation_id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(StoreError::ReservationConflict {
                reservation_id,
                current: reservation.status,
            });
        }

        let levels = Self::reserve_stock(
            &mut tx,
            &reservation.product_id,
            reservation.quantity,
            StockFlow::Vendor,
        )
        .await?;

        let now = Utc::now();
        reservation.status = ReservationStatus::Reserved;
        reservation.external_reservation_id = Some(external_reservation_id.to_string());
        reservation.stock_held = true;
        reservation.reserved_at = Some(now);
        reservation.updated_at = now;
        Self::write_reservation(&mut tx, &reservation).await?;

        let mut item = Self::lock_item(&mut tx, reservation.order_item_id).await?;
        item.transition(ItemFulfillmentStatus::Reserved, now);
        Self::write_item(&mut tx, &item).await?;

        tx.commit().await?;
        Ok(levels)
    }

    async fn fail_reservation(&self, reservation_id: ReservationId, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut reservation = Self::lock_reservation(&mut tx, reservation_id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(StoreError::ReservationConflict {
                reservation_id,
                current: reservation.status,
            });
        }

        reservation.status = ReservationStatus::Failed;
        reservation.error_message = Some(error.to_string());
        reservation.updated_at = Utc::now();
        Self::write_reservation(&mut tx, &reservation).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn release_reservation(
        &self,
        reservation_id: ReservationId,
        compensation: CompensationOutcome,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut reservation = Self::lock_reservation(&mut tx, reservation_id).await?;
        if reservation.status != ReservationStatus::Reserved {
            return Ok(false);
        }

        let was_held = reservation.stock_held;
        if was_held {
            Self::release_stock(
                &mut tx,
                &reservation.product_id,
                reservation.quantity,
                StockFlow::Vendor,
            )
            .await?;
        }

        reservation.status = ReservationStatus::Unreserved;
        reservation.stock_held = false;
        if let Some(reason) = &compensation.failed_reason {
            reservation.error_message = Some(reason.clone());
        }
        reservation.compensation = Some(compensation);
        reservation.updated_at = Utc::now();
        Self::write_reservation(&mut tx, &reservation).await?;

        let mut item = Self::lock_item(&mut tx, reservation.order_item_id).await?;
        if item.fulfillment_status == ItemFulfillmentStatus::Reserved {
            item.transition(ItemFulfillmentStatus::Pending, reservation.updated_at);
            Self::write_item(&mut tx, &item).await?;
        }

        tx.commit().await?;
        Ok(was_held)
    }
}
