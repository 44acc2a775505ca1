use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AuditLogId, CartId, CartItemId, CourseId, ManualPaymentRequestId, OrderId, Page, PageRequest,
    PaymentAttemptId, TransactionId, UserId,
};
use domain::catalog::CourseEnrollment;
use domain::payments::{ManualPaymentRequest, PaymentAuditEntry, Transaction};
use domain::shopping::{Cart, CartItem, CartStatus, Order, PaymentAttempt};
use sqlx::{PgConnection, Row, postgres::PgRow};

use super::{
    PostgresStore, conflict, db_error, id_column, json, limit_offset, money, opt_id_column,
    opt_text, page_of, text,
};
use crate::{
    OrderChange, OrderPlacement, PaymentRepository, Result, ShoppingRepository, StoreError,
};

const ORDER_COLUMNS: &str = "id, order_number, user_id, cart_id, items, total_cents, status, \
     created_at, updated_at, paid_at, cancelled_at";

const ATTEMPT_COLUMNS: &str =
    "id, order_id, amount_cents, status, tracking_code, expires_at, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, payment_attempt_id, order_id, user_id, amount_cents, \
     bank_reference, paid_at, payer_name, receipt_url, note, status, reviewed_by, reviewed_at, \
     admin_note, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, order_id, payment_attempt_id, amount_cents, kind, \
     reference, recorded_by, created_at";

fn cart_item_from_row(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(id_column(row, "id")?),
        cart_id: CartId::from_uuid(id_column(row, "cart_id")?),
        course_id: CourseId::from_uuid(id_column(row, "course_id")?),
        title: row.try_get("title")?,
        unit_price: money(row, "unit_price_cents")?,
        added_at: row.try_get("added_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(id_column(row, "id")?),
        order_number: row.try_get("order_number")?,
        user_id: UserId::from_uuid(id_column(row, "user_id")?),
        cart_id: CartId::from_uuid(id_column(row, "cart_id")?),
        items: json(row, "items")?,
        total: money(row, "total_cents")?,
        status: text(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        paid_at: row.try_get("paid_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
    })
}

fn attempt_from_row(row: &PgRow) -> Result<PaymentAttempt> {
    Ok(PaymentAttempt {
        id: PaymentAttemptId::from_uuid(id_column(row, "id")?),
        order_id: OrderId::from_uuid(id_column(row, "order_id")?),
        amount: money(row, "amount_cents")?,
        status: text(row, "status")?,
        tracking_code: row.try_get("tracking_code")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<ManualPaymentRequest> {
    Ok(ManualPaymentRequest {
        id: ManualPaymentRequestId::from_uuid(id_column(row, "id")?),
        payment_attempt_id: PaymentAttemptId::from_uuid(id_column(row, "payment_attempt_id")?),
        order_id: OrderId::from_uuid(id_column(row, "order_id")?),
        user_id: UserId::from_uuid(id_column(row, "user_id")?),
        amount: money(row, "amount_cents")?,
        bank_reference: row.try_get("bank_reference")?,
        paid_at: row.try_get("paid_at")?,
        payer_name: row.try_get("payer_name")?,
        receipt_url: row.try_get("receipt_url")?,
        note: row.try_get("note")?,
        status: text(row, "status")?,
        reviewed_by: opt_id_column(row, "reviewed_by")?.map(UserId::from_uuid),
        reviewed_at: row.try_get("reviewed_at")?,
        admin_note: row.try_get("admin_note")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    Ok(Transaction {
        id: TransactionId::from_uuid(id_column(row, "id")?),
        user_id: UserId::from_uuid(id_column(row, "user_id")?),
        order_id: OrderId::from_uuid(id_column(row, "order_id")?),
        payment_attempt_id: PaymentAttemptId::from_uuid(id_column(row, "payment_attempt_id")?),
        amount: money(row, "amount_cents")?,
        kind: text(row, "kind")?,
        reference: row.try_get("reference")?,
        recorded_by: UserId::from_uuid(id_column(row, "recorded_by")?),
        created_at: row.try_get("created_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<PaymentAuditEntry> {
    Ok(PaymentAuditEntry {
        id: AuditLogId::from_uuid(id_column(row, "id")?),
        payment_attempt_id: PaymentAttemptId::from_uuid(id_column(row, "payment_attempt_id")?),
        order_id: OrderId::from_uuid(id_column(row, "order_id")?),
        from_status: opt_text(row, "from_status")?,
        to_status: text(row, "to_status")?,
        actor_id: opt_id_column(row, "actor_id")?.map(UserId::from_uuid),
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(order.id.as_uuid())
    .bind(&order.order_number)
    .bind(order.user_id.as_uuid())
    .bind(order.cart_id.as_uuid())
    .bind(serde_json::to_value(&order.items)?)
    .bind(order.total.cents())
    .bind(order.status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.paid_at)
    .bind(order.cancelled_at)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn insert_attempt(conn: &mut PgConnection, attempt: &PaymentAttempt) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO payment_attempts ({ATTEMPT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
    .bind(attempt.id.as_uuid())
    .bind(attempt.order_id.as_uuid())
    .bind(attempt.amount.cents())
    .bind(attempt.status.as_str())
    .bind(&attempt.tracking_code)
    .bind(attempt.expires_at)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn insert_request(conn: &mut PgConnection, request: &ManualPaymentRequest) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO manual_payment_requests ({REQUEST_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
    ))
    .bind(request.id.as_uuid())
    .bind(request.payment_attempt_id.as_uuid())
    .bind(request.order_id.as_uuid())
    .bind(request.user_id.as_uuid())
    .bind(request.amount.cents())
    .bind(&request.bank_reference)
    .bind(request.paid_at)
    .bind(&request.payer_name)
    .bind(&request.receipt_url)
    .bind(&request.note)
    .bind(request.status.as_str())
    .bind(request.reviewed_by.map(|id| id.as_uuid()))
    .bind(request.reviewed_at)
    .bind(&request.admin_note)
    .bind(request.created_at)
    .bind(request.updated_at)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn insert_transaction(conn: &mut PgConnection, transaction: &Transaction) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    ))
    .bind(transaction.id.as_uuid())
    .bind(transaction.user_id.as_uuid())
    .bind(transaction.order_id.as_uuid())
    .bind(transaction.payment_attempt_id.as_uuid())
    .bind(transaction.amount.cents())
    .bind(transaction.kind.as_str())
    .bind(&transaction.reference)
    .bind(transaction.recorded_by.as_uuid())
    .bind(transaction.created_at)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

/// Inserts enrollments, skipping pairs that already exist.
async fn insert_enrollments(conn: &mut PgConnection, enrollments: &[CourseEnrollment]) -> Result<()> {
    for enrollment in enrollments {
        sqlx::query(
            r#"
            INSERT INTO course_enrollments (id, course_id, student_id, source, order_id, enrolled_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (course_id, student_id) DO NOTHING
            "#,
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.course_id.as_uuid())
        .bind(enrollment.student_id.as_uuid())
        .bind(enrollment.source.as_str())
        .bind(enrollment.order_id.map(|id| id.as_uuid()))
        .bind(enrollment.enrolled_at)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    }
    Ok(())
}

async fn insert_audit(conn: &mut PgConnection, entries: &[PaymentAuditEntry]) -> Result<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO payment_audit_log
                (id, payment_attempt_id, order_id, from_status, to_status, actor_id, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.payment_attempt_id.as_uuid())
        .bind(entry.order_id.as_uuid())
        .bind(entry.from_status.map(|s| s.as_str()))
        .bind(entry.to_status.as_str())
        .bind(entry.actor_id.map(|id| id.as_uuid()))
        .bind(&entry.note)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    }
    Ok(())
}

async fn check_out_cart(conn: &mut PgConnection, cart_id: CartId, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE carts SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(cart_id.as_uuid())
        .bind(CartStatus::CheckedOut.as_str())
        .bind(now)
        .execute(conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Locks the cart row for the rest of the transaction and fails when an
/// active order holds the cart. Checkout takes the same row lock, so a cart
/// write and an order placement never interleave.
async fn lock_unlocked_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<()> {
    let found = sqlx::query("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    if found.is_none() {
        return Err(StoreError::not_found("cart", cart_id));
    }

    let locked: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM orders \
         WHERE cart_id = $1 AND status IN ('PendingPayment', 'Processing'))",
    )
    .bind(cart_id.as_uuid())
    .fetch_one(&mut *conn)
    .await?;
    if locked {
        return Err(StoreError::cart_locked(cart_id));
    }
    Ok(())
}

/// Locks the cart row and checks it still holds exactly `expected`.
async fn check_cart_snapshot(
    conn: &mut PgConnection,
    cart_id: CartId,
    expected: &[CourseId],
) -> Result<()> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM carts WHERE id = $1 FOR UPDATE")
            .bind(cart_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;
    let Some(status) = status else {
        return Err(StoreError::not_found("cart", cart_id));
    };

    let mut held: Vec<uuid::Uuid> =
        sqlx::query_scalar("SELECT course_id FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .fetch_all(&mut *conn)
            .await?;
    let mut expected: Vec<uuid::Uuid> = expected.iter().map(|id| id.as_uuid()).collect();
    held.sort();
    expected.sort();
    if status != CartStatus::Active.as_str() || held != expected {
        return Err(conflict("cart", cart_id, "unchanged items"));
    }
    Ok(())
}

async fn touch_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<()> {
    sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
        .bind(cart_id.as_uuid())
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

/// Distinguishes a missing row from a lost race after a guarded update
/// matched nothing.
async fn guard_failed(
    conn: &mut PgConnection,
    table: &str,
    entity: &'static str,
    id: uuid::Uuid,
    expected: &str,
) -> StoreError {
    let exists = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"
    ))
    .bind(id)
    .fetch_one(conn)
    .await;
    match exists {
        Ok(true) => conflict(entity, id, expected),
        Ok(false) => StoreError::not_found(entity, id),
        Err(err) => StoreError::Database(err),
    }
}

impl PostgresStore {
    async fn load_cart(&self, row: Option<PgRow>) -> Result<Option<Cart>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id = CartId::from_uuid(id_column(&row, "id")?);
        let items = sqlx::query(
            r#"
            SELECT id, cart_id, course_id, title, unit_price_cents, added_at
            FROM cart_items WHERE cart_id = $1 ORDER BY added_at, id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        Ok(Some(Cart {
            id,
            user_id: UserId::from_uuid(id_column(&row, "user_id")?),
            status: text(&row, "status")?,
            items: items.iter().map(cart_item_from_row).collect::<Result<_>>()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

#[async_trait]
impl ShoppingRepository for PostgresStore {
    async fn find_active_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, user_id, status, created_at, updated_at FROM carts WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id.as_uuid())
        .bind(CartStatus::Active.as_str())
        .fetch_optional(self.pool())
        .await?;
        self.load_cart(row).await
    }

    async fn find_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, user_id, status, created_at, updated_at FROM carts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        self.load_cart(row).await
    }

    async fn insert_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (id, user_id, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.status.as_str())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn insert_cart_item(&self, item: &CartItem) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        lock_unlocked_cart(&mut tx, item.cart_id).await?;
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, course_id, title, unit_price_cents, added_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.course_id.as_uuid())
        .bind(&item.title)
        .bind(item.unit_price.cents())
        .bind(item.added_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
            .bind(item.cart_id.as_uuid())
            .bind(item.added_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart_item(&self, cart_id: CartId, course_id: CourseId) -> Result<bool> {
        let mut tx = self.pool().begin().await?;
        lock_unlocked_cart(&mut tx, cart_id).await?;
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND course_id = $2")
            .bind(cart_id.as_uuid())
            .bind(course_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            touch_cart(&mut tx, cart_id).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        lock_unlocked_cart(&mut tx, cart_id).await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        touch_cart(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn place_order(&self, placement: OrderPlacement) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        let order = &placement.order;

        if let Some(expected) = &placement.cart_snapshot {
            check_cart_snapshot(&mut tx, order.cart_id, expected).await?;
        }
        insert_order(&mut tx, order).await?;
        if let Some(attempt) = &placement.attempt {
            insert_attempt(&mut tx, attempt).await?;
        }
        insert_audit(&mut tx, &placement.audit).await?;
        insert_enrollments(&mut tx, &placement.enrollments).await?;
        if let Some(cart_id) = placement.checkout_cart {
            check_out_cart(&mut tx, cart_id, order.created_at).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn apply_order_change(&self, change: OrderChange) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        let order = &change.order.row;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, updated_at = $4, paid_at = $5, cancelled_at = $6
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(change.order.expected.as_str())
        .bind(order.status.as_str())
        .bind(order.updated_at)
        .bind(order.paid_at)
        .bind(order.cancelled_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(guard_failed(
                &mut tx,
                "orders",
                "order",
                order.id.as_uuid(),
                change.order.expected.as_str(),
            )
            .await);
        }

        // The old attempt is closed before a replacement is inserted so the
        // one-open-attempt index never sees two.
        if let Some(guarded) = &change.attempt {
            let attempt = &guarded.row;
            let updated = sqlx::query(
                r#"
                UPDATE payment_attempts
                SET status = $3, tracking_code = $4, expires_at = $5, updated_at = $6
                WHERE id = $1 AND status = $2
                "#,
            )
            .bind(attempt.id.as_uuid())
            .bind(guarded.expected.as_str())
            .bind(attempt.status.as_str())
            .bind(&attempt.tracking_code)
            .bind(attempt.expires_at)
            .bind(attempt.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
            if updated.rows_affected() == 0 {
                return Err(guard_failed(
                    &mut tx,
                    "payment_attempts",
                    "payment attempt",
                    attempt.id.as_uuid(),
                    guarded.expected.as_str(),
                )
                .await);
            }
        }
        if let Some(attempt) = &change.new_attempt {
            insert_attempt(&mut tx, attempt).await?;
        }

        match &change.request {
            Some((request, None)) => insert_request(&mut tx, request).await?,
            Some((request, Some(expected))) => {
                let updated = sqlx::query(
                    r#"
                    UPDATE manual_payment_requests
                    SET status = $3, reviewed_by = $4, reviewed_at = $5, admin_note = $6,
                        updated_at = $7
                    WHERE id = $1 AND status = $2
                    "#,
                )
                .bind(request.id.as_uuid())
                .bind(expected.as_str())
                .bind(request.status.as_str())
                .bind(request.reviewed_by.map(|id| id.as_uuid()))
                .bind(request.reviewed_at)
                .bind(&request.admin_note)
                .bind(request.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                if updated.rows_affected() == 0 {
                    return Err(guard_failed(
                        &mut tx,
                        "manual_payment_requests",
                        "payment request",
                        request.id.as_uuid(),
                        expected.as_str(),
                    )
                    .await);
                }
            }
            None => {}
        }

        if let Some(transaction) = &change.transaction {
            insert_transaction(&mut tx, transaction).await?;
        }
        insert_enrollments(&mut tx, &change.enrollments).await?;
        if let Some(cart_id) = change.checkout_cart {
            check_out_cart(&mut tx, cart_id, order.updated_at).await?;
        }
        insert_audit(&mut tx, &change.audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_active_order(&self, user_id: UserId, cart_id: CartId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE user_id = $1 AND cart_id = $2 AND status IN ('PendingPayment', 'Processing')"
        ))
        .bind(user_id.as_uuid())
        .bind(cart_id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(self.pool())
            .await?;

        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        let orders = rows.iter().map(order_from_row).collect::<Result<_>>()?;
        Ok(page_of(page, orders, total))
    }

    async fn find_attempt(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(attempt_from_row).transpose()
    }

    async fn find_open_attempt(&self, order_id: OrderId) -> Result<Option<PaymentAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts \
             WHERE order_id = $1 AND status IN ('Draft', 'PendingPayment', 'AwaitingAdminApproval')"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(attempt_from_row).transpose()
    }

    async fn list_expired_attempts(&self, now: DateTime<Utc>) -> Result<Vec<PaymentAttempt>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts \
             WHERE status = 'PendingPayment' AND expires_at <= $1 ORDER BY expires_at"
        ))
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(attempt_from_row).collect()
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn find_request(
        &self,
        id: ManualPaymentRequestId,
    ) -> Result<Option<ManualPaymentRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM manual_payment_requests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn list_pending_requests(
        &self,
        page: PageRequest,
    ) -> Result<Page<ManualPaymentRequest>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM manual_payment_requests WHERE status = 'AwaitingAdminApproval'",
        )
        .fetch_one(self.pool())
        .await?;

        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM manual_payment_requests \
             WHERE status = 'AwaitingAdminApproval' ORDER BY created_at ASC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        let requests = rows.iter().map(request_from_row).collect::<Result<_>>()?;
        Ok(page_of(page, requests, total))
    }

    async fn list_requests_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ManualPaymentRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM manual_payment_requests \
             WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn list_transactions(&self, page: PageRequest) -> Result<Page<Transaction>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(self.pool())
            .await?;

        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        let transactions = rows.iter().map(transaction_from_row).collect::<Result<_>>()?;
        Ok(page_of(page, transactions, total))
    }

    async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<PaymentAuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_attempt_id, order_id, from_status, to_status, actor_id, note, created_at
            FROM payment_audit_log
            WHERE order_id = $1
            ORDER BY seq
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(audit_from_row).collect()
    }
}
