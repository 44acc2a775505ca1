//! Turning a cart into an order.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, Page, PageRequest};
use domain::catalog::{CourseEnrollment, EnrollmentSource};
use domain::payments::{IdempotencyKey, IdempotentOperation, PaymentAuditEntry};
use domain::shopping::{
    Order, OrderItem, OrderStatus, PaymentAttempt, PaymentStatus, ShoppingError, order_item_for,
};
use serde::Serialize;
use serde_json::json;
use store::{OrderChange, OrderPlacement, Store, StoreError, constraints};

use super::cart::active_cart;
use crate::auth::Actor;
use crate::error::{ApplicationError, Result};
use crate::idempotency::{IdempotencyGuard, IdempotentRequest, Replayable};
use crate::settings::{BankDetails, Settings};

/// Where and how much to transfer for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInstructions {
    #[serde(flatten)]
    pub bank: BankDetails,
    pub amount: Money,
    /// Reference the buyer must put on the transfer.
    pub tracking_code: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentInstructions {
    pub(crate) fn new(bank: &BankDetails, attempt: &PaymentAttempt) -> Self {
        Self {
            bank: bank.clone(),
            amount: attempt.amount,
            tracking_code: attempt.tracking_code.clone(),
            expires_at: attempt.expires_at,
        }
    }
}

/// An order with the instructions for its open payment attempt, if any.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub payment: Option<PaymentInstructions>,
}

#[derive(Clone)]
pub struct CheckoutService<S> {
    store: S,
    settings: Settings,
    idempotency: IdempotencyGuard<S>,
}

impl<S: Store> CheckoutService<S> {
    pub fn new(store: S, settings: Settings) -> Self {
        Self {
            idempotency: IdempotencyGuard::new(store.clone(), settings.idempotency_ttl),
            store,
            settings,
        }
    }

    /// Places an order for the caller's cart. A repeated call while the order
    /// awaits payment returns the same order.
    #[tracing::instrument(skip(self, actor, key), fields(user_id = %actor.user_id))]
    pub async fn checkout(
        &self,
        actor: &Actor,
        key: Option<&IdempotencyKey>,
    ) -> Result<Replayable<OrderView>> {
        let request = key.map(|key| IdempotentRequest {
            key,
            user_id: actor.user_id,
            operation: IdempotentOperation::Checkout,
        });
        self.idempotency
            .run(request, &json!({}), 201, || self.place_order(actor))
            .await
    }

    async fn place_order(&self, actor: &Actor) -> Result<OrderView> {
        // 1. Load the cart
        let cart = active_cart(&self.store, actor.user_id).await?;
        if cart.is_empty() {
            return Err(ShoppingError::EmptyCart.into());
        }

        // 2. An order already awaiting payment is the answer
        if let Some(order) = self.store.find_active_order(actor.user_id, cart.id).await? {
            tracing::info!(order_id = %order.id, "returning existing active order");
            return self.view(order).await;
        }

        // 3. Re-check every item against the catalog
        let items = self.snapshot_items(actor, &cart.items).await?;
        let now = Utc::now();
        let order = Order::place(actor.user_id, cart.id, items, now)?;

        // 4. Free orders are paid at once; 5. priced orders get an attempt
        let snapshot: Vec<_> = cart.items.iter().map(|i| i.course_id).collect();
        let placement = if order.is_free() {
            let enrollments = order
                .course_ids()
                .map(|course_id| {
                    CourseEnrollment::new(
                        course_id,
                        actor.user_id,
                        EnrollmentSource::Free,
                        Some(order.id),
                        now,
                    )
                })
                .collect();
            OrderPlacement::new(order.clone())
                .with_enrollments(enrollments)
                .checking_out(cart.id)
                .from_cart(snapshot)
        } else {
            let expires_at = now + self.settings.payment_window;
            let (attempt, changes) = PaymentAttempt::issue(order.id, order.total, expires_at, now)?;
            let audit = changes
                .into_iter()
                .map(|change| {
                    PaymentAuditEntry::record(&attempt, change, Some(actor.user_id), None, now)
                })
                .collect();
            OrderPlacement::new(order.clone())
                .with_attempt(attempt, audit)
                .from_cart(snapshot)
        };

        match self.store.place_order(placement).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation(constraints::ORDERS_USER_CART_ACTIVE) => {
                tracing::info!("concurrent checkout placed the order first");
                let winner = self
                    .store
                    .find_active_order(actor.user_id, cart.id)
                    .await?
                    .ok_or_else(|| ApplicationError::Conflict("checkout is in progress".into()))?;
                return self.view(winner).await;
            }
            Err(StoreError::ConcurrencyConflict { entity: "cart", .. }) => {
                tracing::info!(cart_id = %cart.id, "cart changed during checkout");
                return Err(ApplicationError::Conflict(
                    "the cart changed during checkout, review it and try again".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let kind = if order.is_free() { "free" } else { "manual" };
        metrics::counter!("checkout_orders_total", "kind" => kind).increment(1);
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "order placed"
        );
        self.view(order).await
    }

    async fn snapshot_items(
        &self,
        actor: &Actor,
        cart_items: &[domain::shopping::CartItem],
    ) -> Result<Vec<OrderItem>> {
        let ids: Vec<_> = cart_items.iter().map(|i| i.course_id).collect();
        let courses = self.store.find_courses(&ids).await?;

        let mut items = Vec::with_capacity(ids.len());
        for course_id in ids {
            let course = courses
                .iter()
                .find(|c| c.id == course_id)
                .ok_or(ShoppingError::CourseUnavailable(course_id))?;
            let enrolled = self
                .store
                .find_enrollment(course_id, actor.user_id)
                .await?
                .is_some();
            items.push(order_item_for(course, enrolled)?);
        }
        Ok(items)
    }

    /// An order of the caller's, or any order for an admin.
    pub async fn get_order(&self, actor: &Actor, id: OrderId) -> Result<OrderView> {
        let order = self.load_for(actor, id).await?;
        self.view(order).await
    }

    pub async fn list_orders(&self, actor: &Actor, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.store.list_orders(actor.user_id, page).await?)
    }

    /// Cancels an order still awaiting payment. The cart becomes editable
    /// again.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn cancel_order(&self, actor: &Actor, id: OrderId) -> Result<OrderView> {
        let mut order = self.load_for(actor, id).await?;
        let expected = order.status;
        let now = Utc::now();
        order.cancel(now)?;

        let mut change = OrderChange::new(order.clone(), expected);
        if let Some(mut attempt) = self.store.find_open_attempt(id).await? {
            let attempt_status = attempt.status;
            let status_change = attempt.transition(PaymentStatus::Failed, now)?;
            let entry = PaymentAuditEntry::record(
                &attempt,
                status_change,
                Some(actor.user_id),
                Some("cancelled by buyer"),
                now,
            );
            change = change.attempt(attempt, attempt_status).audit(entry);
        }
        self.store.apply_order_change(change).await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_id = %id, "order cancelled");
        Ok(OrderView {
            order,
            payment: None,
        })
    }

    async fn load_for(&self, actor: &Actor, id: OrderId) -> Result<Order> {
        self.store
            .find_order(id)
            .await?
            .filter(|o| o.user_id == actor.user_id || actor.is_admin())
            .ok_or_else(|| ApplicationError::not_found("order", id))
    }

    async fn view(&self, order: Order) -> Result<OrderView> {
        let payment = if order.status == OrderStatus::PendingPayment {
            self.store
                .find_open_attempt(order.id)
                .await?
                .map(|attempt| PaymentInstructions::new(&self.settings.bank, &attempt))
        } else {
            None
        };
        Ok(OrderView { order, payment })
    }
}
