use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartId, CourseId, ManualPaymentRequestId, OrderId, Page, PageRequest, PaymentAttemptId, UserId,
};
use domain::catalog::CourseEnrollment;
use domain::payments::{ManualPaymentRequest, PaymentAuditEntry, Transaction};
use domain::shopping::{Cart, CartItem, CartStatus, Order, PaymentAttempt, PaymentStatus};

use super::{InMemoryStore, Tables};
use crate::{
    OrderChange, OrderPlacement, PaymentRepository, Result, ShoppingRepository, StoreError,
    constraints,
};

impl Tables {
    fn check_active_order(&self, order: &Order) -> Result<()> {
        let clash = order.status.is_active()
            && self.orders.values().any(|o| {
                o.id != order.id
                    && o.status.is_active()
                    && o.user_id == order.user_id
                    && o.cart_id == order.cart_id
            });
        if clash {
            return Err(StoreError::unique(constraints::ORDERS_USER_CART_ACTIVE));
        }
        Ok(())
    }

    /// Checks attempt indexes as if `attempt` replaced the row with its id.
    /// `ignore` lists attempts being changed in the same write.
    fn check_attempt(&self, attempt: &PaymentAttempt, ignore: &[PaymentAttemptId]) -> Result<()> {
        let others = self
            .attempts
            .values()
            .filter(|a| a.id != attempt.id && !ignore.contains(&a.id));

        for other in others {
            if attempt.tracking_code.is_some() && other.tracking_code == attempt.tracking_code {
                return Err(StoreError::unique(
                    constraints::PAYMENT_ATTEMPTS_TRACKING_CODE,
                ));
            }
            if attempt.is_open() && other.is_open() && other.order_id == attempt.order_id {
                return Err(StoreError::unique(constraints::PAYMENT_ATTEMPTS_ORDER_OPEN));
            }
        }
        Ok(())
    }

    fn insert_missing_enrollments(&mut self, enrollments: &[CourseEnrollment]) {
        for enrollment in enrollments {
            if !self.is_enrolled(enrollment.course_id, enrollment.student_id) {
                self.enrollments.push(enrollment.clone());
            }
        }
    }

    fn cart_has_active_order(&self, cart_id: CartId) -> bool {
        self.orders
            .values()
            .any(|o| o.cart_id == cart_id && o.status.is_active())
    }

    /// The cart, unless an active order holds it.
    fn unlocked_cart(&mut self, cart_id: CartId) -> Result<&mut Cart> {
        if self.cart_has_active_order(cart_id) {
            return Err(StoreError::cart_locked(cart_id));
        }
        self.carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))
    }

    fn check_cart_snapshot(&self, cart_id: CartId, expected: &[CourseId]) -> Result<()> {
        let cart = self
            .carts
            .get(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        let mut held: Vec<_> = cart.items.iter().map(|i| i.course_id).collect();
        let mut expected = expected.to_vec();
        held.sort();
        expected.sort();
        if cart.status != CartStatus::Active || held != expected {
            return Err(StoreError::conflict("cart", cart_id, "unchanged items"));
        }
        Ok(())
    }

    fn check_out_cart(&mut self, cart_id: CartId, now: DateTime<Utc>) {
        if let Some(cart) = self.carts.get_mut(&cart_id) {
            cart.status = CartStatus::CheckedOut;
            cart.updated_at = now;
        }
    }
}

#[async_trait]
impl ShoppingRepository for InMemoryStore {
    async fn find_active_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let tables = self.tables.read().await;
        Ok(tables
            .carts
            .values()
            .find(|c| c.user_id == user_id && c.status == CartStatus::Active)
            .cloned())
    }

    async fn find_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.tables.read().await.carts.get(&id).cloned())
    }

    async fn insert_cart(&self, cart: &Cart) -> Result<()> {
        let mut tables = self.tables.write().await;
        let clash = cart.status == CartStatus::Active
            && tables
                .carts
                .values()
                .any(|c| c.user_id == cart.user_id && c.status == CartStatus::Active);
        if clash {
            return Err(StoreError::unique(constraints::CARTS_USER_ACTIVE));
        }
        tables.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn insert_cart_item(&self, item: &CartItem) -> Result<()> {
        let mut tables = self.tables.write().await;
        let cart = tables.unlocked_cart(item.cart_id)?;
        if cart.contains(item.course_id) {
            return Err(StoreError::unique(constraints::CART_ITEMS_CART_COURSE));
        }
        cart.items.push(item.clone());
        cart.updated_at = item.added_at;
        Ok(())
    }

    async fn delete_cart_item(&self, cart_id: CartId, course_id: CourseId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let cart = tables.unlocked_cart(cart_id)?;
        let before = cart.items.len();
        cart.items.retain(|i| i.course_id != course_id);
        let removed = cart.items.len() != before;
        if removed {
            cart.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let cart = tables.unlocked_cart(cart_id)?;
        cart.items.clear();
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn place_order(&self, placement: OrderPlacement) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = &placement.order;

        tables.check_active_order(order)?;
        if let Some(expected) = &placement.cart_snapshot {
            tables.check_cart_snapshot(order.cart_id, expected)?;
        }
        if tables
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::unique(constraints::ORDERS_ORDER_NUMBER));
        }
        if let Some(attempt) = &placement.attempt {
            tables.check_attempt(attempt, &[])?;
        }

        let now = order.created_at;
        tables.orders.insert(order.id, order.clone());
        if let Some(attempt) = placement.attempt {
            tables.attempts.insert(attempt.id, attempt);
        }
        tables.audit_log.extend(placement.audit);
        tables.insert_missing_enrollments(&placement.enrollments);
        if let Some(cart_id) = placement.checkout_cart {
            tables.check_out_cart(cart_id, now);
        }
        Ok(())
    }

    async fn apply_order_change(&self, change: OrderChange) -> Result<()> {
        let mut tables = self.tables.write().await;

        // Guards first: nothing is written unless every row is as expected.
        let order = &change.order.row;
        match tables.orders.get(&order.id) {
            Some(current) if current.status == change.order.expected => {}
            Some(_) => return Err(StoreError::conflict("order", order.id, change.order.expected)),
            None => return Err(StoreError::not_found("order", order.id)),
        }
        tables.check_active_order(order)?;

        let mut changed_attempts = Vec::new();
        if let Some(guarded) = &change.attempt {
            match tables.attempts.get(&guarded.row.id) {
                Some(current) if current.status == guarded.expected => {}
                Some(_) => {
                    return Err(StoreError::conflict(
                        "payment attempt",
                        guarded.row.id,
                        guarded.expected,
                    ));
                }
                None => return Err(StoreError::not_found("payment attempt", guarded.row.id)),
            }
            changed_attempts.push(guarded.row.id);
        }
        if let Some(new_attempt) = &change.new_attempt {
            tables.check_attempt(new_attempt, &changed_attempts)?;
            if let Some(guarded) = &change.attempt
                && guarded.row.is_open()
                && new_attempt.is_open()
            {
                return Err(StoreError::unique(constraints::PAYMENT_ATTEMPTS_ORDER_OPEN));
            }
        }

        if let Some((request, Some(expected))) = &change.request {
            match tables.requests.get(&request.id) {
                Some(current) if current.status == *expected => {}
                Some(_) => {
                    return Err(StoreError::conflict("payment request", request.id, expected));
                }
                None => return Err(StoreError::not_found("payment request", request.id)),
            }
        }
        if let Some(transaction) = &change.transaction
            && tables
                .transactions
                .iter()
                .any(|t| t.payment_attempt_id == transaction.payment_attempt_id)
        {
            return Err(StoreError::unique(constraints::TRANSACTIONS_PAYMENT_ATTEMPT));
        }

        let now = order.updated_at;
        tables.orders.insert(order.id, change.order.row.clone());
        if let Some(guarded) = change.attempt {
            tables.attempts.insert(guarded.row.id, guarded.row);
        }
        if let Some(new_attempt) = change.new_attempt {
            tables.attempts.insert(new_attempt.id, new_attempt);
        }
        if let Some((request, _)) = change.request {
            tables.requests.insert(request.id, request);
        }
        if let Some(transaction) = change.transaction {
            tables.transactions.push(transaction);
        }
        tables.insert_missing_enrollments(&change.enrollments);
        if let Some(cart_id) = change.checkout_cart {
            tables.check_out_cart(cart_id, now);
        }
        tables.audit_log.extend(change.audit);
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_active_order(&self, user_id: UserId, cart_id: CartId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.user_id == user_id && o.cart_id == cart_id && o.status.is_active())
            .cloned())
    }

    async fn list_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.paginate(orders))
    }

    async fn find_attempt(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>> {
        Ok(self.tables.read().await.attempts.get(&id).cloned())
    }

    async fn find_open_attempt(&self, order_id: OrderId) -> Result<Option<PaymentAttempt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .find(|a| a.order_id == order_id && a.is_open())
            .cloned())
    }

    async fn list_expired_attempts(&self, now: DateTime<Utc>) -> Result<Vec<PaymentAttempt>> {
        let tables = self.tables.read().await;
        let mut attempts: Vec<_> = tables
            .attempts
            .values()
            .filter(|a| a.status == PaymentStatus::PendingPayment && a.expires_at <= now)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(attempts)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn find_request(
        &self,
        id: ManualPaymentRequestId,
    ) -> Result<Option<ManualPaymentRequest>> {
        Ok(self.tables.read().await.requests.get(&id).cloned())
    }

    async fn list_pending_requests(
        &self,
        page: PageRequest,
    ) -> Result<Page<ManualPaymentRequest>> {
        let tables = self.tables.read().await;
        let mut requests: Vec<_> = tables
            .requests
            .values()
            .filter(|r| r.status == PaymentStatus::AwaitingAdminApproval)
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(page.paginate(requests))
    }

    async fn list_requests_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ManualPaymentRequest>> {
        let tables = self.tables.read().await;
        let mut requests: Vec<_> = tables
            .requests
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requests)
    }

    async fn list_transactions(&self, page: PageRequest) -> Result<Page<Transaction>> {
        let tables = self.tables.read().await;
        let mut transactions = tables.transactions.clone();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.paginate(transactions))
    }

    async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<PaymentAuditEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit_log
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::{CartItemId, Money};
    use domain::shopping::{OrderItem, OrderStatus};

    use super::*;

    fn order(user_id: UserId, cart_id: CartId) -> Order {
        Order::place(
            user_id,
            cart_id,
            vec![OrderItem {
                course_id: CourseId::new(),
                title: "Rust".to_string(),
                unit_price: Money::from_cents(1000),
            }],
            Utc::now(),
        )
        .unwrap()
    }

    fn attempt(order: &Order) -> PaymentAttempt {
        let now = Utc::now();
        PaymentAttempt::issue(order.id, order.total, now + Duration::hours(1), now)
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn second_active_order_for_cart_is_rejected() {
        let store = InMemoryStore::new();
        let (user, cart) = (UserId::new(), CartId::new());
        store
            .place_order(OrderPlacement::new(order(user, cart)))
            .await
            .unwrap();

        let err = store
            .place_order(OrderPlacement::new(order(user, cart)))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(constraints::ORDERS_USER_CART_ACTIVE));
    }

    #[tokio::test]
    async fn cancelled_order_frees_the_cart() {
        let store = InMemoryStore::new();
        let (user, cart) = (UserId::new(), CartId::new());
        let mut first = order(user, cart);
        store
            .place_order(OrderPlacement::new(first.clone()))
            .await
            .unwrap();

        first.cancel(Utc::now()).unwrap();
        store
            .apply_order_change(OrderChange::new(first, OrderStatus::PendingPayment))
            .await
            .unwrap();

        store
            .place_order(OrderPlacement::new(order(user, cart)))
            .await
            .unwrap();
    }

    async fn cart_with_item(store: &InMemoryStore, user: UserId) -> (Cart, CourseId) {
        let now = Utc::now();
        let cart = Cart::new(user, now);
        store.insert_cart(&cart).await.unwrap();
        let course_id = CourseId::new();
        store
            .insert_cart_item(&CartItem {
                id: CartItemId::new(),
                cart_id: cart.id,
                course_id,
                title: "Rust".to_string(),
                unit_price: Money::from_cents(1000),
                added_at: now,
            })
            .await
            .unwrap();
        (cart, course_id)
    }

    fn order_for(cart: &Cart, course_id: CourseId) -> Order {
        Order::place(
            cart.user_id,
            cart.id,
            vec![OrderItem {
                course_id,
                title: "Rust".to_string(),
                unit_price: Money::from_cents(1000),
            }],
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn cart_writes_fail_while_an_order_is_active() {
        let store = InMemoryStore::new();
        let (cart, course_id) = cart_with_item(&store, UserId::new()).await;
        store
            .place_order(OrderPlacement::new(order_for(&cart, course_id)).from_cart([course_id]))
            .await
            .unwrap();

        let item = CartItem {
            id: CartItemId::new(),
            cart_id: cart.id,
            course_id: CourseId::new(),
            title: "Tokio".to_string(),
            unit_price: Money::from_cents(500),
            added_at: Utc::now(),
        };
        let err = store.insert_cart_item(&item).await.unwrap_err();
        assert!(matches!(err, StoreError::CartLocked { .. }));
        let err = store.delete_cart_item(cart.id, course_id).await.unwrap_err();
        assert!(matches!(err, StoreError::CartLocked { .. }));
        let err = store.clear_cart(cart.id).await.unwrap_err();
        assert!(matches!(err, StoreError::CartLocked { .. }));

        let stored = store.find_cart(cart.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
    }

    #[tokio::test]
    async fn placement_from_a_changed_cart_conflicts() {
        let store = InMemoryStore::new();
        let (cart, course_id) = cart_with_item(&store, UserId::new()).await;
        let snapshot = [course_id];

        // An item lands between reading the cart and placing the order.
        store
            .insert_cart_item(&CartItem {
                id: CartItemId::new(),
                cart_id: cart.id,
                course_id: CourseId::new(),
                title: "Tokio".to_string(),
                unit_price: Money::from_cents(500),
                added_at: Utc::now(),
            })
            .await
            .unwrap();

        let err = store
            .place_order(OrderPlacement::new(order_for(&cart, course_id)).from_cart(snapshot))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { entity: "cart", .. }
        ));
        assert!(store.find_active_order(cart.user_id, cart.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_guard_is_a_concurrency_conflict() {
        let store = InMemoryStore::new();
        let mut placed = order(UserId::new(), CartId::new());
        let attempt = attempt(&placed);
        store
            .place_order(OrderPlacement::new(placed.clone()).with_attempt(attempt, vec![]))
            .await
            .unwrap();

        placed.mark_processing(Utc::now()).unwrap();
        let err = store
            .apply_order_change(OrderChange::new(placed, OrderStatus::Processing))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn second_open_attempt_is_rejected() {
        let store = InMemoryStore::new();
        let placed = order(UserId::new(), CartId::new());
        let first = attempt(&placed);
        store
            .place_order(OrderPlacement::new(placed.clone()).with_attempt(first, vec![]))
            .await
            .unwrap();

        let change = OrderChange::new(placed.clone(), OrderStatus::PendingPayment)
            .new_attempt(attempt(&placed));
        let err = store.apply_order_change(change).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::PAYMENT_ATTEMPTS_ORDER_OPEN));
    }

    #[tokio::test]
    async fn expired_attempts_are_listed() {
        let store = InMemoryStore::new();
        let placed = order(UserId::new(), CartId::new());
        let attempt = attempt(&placed);
        let expires_at = attempt.expires_at;
        store
            .place_order(OrderPlacement::new(placed).with_attempt(attempt, vec![]))
            .await
            .unwrap();

        assert!(store.list_expired_attempts(Utc::now()).await.unwrap().is_empty());
        assert_eq!(store.list_expired_attempts(expires_at).await.unwrap().len(), 1);
    }
}
