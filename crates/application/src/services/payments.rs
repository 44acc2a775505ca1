//! Manual bank-transfer payments and their review by admins.

use chrono::{DateTime, Utc};
use common::{ManualPaymentRequestId, OrderId, Page, PageRequest};
use domain::catalog::{CourseEnrollment, EnrollmentSource};
use domain::payments::{
    IdempotencyKey, IdempotentOperation, ManualPaymentRequest, PaymentAuditEntry, ReceiptDetails,
    Transaction,
};
use domain::shopping::{Order, OrderStatus, PaymentAttempt, PaymentStatus, ShoppingError};
use serde::Serialize;
use serde_json::json;
use store::{OrderChange, Store, StoreError};

use crate::auth::Actor;
use crate::error::{ApplicationError, Result};
use crate::idempotency::{IdempotencyGuard, IdempotentRequest, Replayable};
use crate::services::checkout::PaymentInstructions;
use crate::settings::Settings;

/// The result of an admin decision on a receipt.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReview {
    pub request: ManualPaymentRequest,
    pub order: Order,
    /// Instructions for the replacement attempt after a rejection.
    pub retry: Option<PaymentInstructions>,
}

#[derive(Clone)]
pub struct PaymentService<S> {
    store: S,
    settings: Settings,
    idempotency: IdempotencyGuard<S>,
}

impl<S: Store> PaymentService<S> {
    pub fn new(store: S, settings: Settings) -> Self {
        Self {
            idempotency: IdempotencyGuard::new(store.clone(), settings.idempotency_ttl),
            store,
            settings,
        }
    }

    /// Records the buyer's transfer receipt and hands the order to admins.
    #[tracing::instrument(skip(self, actor, receipt, key), fields(user_id = %actor.user_id))]
    pub async fn submit_receipt(
        &self,
        actor: &Actor,
        order_id: OrderId,
        receipt: ReceiptDetails,
        key: Option<&IdempotencyKey>,
    ) -> Result<Replayable<ManualPaymentRequest>> {
        let request = key.map(|key| IdempotentRequest {
            key,
            user_id: actor.user_id,
            operation: IdempotentOperation::SubmitReceipt,
        });
        let payload = json!({ "order_id": order_id, "receipt": &receipt });
        self.idempotency
            .run(request, &payload, 201, || {
                self.record_receipt(actor, order_id, receipt)
            })
            .await
    }

    async fn record_receipt(
        &self,
        actor: &Actor,
        order_id: OrderId,
        receipt: ReceiptDetails,
    ) -> Result<ManualPaymentRequest> {
        let mut order = self
            .store
            .find_order(order_id)
            .await?
            .filter(|o| o.user_id == actor.user_id)
            .ok_or_else(|| ApplicationError::not_found("order", order_id))?;
        let mut attempt = self
            .store
            .find_open_attempt(order_id)
            .await?
            .ok_or(ShoppingError::NoOpenAttempt(order_id))?;

        let now = Utc::now();
        attempt.ensure_payable(now)?;
        let request = ManualPaymentRequest::submit(&attempt, actor.user_id, receipt, now)?;
        order.mark_processing(now)?;
        let change = attempt.transition(PaymentStatus::AwaitingAdminApproval, now)?;
        let entry = PaymentAuditEntry::record(&attempt, change, Some(actor.user_id), None, now);

        self.store
            .apply_order_change(
                OrderChange::new(order, OrderStatus::PendingPayment)
                    .attempt(attempt, PaymentStatus::PendingPayment)
                    .insert_request(request.clone())
                    .audit(entry),
            )
            .await?;

        metrics::counter!("manual_payments_submitted_total").increment(1);
        tracing::info!(request_id = %request.id, %order_id, "receipt submitted");
        Ok(request)
    }

    /// Accepts a receipt: the order is paid and the buyer enrolled.
    #[tracing::instrument(skip(self, admin, note), fields(admin_id = %admin.user_id))]
    pub async fn approve(
        &self,
        admin: &Actor,
        id: ManualPaymentRequestId,
        note: Option<String>,
    ) -> Result<PaymentReview> {
        admin.require_admin()?;
        let (mut request, mut attempt, mut order) = self.load_review(id).await?;

        let now = Utc::now();
        request.approve(admin.user_id, note, now)?;
        let change = attempt.transition(PaymentStatus::Paid, now)?;
        order.mark_paid(now)?;

        let entry = PaymentAuditEntry::record(
            &attempt,
            change,
            Some(admin.user_id),
            request.admin_note.as_deref(),
            now,
        );
        let transaction = Transaction::for_approved_request(&request, admin.user_id, now);
        let enrollments = order
            .course_ids()
            .map(|course_id| {
                CourseEnrollment::new(
                    course_id,
                    order.user_id,
                    EnrollmentSource::Purchase,
                    Some(order.id),
                    now,
                )
            })
            .collect();

        self.store
            .apply_order_change(
                OrderChange::new(order.clone(), OrderStatus::Processing)
                    .attempt(attempt, PaymentStatus::AwaitingAdminApproval)
                    .update_request(request.clone(), PaymentStatus::AwaitingAdminApproval)
                    .transaction(transaction)
                    .enrollments(enrollments)
                    .checking_out(order.cart_id)
                    .audit(entry),
            )
            .await?;

        metrics::counter!("manual_payments_reviewed_total", "outcome" => "approved").increment(1);
        tracing::info!(request_id = %id, order_id = %order.id, "payment approved");
        Ok(PaymentReview {
            request,
            order,
            retry: None,
        })
    }

    /// Turns a receipt down. The order goes back to awaiting payment with a
    /// fresh attempt so the buyer can transfer again.
    #[tracing::instrument(skip(self, admin, reason), fields(admin_id = %admin.user_id))]
    pub async fn reject(
        &self,
        admin: &Actor,
        id: ManualPaymentRequestId,
        reason: &str,
    ) -> Result<PaymentReview> {
        admin.require_admin()?;
        let (mut request, mut attempt, mut order) = self.load_review(id).await?;

        let now = Utc::now();
        request.reject(admin.user_id, reason, now)?;
        let change = attempt.transition(PaymentStatus::Failed, now)?;
        order.reopen(now)?;

        let expires_at = now + self.settings.payment_window;
        let (retry, issued) = PaymentAttempt::issue(order.id, order.total, expires_at, now)?;

        let mut write = OrderChange::new(order.clone(), OrderStatus::Processing)
            .attempt(attempt.clone(), PaymentStatus::AwaitingAdminApproval)
            .update_request(request.clone(), PaymentStatus::AwaitingAdminApproval)
            .new_attempt(retry.clone())
            .audit(PaymentAuditEntry::record(
                &attempt,
                change,
                Some(admin.user_id),
                request.admin_note.as_deref(),
                now,
            ));
        for change in issued {
            write = write.audit(PaymentAuditEntry::record(
                &retry,
                change,
                Some(admin.user_id),
                None,
                now,
            ));
        }
        self.store.apply_order_change(write).await?;

        metrics::counter!("manual_payments_reviewed_total", "outcome" => "rejected").increment(1);
        tracing::info!(request_id = %id, order_id = %order.id, "payment rejected");
        Ok(PaymentReview {
            request,
            order,
            retry: Some(PaymentInstructions::new(&self.settings.bank, &retry)),
        })
    }

    pub async fn list_pending(
        &self,
        admin: &Actor,
        page: PageRequest,
    ) -> Result<Page<ManualPaymentRequest>> {
        admin.require_admin()?;
        Ok(self.store.list_pending_requests(page).await?)
    }

    pub async fn get_request(
        &self,
        actor: &Actor,
        id: ManualPaymentRequestId,
    ) -> Result<ManualPaymentRequest> {
        self.store
            .find_request(id)
            .await?
            .filter(|r| r.user_id == actor.user_id || actor.is_admin())
            .ok_or_else(|| ApplicationError::not_found("payment request", id))
    }

    pub async fn list_requests_for_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Vec<ManualPaymentRequest>> {
        let visible = self
            .store
            .find_order(order_id)
            .await?
            .is_some_and(|o| o.user_id == actor.user_id || actor.is_admin());
        if !visible {
            return Err(ApplicationError::not_found("order", order_id));
        }
        Ok(self.store.list_requests_for_order(order_id).await?)
    }

    pub async fn list_transactions(
        &self,
        admin: &Actor,
        page: PageRequest,
    ) -> Result<Page<Transaction>> {
        admin.require_admin()?;
        Ok(self.store.list_transactions(page).await?)
    }

    pub async fn audit_trail(
        &self,
        admin: &Actor,
        order_id: OrderId,
    ) -> Result<Vec<PaymentAuditEntry>> {
        admin.require_admin()?;
        if self.store.find_order(order_id).await?.is_none() {
            return Err(ApplicationError::not_found("order", order_id));
        }
        Ok(self.store.audit_trail(order_id).await?)
    }

    /// Fails attempts whose payment window has passed, together with their
    /// orders. Returns how many were expired.
    #[tracing::instrument(skip(self))]
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut expired = 0;
        for mut attempt in self.store.list_expired_attempts(now).await? {
            let Some(mut order) = self.store.find_order(attempt.order_id).await? else {
                tracing::warn!(attempt_id = %attempt.id, "attempt without order");
                continue;
            };
            if order.status != OrderStatus::PendingPayment {
                continue;
            }

            order.fail(now)?;
            let change = attempt.transition(PaymentStatus::Failed, now)?;
            let entry =
                PaymentAuditEntry::record(&attempt, change, None, Some("payment window expired"), now);
            let write = OrderChange::new(order, OrderStatus::PendingPayment)
                .attempt(attempt.clone(), PaymentStatus::PendingPayment)
                .audit(entry);

            match self.store.apply_order_change(write).await {
                Ok(()) => {
                    expired += 1;
                    tracing::info!(attempt_id = %attempt.id, order_id = %attempt.order_id, "payment attempt expired");
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    tracing::warn!(attempt_id = %attempt.id, "attempt changed while expiring, skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if expired > 0 {
            metrics::counter!("payment_attempts_expired_total").increment(expired);
        }
        Ok(expired)
    }

    async fn load_review(
        &self,
        id: ManualPaymentRequestId,
    ) -> Result<(ManualPaymentRequest, PaymentAttempt, Order)> {
        let request = self
            .store
            .find_request(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("payment request", id))?;
        let attempt = self
            .store
            .find_attempt(request.payment_attempt_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("payment attempt", request.payment_attempt_id))?;
        let order = self
            .store
            .find_order(request.order_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("order", request.order_id))?;
        Ok((request, attempt, order))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::{CartId, Money, UserId};
    use domain::identity::Role;
    use domain::shopping::OrderItem;
    use store::{InMemoryStore, OrderPlacement, ShoppingRepository};

    use super::*;

    async fn pending_order(store: &InMemoryStore, user_id: UserId, expires_in: Duration) -> Order {
        let now = Utc::now();
        let items = vec![OrderItem {
            course_id: common::CourseId::new(),
            title: "Rust Basics".to_string(),
            unit_price: Money::from_cents(4900),
        }];
        let order = Order::place(user_id, CartId::new(), items, now - Duration::hours(1)).unwrap();
        let (attempt, _) =
            PaymentAttempt::issue(order.id, order.total, now + expires_in, now - Duration::hours(1))
                .unwrap();
        store
            .place_order(OrderPlacement::new(order.clone()).with_attempt(attempt, Vec::new()))
            .await
            .unwrap();
        order
    }

    fn receipt(cents: i64) -> ReceiptDetails {
        ReceiptDetails {
            amount: Money::from_cents(cents),
            bank_reference: "TRX-0001".to_string(),
            paid_at: None,
            payer_name: None,
            receipt_url: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn receipt_amount_must_match() {
        let store = InMemoryStore::new();
        let buyer = Actor::new(UserId::new(), [Role::Student]);
        let order = pending_order(&store, buyer.user_id, Duration::hours(1)).await;
        let service = PaymentService::new(store, Settings::default());

        let err = service
            .submit_receipt(&buyer, order.id, receipt(100), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn expired_attempt_rejects_receipts() {
        let store = InMemoryStore::new();
        let buyer = Actor::new(UserId::new(), [Role::Student]);
        let order = pending_order(&store, buyer.user_id, -Duration::minutes(1)).await;
        let service = PaymentService::new(store, Settings::default());

        let err = service
            .submit_receipt(&buyer, order.id, receipt(4900), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn only_admins_review() {
        let store = InMemoryStore::new();
        let buyer = Actor::new(UserId::new(), [Role::Student]);
        let order = pending_order(&store, buyer.user_id, Duration::hours(1)).await;
        let service = PaymentService::new(store, Settings::default());
        let request = match service
            .submit_receipt(&buyer, order.id, receipt(4900), None)
            .await
            .unwrap()
        {
            Replayable::Fresh(request) => request,
            Replayable::Replayed { .. } => panic!("expected a fresh request"),
        };

        let err = service.approve(&buyer, request.id, None).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn expiry_fails_overdue_orders_only() {
        let store = InMemoryStore::new();
        let buyer = Actor::new(UserId::new(), [Role::Student]);
        let overdue = pending_order(&store, buyer.user_id, -Duration::minutes(1)).await;
        let current = pending_order(&store, UserId::new(), Duration::hours(1)).await;
        let service = PaymentService::new(store.clone(), Settings::default());

        assert_eq!(service.expire_overdue(Utc::now()).await.unwrap(), 1);
        assert_eq!(service.expire_overdue(Utc::now()).await.unwrap(), 0);

        let overdue = store.find_order(overdue.id).await.unwrap().unwrap();
        let current = store.find_order(current.id).await.unwrap().unwrap();
        assert_eq!(overdue.status, OrderStatus::Failed);
        assert_eq!(current.status, OrderStatus::PendingPayment);
    }
}
