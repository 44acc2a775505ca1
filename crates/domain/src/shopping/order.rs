//! Order state machine.

use chrono::{DateTime, Utc};
use common::{CartId, CourseId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::ShoppingError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// PendingPayment ◄──► Processing ──► Paid
///       │
///       ├──► Cancelled
///       └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Waiting for the buyer's bank transfer.
    #[default]
    PendingPayment,

    /// A receipt was submitted and is under review.
    Processing,

    /// Payment approved (terminal state).
    Paid,

    /// Cancelled by the buyer (terminal state).
    Cancelled,

    /// Payment window elapsed (terminal state).
    Failed,
}

impl OrderStatus {
    /// Returns true if a receipt can be submitted in this status.
    pub fn can_submit_receipt(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if a review decision can be applied in this status.
    pub fn can_review(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the buyer can cancel in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Active orders lock their cart. At most one exists per user and cart.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment | OrderStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PendingPayment",
            OrderStatus::Processing => "Processing",
            OrderStatus::Paid => "Paid",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PendingPayment" => Ok(OrderStatus::PendingPayment),
            "Processing" => Ok(OrderStatus::Processing),
            "Paid" => Ok(OrderStatus::Paid),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            "Failed" => Ok(OrderStatus::Failed),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// A course snapshot taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub course_id: CourseId,
    pub title: String,
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Places an order for the given items. A free order is paid at once.
    pub fn place(
        user_id: UserId,
        cart_id: CartId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, ShoppingError> {
        if items.is_empty() {
            return Err(ShoppingError::EmptyCart);
        }
        let total = Money::checked_sum(items.iter().map(|i| i.unit_price))
            .ok_or(ShoppingError::TotalOverflow)?;

        let id = OrderId::new();
        let free = total.is_zero();

        Ok(Self {
            id,
            order_number: generate_order_number(id, now),
            user_id,
            cart_id,
            items,
            total,
            status: if free {
                OrderStatus::Paid
            } else {
                OrderStatus::PendingPayment
            },
            created_at: now,
            updated_at: now,
            paid_at: free.then_some(now),
            cancelled_at: None,
        })
    }

    pub fn is_free(&self) -> bool {
        self.total.is_zero()
    }

    /// A receipt was submitted.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        self.ensure(self.status.can_submit_receipt(), "submit a receipt for")?;
        self.status = OrderStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    /// The payment was approved.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        self.ensure(self.status.can_review(), "approve")?;
        self.status = OrderStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// The receipt was rejected; the buyer may pay again.
    pub fn reopen(&mut self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        self.ensure(self.status.can_review(), "reject")?;
        self.status = OrderStatus::PendingPayment;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        self.ensure(self.status.can_cancel(), "cancel")?;
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// The payment window elapsed.
    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        self.ensure(self.status == OrderStatus::PendingPayment, "expire")?;
        self.status = OrderStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    pub fn course_ids(&self) -> impl Iterator<Item = CourseId> + '_ {
        self.items.iter().map(|i| i.course_id)
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> Result<(), ShoppingError> {
        if allowed {
            Ok(())
        } else {
            Err(ShoppingError::InvalidOrderTransition {
                current: self.status,
                action,
            })
        }
    }
}

/// Builds an order number of the form `ORD-YYYYMMDD-XXXXXXXX`.
pub fn generate_order_number(id: OrderId, now: DateTime<Utc>) -> String {
    let suffix = id.as_uuid().simple().to_string().to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn item(cents: i64) -> OrderItem {
        OrderItem {
            course_id: CourseId::new(),
            title: "Course".to_string(),
            unit_price: Money::from_cents(cents),
        }
    }

    fn pending() -> Order {
        Order::place(UserId::new(), CartId::new(), vec![item(1000), item(2500)], Utc::now()).unwrap()
    }

    #[test]
    fn test_active_statuses() {
        assert!(OrderStatus::PendingPayment.is_active());
        assert!(OrderStatus::Processing.is_active());
        assert!(!OrderStatus::Paid.is_active());
        assert!(!OrderStatus::Cancelled.is_active());
        assert!(!OrderStatus::Failed.is_active());
    }

    #[test]
    fn test_place_computes_total() {
        let order = pending();
        assert_eq!(order.total, Money::from_cents(3500));
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert!(order.paid_at.is_none());
    }

    #[test]
    fn test_free_order_is_paid_immediately() {
        let order = Order::place(UserId::new(), CartId::new(), vec![item(0)], Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.paid_at.is_some());
    }

    #[test]
    fn test_empty_order_rejected() {
        let result = Order::place(UserId::new(), CartId::new(), vec![], Utc::now());
        assert_eq!(result, Err(ShoppingError::EmptyCart));
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2026, 2, 3, 10, 0, 0).unwrap();
        let number = generate_order_number(OrderId::new(), now);
        assert!(number.starts_with("ORD-20260203-"));
        assert_eq!(number.len(), "ORD-20260203-".len() + 8);
    }

    #[test]
    fn test_review_cycle() {
        let mut order = pending();
        order.mark_processing(Utc::now()).unwrap();
        order.reopen(Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        order.mark_processing(Utc::now()).unwrap();
        order.mark_paid(Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn test_cannot_cancel_while_processing() {
        let mut order = pending();
        order.mark_processing(Utc::now()).unwrap();
        let err = order.cancel(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ShoppingError::InvalidOrderTransition {
                current: OrderStatus::Processing,
                action: "cancel",
            }
        );
    }

    #[test]
    fn test_cancel_sets_timestamp() {
        let mut order = pending();
        order.cancel(Utc::now()).unwrap();
        assert!(order.cancelled_at.is_some());
        assert!(order.fail(Utc::now()).is_err());
    }
}
