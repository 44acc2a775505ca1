//! Multi-row writes applied atomically.
//!
//! Status updates carry the status the caller read. The store applies the
//! write only if every row is still in that status and fails with
//! [`StoreError::ConcurrencyConflict`](crate::StoreError::ConcurrencyConflict)
//! otherwise, so two admins reviewing the same receipt cannot both win.

use common::{CartId, CourseId};
use domain::catalog::CourseEnrollment;
use domain::payments::{ManualPaymentRequest, PaymentAuditEntry, Transaction};
use domain::shopping::{Order, OrderStatus, PaymentAttempt, PaymentStatus};

/// A new order with everything created alongside it.
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    pub order: Order,
    /// The payment attempt issued for a priced order.
    pub attempt: Option<PaymentAttempt>,
    pub audit: Vec<PaymentAuditEntry>,
    /// Enrollments granted at once for a free order.
    pub enrollments: Vec<CourseEnrollment>,
    /// Cart to mark checked out.
    pub checkout_cart: Option<CartId>,
    /// Courses the order's cart held when it was read. The placement fails
    /// with a concurrency conflict if the cart no longer holds exactly these.
    pub cart_snapshot: Option<Vec<CourseId>>,
}

impl OrderPlacement {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            attempt: None,
            audit: Vec::new(),
            enrollments: Vec::new(),
            checkout_cart: None,
            cart_snapshot: None,
        }
    }

    pub fn with_attempt(mut self, attempt: PaymentAttempt, audit: Vec<PaymentAuditEntry>) -> Self {
        self.attempt = Some(attempt);
        self.audit = audit;
        self
    }

    pub fn with_enrollments(mut self, enrollments: Vec<CourseEnrollment>) -> Self {
        self.enrollments = enrollments;
        self
    }

    pub fn checking_out(mut self, cart_id: CartId) -> Self {
        self.checkout_cart = Some(cart_id);
        self
    }

    /// Requires `order.cart_id` to still hold exactly `course_ids`.
    pub fn from_cart(mut self, course_ids: impl IntoIterator<Item = CourseId>) -> Self {
        self.cart_snapshot = Some(course_ids.into_iter().collect());
        self
    }
}

/// A row update guarded by the status it is expected to have.
#[derive(Debug, Clone)]
pub struct Guarded<T, S> {
    pub row: T,
    pub expected: S,
}

/// A change to an existing order and its payment rows.
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub order: Guarded<Order, OrderStatus>,
    pub attempt: Option<Guarded<PaymentAttempt, PaymentStatus>>,
    /// A request to update (`Some(expected)`) or insert (`None`).
    pub request: Option<(ManualPaymentRequest, Option<PaymentStatus>)>,
    /// A replacement attempt issued after a rejection.
    pub new_attempt: Option<PaymentAttempt>,
    pub transaction: Option<Transaction>,
    /// Existing enrollments for the same course and student are kept.
    pub enrollments: Vec<CourseEnrollment>,
    pub checkout_cart: Option<CartId>,
    pub audit: Vec<PaymentAuditEntry>,
}

impl OrderChange {
    /// Updates `order`, which the caller read in status `expected`.
    pub fn new(order: Order, expected: OrderStatus) -> Self {
        Self {
            order: Guarded {
                row: order,
                expected,
            },
            attempt: None,
            request: None,
            new_attempt: None,
            transaction: None,
            enrollments: Vec::new(),
            checkout_cart: None,
            audit: Vec::new(),
        }
    }

    pub fn attempt(mut self, attempt: PaymentAttempt, expected: PaymentStatus) -> Self {
        self.attempt = Some(Guarded {
            row: attempt,
            expected,
        });
        self
    }

    pub fn insert_request(mut self, request: ManualPaymentRequest) -> Self {
        self.request = Some((request, None));
        self
    }

    pub fn update_request(mut self, request: ManualPaymentRequest, expected: PaymentStatus) -> Self {
        self.request = Some((request, Some(expected)));
        self
    }

    pub fn new_attempt(mut self, attempt: PaymentAttempt) -> Self {
        self.new_attempt = Some(attempt);
        self
    }

    pub fn transaction(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn enrollments(mut self, enrollments: Vec<CourseEnrollment>) -> Self {
        self.enrollments = enrollments;
        self
    }

    pub fn checking_out(mut self, cart_id: CartId) -> Self {
        self.checkout_cart = Some(cart_id);
        self
    }

    pub fn audit(mut self, entry: PaymentAuditEntry) -> Self {
        self.audit.push(entry);
        self
    }
}
