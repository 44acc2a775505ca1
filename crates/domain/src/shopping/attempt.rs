//! Payment attempt state machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentAttemptId};
use serde::{Deserialize, Serialize};

use super::ShoppingError;

/// Status shared by payment attempts and manual payment requests.
///
/// State transitions:
/// ```text
/// Draft ──► PendingPayment ──► AwaitingAdminApproval ──► Paid
///                 │                      │
///                 └──────────────────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Created but not yet offered to the buyer.
    #[default]
    Draft,

    /// Waiting for the buyer's bank transfer.
    PendingPayment,

    /// A receipt was submitted and waits for an admin.
    AwaitingAdminApproval,

    /// Approved (terminal state).
    Paid,

    /// Rejected, cancelled or expired (terminal state).
    Failed,
}

impl PaymentStatus {
    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Draft, PendingPayment)
                | (PendingPayment, AwaitingAdminApproval)
                | (PendingPayment, Failed)
                | (AwaitingAdminApproval, Paid)
                | (AwaitingAdminApproval, Failed)
        )
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Draft => "Draft",
            PaymentStatus::PendingPayment => "PendingPayment",
            PaymentStatus::AwaitingAdminApproval => "AwaitingAdminApproval",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(PaymentStatus::Draft),
            "PendingPayment" => Ok(PaymentStatus::PendingPayment),
            "AwaitingAdminApproval" => Ok(PaymentStatus::AwaitingAdminApproval),
            "Paid" => Ok(PaymentStatus::Paid),
            "Failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

/// A status change, kept for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: Option<PaymentStatus>,
    pub to: PaymentStatus,
}

/// One attempt at paying an order by bank transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: PaymentAttemptId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub tracking_code: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAttempt {
    /// Creates a draft attempt. It has no tracking code until issued.
    pub fn draft(
        order_id: OrderId,
        amount: Money,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentAttemptId::new(),
            order_id,
            amount,
            status: PaymentStatus::Draft,
            tracking_code: None,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an attempt and immediately offers it to the buyer with a
    /// fresh tracking code. Returns the attempt and its two status changes.
    pub fn issue(
        order_id: OrderId,
        amount: Money,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Self, [StatusChange; 2]), ShoppingError> {
        let mut attempt = Self::draft(order_id, amount, expires_at, now);
        let created = StatusChange {
            from: None,
            to: PaymentStatus::Draft,
        };
        let issued = attempt.transition(PaymentStatus::PendingPayment, now)?;
        attempt.tracking_code = Some(generate_tracking_code());
        Ok((attempt, [created, issued]))
    }

    /// Moves to `next` if the state machine allows it.
    pub fn transition(
        &mut self,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, ShoppingError> {
        if !self.status.can_transition_to(next) {
            return Err(ShoppingError::InvalidPaymentTransition {
                from: self.status,
                to: next,
            });
        }
        let change = StatusChange {
            from: Some(self.status),
            to: next,
        };
        self.status = next;
        self.updated_at = now;
        Ok(change)
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::PendingPayment && now >= self.expires_at
    }

    /// Checks that the buyer may still pay into this attempt.
    pub fn ensure_payable(&self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        if self.status != PaymentStatus::PendingPayment {
            return Err(ShoppingError::InvalidPaymentTransition {
                from: self.status,
                to: PaymentStatus::AwaitingAdminApproval,
            });
        }
        if self.is_expired(now) {
            return Err(ShoppingError::AttemptExpired(self.id));
        }
        Ok(())
    }
}

/// Generates a reference the buyer puts on the bank transfer, e.g.
/// `PAY-3F9A2C7B1D`.
pub fn generate_tracking_code() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("PAY-{}", &id[..10])
}
