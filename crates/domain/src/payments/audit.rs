use chrono::{DateTime, Utc};
use common::{AuditLogId, OrderId, PaymentAttemptId, UserId};
use serde::{Deserialize, Serialize};

use crate::shopping::{PaymentAttempt, PaymentStatus, StatusChange};

/// One row of the append-only payment audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuditEntry {
    pub id: AuditLogId,
    pub payment_attempt_id: PaymentAttemptId,
    pub order_id: OrderId,
    pub from_status: Option<PaymentStatus>,
    pub to_status: PaymentStatus,
    pub actor_id: Option<UserId>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentAuditEntry {
    /// Records a status change of `attempt`. `actor_id` is `None` for
    /// changes made by the system, such as expiry.
    pub fn record(
        attempt: &PaymentAttempt,
        change: StatusChange,
        actor_id: Option<UserId>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditLogId::new(),
            payment_attempt_id: attempt.id,
            order_id: attempt.order_id,
            from_status: change.from,
            to_status: change.to,
            actor_id,
            note: note.map(str::to_string),
            created_at: now,
        }
    }
}
