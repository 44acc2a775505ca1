use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentAttemptId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use super::ManualPaymentRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    ManualBankTransfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::ManualBankTransfer => "ManualBankTransfer",
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ManualBankTransfer" => Ok(TransactionKind::ManualBankTransfer),
            other => Err(format!("unknown transaction kind '{other}'")),
        }
    }
}

/// Money received for an order. One per approved payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub payment_attempt_id: PaymentAttemptId,
    pub amount: Money,
    pub kind: TransactionKind,
    pub reference: String,
    pub recorded_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn for_approved_request(
        request: &ManualPaymentRequest,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            user_id: request.user_id,
            order_id: request.order_id,
            payment_attempt_id: request.payment_attempt_id,
            amount: request.amount,
            kind: TransactionKind::ManualBankTransfer,
            reference: request.bank_reference.clone(),
            recorded_by: admin_id,
            created_at: now,
        }
    }
}
