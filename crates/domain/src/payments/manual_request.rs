use chrono::{DateTime, Utc};
use common::{ManualPaymentRequestId, Money, OrderId, PaymentAttemptId, UserId};
use serde::{Deserialize, Serialize};

use super::PaymentError;
use crate::shopping::{PaymentAttempt, PaymentStatus, StatusChange};

/// What the buyer reports about their bank transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDetails {
    pub amount: Money,
    pub bank_reference: String,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payer_name: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A buyer's claim that they paid, waiting for an admin to check the bank
/// statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPaymentRequest {
    pub id: ManualPaymentRequestId,
    pub payment_attempt_id: PaymentAttemptId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub bank_reference: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub payer_name: Option<String>,
    pub receipt_url: Option<String>,
    pub note: Option<String>,
    pub status: PaymentStatus,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ManualPaymentRequest {
    /// Records a receipt against an attempt. The caller has already checked
    /// that the attempt is payable.
    pub fn submit(
        attempt: &PaymentAttempt,
        user_id: UserId,
        receipt: ReceiptDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, PaymentError> {
        if receipt.amount != attempt.amount {
            return Err(PaymentError::AmountMismatch {
                expected: attempt.amount,
                actual: receipt.amount,
            });
        }

        let bank_reference = receipt.bank_reference.trim().to_string();
        let len = bank_reference.chars().count();
        if !(4..=64).contains(&len) {
            return Err(PaymentError::InvalidBankReference);
        }

        let receipt_url = trimmed(receipt.receipt_url);
        if let Some(url) = &receipt_url
            && !(url.starts_with("https://") || url.starts_with("http://"))
        {
            return Err(PaymentError::InvalidReceiptUrl);
        }

        Ok(Self {
            id: ManualPaymentRequestId::new(),
            payment_attempt_id: attempt.id,
            order_id: attempt.order_id,
            user_id,
            amount: receipt.amount,
            bank_reference,
            paid_at: receipt.paid_at,
            payer_name: trimmed(receipt.payer_name),
            receipt_url,
            note: trimmed(receipt.note),
            status: PaymentStatus::AwaitingAdminApproval,
            reviewed_by: None,
            reviewed_at: None,
            admin_note: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn approve(
        &mut self,
        admin_id: UserId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, PaymentError> {
        self.review(PaymentStatus::Paid, admin_id, trimmed(note), now)
    }

    pub fn reject(
        &mut self,
        admin_id: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, PaymentError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PaymentError::ReasonRequired);
        }
        self.review(PaymentStatus::Failed, admin_id, Some(reason.to_string()), now)
    }

    fn review(
        &mut self,
        outcome: PaymentStatus,
        admin_id: UserId,
        admin_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, PaymentError> {
        if self.status != PaymentStatus::AwaitingAdminApproval {
            return Err(PaymentError::NotAwaitingApproval {
                id: self.id,
                status: self.status,
            });
        }
        let change = StatusChange {
            from: Some(self.status),
            to: outcome,
        };
        self.status = outcome;
        self.reviewed_by = Some(admin_id);
        self.reviewed_at = Some(now);
        self.admin_note = admin_note;
        self.updated_at = now;
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn attempt() -> PaymentAttempt {
        let now = Utc::now();
        PaymentAttempt::issue(OrderId::new(), Money::from_cents(4900), now + Duration::hours(1), now)
            .unwrap()
            .0
    }

    fn receipt(cents: i64, reference: &str) -> ReceiptDetails {
        ReceiptDetails {
            amount: Money::from_cents(cents),
            bank_reference: reference.to_string(),
            paid_at: None,
            payer_name: Some("  ".to_string()),
            receipt_url: None,
            note: None,
        }
    }

    #[test]
    fn submit_creates_request_awaiting_approval() {
        let attempt = attempt();
        let request =
            ManualPaymentRequest::submit(&attempt, UserId::new(), receipt(4900, " TRX-123 "), Utc::now())
                .unwrap();
        assert_eq!(request.status, PaymentStatus::AwaitingAdminApproval);
        assert_eq!(request.bank_reference, "TRX-123");
        assert_eq!(request.payer_name, None);
        assert_eq!(request.order_id, attempt.order_id);
    }

    #[test]
    fn amount_must_match() {
        let result =
            ManualPaymentRequest::submit(&attempt(), UserId::new(), receipt(4800, "TRX-123"), Utc::now());
        assert_eq!(
            result,
            Err(PaymentError::AmountMismatch {
                expected: Money::from_cents(4900),
                actual: Money::from_cents(4800),
            })
        );
    }

    #[test]
    fn bank_reference_length_is_checked() {
        let result =
            ManualPaymentRequest::submit(&attempt(), UserId::new(), receipt(4900, "abc"), Utc::now());
        assert_eq!(result, Err(PaymentError::InvalidBankReference));
    }

    #[test]
    fn reject_requires_reason_and_is_final() {
        let mut request =
            ManualPaymentRequest::submit(&attempt(), UserId::new(), receipt(4900, "TRX-123"), Utc::now())
                .unwrap();
        let admin = UserId::new();
        assert_eq!(
            request.reject(admin, "  ", Utc::now()),
            Err(PaymentError::ReasonRequired)
        );

        let change = request.reject(admin, "No transfer found", Utc::now()).unwrap();
        assert_eq!(change.to, PaymentStatus::Failed);
        assert_eq!(request.reviewed_by, Some(admin));
        assert_eq!(request.admin_note.as_deref(), Some("No transfer found"));

        assert!(matches!(
            request.approve(admin, None, Utc::now()),
            Err(PaymentError::NotAwaitingApproval { .. })
        ));
    }
}
