//! Manual bank-transfer payments: receipts, transactions, the audit trail
//! and idempotency records.

mod audit;
mod idempotency;
mod manual_request;
mod transaction;

pub use audit::PaymentAuditEntry;
pub use idempotency::{
    IdempotencyKey, IdempotencyRecord, IdempotentOperation, MAX_IDEMPOTENCY_KEY_LEN, request_hash,
};
pub use manual_request::{ManualPaymentRequest, ReceiptDetails};
pub use transaction::{Transaction, TransactionKind};

use common::{ManualPaymentRequestId, Money};
use thiserror::Error;

use crate::shopping::PaymentStatus;

/// Errors that can occur during payment operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Transferred amount {actual} does not match the amount due {expected}")]
    AmountMismatch { expected: Money, actual: Money },

    #[error("Bank reference must be between 4 and 64 characters")]
    InvalidBankReference,

    #[error("Receipt URL must be an absolute http(s) URL")]
    InvalidReceiptUrl,

    #[error("A reason is required to reject a payment")]
    ReasonRequired,

    #[error("Payment request {id} is {status}, not awaiting approval")]
    NotAwaitingApproval {
        id: ManualPaymentRequestId,
        status: PaymentStatus,
    },

    #[error("Idempotency-Key must be 1 to 255 printable ASCII characters")]
    InvalidIdempotencyKey,

    #[error("Idempotency-Key was already used with a different request")]
    IdempotencyKeyReused,

    #[error("Request could not be hashed: {0}")]
    Hash(String),
}
