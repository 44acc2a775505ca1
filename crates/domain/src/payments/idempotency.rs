//! Cached responses keyed by client-supplied idempotency keys.

use chrono::{DateTime, Duration, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::PaymentError;

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Operations that accept an `Idempotency-Key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdempotentOperation {
    Checkout,
    SubmitReceipt,
}

impl IdempotentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotentOperation::Checkout => "Checkout",
            IdempotentOperation::SubmitReceipt => "SubmitReceipt",
        }
    }
}

impl std::str::FromStr for IdempotentOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Checkout" => Ok(IdempotentOperation::Checkout),
            "SubmitReceipt" => Ok(IdempotentOperation::SubmitReceipt),
            other => Err(format!("unknown idempotent operation '{other}'")),
        }
    }
}

/// A validated idempotency key: 1 to 255 printable ASCII characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn parse(value: &str) -> Result<Self, PaymentError> {
        let valid = !value.is_empty()
            && value.len() <= MAX_IDEMPOTENCY_KEY_LEN
            && value.bytes().all(|b| b.is_ascii_graphic() || b == b' ')
            && !value.trim().is_empty();
        if !valid {
            return Err(PaymentError::InvalidIdempotencyKey);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hex SHA-256 of the canonical JSON form of a request.
///
/// Object keys are serialized in sorted order, so two requests with the same
/// fields hash equally regardless of field order.
pub fn request_hash<T: Serialize>(request: &T) -> Result<String, PaymentError> {
    let canonical = serde_json::to_value(request).map_err(|e| PaymentError::Hash(e.to_string()))?;
    let bytes = serde_json::to_vec(&canonical).map_err(|e| PaymentError::Hash(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// A stored response for a completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub user_id: UserId,
    pub operation: IdempotentOperation,
    pub request_hash: String,
    pub response_status: u16,
    pub response_body: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: IdempotencyKey,
        user_id: UserId,
        operation: IdempotentOperation,
        request_hash: String,
        response_status: u16,
        response_body: Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            user_id,
            operation,
            request_hash,
            response_status,
            response_body,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Decides what a repeated request gets.
    ///
    /// Returns `Ok(true)` when the stored response should be replayed and
    /// `Ok(false)` when the record is expired and the request runs again.
    /// A live record with a different request hash is an error.
    pub fn replays(&self, request_hash: &str, now: DateTime<Utc>) -> Result<bool, PaymentError> {
        if self.is_expired(now) {
            return Ok(false);
        }
        if self.request_hash != request_hash {
            return Err(PaymentError::IdempotencyKeyReused);
        }
        Ok(true)
    }
}
