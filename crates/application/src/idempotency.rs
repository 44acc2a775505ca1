//! Replay of responses for requests carrying an `Idempotency-Key`.
//!
//! A request is hashed before it runs. A live record for the same key, user
//! and operation either replays its stored response (same hash) or rejects
//! the request (different hash). After a fresh run the response is stored
//! with insert-if-absent semantics; if another request stored first, its
//! response is replayed instead.

use std::future::Future;

use chrono::{Duration, Utc};
use common::UserId;
use domain::payments::{IdempotencyKey, IdempotencyRecord, IdempotentOperation, request_hash};
use serde::Serialize;
use serde_json::Value;
use store::IdempotencyRepository;

use crate::error::Result;

/// Outcome of an idempotent call.
#[derive(Debug, Clone, PartialEq)]
pub enum Replayable<T> {
    /// The operation ran now.
    Fresh(T),
    /// A stored response from an earlier run.
    Replayed { status: u16, body: Value },
}

impl<T> Replayable<T> {
    pub fn is_replayed(&self) -> bool {
        matches!(self, Replayable::Replayed { .. })
    }
}

/// What identifies one idempotent request.
#[derive(Debug, Clone, Copy)]
pub struct IdempotentRequest<'a> {
    pub key: &'a IdempotencyKey,
    pub user_id: UserId,
    pub operation: IdempotentOperation,
}

#[derive(Clone)]
pub struct IdempotencyGuard<S> {
    store: S,
    ttl: Duration,
}

impl<S: IdempotencyRepository> IdempotencyGuard<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Runs `operation` unless `request` already has a stored response.
    /// `status` is the response status stored for a fresh run.
    #[tracing::instrument(skip_all)]
    pub async fn run<T, P, F, Fut>(
        &self,
        request: Option<IdempotentRequest<'_>>,
        payload: &P,
        status: u16,
        operation: F,
    ) -> Result<Replayable<T>>
    where
        T: Serialize,
        P: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(request) = request else {
            return Ok(Replayable::Fresh(operation().await?));
        };

        let hash = request_hash(payload)?;
        let stored = self
            .store
            .find_idempotency_record(request.key, request.user_id, request.operation)
            .await?;
        if let Some(record) = stored
            && record.replays(&hash, Utc::now())?
        {
            return Ok(replay(record));
        }

        let value = operation().await?;

        let now = Utc::now();
        let record = IdempotencyRecord::new(
            request.key.clone(),
            request.user_id,
            request.operation,
            hash.clone(),
            status,
            serde_json::to_value(&value)?,
            self.ttl,
            now,
        );
        match self.store.save_idempotency_record(&record, now).await? {
            None => Ok(Replayable::Fresh(value)),
            Some(winner) => {
                tracing::info!("concurrent request stored first, replaying its response");
                winner.replays(&hash, now)?;
                Ok(replay(winner))
            }
        }
    }
}

fn replay<T>(record: IdempotencyRecord) -> Replayable<T> {
    metrics::counter!(
        "idempotent_replays_total",
        "operation" => record.operation.as_str()
    )
    .increment(1);
    Replayable::Replayed {
        status: record.response_status,
        body: record.response_body,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;
    use store::InMemoryStore;

    use super::*;
    use crate::error::ApplicationError;

    fn guard() -> IdempotencyGuard<InMemoryStore> {
        IdempotencyGuard::new(InMemoryStore::new(), Duration::hours(1))
    }

    #[tokio::test]
    async fn same_request_runs_once() {
        let guard = guard();
        let key = IdempotencyKey::parse("abc").unwrap();
        let request = IdempotentRequest {
            key: &key,
            user_id: UserId::new(),
            operation: IdempotentOperation::Checkout,
        };
        let runs = AtomicU32::new(0);

        for _ in 0..2 {
            guard
                .run(Some(request), &json!({"a": 1}), 201, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"order": "ORD-1"}))
                })
                .await
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replay_returns_stored_status_and_body() {
        let guard = guard();
        let key = IdempotencyKey::parse("abc").unwrap();
        let request = IdempotentRequest {
            key: &key,
            user_id: UserId::new(),
            operation: IdempotentOperation::SubmitReceipt,
        };

        let first = guard
            .run(Some(request), &json!({}), 201, || async { Ok(json!({"n": 1})) })
            .await
            .unwrap();
        assert!(!first.is_replayed());

        let second = guard
            .run(Some(request), &json!({}), 201, || async { Ok(json!({"n": 2})) })
            .await
            .unwrap();
        assert_eq!(
            second,
            Replayable::Replayed {
                status: 201,
                body: json!({"n": 1})
            }
        );
    }

    #[tokio::test]
    async fn different_payload_with_same_key_is_rejected() {
        let guard = guard();
        let key = IdempotencyKey::parse("abc").unwrap();
        let request = IdempotentRequest {
            key: &key,
            user_id: UserId::new(),
            operation: IdempotentOperation::SubmitReceipt,
        };

        guard
            .run(Some(request), &json!({"amount": 1}), 201, || async { Ok(1) })
            .await
            .unwrap();
        let err = guard
            .run(Some(request), &json!({"amount": 2}), 201, || async { Ok(2) })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::IdempotencyMismatch);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_user() {
        let guard = guard();
        let key = IdempotencyKey::parse("abc").unwrap();
        let runs = AtomicU32::new(0);

        for user_id in [UserId::new(), UserId::new()] {
            let request = IdempotentRequest {
                key: &key,
                user_id,
                operation: IdempotentOperation::Checkout,
            };
            guard
                .run(Some(request), &json!({}), 201, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_run_stores_nothing() {
        let guard = guard();
        let key = IdempotencyKey::parse("abc").unwrap();
        let request = IdempotentRequest {
            key: &key,
            user_id: UserId::new(),
            operation: IdempotentOperation::Checkout,
        };

        let failed: Result<Replayable<()>> = guard
            .run(Some(request), &json!({}), 201, || async {
                Err(ApplicationError::Validation("nope".to_string()))
            })
            .await;
        assert!(failed.is_err());

        let retried = guard
            .run(Some(request), &json!({}), 201, || async { Ok(()) })
            .await
            .unwrap();
        assert!(!retried.is_replayed());
    }
}
