//! In-memory store.
//!
//! Holds every table behind one lock and emulates the unique and filtered
//! unique indexes of the PostgreSQL schema, so services behave the same on
//! both back ends.

mod blog;
mod catalog;
mod shopping;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    BlogCategoryId, CartId, CategoryId, CourseId, ManualPaymentRequestId, OrderId,
    PaymentAttemptId, PostId, ScheduleId, TagId, UserId,
};
use domain::blog::{BlogCategory, Post, PostSlugHistory, Tag};
use domain::catalog::{Category, Course, CourseEnrollment, CourseSchedule, Curriculum};
use domain::identity::{Email, User};
use domain::payments::{
    IdempotencyKey, IdempotencyRecord, IdempotentOperation, ManualPaymentRequest,
    PaymentAuditEntry, Transaction,
};
use domain::seo::SlugRedirect;
use domain::shopping::{Cart, Order, PaymentAttempt};
use tokio::sync::RwLock;

use crate::{
    IdempotencyRepository, RedirectRepository, Result, StoreError, UserRepository, constraints,
};

type IdempotencyIndex = (String, UserId, IdempotentOperation);

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    categories: HashMap<CategoryId, Category>,
    courses: HashMap<CourseId, Course>,
    curricula: HashMap<CourseId, Curriculum>,
    schedules: HashMap<ScheduleId, CourseSchedule>,
    enrollments: Vec<CourseEnrollment>,
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    attempts: HashMap<PaymentAttemptId, PaymentAttempt>,
    requests: HashMap<ManualPaymentRequestId, ManualPaymentRequest>,
    transactions: Vec<Transaction>,
    audit_log: Vec<PaymentAuditEntry>,
    idempotency: HashMap<IdempotencyIndex, IdempotencyRecord>,
    blog_categories: HashMap<BlogCategoryId, BlogCategory>,
    tags: HashMap<TagId, Tag>,
    posts: HashMap<PostId, Post>,
    post_slug_history: Vec<PostSlugHistory>,
    redirects: HashMap<String, SlugRedirect>,
}

/// In-memory store for tests and local runs without a database.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every row.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }

    /// Number of payment audit entries, for tests.
    pub async fn audit_entry_count(&self) -> usize {
        self.tables.read().await.audit_log.len()
    }
}

fn idempotency_index(
    key: &IdempotencyKey,
    user_id: UserId,
    operation: IdempotentOperation,
) -> IdempotencyIndex {
    (key.as_str().to_string(), user_id, operation)
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::unique(constraints::USERS_EMAIL));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::unique(constraints::USERS_EMAIL));
        }
        match tables.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("user", user.id)),
        }
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| &u.email == email).cloned())
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryStore {
    async fn find_idempotency_record(
        &self,
        key: &IdempotencyKey,
        user_id: UserId,
        operation: IdempotentOperation,
    ) -> Result<Option<IdempotencyRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .idempotency
            .get(&idempotency_index(key, user_id, operation))
            .cloned())
    }

    async fn save_idempotency_record(
        &self,
        record: &IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>> {
        let mut tables = self.tables.write().await;
        let index = idempotency_index(&record.key, record.user_id, record.operation);

        if let Some(existing) = tables.idempotency.get(&index)
            && !existing.is_expired(now)
        {
            return Ok(Some(existing.clone()));
        }
        tables.idempotency.insert(index, record.clone());
        Ok(None)
    }

    async fn purge_expired_idempotency_records(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.idempotency.len();
        tables.idempotency.retain(|_, r| !r.is_expired(now));
        Ok((before - tables.idempotency.len()) as u64)
    }
}

#[async_trait]
impl RedirectRepository for InMemoryStore {
    async fn find_redirect(&self, from_path: &str) -> Result<Option<SlugRedirect>> {
        Ok(self.tables.read().await.redirects.get(from_path).cloned())
    }

    async fn save_redirect(&self, redirect: &SlugRedirect) -> Result<()> {
        let mut tables = self.tables.write().await;

        tables.redirects.remove(&redirect.to_path);
        for existing in tables.redirects.values_mut() {
            if existing.to_path == redirect.from_path {
                existing.to_path = redirect.to_path.clone();
            }
        }
        tables
            .redirects
            .insert(redirect.from_path.clone(), redirect.clone());
        Ok(())
    }

    async fn list_redirects(&self) -> Result<Vec<SlugRedirect>> {
        let tables = self.tables.read().await;
        let mut redirects: Vec<_> = tables.redirects.values().cloned().collect();
        redirects.sort_by(|a, b| a.from_path.cmp(&b.from_path));
        Ok(redirects)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use domain::seo::RedirectStatus;
    use serde_json::json;

    use super::*;

    fn user(email: &str) -> User {
        User::register(Email::parse(email).unwrap(), "Ada", "hash".to_string(), Utc::now()).unwrap()
    }

    fn redirect(from: &str, to: &str) -> SlugRedirect {
        SlugRedirect::new(from, to, RedirectStatus::Permanent, Utc::now()).unwrap()
    }

    fn record(hash: &str, ttl: Duration, now: DateTime<Utc>) -> IdempotencyRecord {
        IdempotencyRecord::new(
            IdempotencyKey::parse("key").unwrap(),
            UserId::from_uuid(uuid::Uuid::nil()),
            IdempotentOperation::Checkout,
            hash.to_string(),
            201,
            json!({}),
            ttl,
            now,
        )
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = InMemoryStore::new();
        store.insert_user(&user("ada@example.com")).await.unwrap();

        let err = store.insert_user(&user("ada@example.com")).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::USERS_EMAIL));
    }

    #[tokio::test]
    async fn redirect_chains_collapse() {
        let store = InMemoryStore::new();
        store.save_redirect(&redirect("/a", "/b")).await.unwrap();
        store.save_redirect(&redirect("/b", "/c")).await.unwrap();

        let a = store.find_redirect("/a").await.unwrap().unwrap();
        assert_eq!(a.to_path, "/c");
    }

    #[tokio::test]
    async fn reverse_redirect_is_removed() {
        let store = InMemoryStore::new();
        store.save_redirect(&redirect("/a", "/b")).await.unwrap();
        store.save_redirect(&redirect("/b", "/a")).await.unwrap();

        assert!(store.find_redirect("/a").await.unwrap().is_none());
        assert_eq!(
            store.find_redirect("/b").await.unwrap().unwrap().to_path,
            "/a"
        );
    }

    #[tokio::test]
    async fn live_idempotency_record_wins() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        assert!(
            store
                .save_idempotency_record(&record("first", Duration::hours(1), now), now)
                .await
                .unwrap()
                .is_none()
        );

        let winner = store
            .save_idempotency_record(&record("second", Duration::hours(1), now), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(winner.request_hash, "first");
    }

    #[tokio::test]
    async fn expired_idempotency_record_is_replaced_and_purged() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .save_idempotency_record(&record("old", Duration::seconds(1), now), now)
            .await
            .unwrap();

        let later = now + Duration::seconds(5);
        assert!(
            store
                .save_idempotency_record(&record("new", Duration::seconds(1), later), later)
                .await
                .unwrap()
                .is_none()
        );

        let purged = store
            .purge_expired_idempotency_records(later + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }
}
