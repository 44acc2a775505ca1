//! PostgreSQL back end.
//!
//! Multi-row writes run in one transaction. Guarded status updates use
//! `UPDATE ... WHERE status = $expected` and treat zero affected rows as a
//! concurrency conflict.

mod blog;
mod catalog;
mod shopping;

use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, Page, PageRequest, RedirectId, UserId};
use domain::identity::{Email, Role, User};
use domain::payments::{IdempotencyKey, IdempotencyRecord, IdempotentOperation};
use domain::seo::{RedirectStatus, SlugRedirect};
use domain::slug::Slug;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{IdempotencyRepository, RedirectRepository, Result, StoreError, UserRepository};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool of at most `max_connections` connections.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the embedded migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps unique violations to [`StoreError::UniqueViolation`] by index name.
pub(super) fn db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
        && let Some(constraint) = db_err.constraint()
    {
        return StoreError::unique(constraint);
    }
    StoreError::Database(err)
}

/// Reports a guarded update that matched no row.
pub(super) fn conflict(entity: &'static str, id: impl Display, expected: impl Display) -> StoreError {
    tracing::warn!(entity, %id, %expected, "Guarded update lost a race");
    metrics::counter!("store_concurrency_conflicts_total", "entity" => entity).increment(1);
    StoreError::conflict(entity, id, expected)
}

fn corrupt<E: Display>(column: &'static str) -> impl FnOnce(E) -> StoreError {
    move |err| StoreError::Corrupt(format!("{column}: {err}"))
}

/// Decodes a text column through `FromStr`.
pub(super) fn text<T>(row: &PgRow, column: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(corrupt(column))
}

pub(super) fn opt_text<T>(row: &PgRow, column: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|r| r.parse().map_err(corrupt(column))).transpose()
}

pub(super) fn slug(row: &PgRow, column: &'static str) -> Result<Slug> {
    let raw: String = row.try_get(column)?;
    Slug::parse(raw).map_err(corrupt(column))
}

pub(super) fn json<T: DeserializeOwned>(row: &PgRow, column: &'static str) -> Result<T> {
    let value: serde_json::Value = row.try_get(column)?;
    Ok(serde_json::from_value(value)?)
}

pub(super) fn money(row: &PgRow, column: &'static str) -> Result<Money> {
    Ok(Money::from_cents(row.try_get(column)?))
}

pub(super) fn unsigned(row: &PgRow, column: &'static str) -> Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(corrupt(column))
}

pub(super) fn id_column(row: &PgRow, column: &'static str) -> Result<Uuid> {
    Ok(row.try_get(column)?)
}

pub(super) fn opt_id_column(row: &PgRow, column: &'static str) -> Result<Option<Uuid>> {
    Ok(row.try_get(column)?)
}

pub(super) fn page_of<T>(request: PageRequest, items: Vec<T>, total: i64) -> Page<T> {
    Page {
        items,
        page: request.page,
        per_page: request.per_page,
        total: u64::try_from(total).unwrap_or_default(),
    }
}

pub(super) fn limit_offset(request: PageRequest) -> (i64, i64) {
    (request.limit() as i64, request.offset() as i64)
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let email: String = row.try_get("email")?;
    let roles: Vec<String> = row.try_get("roles")?;
    let roles = roles
        .iter()
        .map(|r| r.parse::<Role>().map_err(corrupt("roles")))
        .collect::<Result<_>>()?;

    Ok(User {
        id: UserId::from_uuid(id_column(row, "id")?),
        email: Email::parse(&email).map_err(corrupt("email"))?,
        display_name: row.try_get("display_name")?,
        password_hash: row.try_get("password_hash")?,
        roles,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn idempotency_from_row(row: &PgRow) -> Result<IdempotencyRecord> {
    let key: String = row.try_get("key")?;
    let status: i32 = row.try_get("response_status")?;
    Ok(IdempotencyRecord {
        key: IdempotencyKey::parse(&key).map_err(corrupt("key"))?,
        user_id: UserId::from_uuid(id_column(row, "user_id")?),
        operation: text(row, "operation")?,
        request_hash: row.try_get("request_hash")?,
        response_status: u16::try_from(status).map_err(corrupt("response_status"))?,
        response_body: row.try_get("response_body")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn redirect_from_row(row: &PgRow) -> Result<SlugRedirect> {
    let code: i32 = row.try_get("status_code")?;
    let code = u16::try_from(code).map_err(corrupt("status_code"))?;
    Ok(SlugRedirect {
        id: RedirectId::from_uuid(id_column(row, "id")?),
        from_path: row.try_get("from_path")?,
        to_path: row.try_get("to_path")?,
        status: RedirectStatus::from_code(code).map_err(corrupt("status_code"))?,
        created_at: row.try_get("created_at")?,
    })
}

fn role_names(user: &User) -> Vec<String> {
    user.roles.iter().map(|r| r.as_str().to_string()).collect()
}

const USER_COLUMNS: &str =
    "id, email, display_name, password_hash, roles, is_active, created_at, updated_at";

#[async_trait]
impl UserRepository for PostgresStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, password_hash, roles, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.email.as_str())
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(role_names(user))
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, display_name = $3, password_hash = $4, roles = $5,
                is_active = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.email.as_str())
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(role_names(user))
        .bind(user.is_active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user.id));
        }
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl IdempotencyRepository for PostgresStore {
    async fn find_idempotency_record(
        &self,
        key: &IdempotencyKey,
        user_id: UserId,
        operation: IdempotentOperation,
    ) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT key, user_id, operation, request_hash, response_status, response_body,
                   created_at, expires_at
            FROM idempotency_records
            WHERE key = $1 AND user_id = $2 AND operation = $3
            "#,
        )
        .bind(key.as_str())
        .bind(user_id.as_uuid())
        .bind(operation.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(idempotency_from_row).transpose()
    }

    async fn save_idempotency_record(
        &self,
        record: &IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>> {
        // Only an expired row may be overwritten; a live one is left alone
        // and returned to the caller.
        let stored = sqlx::query(
            r#"
            INSERT INTO idempotency_records
                (key, user_id, operation, request_hash, response_status, response_body,
                 created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ON CONSTRAINT idempotency_records_key DO UPDATE
            SET request_hash = EXCLUDED.request_hash,
                response_status = EXCLUDED.response_status,
                response_body = EXCLUDED.response_body,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency_records.expires_at <= $9
            RETURNING key
            "#,
        )
        .bind(record.key.as_str())
        .bind(record.user_id.as_uuid())
        .bind(record.operation.as_str())
        .bind(&record.request_hash)
        .bind(i32::from(record.response_status))
        .bind(&record.response_body)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if stored.is_some() {
            return Ok(None);
        }
        self.find_idempotency_record(&record.key, record.user_id, record.operation)
            .await
    }

    async fn purge_expired_idempotency_records(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RedirectRepository for PostgresStore {
    async fn find_redirect(&self, from_path: &str) -> Result<Option<SlugRedirect>> {
        let row = sqlx::query(
            "SELECT id, from_path, to_path, status_code, created_at FROM slug_redirects WHERE from_path = $1",
        )
        .bind(from_path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(redirect_from_row).transpose()
    }

    async fn save_redirect(&self, redirect: &SlugRedirect) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM slug_redirects WHERE from_path = $1")
            .bind(&redirect.to_path)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE slug_redirects SET to_path = $2 WHERE to_path = $1")
            .bind(&redirect.from_path)
            .bind(&redirect.to_path)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO slug_redirects (id, from_path, to_path, status_code, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT slug_redirects_from_path_key DO UPDATE
            SET to_path = EXCLUDED.to_path,
                status_code = EXCLUDED.status_code,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(redirect.id.as_uuid())
        .bind(&redirect.from_path)
        .bind(&redirect.to_path)
        .bind(i32::from(redirect.status.code()))
        .bind(redirect.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_redirects(&self) -> Result<Vec<SlugRedirect>> {
        let rows = sqlx::query(
            "SELECT id, from_path, to_path, status_code, created_at FROM slug_redirects ORDER BY from_path",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(redirect_from_row).collect()
    }
}
