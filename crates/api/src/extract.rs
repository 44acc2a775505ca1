//! Request extractors: the calling user, JSON bodies, path and query
//! parameters and the `Idempotency-Key` header.

use std::sync::Arc;

use application::Actor;
use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use domain::payments::IdempotencyKey;
use serde::de::DeserializeOwned;
use store::Store;

use crate::error::ApiError;
use crate::routes::AppState;

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

fn bearer_token(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthenticated)?;
    Ok(Some(token))
}

/// A signed-in user. Rejects with 401 when the bearer token is missing,
/// invalid or belongs to a deactivated account.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(ApiError::Unauthenticated)?;
        let actor = state.services.identity.actor_for_token(token).await?;
        Ok(AuthUser(actor))
    }
}

/// Like [`AuthUser`] but anonymous requests pass through as `None`.
/// A token that is present must still be valid.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<Actor>);

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for OptionalAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => {
                let actor = state.services.identity.actor_for_token(token).await?;
                Ok(OptionalAuthUser(Some(actor)))
            }
            None => Ok(OptionalAuthUser(None)),
        }
    }
}

/// A signed-in admin; other users get 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Actor);

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        actor.require_admin()?;
        Ok(AdminUser(actor))
    }
}

/// A signed-in instructor (or admin).
#[derive(Debug, Clone)]
pub struct InstructorUser(pub Actor);

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for InstructorUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        actor.require_instructor()?;
        Ok(InstructorUser(actor))
    }
}

/// The optional `Idempotency-Key` header. A malformed key is a 400.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyHeader(pub Option<IdempotencyKey>);

impl IdempotencyHeader {
    pub fn key(&self) -> Option<&IdempotencyKey> {
        self.0.as_ref()
    }
}

impl<St: Send + Sync> FromRequestParts<St> for IdempotencyHeader {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IDEMPOTENCY_KEY) else {
            return Ok(IdempotencyHeader(None));
        };
        let value = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".to_string()))?;
        let key = IdempotencyKey::parse(value).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(IdempotencyHeader(Some(key)))
    }
}

/// JSON body whose rejection is reported as a 400 in the API's error shape.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, St> FromRequest<St> for ApiJson<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &St) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// Query string with the same error handling as [`ApiJson`].
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, St> FromRequestParts<St> for ApiQuery<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// Path parameters. A malformed id is a 400 with the usual JSON body.
#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

impl<T, St> FromRequestParts<St> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(ApiPath(value))
    }
}
