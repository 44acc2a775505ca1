//! Registration, login and the caller's own account.

use std::sync::Arc;

use application::services::{RegisterUser, Session, UserProfile};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::CourseId;
use domain::catalog::CourseEnrollment;
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, AuthUser};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct EnrollRequest {
    pub course_id: CourseId,
}

/// POST /auth/register
#[tracing::instrument(skip_all)]
pub async fn register<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<RegisterUser>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let profile = state.services.identity.register(req).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /auth/login
#[tracing::instrument(skip_all)]
pub async fn login<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .services
        .identity
        .authenticate(&req.email, &req.password)
        .await?;
    Ok(Json(session))
}

/// GET /auth/me
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn me<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.services.identity.get_user(actor.user_id).await?))
}

/// GET /me/enrollments
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn enrollments<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<CourseEnrollment>>, ApiError> {
    let enrollments = state.services.catalog.list_enrollments(actor.user_id).await?;
    Ok(Json(enrollments))
}

/// POST /me/enrollments: join a free course.
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn enroll_free<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiJson(req): ApiJson<EnrollRequest>,
) -> Result<(StatusCode, Json<CourseEnrollment>), ApiError> {
    let enrollment = state
        .services
        .catalog
        .enroll_free(&actor, req.course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}
