//! Admin back office: categories, course restore, payment review, users and
//! manual enrollments.

use std::str::FromStr;
use std::sync::Arc;

use application::services::{PaymentReview, UserProfile};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{CategoryId, CourseId, ManualPaymentRequestId, OrderId, Page, UserId};
use domain::catalog::{Category, CategoryDetails, Course, CourseEnrollment};
use domain::identity::Role;
use domain::payments::{ManualPaymentRequest, PaymentAuditEntry, Transaction};
use serde::Deserialize;
use store::Store;

use super::{AppState, PageQuery};
use crate::error::ApiError;
use crate::extract::{AdminUser, ApiJson, ApiPath, ApiQuery};

#[derive(Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Deserialize)]
pub struct AdminEnrollRequest {
    pub course_id: CourseId,
    pub student_id: UserId,
}

fn parse_role(value: &str) -> Result<Role, ApiError> {
    Role::from_str(value).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// -- Categories --

/// POST /admin/categories
#[tracing::instrument(skip_all, fields(admin_id = %admin.user_id))]
pub async fn create_category<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiJson(details): ApiJson<CategoryDetails>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.services.catalog.create_category(&admin, details).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /admin/categories/{id}
#[tracing::instrument(skip(state, admin, details))]
pub async fn update_category<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(details): ApiJson<CategoryDetails>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .services
        .catalog
        .update_category(&admin, id, details)
        .await?;
    Ok(Json(category))
}

/// DELETE /admin/categories/{id}
#[tracing::instrument(skip(state, admin))]
pub async fn delete_category<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<StatusCode, ApiError> {
    state.services.catalog.delete_category(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/courses/{id}/restore
#[tracing::instrument(skip(state, admin))]
pub async fn restore_course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.services.catalog.restore_course(&admin, id).await?))
}

// -- Payments --

/// GET /admin/payments/pending
#[tracing::instrument(skip_all)]
pub async fn pending_payments<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Json<Page<ManualPaymentRequest>>, ApiError> {
    let requests = state
        .services
        .payments
        .list_pending(&admin, page.request())
        .await?;
    Ok(Json(requests))
}

/// GET /admin/payments/{id}
#[tracing::instrument(skip(state, admin))]
pub async fn payment_request<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<ManualPaymentRequestId>,
) -> Result<Json<ManualPaymentRequest>, ApiError> {
    Ok(Json(state.services.payments.get_request(&admin, id).await?))
}

/// POST /admin/payments/{id}/approve
#[tracing::instrument(skip(state, admin, req))]
pub async fn approve_payment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<ManualPaymentRequestId>,
    ApiJson(req): ApiJson<ApproveRequest>,
) -> Result<Json<PaymentReview>, ApiError> {
    let review = state.services.payments.approve(&admin, id, req.note).await?;
    Ok(Json(review))
}

/// POST /admin/payments/{id}/reject: the buyer gets a fresh attempt to pay.
#[tracing::instrument(skip(state, admin, req))]
pub async fn reject_payment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<ManualPaymentRequestId>,
    ApiJson(req): ApiJson<RejectRequest>,
) -> Result<Json<PaymentReview>, ApiError> {
    let review = state
        .services
        .payments
        .reject(&admin, id, &req.reason)
        .await?;
    Ok(Json(review))
}

/// GET /admin/orders/{id}/audit
#[tracing::instrument(skip(state, admin))]
pub async fn audit_trail<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Vec<PaymentAuditEntry>>, ApiError> {
    Ok(Json(state.services.payments.audit_trail(&admin, id).await?))
}

/// GET /admin/transactions
#[tracing::instrument(skip_all)]
pub async fn transactions<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Json<Page<Transaction>>, ApiError> {
    let transactions = state
        .services
        .payments
        .list_transactions(&admin, page.request())
        .await?;
    Ok(Json(transactions))
}

// -- Users --

/// GET /admin/users/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn user<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_admin): AdminUser,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.services.identity.get_user(id).await?))
}

/// POST /admin/users/{id}/roles
#[tracing::instrument(skip(state, admin, req))]
pub async fn grant_role<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let role = parse_role(&req.role)?;
    let profile = state.services.identity.grant_role(&admin, id, role).await?;
    Ok(Json(profile))
}

/// DELETE /admin/users/{id}/roles/{role}
#[tracing::instrument(skip(state, admin))]
pub async fn revoke_role<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath((id, role)): ApiPath<(UserId, String)>,
) -> Result<Json<UserProfile>, ApiError> {
    let role = parse_role(&role)?;
    let profile = state.services.identity.revoke_role(&admin, id, role).await?;
    Ok(Json(profile))
}

/// POST /admin/users/{id}/deactivate
#[tracing::instrument(skip(state, admin))]
pub async fn deactivate_user<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.services.identity.deactivate(&admin, id).await?))
}

/// POST /admin/enrollments
#[tracing::instrument(skip_all, fields(admin_id = %admin.user_id))]
pub async fn enroll<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<AdminEnrollRequest>,
) -> Result<(StatusCode, Json<CourseEnrollment>), ApiError> {
    let enrollment = state
        .services
        .catalog
        .admin_enroll(&admin, req.course_id, req.student_id)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}
