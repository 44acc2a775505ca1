//! The caller's shopping cart.

use std::sync::Arc;

use application::services::CartView;
use axum::Json;
use axum::extract::State;
use common::CourseId;
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, AuthUser};

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub course_id: CourseId,
}

/// GET /cart
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.services.cart.get_cart(&actor).await?))
}

/// POST /cart/items
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id, course_id = %req.course_id))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(
        state.services.cart.add_to_cart(&actor, req.course_id).await?,
    ))
}

/// DELETE /cart/items/{course_id}
#[tracing::instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiPath(course_id): ApiPath<CourseId>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(
        state.services.cart.remove_from_cart(&actor, course_id).await?,
    ))
}

/// DELETE /cart
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.services.cart.clear_cart(&actor).await?))
}
