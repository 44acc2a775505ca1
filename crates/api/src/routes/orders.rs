//! Checkout, the buyer's orders and transfer receipts.

use std::sync::Arc;

use application::services::OrderView;
use axum::Json;
use axum::extract::State;
use axum::response::Response;
use common::{OrderId, Page};
use domain::payments::{ManualPaymentRequest, ReceiptDetails};
use domain::shopping::Order;
use store::Store;

use super::{AppState, PageQuery};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, AuthUser, IdempotencyHeader};
use crate::response;

/// POST /checkout: places an order for the cart. Honors `Idempotency-Key`.
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn checkout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    idempotency: IdempotencyHeader,
) -> Result<Response, ApiError> {
    let result = state
        .services
        .checkout
        .checkout(&actor, idempotency.key())
        .await?;
    Ok(response::replayable(result))
}

/// GET /orders
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Json<Page<Order>>, ApiError> {
    let orders = state
        .services
        .checkout
        .list_orders(&actor, page.request())
        .await?;
    Ok(Json(orders))
}

/// GET /orders/{id}: the order and, while it awaits payment, the transfer
/// instructions.
#[tracing::instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.services.checkout.get_order(&actor, id).await?))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.services.checkout.cancel_order(&actor, id).await?))
}

/// POST /orders/{id}/receipt: reports a bank transfer. Honors
/// `Idempotency-Key`.
#[tracing::instrument(skip(state, actor, idempotency, receipt), fields(user_id = %actor.user_id))]
pub async fn submit_receipt<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
    idempotency: IdempotencyHeader,
    ApiJson(receipt): ApiJson<ReceiptDetails>,
) -> Result<Response, ApiError> {
    let result = state
        .services
        .payments
        .submit_receipt(&actor, id, receipt, idempotency.key())
        .await?;
    Ok(response::replayable(result))
}

/// GET /orders/{id}/payment-requests
#[tracing::instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn payment_requests<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Vec<ManualPaymentRequest>>, ApiError> {
    let requests = state
        .services
        .payments
        .list_requests_for_order(&actor, id)
        .await?;
    Ok(Json(requests))
}
