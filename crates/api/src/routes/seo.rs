//! Redirect management, page metadata and the sitemap.

use std::sync::Arc;

use application::services::{NewRedirect, render_sitemap};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use domain::seo::{ResolvedSeo, SlugRedirect};
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{AdminUser, ApiJson, ApiQuery};
use crate::response;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

/// GET /redirects/resolve?path=: 301/302 to the final target, 404 when
/// nothing redirects from `path`.
#[tracing::instrument(skip(state))]
pub async fn resolve<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> Result<Response, ApiError> {
    match state.services.seo.resolve_redirect(&query.path).await? {
        Some(target) => Ok(response::redirect(target)),
        None => Err(application::ApplicationError::not_found("redirect", &query.path).into()),
    }
}

/// POST /admin/redirects
#[tracing::instrument(skip_all, fields(admin_id = %admin.user_id))]
pub async fn add_redirect<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<NewRedirect>,
) -> Result<(StatusCode, Json<SlugRedirect>), ApiError> {
    let redirect = state.services.seo.add_redirect(&admin, req).await?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

/// GET /admin/redirects
#[tracing::instrument(skip_all)]
pub async fn list_redirects<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Vec<SlugRedirect>>, ApiError> {
    Ok(Json(state.services.seo.list_redirects(&admin).await?))
}

/// GET /seo?path=
#[tracing::instrument(skip(state))]
pub async fn metadata<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> Result<Json<ResolvedSeo>, ApiError> {
    Ok(Json(state.services.seo.resolve_seo(&query.path).await?))
}

/// GET /sitemap.xml
#[tracing::instrument(skip_all)]
pub async fn sitemap<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Response, ApiError> {
    let entries = state.services.seo.sitemap().await?;
    let xml = render_sitemap(&entries);
    Ok(([(CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response())
}
