//! Public blog reading and admin post management.

use std::sync::Arc;

use application::services::{PostFilter, PostView};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use common::{Page, PageRequest, PostId};
use domain::blog::{BlogCategory, BlogCategoryDetails, Post, PostDetails, Tag};
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{AdminUser, ApiJson, ApiPath, ApiQuery};
use crate::response;

#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /blog/posts
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<PostListQuery>,
) -> Result<Json<Page<PostView>>, ApiError> {
    let page = PageRequest::from_query(query.page, query.per_page);
    let filter = PostFilter {
        category: query.category,
        tag: query.tag,
        search: query.search,
    };
    Ok(Json(state.services.blog.list_posts(filter, page).await?))
}

/// GET /blog/posts/{slug}: old slugs redirect to the current one.
#[tracing::instrument(skip(state))]
pub async fn post<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Response, ApiError> {
    let found = state.services.blog.get_post_by_slug(&slug).await?;
    Ok(response::lookup(found))
}

/// GET /blog/categories
pub async fn categories<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<BlogCategory>>, ApiError> {
    Ok(Json(state.services.blog.list_blog_categories().await?))
}

/// GET /blog/tags
pub async fn tags<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.services.blog.list_tags().await?))
}

/// POST /admin/blog/categories
#[tracing::instrument(skip_all, fields(admin_id = %admin.user_id))]
pub async fn create_category<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiJson(details): ApiJson<BlogCategoryDetails>,
) -> Result<(StatusCode, Json<BlogCategory>), ApiError> {
    let category = state
        .services
        .blog
        .create_blog_category(&admin, details)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /admin/blog/posts/{id}: drafts included.
#[tracing::instrument(skip(state, admin))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<PostId>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.services.blog.get_post(&admin, id).await?))
}

/// POST /admin/blog/posts
#[tracing::instrument(skip_all, fields(admin_id = %admin.user_id))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiJson(details): ApiJson<PostDetails>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let post = state.services.blog.create_post(&admin, details).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /admin/blog/posts/{id}
#[tracing::instrument(skip(state, admin, details))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<PostId>,
    ApiJson(details): ApiJson<PostDetails>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.services.blog.update_post(&admin, id, details).await?))
}

/// POST /admin/blog/posts/{id}/publish
#[tracing::instrument(skip(state, admin))]
pub async fn publish<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<PostId>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.services.blog.publish_post(&admin, id).await?))
}

/// POST /admin/blog/posts/{id}/unpublish
#[tracing::instrument(skip(state, admin))]
pub async fn unpublish<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<PostId>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.services.blog.unpublish_post(&admin, id).await?))
}

/// DELETE /admin/blog/posts/{id}
#[tracing::instrument(skip(state, admin))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<PostId>,
) -> Result<StatusCode, ApiError> {
    state.services.blog.delete_post(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
