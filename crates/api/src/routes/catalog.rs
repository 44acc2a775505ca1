//! Public catalog: the category tree and published courses.

use std::sync::Arc;

use application::services::CourseFilter;
use axum::Json;
use axum::extract::State;
use axum::response::Response;
use common::{Page, PageRequest, UserId};
use domain::catalog::{CategoryNode, Course, CourseLevel};
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery, OptionalAuthUser};
use crate::response;

#[derive(Debug, Default, Deserialize)]
pub struct CourseListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub level: Option<CourseLevel>,
    pub instructor: Option<UserId>,
    #[serde(default)]
    pub include_unpublished: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CourseListQuery {
    fn into_parts(self) -> (CourseFilter, PageRequest) {
        let page = PageRequest::from_query(self.page, self.per_page);
        let filter = CourseFilter {
            category: self.category,
            search: self.search,
            level: self.level,
            instructor: self.instructor,
            include_unpublished: self.include_unpublished,
        };
        (filter, page)
    }
}

/// GET /categories
#[tracing::instrument(skip_all)]
pub async fn tree<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<CategoryNode>>, ApiError> {
    Ok(Json(state.services.catalog.category_tree().await?))
}

/// GET /categories/{slug}
#[tracing::instrument(skip(state))]
pub async fn category<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Response, ApiError> {
    let found = state.services.catalog.get_category_by_slug(&slug).await?;
    Ok(response::lookup(found))
}

/// GET /courses
#[tracing::instrument(skip_all)]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    OptionalAuthUser(actor): OptionalAuthUser,
    ApiQuery(query): ApiQuery<CourseListQuery>,
) -> Result<Json<Page<Course>>, ApiError> {
    let (filter, page) = query.into_parts();
    let courses = state
        .services
        .catalog
        .list_courses(actor.as_ref(), filter, page)
        .await?;
    Ok(Json(courses))
}

/// GET /courses/{slug}: the course page with curriculum and schedules.
#[tracing::instrument(skip(state))]
pub async fn course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Response, ApiError> {
    let found = state.services.catalog.course_detail(&slug).await?;
    Ok(response::lookup(found))
}
