//! Course authoring for instructors. Ownership is checked by the catalog
//! service; admins may edit any course.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{CourseId, ScheduleId, SectionId, SessionId};
use domain::catalog::{Course, CourseDetails, CourseSchedule, Curriculum, ScheduleDetails, SessionDetails};
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, InstructorUser};

#[derive(Deserialize)]
pub struct SectionRequest {
    pub title: String,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    /// 1-based target position.
    pub position: u32,
}

/// POST /instructor/courses
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn create_course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiJson(details): ApiJson<CourseDetails>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let course = state.services.catalog.create_course(&actor, details).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /instructor/courses/{id}: any status, for editing.
#[tracing::instrument(skip(state, actor))]
pub async fn get_course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.services.catalog.get_course(&actor, id).await?))
}

/// PUT /instructor/courses/{id}
#[tracing::instrument(skip(state, actor, details))]
pub async fn update_course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
    ApiJson(details): ApiJson<CourseDetails>,
) -> Result<Json<Course>, ApiError> {
    let course = state.services.catalog.update_course(&actor, id, details).await?;
    Ok(Json(course))
}

/// POST /instructor/courses/{id}/publish
#[tracing::instrument(skip(state, actor))]
pub async fn publish_course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.services.catalog.publish_course(&actor, id).await?))
}

/// POST /instructor/courses/{id}/archive
#[tracing::instrument(skip(state, actor))]
pub async fn archive_course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.services.catalog.archive_course(&actor, id).await?))
}

/// DELETE /instructor/courses/{id}
#[tracing::instrument(skip(state, actor))]
pub async fn delete_course<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<StatusCode, ApiError> {
    state.services.catalog.delete_course(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /instructor/courses/{id}/curriculum
#[tracing::instrument(skip(state, actor))]
pub async fn curriculum<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
) -> Result<Json<Curriculum>, ApiError> {
    Ok(Json(state.services.catalog.curriculum(&actor, id).await?))
}

/// POST /instructor/courses/{id}/sections
#[tracing::instrument(skip(state, actor, req))]
pub async fn add_section<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
    ApiJson(req): ApiJson<SectionRequest>,
) -> Result<(StatusCode, Json<Curriculum>), ApiError> {
    let curriculum = state
        .services
        .catalog
        .add_section(&actor, id, &req.title)
        .await?;
    Ok((StatusCode::CREATED, Json(curriculum)))
}

/// PUT /instructor/sections/{id}
#[tracing::instrument(skip(state, actor, req))]
pub async fn rename_section<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<SectionId>,
    ApiJson(req): ApiJson<SectionRequest>,
) -> Result<Json<Curriculum>, ApiError> {
    let curriculum = state
        .services
        .catalog
        .rename_section(&actor, id, &req.title)
        .await?;
    Ok(Json(curriculum))
}

/// POST /instructor/sections/{id}/move
#[tracing::instrument(skip(state, actor, req))]
pub async fn move_section<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<SectionId>,
    ApiJson(req): ApiJson<MoveRequest>,
) -> Result<Json<Curriculum>, ApiError> {
    let curriculum = state
        .services
        .catalog
        .move_section(&actor, id, req.position)
        .await?;
    Ok(Json(curriculum))
}

/// DELETE /instructor/sections/{id}
#[tracing::instrument(skip(state, actor))]
pub async fn remove_section<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<SectionId>,
) -> Result<Json<Curriculum>, ApiError> {
    Ok(Json(state.services.catalog.remove_section(&actor, id).await?))
}

/// POST /instructor/sections/{id}/sessions
#[tracing::instrument(skip(state, actor, details))]
pub async fn add_session<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<SectionId>,
    ApiJson(details): ApiJson<SessionDetails>,
) -> Result<(StatusCode, Json<Curriculum>), ApiError> {
    let curriculum = state.services.catalog.add_session(&actor, id, details).await?;
    Ok((StatusCode::CREATED, Json(curriculum)))
}

/// POST /instructor/sessions/{id}/move
#[tracing::instrument(skip(state, actor, req))]
pub async fn move_session<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<SessionId>,
    ApiJson(req): ApiJson<MoveRequest>,
) -> Result<Json<Curriculum>, ApiError> {
    let curriculum = state
        .services
        .catalog
        .move_session(&actor, id, req.position)
        .await?;
    Ok(Json(curriculum))
}

/// DELETE /instructor/sessions/{id}
#[tracing::instrument(skip(state, actor))]
pub async fn remove_session<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<SessionId>,
) -> Result<Json<Curriculum>, ApiError> {
    Ok(Json(state.services.catalog.remove_session(&actor, id).await?))
}

/// POST /instructor/courses/{id}/schedules
#[tracing::instrument(skip(state, actor, details))]
pub async fn add_schedule<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<CourseId>,
    ApiJson(details): ApiJson<ScheduleDetails>,
) -> Result<(StatusCode, Json<CourseSchedule>), ApiError> {
    let schedule = state.services.catalog.add_schedule(&actor, id, details).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// DELETE /instructor/schedules/{id}
#[tracing::instrument(skip(state, actor))]
pub async fn remove_schedule<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    InstructorUser(actor): InstructorUser,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<StatusCode, ApiError> {
    state.services.catalog.remove_schedule(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
