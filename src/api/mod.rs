use axum::extract::{Path, Query};
use axum::routing::delete;
use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use tracing::error;

use crate::error::AppError;
use crate::models::{Course, CourseFilter};
use crate::services::{
    AssociationResolver, CascadeDeletionPlanner, CascadeError, CascadeReport, CascadeTarget,
    COURSES_COLLECTION, RelatedCounts, RelatedItemsCounter,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses", get(list_courses))
        .route("/courses/{id}", delete(delete_course))
        .route("/courses/{id}/related", get(count_related))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.query(COURSES_COLLECTION, &[], None, Some(1)).await?;
    Ok(StatusCode::OK)
}

async fn list_courses(
    State(state): State<AppState>,
    Query(filter): Query<CourseFilter>,
) -> Json<Vec<Course>> {
    let resolver = AssociationResolver::new(state.store.clone());
    let mut courses = resolver.resolve(&filter).await;
    if let Some(needle) = filter.query.as_deref() {
        courses.retain(|c| matches_text(c, needle));
    }
    Json(courses)
}

/// Free-text narrowing applied after structural filtering: case-insensitive
/// substring match over title, description, instructor, and tags.
fn matches_text(course: &Course, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    course.title.to_lowercase().contains(&needle)
        || course
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&needle))
        || course
            .instructor
            .as_deref()
            .is_some_and(|i| i.to_lowercase().contains(&needle))
        || course.tags.iter().any(|t| t.to_lowercase().contains(&needle))
}

async fn count_related(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RelatedCounts>, AppError> {
    if state.store.get(COURSES_COLLECTION, &id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let counter = RelatedItemsCounter::new(state.store.clone(), CascadeTarget::defaults());
    Ok(Json(counter.count_related(&id).await))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted_items: Option<CascadeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<DeleteResponse>) {
    let planner = CascadeDeletionPlanner::new(state.store.clone(), CascadeTarget::defaults());
    match planner.delete_cascade(&id).await {
        Ok(report) => (
            StatusCode::OK,
            Json(DeleteResponse {
                success: true,
                deleted_items: Some(report),
                error: None,
            }),
        ),
        Err(err @ CascadeError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(DeleteResponse {
                success: false,
                deleted_items: None,
                error: Some(err.to_string()),
            }),
        ),
        Err(err) => {
            error!("cascade delete of course {} failed: {}", id, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DeleteResponse {
                    success: false,
                    deleted_items: None,
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}
