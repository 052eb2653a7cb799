use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;
use tracing::error;

use crate::error::{AppError, TrawlError};
use crate::models::{Course, CourseKey};
use crate::state::AppState;
use crate::sync::{TracingReporter, TrawlSummary};
use crate::text::normalize_term;

#[derive(Deserialize)]
struct SearchParams {
    semester: Option<String>,
    query: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    skip_related: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/search/courses", get(search_courses))
        .route("/api/courses/{term}/{subject}/{crse_id}", get(get_course))
        .route("/api/trawl/{term}", post(trawl_term))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn search_courses(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let (Some(semester), Some(query)) = (params.semester, params.query) else {
        return Err(AppError::BadRequest(
            "Provide semester and query parameters with this route.".to_string(),
        ));
    };
    let limit = params
        .limit
        .unwrap_or(state.search.default_limit)
        .min(state.search.max_limit);

    let courses = state
        .search_service()
        .search_with_timeout(state.search.timeout, &semester, &query, limit, params.skip_related)
        .await
        .map_err(|e| match e {
            AppError::BadRequest(_) | AppError::Timeout => e,
            other => {
                error!("course search for {:?} in {} failed: {}", query, semester, other);
                AppError::SearchFailed
            }
        })?;

    Ok(Json(courses))
}

async fn get_course(
    State(state): State<AppState>,
    Path((term, subject, crse_id)): Path<(String, String, i64)>,
) -> Result<Json<Course>, AppError> {
    let key = CourseKey::new(subject.trim().to_ascii_uppercase(), crse_id);
    let course = state
        .store
        .find_course(&normalize_term(&term), &key)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(course))
}

async fn trawl_term(
    State(state): State<AppState>,
    Path(term): Path<String>,
) -> Result<Json<TrawlSummary>, TrawlError> {
    // The run lives in its own task so a dropped request cannot cancel it
    // halfway through the apply phase.
    let service = state.trawl_service();
    let run_term = term.clone();
    let run = tokio::spawn(async move {
        service
            .try_reconcile_with_progress(&run_term, &TracingReporter)
            .await
    });

    let summary = run.await.map_err(|e| {
        error!("reconciliation task for {} failed: {}", term, e);
        TrawlError::Interrupted(normalize_term(&term))
    })??;
    Ok(Json(summary))
}
