use std::fmt;

use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::models::CourseKey;
use crate::sync::TrawlSummary;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Roster API error: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request timed out")]
    Timeout,

    #[error("An error occurred performing the course search.")]
    SearchFailed,

    #[error("Internal server error")]
    InternalServerError,
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Remote(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_body(status: StatusCode, message: String) -> Response {
    let body = Json(ErrorResponse {
        error: status.to_string(),
        message,
    });

    (status, body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Request timed out".to_string()),
            AppError::SearchFailed => (
                StatusCode::BAD_REQUEST,
                "An error occurred performing the course search.".to_string(),
            ),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::Remote(e) => {
                error!("roster api error: {}", e);
                (StatusCode::BAD_GATEWAY, "Roster API error".to_string())
            }
            AppError::Serialization(e) => {
                error!("serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        error_body(status, error_message)
    }
}

/// The sequential stages of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrawlStage {
    ValidateTerm,
    BootstrapSemester,
    EnumerateSubjects,
    FetchCourses,
    FetchSnapshot,
    ComputePlan,
    ApplyUpdates,
    ApplyDeletes,
    ApplyInserts,
}

impl fmt::Display for TrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrawlStage::ValidateTerm => "term validation",
            TrawlStage::BootstrapSemester => "semester bootstrap",
            TrawlStage::EnumerateSubjects => "subject enumeration",
            TrawlStage::FetchCourses => "remote course fetch",
            TrawlStage::FetchSnapshot => "database snapshot fetch",
            TrawlStage::ComputePlan => "course analysis",
            TrawlStage::ApplyUpdates => "course updates",
            TrawlStage::ApplyDeletes => "course deletes",
            TrawlStage::ApplyInserts => "course inserts",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    Update,
    Delete,
    Insert,
}

impl ApplyPhase {
    pub fn stage(self) -> TrawlStage {
        match self {
            ApplyPhase::Update => TrawlStage::ApplyUpdates,
            ApplyPhase::Delete => TrawlStage::ApplyDeletes,
            ApplyPhase::Insert => TrawlStage::ApplyInserts,
        }
    }
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyPhase::Update => "update",
            ApplyPhase::Delete => "delete",
            ApplyPhase::Insert => "insert",
        })
    }
}

/// A single insert, update or delete that failed during a run.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{phase} of course {course} failed: {message}")]
pub struct ApplyItemError {
    pub phase: ApplyPhase,
    pub course: CourseKey,
    pub message: String,
}

impl ApplyItemError {
    pub fn new(phase: ApplyPhase, course: CourseKey, err: &AppError) -> Self {
        Self {
            phase,
            course,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("{0} is not an available semester")]
    UnavailableTerm(String),

    #[error("no subjects are available for semester {0}")]
    NoSubjects(String),

    #[error("an error occurred retrieving courses for subject {subject}: {source}")]
    SubjectFetch {
        subject: String,
        #[source]
        source: AppError,
    },

    #[error("{} course operation(s) failed", .failures.len())]
    Apply {
        failures: Vec<ApplyItemError>,
        summary: TrawlSummary,
    },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: TrawlStage,
        #[source]
        source: AppError,
    },

    #[error("a reconciliation for {0} is already running")]
    InProgress(String),

    #[error("the reconciliation for {0} stopped unexpectedly")]
    Interrupted(String),
}

impl TrawlError {
    /// Wraps a collaborator failure with the stage it happened in.
    pub fn in_stage(stage: TrawlStage) -> impl FnOnce(AppError) -> TrawlError {
        move |source| TrawlError::Stage { stage, source }
    }

    /// The stage a run was in when it failed, if it got past locking.
    pub fn stage(&self) -> Option<TrawlStage> {
        match self {
            TrawlError::UnavailableTerm(_) => Some(TrawlStage::ValidateTerm),
            TrawlError::NoSubjects(_) => Some(TrawlStage::EnumerateSubjects),
            TrawlError::SubjectFetch { .. } => Some(TrawlStage::FetchCourses),
            TrawlError::Apply { failures, .. } => failures.first().map(|f| f.phase.stage()),
            TrawlError::Stage { stage, .. } => Some(*stage),
            TrawlError::InProgress(_) | TrawlError::Interrupted(_) => None,
        }
    }
}

impl IntoResponse for TrawlError {
    fn into_response(self) -> Response {
        let status = match &self {
            TrawlError::UnavailableTerm(_) | TrawlError::NoSubjects(_) => StatusCode::NOT_FOUND,
            TrawlError::InProgress(_) => StatusCode::CONFLICT,
            TrawlError::SubjectFetch { .. } => StatusCode::BAD_GATEWAY,
            TrawlError::Apply { .. }
            | TrawlError::Stage { .. }
            | TrawlError::Interrupted(_) => {
                error!("reconciliation failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        error_body(status, self.to_string())
    }
}
