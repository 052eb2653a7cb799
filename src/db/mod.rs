pub mod repository;
pub mod sqlite;

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::AppError;
use crate::models::{Course, CourseKey, CourseListing, NewSemester, Semester};

pub use sqlite::SqliteCourseStore;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// A "column contains text" predicate used by course search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseFilter {
    Subject(String),
    CatalogNbr(String),
    Title(String),
    Description(String),
}

impl CourseFilter {
    pub fn column(&self) -> &'static str {
        match self {
            CourseFilter::Subject(_) => "subject",
            CourseFilter::CatalogNbr(_) => "catalog_nbr",
            CourseFilter::Title(_) => "title_long",
            CourseFilter::Description(_) => "description",
        }
    }

    pub fn needle(&self) -> &str {
        match self {
            CourseFilter::Subject(s)
            | CourseFilter::CatalogNbr(s)
            | CourseFilter::Title(s)
            | CourseFilter::Description(s) => s,
        }
    }
}

/// Conjunctive course query scoped to one term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseQuery {
    pub term: String,
    pub filters: Vec<CourseFilter>,
    pub exclude_ids: Vec<i64>,
    pub limit: usize,
    pub with_related: bool,
}

/// Persistence operations the search and trawl services depend on.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn find_courses(&self, query: &CourseQuery) -> Result<Vec<Course>, AppError>;

    async fn find_course(&self, term: &str, key: &CourseKey) -> Result<Option<Course>, AppError>;

    /// Every course of a term with sections, meetings and professors loaded.
    async fn fetch_term_courses(&self, term: &str) -> Result<Vec<Course>, AppError>;

    async fn insert_course(&self, term: &str, listing: &CourseListing) -> Result<i64, AppError>;

    /// Replaces scalar attributes and the whole section tree of a course.
    async fn update_course(&self, id: i64, listing: &CourseListing) -> Result<(), AppError>;

    async fn delete_course(&self, id: i64) -> Result<(), AppError>;

    async fn find_semester(&self, slug: &str) -> Result<Option<Semester>, AppError>;

    async fn insert_semester(&self, semester: &NewSemester) -> Result<Semester, AppError>;

    async fn update_semester_subjects(
        &self,
        slug: &str,
        subject_list: &str,
    ) -> Result<Semester, AppError>;
}

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Single-connection in-memory database with migrations applied.
///
/// The connection never expires, since dropping it drops the database.
pub async fn connect_in_memory() -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::Database(e.into()))?;

    Ok(pool)
}
