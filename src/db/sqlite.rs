use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{CourseQuery, CourseStore, repository};
use crate::error::AppError;
use crate::models::{Course, CourseKey, CourseListing, NewSemester, Semester};

/// [`CourseStore`] backed by the SQLite repository functions.
#[derive(Clone)]
pub struct SqliteCourseStore {
    db: SqlitePool,
}

impl SqliteCourseStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

fn not_found(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::RowNotFound => AppError::NotFound,
        other => AppError::Database(other),
    }
}

#[async_trait]
impl CourseStore for SqliteCourseStore {
    async fn find_courses(&self, query: &CourseQuery) -> Result<Vec<Course>, AppError> {
        Ok(repository::find_courses(&self.db, query).await?)
    }

    async fn find_course(&self, term: &str, key: &CourseKey) -> Result<Option<Course>, AppError> {
        Ok(repository::find_course(&self.db, term, key).await?)
    }

    async fn fetch_term_courses(&self, term: &str) -> Result<Vec<Course>, AppError> {
        Ok(repository::fetch_term_courses(&self.db, term).await?)
    }

    async fn insert_course(&self, term: &str, listing: &CourseListing) -> Result<i64, AppError> {
        Ok(repository::insert_course(&self.db, term, listing).await?)
    }

    async fn update_course(&self, id: i64, listing: &CourseListing) -> Result<(), AppError> {
        repository::update_course(&self.db, id, listing)
            .await
            .map_err(not_found)
    }

    async fn delete_course(&self, id: i64) -> Result<(), AppError> {
        repository::delete_course(&self.db, id)
            .await
            .map_err(not_found)
    }

    async fn find_semester(&self, slug: &str) -> Result<Option<Semester>, AppError> {
        Ok(repository::find_semester(&self.db, slug).await?)
    }

    async fn insert_semester(&self, semester: &NewSemester) -> Result<Semester, AppError> {
        Ok(repository::insert_semester(&self.db, semester).await?)
    }

    async fn update_semester_subjects(
        &self,
        slug: &str,
        subject_list: &str,
    ) -> Result<Semester, AppError> {
        repository::update_semester_subjects(&self.db, slug, subject_list)
            .await
            .map_err(not_found)
    }
}
