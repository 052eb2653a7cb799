use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A locally stored term.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Semester {
    pub id: i64,
    pub slug: String,
    pub descr: String,
    /// Raw subject list from the roster, stored as JSON text.
    pub subject_list: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSemester {
    pub slug: String,
    pub descr: String,
}
