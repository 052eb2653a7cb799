use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity of a course within a term.
///
/// Two records with the same key are the same course even if every other
/// attribute differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseKey {
    pub subject: String,
    pub crse_id: i64,
}

impl CourseKey {
    pub fn new(subject: impl Into<String>, crse_id: i64) -> Self {
        Self {
            subject: subject.into(),
            crse_id,
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.subject, self.crse_id)
    }
}

/// A persisted course record.
///
/// `groups` is only populated when related data was requested.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: i64,
    pub term: String,
    pub subject: String,
    pub crse_id: i64,
    pub catalog_nbr: String,
    pub title_long: String,
    pub description: Option<String>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<SectionGroup>,
}

impl Course {
    pub fn key(&self) -> CourseKey {
        CourseKey::new(self.subject.clone(), self.crse_id)
    }

    /// Deep comparison with a remote listing, ignoring storage ids.
    pub fn is_identical(&self, listing: &CourseListing) -> bool {
        self.catalog_nbr == listing.catalog_nbr
            && self.title_long == listing.title_long
            && self.description == listing.description
            && self.groups == listing.groups
    }
}

/// A course as published by the remote roster, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseListing {
    pub subject: String,
    pub crse_id: i64,
    pub catalog_nbr: String,
    pub title_long: String,
    pub description: Option<String>,
    pub groups: Vec<SectionGroup>,
}

impl CourseListing {
    pub fn key(&self) -> CourseKey {
        CourseKey::new(self.subject.clone(), self.crse_id)
    }
}

/// An enrollment group: the set of sections a student picks from together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionGroup {
    pub units_min: f64,
    pub units_max: f64,
    pub components_required: Vec<String>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub class_nbr: i64,
    pub section: String,
    pub component: String,
    pub campus: Option<String>,
    pub location: Option<String>,
    pub meetings: Vec<Meeting>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub pattern: Option<String>,
    pub time_start: Option<String>,
    pub time_end: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub facility: Option<String>,
    pub professors: Vec<Professor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professor {
    pub netid: String,
    pub first_name: String,
    pub last_name: String,
}
