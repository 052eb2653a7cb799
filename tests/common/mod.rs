#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chequerd::db::{CourseQuery, CourseStore, SqliteCourseStore, connect_in_memory};
use chequerd::error::AppError;
use chequerd::models::{
    Course, CourseKey, CourseListing, Meeting, NewSemester, Professor, Section, SectionGroup,
    Semester,
};
use chequerd::roster::{Roster, RosterClient, Subject};
use chequerd::sync::{ProgressReporter, TrawlEvent};

pub async fn setup_store() -> SqliteCourseStore {
    let pool = connect_in_memory()
        .await
        .expect("Failed to create test db");
    SqliteCourseStore::new(pool)
}

pub fn listing(subject: &str, crse_id: i64, catalog_nbr: &str, title: &str) -> CourseListing {
    CourseListing {
        subject: subject.to_string(),
        crse_id,
        catalog_nbr: catalog_nbr.to_string(),
        title_long: title.to_string(),
        description: None,
        groups: vec![SectionGroup {
            units_min: 3.0,
            units_max: 3.0,
            components_required: vec!["LEC".to_string()],
            sections: vec![Section {
                class_nbr: 10_000 + crse_id,
                section: "001".to_string(),
                component: "LEC".to_string(),
                campus: Some("MAIN".to_string()),
                location: Some("ITH".to_string()),
                meetings: vec![Meeting {
                    pattern: Some("MWF".to_string()),
                    time_start: Some("10:10AM".to_string()),
                    time_end: Some("11:00AM".to_string()),
                    start_date: Some("01/22/2024".to_string()),
                    end_date: Some("05/06/2024".to_string()),
                    facility: Some("Gates Hall G01".to_string()),
                    professors: vec![Professor {
                        netid: format!("p{}", crse_id),
                        first_name: "Pat".to_string(),
                        last_name: "Smith".to_string(),
                    }],
                }],
            }],
        }],
    }
}

pub fn subject(code: &str) -> Subject {
    Subject {
        value: code.to_string(),
        descr: Some(format!("{} department", code)),
        descrformal: None,
    }
}

/// In-memory roster whose terms, subjects and courses tests can change
/// between runs.
#[derive(Default)]
pub struct FakeRoster {
    rosters: Mutex<Vec<Roster>>,
    subjects: Mutex<Vec<Subject>>,
    courses: Mutex<HashMap<String, Vec<CourseListing>>>,
    failing_subjects: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    pub course_requests: AtomicUsize,
    pub peak_requests: AtomicUsize,
}

impl FakeRoster {
    pub fn new(term: &str) -> Self {
        let roster = Self::default();
        roster.rosters.lock().unwrap().push(Roster {
            slug: term.to_string(),
            descr: format!("Semester {}", term),
        });
        roster
    }

    pub fn set_subjects(&self, codes: &[&str]) {
        *self.subjects.lock().unwrap() = codes.iter().map(|c| subject(c)).collect();
    }

    pub fn set_courses(&self, subject: &str, courses: Vec<CourseListing>) {
        self.courses
            .lock()
            .unwrap()
            .insert(subject.to_string(), courses);
    }

    /// Makes every course request take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn peak_requests(&self) -> usize {
        self.peak_requests.load(Ordering::SeqCst)
    }

    pub fn fail_subject(&self, subject: &str) {
        self.failing_subjects
            .lock()
            .unwrap()
            .insert(subject.to_string());
    }
}

#[async_trait]
impl RosterClient for FakeRoster {
    async fn get_roster(&self, term: &str) -> Result<Option<Roster>, AppError> {
        Ok(self
            .rosters
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.slug.eq_ignore_ascii_case(term))
            .cloned())
    }

    async fn get_subjects(&self, _term: &str) -> Result<Vec<Subject>, AppError> {
        Ok(self.subjects.lock().unwrap().clone())
    }

    async fn get_courses(
        &self,
        _term: &str,
        subject: &str,
    ) -> Result<Vec<CourseListing>, AppError> {
        self.course_requests.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_requests.fetch_max(current, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_subjects.lock().unwrap().contains(subject) {
            return Err(AppError::Remote(format!("{} is unavailable", subject)));
        }
        Ok(self
            .courses
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .unwrap_or_default())
    }
}

/// Wraps the SQLite store, counting course mutations and failing the ones
/// aimed at selected courses.
pub struct FaultyStore {
    inner: SqliteCourseStore,
    failing: Mutex<HashSet<CourseKey>>,
    in_flight: AtomicUsize,
    pub mutations: AtomicUsize,
    pub peak_writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: SqliteCourseStore) -> Self {
        Self {
            inner,
            failing: Mutex::default(),
            in_flight: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
            peak_writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_course(&self, key: CourseKey) {
        self.failing.lock().unwrap().insert(key);
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn peak_writes(&self) -> usize {
        self.peak_writes.load(Ordering::SeqCst)
    }

    /// Runs one mutation while counting how many overlap.
    async fn write<T>(&self, op: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_writes.fetch_max(current, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = op.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn check(&self, key: &CourseKey) -> Result<(), AppError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(key) {
            return Err(AppError::Conflict(format!("{} is locked", key)));
        }
        Ok(())
    }

    async fn key_of(&self, id: i64) -> Result<CourseKey, AppError> {
        let (subject, crse_id): (String, i64) =
            sqlx::query_as("SELECT subject, crse_id FROM courses WHERE id = ?")
                .bind(id)
                .fetch_one(self.inner.pool())
                .await?;
        Ok(CourseKey::new(subject, crse_id))
    }
}

#[async_trait]
impl CourseStore for FaultyStore {
    async fn find_courses(&self, query: &CourseQuery) -> Result<Vec<Course>, AppError> {
        self.inner.find_courses(query).await
    }

    async fn find_course(&self, term: &str, key: &CourseKey) -> Result<Option<Course>, AppError> {
        self.inner.find_course(term, key).await
    }

    async fn fetch_term_courses(&self, term: &str) -> Result<Vec<Course>, AppError> {
        self.inner.fetch_term_courses(term).await
    }

    async fn insert_course(&self, term: &str, listing: &CourseListing) -> Result<i64, AppError> {
        self.check(&listing.key())?;
        self.write(self.inner.insert_course(term, listing)).await
    }

    async fn update_course(&self, id: i64, listing: &CourseListing) -> Result<(), AppError> {
        self.check(&listing.key())?;
        self.write(self.inner.update_course(id, listing)).await
    }

    async fn delete_course(&self, id: i64) -> Result<(), AppError> {
        let key = self.key_of(id).await?;
        self.check(&key)?;
        self.write(self.inner.delete_course(id)).await
    }

    async fn find_semester(&self, slug: &str) -> Result<Option<Semester>, AppError> {
        self.inner.find_semester(slug).await
    }

    async fn insert_semester(&self, semester: &NewSemester) -> Result<Semester, AppError> {
        self.inner.insert_semester(semester).await
    }

    async fn update_semester_subjects(
        &self,
        slug: &str,
        subject_list: &str,
    ) -> Result<Semester, AppError> {
        self.inner.update_semester_subjects(slug, subject_list).await
    }
}

/// Records a compact description of every event.
#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: TrawlEvent<'_>) {
        let line = match event {
            TrawlEvent::Analyzed { current, total } => format!("analyzed {}/{}", current, total),
            TrawlEvent::Applied {
                phase,
                current,
                total,
            } => format!("{} {}/{}", phase, current, total),
            TrawlEvent::ItemFailed { error } => format!("failed {}", error.course),
            TrawlEvent::RunCompleted { .. } => "completed".to_string(),
            TrawlEvent::RunFailed { .. } => "failed".to_string(),
            other => format!("{:?}", other),
        };
        self.events.lock().unwrap().push(line);
    }
}

pub fn sorted_keys(courses: &[Course]) -> Vec<CourseKey> {
    let mut keys: Vec<CourseKey> = courses.iter().map(Course::key).collect();
    keys.sort_by(|a, b| (&a.subject, a.crse_id).cmp(&(&b.subject, b.crse_id)));
    keys
}
