//! Reconciliation planning between the remote roster and stored courses.

pub mod progress;

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::models::{Course, CourseKey, CourseListing};

pub use progress::{ProgressReporter, SilentReporter, TracingReporter, TrawlEvent};

/// A remote listing paired with the stored record it replaces.
#[derive(Debug, Clone)]
pub struct UpdatePair {
    pub remote: CourseListing,
    pub existing: Course,
}

/// The insert, update and delete sets needed to bring a term in sync.
///
/// The three sets are disjoint by course identity.
#[derive(Debug, Default)]
pub struct ReconciliationPlan {
    pub inserts: Vec<CourseListing>,
    pub deletes: Vec<Course>,
    pub updates: Vec<UpdatePair>,
    pub unchanged: usize,
    /// Remote listings dropped because an earlier listing had the same key.
    pub duplicates: usize,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty() && self.updates.is_empty()
    }
}

/// Counts reported at the end of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrawlSummary {
    pub term: String,
    pub subjects: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl TrawlSummary {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }
}

pub fn compute_plan(remote: Vec<CourseListing>, persisted: Vec<Course>) -> ReconciliationPlan {
    compute_plan_with_progress(remote, persisted, 0, |_, _| {})
}

/// Diffs the remote listing against the stored snapshot.
///
/// Remote courses are scanned in input order. A remote course whose key
/// matches a stored record consumes that record: it becomes an update when
/// the two differ and is dropped when they are identical. Whatever remote
/// courses are left are inserts, whatever stored records are left are
/// deletes. `on_progress(current, total)` fires every `interval` scanned
/// courses; an interval of zero disables it.
pub fn compute_plan_with_progress<F>(
    remote: Vec<CourseListing>,
    persisted: Vec<Course>,
    interval: usize,
    mut on_progress: F,
) -> ReconciliationPlan
where
    F: FnMut(usize, usize),
{
    let total = remote.len();
    let mut plan = ReconciliationPlan::default();

    let mut index: HashMap<CourseKey, usize> = HashMap::with_capacity(persisted.len());
    for (i, course) in persisted.iter().enumerate() {
        index.entry(course.key()).or_insert(i);
    }
    let mut slots: Vec<Option<Course>> = persisted.into_iter().map(Some).collect();
    let mut seen: HashSet<CourseKey> = HashSet::with_capacity(total);

    for (n, listing) in remote.into_iter().enumerate() {
        let key = listing.key();

        if !seen.insert(key.clone()) {
            warn!(course = %key, "duplicate course in roster listing, keeping the first");
            plan.duplicates += 1;
        } else {
            match index.get(&key).and_then(|&i| slots[i].take()) {
                Some(existing) if existing.is_identical(&listing) => plan.unchanged += 1,
                Some(existing) => plan.updates.push(UpdatePair {
                    remote: listing,
                    existing,
                }),
                None => plan.inserts.push(listing),
            }
        }

        let current = n + 1;
        if interval > 0 && current % interval == 0 {
            on_progress(current, total);
        }
    }

    plan.deletes = slots.into_iter().flatten().collect();
    plan
}
