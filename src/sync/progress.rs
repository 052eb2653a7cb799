//! Progress reporting for reconciliation runs.
//!
//! The trawl service emits [`TrawlEvent`]s through a [`ProgressReporter`] so
//! that logging, CLI output and tests can observe a run without the service
//! knowing about any of them.

use uuid::Uuid;

use crate::error::{ApplyItemError, ApplyPhase, TrawlStage};
use crate::sync::TrawlSummary;

/// Events emitted while a term is being reconciled.
#[derive(Debug, Clone)]
pub enum TrawlEvent<'a> {
    /// Run acquired the term lock and is starting.
    RunStarted { term: &'a str, run_id: Uuid },

    /// A stage is starting.
    StageStarted { stage: TrawlStage },

    /// The semester row already existed or was just created.
    SemesterReady { slug: &'a str, created: bool },

    /// Subjects listed for the term.
    SubjectsFound { count: usize },

    /// Courses retrieved for one subject.
    SubjectFetched { subject: &'a str, courses: usize },

    /// Remote listing and stored snapshot are both in memory.
    CoursesLoaded { remote: usize, persisted: usize },

    /// Periodic diff progress.
    Analyzed { current: usize, total: usize },

    /// Diff finished.
    PlanReady {
        inserts: usize,
        updates: usize,
        deletes: usize,
        unchanged: usize,
    },

    /// Periodic apply progress.
    Applied {
        phase: ApplyPhase,
        current: usize,
        total: usize,
    },

    /// One insert, update or delete failed; siblings keep going.
    ItemFailed { error: &'a ApplyItemError },

    /// An apply phase finished.
    PhaseCompleted {
        phase: ApplyPhase,
        succeeded: usize,
        failed: usize,
    },

    /// Run finished without errors.
    RunCompleted { summary: &'a TrawlSummary },

    /// Run aborted or finished with errors.
    RunFailed { term: &'a str, error: &'a str },
}

/// Receives [`TrawlEvent`]s. The default implementation ignores them.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: TrawlEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Writes each event as a human-readable `tracing` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: TrawlEvent<'_>) {
        use tracing::{error, info, warn};

        match event {
            TrawlEvent::RunStarted { term, run_id } => {
                info!(%run_id, "Updating the courses for semester {}", term);
            }
            TrawlEvent::StageStarted { stage } => {
                info!("Starting {}", stage);
            }
            TrawlEvent::SemesterReady { slug, created } => {
                if created {
                    info!("Inserted new semester entry {}", slug);
                } else {
                    info!("Semester entry {} already exists", slug);
                }
            }
            TrawlEvent::SubjectsFound { count } => {
                info!("Retrieved list of {} subject(s)", count);
            }
            TrawlEvent::SubjectFetched { subject, courses } => {
                info!("    Retrieved {} {} course(s)", courses, subject);
            }
            TrawlEvent::CoursesLoaded { remote, persisted } => {
                info!(
                    "Analyzing {} course(s) against {} existing database entries",
                    remote, persisted
                );
            }
            TrawlEvent::Analyzed { current, total } => {
                info!("Analyzed {} of {} courses", current, total);
            }
            TrawlEvent::PlanReady {
                inserts,
                updates,
                deletes,
                unchanged,
            } => {
                info!(
                    "Found {} to update, {} to delete, {} to insert ({} unchanged)",
                    updates, deletes, inserts, unchanged
                );
            }
            TrawlEvent::Applied {
                phase,
                current,
                total,
            } => {
                info!("{} {} of {} courses", past_tense(phase), current, total);
            }
            TrawlEvent::ItemFailed { error } => {
                warn!("{}", error);
            }
            TrawlEvent::PhaseCompleted {
                phase,
                succeeded,
                failed,
            } => {
                if failed == 0 {
                    info!("{} all {} course(s)", past_tense(phase), succeeded);
                } else {
                    warn!(
                        "{} {} course(s), {} failed",
                        past_tense(phase),
                        succeeded,
                        failed
                    );
                }
            }
            TrawlEvent::RunCompleted { summary } => {
                info!(
                    "Finished updating the courses for semester {}: {} inserted, {} updated, {} deleted, {} unchanged",
                    summary.term,
                    summary.inserted,
                    summary.updated,
                    summary.deleted,
                    summary.unchanged
                );
            }
            TrawlEvent::RunFailed { term, error } => {
                error!("Updating semester {} failed: {}", term, error);
            }
        }
    }
}

fn past_tense(phase: ApplyPhase) -> &'static str {
    match phase {
        ApplyPhase::Update => "Updated",
        ApplyPhase::Delete => "Deleted",
        ApplyPhase::Insert => "Inserted",
    }
}
