use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::config::TrawlConfig;
use crate::db::CourseStore;
use crate::error::{ApplyItemError, ApplyPhase, TrawlError, TrawlStage};
use crate::models::{Course, CourseListing, NewSemester, Semester};
use crate::roster::{Roster, RosterClient};
use crate::services::lock::TermLocks;
use crate::sync::{
    ProgressReporter, ReconciliationPlan, TracingReporter, TrawlEvent, TrawlSummary, UpdatePair,
    compute_plan_with_progress,
};
use crate::text::normalize_term;

/// Brings the stored catalog of a term in line with the remote roster.
#[derive(Clone)]
pub struct TrawlService {
    store: Arc<dyn CourseStore>,
    roster: Arc<dyn RosterClient>,
    locks: TermLocks,
    config: TrawlConfig,
}

#[derive(Debug, Default)]
struct ApplyOutcome {
    succeeded: usize,
    failures: Vec<ApplyItemError>,
}

impl TrawlService {
    pub fn new(store: Arc<dyn CourseStore>, roster: Arc<dyn RosterClient>) -> Self {
        Self::with_config(store, roster, TermLocks::default(), TrawlConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CourseStore>,
        roster: Arc<dyn RosterClient>,
        locks: TermLocks,
        config: TrawlConfig,
    ) -> Self {
        Self {
            store,
            roster,
            locks,
            config,
        }
    }

    pub async fn reconcile(&self, term: &str) -> Result<TrawlSummary, TrawlError> {
        self.reconcile_with_progress(term, &TracingReporter).await
    }

    /// Runs a reconciliation, waiting for any in-flight run of the same term.
    pub async fn reconcile_with_progress<R>(
        &self,
        term: &str,
        reporter: &R,
    ) -> Result<TrawlSummary, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        let term = normalize_term(term);
        let _guard = self.locks.acquire(&term).await;
        self.run(&term, reporter).await
    }

    /// Like [`TrawlService::reconcile_with_progress`], but fails with
    /// [`TrawlError::InProgress`] instead of waiting.
    pub async fn try_reconcile_with_progress<R>(
        &self,
        term: &str,
        reporter: &R,
    ) -> Result<TrawlSummary, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        let term = normalize_term(term);
        let Some(_guard) = self.locks.try_acquire(&term) else {
            return Err(TrawlError::InProgress(term));
        };
        self.run(&term, reporter).await
    }

    async fn run<R>(&self, term: &str, reporter: &R) -> Result<TrawlSummary, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        let run_id = Uuid::new_v4();
        reporter.report(TrawlEvent::RunStarted { term, run_id });

        let result = self
            .run_stages(term, reporter)
            .instrument(info_span!("trawl", %term, %run_id))
            .await;

        match &result {
            Ok(summary) => reporter.report(TrawlEvent::RunCompleted { summary }),
            Err(e) => reporter.report(TrawlEvent::RunFailed {
                term,
                error: &e.to_string(),
            }),
        }
        result
    }

    async fn run_stages<R>(&self, term: &str, reporter: &R) -> Result<TrawlSummary, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        let roster = self.validate_term(term, reporter).await?;
        let semester = self.bootstrap_semester(term, &roster, reporter).await?;
        let subjects = self.enumerate_subjects(&semester, reporter).await?;
        let remote = self.fetch_remote_courses(term, &subjects, reporter).await?;
        let persisted = self.fetch_snapshot(term, reporter).await?;

        reporter.report(TrawlEvent::CoursesLoaded {
            remote: remote.len(),
            persisted: persisted.len(),
        });

        let mut summary = TrawlSummary::new(term);
        summary.subjects = subjects.len();
        summary.fetched = remote.len();

        let plan = self.analyze(remote, persisted, reporter);
        summary.unchanged = plan.unchanged;
        let ReconciliationPlan {
            inserts,
            deletes,
            updates,
            ..
        } = plan;

        // Each phase runs to completion even when an earlier one had failures.
        let updated = self.apply_updates(updates, reporter).await;
        let deleted = self.apply_deletes(deletes, reporter).await;
        let inserted = self.apply_inserts(term, inserts, reporter).await;

        summary.updated = updated.succeeded;
        summary.deleted = deleted.succeeded;
        summary.inserted = inserted.succeeded;

        let failures: Vec<ApplyItemError> = [updated, deleted, inserted]
            .into_iter()
            .flat_map(|outcome| outcome.failures)
            .collect();
        summary.failed = failures.len();

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(TrawlError::Apply { failures, summary })
        }
    }

    async fn validate_term<R>(&self, term: &str, reporter: &R) -> Result<Roster, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        reporter.report(TrawlEvent::StageStarted {
            stage: TrawlStage::ValidateTerm,
        });

        self.roster
            .get_roster(term)
            .await
            .map_err(TrawlError::in_stage(TrawlStage::ValidateTerm))?
            .ok_or_else(|| TrawlError::UnavailableTerm(term.to_string()))
    }

    async fn bootstrap_semester<R>(
        &self,
        term: &str,
        roster: &Roster,
        reporter: &R,
    ) -> Result<Semester, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        let stage = TrawlStage::BootstrapSemester;
        reporter.report(TrawlEvent::StageStarted { stage });

        if let Some(existing) = self
            .store
            .find_semester(term)
            .await
            .map_err(TrawlError::in_stage(stage))?
        {
            reporter.report(TrawlEvent::SemesterReady {
                slug: &existing.slug,
                created: false,
            });
            return Ok(existing);
        }

        let created = self
            .store
            .insert_semester(&NewSemester {
                slug: term.to_string(),
                descr: roster.descr.clone(),
            })
            .await
            .map_err(TrawlError::in_stage(stage))?;
        reporter.report(TrawlEvent::SemesterReady {
            slug: &created.slug,
            created: true,
        });
        Ok(created)
    }

    /// Lists the term's subjects and records the raw list on the semester.
    async fn enumerate_subjects<R>(
        &self,
        semester: &Semester,
        reporter: &R,
    ) -> Result<Vec<String>, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        let stage = TrawlStage::EnumerateSubjects;
        reporter.report(TrawlEvent::StageStarted { stage });

        let subjects = self
            .roster
            .get_subjects(&semester.slug)
            .await
            .map_err(TrawlError::in_stage(stage))?;

        let mut codes: Vec<String> = Vec::with_capacity(subjects.len());
        for subject in &subjects {
            let code = subject.value.trim();
            if !code.is_empty() && !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        }
        if codes.is_empty() {
            return Err(TrawlError::NoSubjects(semester.slug.clone()));
        }

        let subject_list = serde_json::to_string(&subjects)
            .map_err(|e| TrawlError::in_stage(stage)(e.into()))?;
        self.store
            .update_semester_subjects(&semester.slug, &subject_list)
            .await
            .map_err(TrawlError::in_stage(stage))?;

        reporter.report(TrawlEvent::SubjectsFound { count: codes.len() });
        Ok(codes)
    }

    /// Fetches every subject with bounded concurrency. The first failure
    /// cancels the outstanding fetches and aborts the run.
    async fn fetch_remote_courses<R>(
        &self,
        term: &str,
        subjects: &[String],
        reporter: &R,
    ) -> Result<Vec<CourseListing>, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        reporter.report(TrawlEvent::StageStarted {
            stage: TrawlStage::FetchCourses,
        });

        let roster = &self.roster;
        let per_subject: Vec<Vec<CourseListing>> = stream::iter(subjects.iter().cloned())
            .map(|subject| async move {
                let courses = roster.get_courses(term, &subject).await.map_err(|source| {
                    TrawlError::SubjectFetch {
                        subject: subject.clone(),
                        source,
                    }
                })?;
                reporter.report(TrawlEvent::SubjectFetched {
                    subject: &subject,
                    courses: courses.len(),
                });
                Ok::<_, TrawlError>(courses)
            })
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(per_subject.into_iter().flatten().collect())
    }

    async fn fetch_snapshot<R>(&self, term: &str, reporter: &R) -> Result<Vec<Course>, TrawlError>
    where
        R: ProgressReporter + ?Sized,
    {
        let stage = TrawlStage::FetchSnapshot;
        reporter.report(TrawlEvent::StageStarted { stage });

        self.store
            .fetch_term_courses(term)
            .await
            .map_err(TrawlError::in_stage(stage))
    }

    fn analyze<R>(
        &self,
        remote: Vec<CourseListing>,
        persisted: Vec<Course>,
        reporter: &R,
    ) -> ReconciliationPlan
    where
        R: ProgressReporter + ?Sized,
    {
        reporter.report(TrawlEvent::StageStarted {
            stage: TrawlStage::ComputePlan,
        });

        let plan = compute_plan_with_progress(
            remote,
            persisted,
            self.config.progress_interval,
            |current, total| reporter.report(TrawlEvent::Analyzed { current, total }),
        );

        reporter.report(TrawlEvent::PlanReady {
            inserts: plan.inserts.len(),
            updates: plan.updates.len(),
            deletes: plan.deletes.len(),
            unchanged: plan.unchanged,
        });
        plan
    }

    async fn apply_updates<R>(&self, updates: Vec<UpdatePair>, reporter: &R) -> ApplyOutcome
    where
        R: ProgressReporter + ?Sized,
    {
        let store = &self.store;
        self.apply_each(ApplyPhase::Update, updates, reporter, |pair| async move {
            store
                .update_course(pair.existing.id, &pair.remote)
                .await
                .map_err(|e| ApplyItemError::new(ApplyPhase::Update, pair.remote.key(), &e))
        })
        .await
    }

    async fn apply_deletes<R>(&self, deletes: Vec<Course>, reporter: &R) -> ApplyOutcome
    where
        R: ProgressReporter + ?Sized,
    {
        let store = &self.store;
        self.apply_each(ApplyPhase::Delete, deletes, reporter, |course| async move {
            store
                .delete_course(course.id)
                .await
                .map_err(|e| ApplyItemError::new(ApplyPhase::Delete, course.key(), &e))
        })
        .await
    }

    async fn apply_inserts<R>(
        &self,
        term: &str,
        inserts: Vec<CourseListing>,
        reporter: &R,
    ) -> ApplyOutcome
    where
        R: ProgressReporter + ?Sized,
    {
        let store = &self.store;
        self.apply_each(ApplyPhase::Insert, inserts, reporter, |listing| async move {
            store
                .insert_course(term, &listing)
                .await
                .map(|_| ())
                .map_err(|e| ApplyItemError::new(ApplyPhase::Insert, listing.key(), &e))
        })
        .await
    }

    /// Runs `op` over `items` with bounded concurrency. Failures are
    /// collected; they never cancel sibling operations.
    async fn apply_each<T, R, F, Fut>(
        &self,
        phase: ApplyPhase,
        items: Vec<T>,
        reporter: &R,
        op: F,
    ) -> ApplyOutcome
    where
        R: ProgressReporter + ?Sized,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), ApplyItemError>>,
    {
        let mut outcome = ApplyOutcome::default();
        let total = items.len();
        if total == 0 {
            return outcome;
        }

        reporter.report(TrawlEvent::StageStarted {
            stage: phase.stage(),
        });

        let interval = self.config.progress_interval;
        let mut results = stream::iter(items)
            .map(op)
            .buffer_unordered(self.config.concurrency.max(1));

        let mut current = 0;
        while let Some(result) = results.next().await {
            current += 1;
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(failure) => {
                    reporter.report(TrawlEvent::ItemFailed { error: &failure });
                    outcome.failures.push(failure);
                }
            }
            if interval > 0 && current % interval == 0 {
                reporter.report(TrawlEvent::Applied {
                    phase,
                    current,
                    total,
                });
            }
        }

        reporter.report(TrawlEvent::PhaseCompleted {
            phase,
            succeeded: outcome.succeeded,
            failed: outcome.failures.len(),
        });
        outcome
    }
}
