mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chequerd::config::TrawlConfig;
use chequerd::db::CourseStore;
use chequerd::error::{ApplyPhase, TrawlError};
use chequerd::models::{CourseKey, CourseListing};
use chequerd::services::{TermLocks, TrawlService};
use chequerd::sync::SilentReporter;

use common::{FakeRoster, FaultyStore, RecordingReporter, listing, setup_store, sorted_keys};

struct Harness {
    store: Arc<FaultyStore>,
    roster: Arc<FakeRoster>,
    locks: TermLocks,
    service: TrawlService,
}

async fn harness(progress_interval: usize) -> Harness {
    let store = Arc::new(FaultyStore::new(setup_store().await));
    let roster = Arc::new(FakeRoster::new("SP24"));
    let locks = TermLocks::default();
    let service = TrawlService::with_config(
        store.clone(),
        roster.clone(),
        locks.clone(),
        TrawlConfig {
            concurrency: 4,
            progress_interval,
        },
    );

    Harness {
        store,
        roster,
        locks,
        service,
    }
}

fn taught_by(mut course: CourseListing, netid: &str, first_name: &str) -> CourseListing {
    let professor = &mut course.groups[0].sections[0].meetings[0].professors[0];
    professor.netid = netid.to_string();
    professor.first_name = first_name.to_string();
    course
}

fn retitled(course: &CourseListing, title: &str) -> CourseListing {
    CourseListing {
        title_long: title.to_string(),
        ..course.clone()
    }
}

#[tokio::test]
async fn test_first_run_inserts_every_course() {
    let h = harness(100).await;
    h.roster.set_subjects(&["CS", "MATH"]);
    h.roster.set_courses(
        "CS",
        vec![
            listing("CS", 1, "1110", "Introduction to Computing"),
            listing("CS", 2, "2110", "Object-Oriented Programming and Data Structures"),
        ],
    );
    h.roster
        .set_courses("MATH", vec![listing("MATH", 3, "1910", "Calculus for Engineers")]);

    let summary = h
        .service
        .reconcile_with_progress("sp24", &SilentReporter)
        .await
        .expect("trawl succeeds");

    assert_eq!(summary.term, "SP24");
    assert_eq!(summary.subjects, 2);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.updated + summary.deleted + summary.unchanged + summary.failed, 0);
    assert_eq!(h.roster.course_requests.load(Ordering::SeqCst), 2);

    let stored = h.store.fetch_term_courses("SP24").await.unwrap();
    assert_eq!(
        sorted_keys(&stored),
        vec![
            CourseKey::new("CS", 1),
            CourseKey::new("CS", 2),
            CourseKey::new("MATH", 3),
        ]
    );
    let cs1 = stored.iter().find(|c| c.crse_id == 1).unwrap();
    assert_eq!(cs1.groups, listing("CS", 1, "1110", "Introduction to Computing").groups);
}

#[tokio::test]
async fn test_second_run_with_same_remote_changes_nothing() {
    let h = harness(100).await;
    h.roster.set_subjects(&["CS"]);
    h.roster.set_courses(
        "CS",
        vec![listing("CS", 1, "1110", "Intro"), listing("CS", 2, "2110", "OOP")],
    );

    h.service.reconcile("SP24").await.expect("first run");
    let mutations = h.store.mutations();

    let summary = h.service.reconcile("SP24").await.expect("second run");
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.inserted + summary.updated + summary.deleted, 0);
    assert_eq!(h.store.mutations(), mutations);
}

#[tokio::test]
async fn test_changed_remote_updates_deletes_and_inserts() {
    let h = harness(100).await;
    let a = listing("CS", 1, "1110", "Intro v1");
    let b = listing("CS", 2, "2110", "OOP");
    h.roster.set_subjects(&["CS"]);
    h.roster.set_courses("CS", vec![a.clone(), b]);
    h.service.reconcile("SP24").await.expect("first run");

    let a_id = h
        .store
        .find_course("SP24", &CourseKey::new("CS", 1))
        .await
        .unwrap()
        .expect("stored")
        .id;

    let c = listing("CS", 3, "3110", "Functional Programming");
    h.roster
        .set_courses("CS", vec![retitled(&a, "Intro v2"), c]);
    let summary = h.service.reconcile("SP24").await.expect("second run");

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.unchanged, 0);

    let stored = h.store.fetch_term_courses("SP24").await.unwrap();
    assert_eq!(
        sorted_keys(&stored),
        vec![CourseKey::new("CS", 1), CourseKey::new("CS", 3)]
    );
    let updated = stored.iter().find(|c| c.crse_id == 1).unwrap();
    assert_eq!(updated.id, a_id, "updates keep the stored record");
    assert_eq!(updated.title_long, "Intro v2");
}

#[tokio::test]
async fn test_subject_fetch_failure_aborts_before_any_mutation() {
    let h = harness(100).await;
    h.roster.set_subjects(&["CS", "MATH", "PHYS"]);
    h.roster.set_courses("CS", vec![listing("CS", 1, "1110", "Intro")]);
    h.roster.set_courses("MATH", vec![listing("MATH", 2, "1910", "Calculus")]);
    h.service.reconcile("SP24").await.expect("seed run");
    let mutations = h.store.mutations();

    // Without the abort these changes would delete CS 1 and insert CS 9.
    h.roster.set_courses("CS", vec![listing("CS", 9, "4820", "Algorithms")]);
    h.roster.fail_subject("MATH");

    let err = h.service.reconcile("SP24").await.unwrap_err();
    match err {
        TrawlError::SubjectFetch { ref subject, .. } => assert_eq!(subject, "MATH"),
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(h.store.mutations(), mutations);
    let stored = h.store.fetch_term_courses("SP24").await.unwrap();
    assert_eq!(
        sorted_keys(&stored),
        vec![CourseKey::new("CS", 1), CourseKey::new("MATH", 2)]
    );
}

#[tokio::test]
async fn test_unknown_term_is_rejected() {
    let h = harness(100).await;

    let err = h.service.reconcile("fa99").await.unwrap_err();
    assert!(matches!(err, TrawlError::UnavailableTerm(ref term) if term == "FA99"));
    assert_eq!(err.to_string(), "FA99 is not an available semester");
    assert!(h.store.find_semester("FA99").await.unwrap().is_none());
}

#[tokio::test]
async fn test_term_without_subjects_fails() {
    let h = harness(100).await;

    let err = h.service.reconcile("SP24").await.unwrap_err();
    assert!(matches!(err, TrawlError::NoSubjects(_)));
    assert_eq!(h.store.mutations(), 0);
}

#[tokio::test]
async fn test_failed_item_does_not_stop_siblings() {
    let h = harness(100).await;
    let a = listing("CS", 1, "1110", "Intro v1");
    h.roster.set_subjects(&["CS"]);
    h.roster
        .set_courses("CS", vec![a.clone(), listing("CS", 2, "2110", "OOP")]);
    h.service.reconcile("SP24").await.expect("seed run");

    h.store.fail_course(CourseKey::new("CS", 1));
    h.roster.set_courses(
        "CS",
        vec![retitled(&a, "Intro v2"), listing("CS", 3, "3110", "Functional")],
    );

    let reporter = RecordingReporter::default();
    let err = h
        .service
        .reconcile_with_progress("SP24", &reporter)
        .await
        .unwrap_err();

    let TrawlError::Apply { failures, summary } = err else {
        panic!("expected apply failure");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].phase, ApplyPhase::Update);
    assert_eq!(failures[0].course, CourseKey::new("CS", 1));
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.failed, 1);
    assert!(reporter.events().contains(&"failed CS#1".to_string()));
    assert_eq!(reporter.events().last().map(String::as_str), Some("failed"));

    let stored = h.store.fetch_term_courses("SP24").await.unwrap();
    assert_eq!(
        sorted_keys(&stored),
        vec![CourseKey::new("CS", 1), CourseKey::new("CS", 3)]
    );
    let untouched = stored.iter().find(|c| c.crse_id == 1).unwrap();
    assert_eq!(untouched.title_long, "Intro v1");
}

#[tokio::test]
async fn test_subject_list_is_recorded_on_every_run() {
    let h = harness(100).await;
    h.roster.set_subjects(&["CS", "MATH"]);
    h.service.reconcile("SP24").await.expect("first run");

    let semester = h.store.find_semester("SP24").await.unwrap().expect("created");
    assert_eq!(semester.descr, "Semester SP24");
    assert!(semester.subject_list.contains("\"MATH\""));
    assert!(!semester.subject_list.contains("\"PHYS\""));

    h.roster.set_subjects(&["CS", "MATH", "PHYS"]);
    h.service.reconcile("SP24").await.expect("second run");

    let semester = h.store.find_semester("SP24").await.unwrap().expect("exists");
    assert!(semester.subject_list.contains("\"PHYS\""));
}

#[tokio::test]
async fn test_overlapping_run_is_refused() {
    let h = harness(100).await;
    h.roster.set_subjects(&["CS"]);

    let held = h.locks.acquire("SP24").await;
    let err = h
        .service
        .try_reconcile_with_progress("sp24", &SilentReporter)
        .await
        .unwrap_err();
    assert!(matches!(err, TrawlError::InProgress(ref term) if term == "SP24"));

    drop(held);
    h.service
        .try_reconcile_with_progress("sp24", &SilentReporter)
        .await
        .expect("runs once the term is free");
}

#[tokio::test]
async fn test_progress_is_reported_at_intervals() {
    let h = harness(2).await;
    h.roster.set_subjects(&["CS"]);
    h.roster.set_courses(
        "CS",
        (1..=5)
            .map(|i| listing("CS", i, &format!("{}110", i), "Seminar"))
            .collect(),
    );

    let reporter = RecordingReporter::default();
    h.service
        .reconcile_with_progress("SP24", &reporter)
        .await
        .expect("trawl succeeds");

    let events = reporter.events();
    for expected in ["analyzed 2/5", "analyzed 4/5", "insert 2/5", "insert 4/5"] {
        assert!(
            events.iter().any(|e| e == expected),
            "missing {:?} in {:?}",
            expected,
            events
        );
    }
    assert!(!events.iter().any(|e| e == "insert 5/5"));
    assert_eq!(events.last().map(String::as_str), Some("completed"));
}

#[tokio::test]
async fn test_duplicate_remote_course_keeps_first() {
    let h = harness(100).await;
    h.roster.set_subjects(&["CS"]);
    h.roster.set_courses(
        "CS",
        vec![listing("CS", 1, "1110", "First"), listing("CS", 1, "1110", "Second")],
    );

    let summary = h.service.reconcile("SP24").await.expect("trawl succeeds");
    assert_eq!(summary.inserted, 1);

    let course = h
        .store
        .find_course("SP24", &CourseKey::new("CS", 1))
        .await
        .unwrap()
        .expect("stored");
    assert_eq!(course.title_long, "First");
}

#[tokio::test]
async fn test_professor_listed_under_two_names_stays_unchanged() {
    let h = harness(100).await;
    h.roster.set_subjects(&["CS"]);
    h.roster.set_courses(
        "CS",
        vec![
            taught_by(listing("CS", 1, "1110", "Intro"), "jd1", "John"),
            taught_by(listing("CS", 2, "2110", "OOP"), "jd1", "Jon"),
        ],
    );

    let first = h.service.reconcile("SP24").await.expect("first run");
    assert_eq!(first.inserted, 2);
    let mutations = h.store.mutations();

    for _ in 0..2 {
        let summary = h.service.reconcile("SP24").await.expect("repeat run");
        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.updated, 0);
    }
    assert_eq!(h.store.mutations(), mutations);

    let jon = h
        .store
        .find_course("SP24", &CourseKey::new("CS", 2))
        .await
        .unwrap()
        .expect("stored");
    assert_eq!(jon.groups[0].sections[0].meetings[0].professors[0].first_name, "Jon");
}

#[tokio::test]
async fn test_concurrency_caps_requests_and_writes() {
    let h = harness(100).await;
    let subjects: Vec<String> = (0..12).map(|i| format!("S{:02}", i)).collect();
    let codes: Vec<&str> = subjects.iter().map(String::as_str).collect();
    h.roster.set_subjects(&codes);
    for (i, code) in codes.iter().enumerate() {
        let crse_id = i as i64 * 10;
        h.roster.set_courses(
            code,
            (0..3)
                .map(|n| listing(code, crse_id + n, "1000", "Seminar"))
                .collect(),
        );
    }
    h.roster.set_delay(Duration::from_millis(20));

    let summary = h.service.reconcile("SP24").await.expect("trawl succeeds");
    assert_eq!(summary.inserted, 36);
    assert_eq!(h.roster.course_requests.load(Ordering::SeqCst), 12);

    // The harness runs with a concurrency of 4.
    let peak = h.roster.peak_requests();
    assert!(peak > 1, "requests ran one at a time");
    assert!(peak <= 4, "{} requests overlapped", peak);
    assert!(h.store.peak_writes() <= 4, "{} writes overlapped", h.store.peak_writes());
}
