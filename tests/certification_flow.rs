//! End-to-end tests of the certification core over in-memory stores.

use async_trait::async_trait;
use chrono::{Datelike, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use learnserver::certification::access::AccessRule;
use learnserver::certification::issuer::{CertificateIssuer, IncompleteReason};
use learnserver::certification::store::{CertificateStore, LevelStore, StoreError};
use learnserver::certification::testing::{
    certificate_for, course_with_quiz, level_definition, MemoryCatalog, MemoryCertificateStore,
    MemoryEnrollmentStore, MemoryGroupLookup, MemoryLevelStore, MemoryProgressStore,
    StaticRenderer,
};
use learnserver::certification::types::{
    format_certificate_number, Certificate, CertificateDraft,
};
use learnserver::certification::CertificationService;
use learnserver::config::CertificateConfig;

fn service_over(
    catalog: Arc<MemoryCatalog>,
    progress: Arc<MemoryProgressStore>,
    enrollments: Arc<MemoryEnrollmentStore>,
    certificates: Arc<MemoryCertificateStore>,
    levels: Arc<MemoryLevelStore>,
    groups: Arc<MemoryGroupLookup>,
) -> CertificationService {
    CertificationService::with_stores(
        catalog,
        progress,
        enrollments,
        certificates,
        levels,
        groups,
        Arc::new(StaticRenderer),
        CertificateConfig::default(),
    )
}

#[tokio::test]
async fn full_enrollment_to_level_lifecycle() {
    let user = Uuid::new_v4();
    let group = Uuid::new_v4();
    let (outline, lessons, quiz) = course_with_quiz(2, true);
    let course_id = outline.course_id;
    let quiz_id = quiz.unwrap();

    let catalog = Arc::new(MemoryCatalog::with(outline));
    let progress = Arc::new(MemoryProgressStore::default());
    let enrollments = Arc::new(MemoryEnrollmentStore::default());
    let certificates = Arc::new(MemoryCertificateStore::default());
    let levels = Arc::new(MemoryLevelStore::default());
    let groups = Arc::new(MemoryGroupLookup::default());

    let definition = level_definition(
        "Certified Operator",
        vec![AccessRule::Group { group_id: group }],
        vec![course_id],
    );
    let level_id = definition.level.id;
    levels.add_definition(definition).await;
    groups.set_groups(user, vec![group]).await;

    let service = service_over(
        catalog,
        progress.clone(),
        enrollments.clone(),
        certificates.clone(),
        levels.clone(),
        groups,
    );

    // Not enrolled yet: structured no-op.
    let outcome = service.issuer.evaluate_and_issue(user, course_id).await.unwrap();
    assert_eq!(outcome.incomplete_reason, Some(IncompleteReason::NotEnrolled));

    enrollments.enroll(user, course_id).await;

    // One of two lessons done.
    progress.complete_lesson(user, lessons[0]).await;
    let outcome = service.issuer.evaluate_and_issue(user, course_id).await.unwrap();
    assert_eq!(
        outcome.incomplete_reason,
        Some(IncompleteReason::LessonsIncomplete)
    );

    // All lessons done, required quiz still unpassed.
    progress.complete_lesson(user, lessons[1]).await;
    let outcome = service.issuer.evaluate_and_issue(user, course_id).await.unwrap();
    assert_eq!(
        outcome.incomplete_reason,
        Some(IncompleteReason::RequiredQuizUnpassed)
    );

    // Quiz passed: certificate is issued exactly once.
    progress
        .record_attempt(user, quiz_id, true, Some(Utc::now()))
        .await;
    let outcome = service.issuer.evaluate_and_issue(user, course_id).await.unwrap();
    assert!(outcome.completed && outcome.issued);
    assert_eq!(certificates.count().await, 1);

    // The level shows as eligible, but nothing was auto-awarded.
    let views = service.evaluator.list_accessible(user).await.unwrap();
    assert_eq!(views.len(), 1);
    assert!(views[0].eligible);
    assert!(!views[0].achieved);
    assert!(levels.find_achievement(user, level_id).await.unwrap().is_none());

    // Re-evaluation stays idempotent.
    let again = service.issuer.evaluate_and_issue(user, course_id).await.unwrap();
    assert!(again.completed);
    assert!(!again.issued);
    assert_eq!(again.certificate_id, outcome.certificate_id);
    assert_eq!(certificates.count().await, 1);

    // Explicit unlock converts eligibility into an achievement.
    let achievement = service.evaluator.unlock(user, level_id, None).await.unwrap();
    assert!(achievement.is_valid);
    assert!(achievement.certificate_number.is_some());

    // Reconciliation keeps it valid while the course certificate holds.
    service.reconciler.reconcile(user).await.unwrap();
    assert!(levels
        .find_achievement(user, level_id)
        .await
        .unwrap()
        .unwrap()
        .is_valid);

    // The underlying certificate lapses, then is renewed.
    certificates
        .set_expiry(user, course_id, Some(Utc::now() - Duration::days(1)))
        .await;
    service.reconciler.reconcile(user).await.unwrap();
    assert!(!levels
        .find_achievement(user, level_id)
        .await
        .unwrap()
        .unwrap()
        .is_valid);

    certificates
        .set_expiry(user, course_id, Some(Utc::now() + Duration::days(365)))
        .await;
    service.reconciler.reconcile(user).await.unwrap();
    assert!(levels
        .find_achievement(user, level_id)
        .await
        .unwrap()
        .unwrap()
        .is_valid);
}

/// Certificate store that misreports "no certificate yet" for the first few
/// lookups, forcing two concurrent evaluations through the issuance path at
/// once the way two racing requests would be.
struct RacingCertificateStore {
    inner: Arc<MemoryCertificateStore>,
    blind_lookups: AtomicUsize,
}

#[async_trait]
impl CertificateStore for RacingCertificateStore {
    async fn find_by_user_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Certificate>, StoreError> {
        if self.blind_lookups.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            (n > 0).then(|| n - 1)
        }).is_ok()
        {
            return Ok(None);
        }
        self.inner.find_by_user_course(user_id, course_id).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Certificate>, StoreError> {
        self.inner.list_for_user(user_id).await
    }

    async fn count_issued_in_year(&self, year: i32) -> Result<i64, StoreError> {
        self.inner.count_issued_in_year(year).await
    }

    async fn create(&self, draft: CertificateDraft) -> Result<Certificate, StoreError> {
        self.inner.create(draft).await
    }
}

#[tokio::test]
async fn racing_issuance_produces_one_winner_and_one_already_issued() {
    let user = Uuid::new_v4();
    let (outline, lessons, _quiz) = course_with_quiz(1, false);
    let course_id = outline.course_id;

    let catalog = Arc::new(MemoryCatalog::with(outline));
    let progress = Arc::new(MemoryProgressStore::default());
    let enrollments = Arc::new(MemoryEnrollmentStore::default());
    let memory = Arc::new(MemoryCertificateStore::default());
    let racing = Arc::new(RacingCertificateStore {
        inner: Arc::clone(&memory),
        blind_lookups: AtomicUsize::new(2),
    });
    enrollments.enroll(user, course_id).await;
    progress.complete_lesson(user, lessons[0]).await;

    let issuer = Arc::new(CertificateIssuer::new(
        catalog,
        progress,
        enrollments,
        racing,
        Arc::new(StaticRenderer),
        CertificateConfig::default(),
    ));

    let (a, b) = tokio::join!(
        issuer.evaluate_and_issue(user, course_id),
        issuer.evaluate_and_issue(user, course_id)
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.completed && b.completed);
    assert_eq!(
        [a.issued, b.issued].iter().filter(|issued| **issued).count(),
        1
    );
    assert_eq!(a.certificate_id, b.certificate_id);
    assert_eq!(memory.count().await, 1);
}

#[tokio::test]
async fn numbering_is_scoped_to_the_calendar_year() {
    let store = MemoryCertificateStore::default();
    let this_year = Utc::now().year();
    let last_year = Utc
        .with_ymd_and_hms(this_year - 1, 6, 15, 12, 0, 0)
        .unwrap();

    // A certificate from the previous year does not advance this year's
    // sequence.
    let mut old = certificate_for(Uuid::new_v4(), Uuid::new_v4(), None);
    old.issued_at = last_year;
    old.number = format_certificate_number("CERT", this_year - 1, 1);
    store.create(old).await.unwrap();

    for seq in 1..=3 {
        let mut draft = certificate_for(Uuid::new_v4(), Uuid::new_v4(), None);
        let year = draft.issued_at.year();
        let next = store.count_issued_in_year(year).await.unwrap() + 1;
        assert_eq!(next, seq);
        draft.number = format_certificate_number("CERT", year, next);
        let cert = store.create(draft).await.unwrap();
        assert_eq!(
            cert.number,
            format!("CERT-{}-{:05}", this_year, seq)
        );
    }

    assert_eq!(store.count_issued_in_year(this_year).await.unwrap(), 3);
    assert_eq!(store.count_issued_in_year(this_year - 1).await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_certificate_numbers_are_rejected_by_the_store() {
    let store = MemoryCertificateStore::default();
    let number = format_certificate_number("CERT", 2026, 1);

    let mut first = certificate_for(Uuid::new_v4(), Uuid::new_v4(), None);
    first.number = number.clone();
    store.create(first).await.unwrap();

    let mut second = certificate_for(Uuid::new_v4(), Uuid::new_v4(), None);
    second.number = number;
    assert!(matches!(
        store.create(second).await,
        Err(StoreError::UniqueViolation)
    ));
}
