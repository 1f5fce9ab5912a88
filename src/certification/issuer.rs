//! Course completion evaluation and certificate issuance.

use chrono::{Datelike, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::certification::error::CertificationError;
use crate::certification::expiry::compute_expiry;
use crate::certification::levels::LevelEvaluator;
use crate::certification::render::{CertificateRenderer, CourseCertificateData};
use crate::certification::store::{
    CertificateStore, CourseCatalog, EnrollmentStore, ProgressStore, StoreError,
};
use crate::certification::types::{
    format_certificate_number, CertificateDraft, CourseOutline,
};
use crate::config::CertificateConfig;
use serde::Serialize;

/// Bounded retries when a concurrent issuance grabs the same sequential
/// number before we commit.
const NUMBER_ALLOCATION_ATTEMPTS: u32 = 3;

/// Result of a completion evaluation. "Not yet complete" is a normal
/// outcome, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub completed: bool,
    pub issued: bool,
    pub certificate_id: Option<Uuid>,
    pub certificate_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete_reason: Option<IncompleteReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    UnknownCourse,
    NotEnrolled,
    LessonsIncomplete,
    RequiredQuizUnpassed,
}

impl IssueOutcome {
    fn incomplete(reason: IncompleteReason) -> Self {
        Self {
            completed: false,
            issued: false,
            certificate_id: None,
            certificate_number: None,
            incomplete_reason: Some(reason),
        }
    }

    fn already_issued(certificate_id: Uuid, number: String) -> Self {
        Self {
            completed: true,
            issued: false,
            certificate_id: Some(certificate_id),
            certificate_number: Some(number),
            incomplete_reason: None,
        }
    }

    fn issued(certificate_id: Uuid, number: String) -> Self {
        Self {
            completed: true,
            issued: true,
            certificate_id: Some(certificate_id),
            certificate_number: Some(number),
            incomplete_reason: None,
        }
    }
}

pub struct CertificateIssuer {
    catalog: Arc<dyn CourseCatalog>,
    progress: Arc<dyn ProgressStore>,
    enrollments: Arc<dyn EnrollmentStore>,
    certificates: Arc<dyn CertificateStore>,
    renderer: Arc<dyn CertificateRenderer>,
    evaluator: Option<Arc<LevelEvaluator>>,
    config: CertificateConfig,
}

impl CertificateIssuer {
    pub fn new(
        catalog: Arc<dyn CourseCatalog>,
        progress: Arc<dyn ProgressStore>,
        enrollments: Arc<dyn EnrollmentStore>,
        certificates: Arc<dyn CertificateStore>,
        renderer: Arc<dyn CertificateRenderer>,
        config: CertificateConfig,
    ) -> Self {
        Self {
            catalog,
            progress,
            enrollments,
            certificates,
            renderer,
            evaluator: None,
            config,
        }
    }

    /// Wire the post-issuance eligibility notification target.
    pub fn with_eligibility_refresh(mut self, evaluator: Arc<LevelEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Evaluate whether `user_id` has completed `course_id` and issue a
    /// certificate when so. Idempotent: once a certificate exists for the
    /// pair, every later call returns it without issuing again.
    pub async fn evaluate_and_issue(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<IssueOutcome, CertificationError> {
        let Some(outline) = self.catalog.course_outline(course_id).await? else {
            return Ok(IssueOutcome::incomplete(IncompleteReason::UnknownCourse));
        };

        if self.enrollments.find(user_id, course_id).await?.is_none() {
            return Ok(IssueOutcome::incomplete(IncompleteReason::NotEnrolled));
        }

        if !self.all_lessons_complete(user_id, &outline).await? {
            return Ok(IssueOutcome::incomplete(IncompleteReason::LessonsIncomplete));
        }

        if !self.required_quizzes_passed(user_id, &outline).await? {
            return Ok(IssueOutcome::incomplete(
                IncompleteReason::RequiredQuizUnpassed,
            ));
        }

        // First completion wins; the stamp is never overwritten.
        let completed_at = self
            .enrollments
            .complete_if_unset(user_id, course_id, Utc::now())
            .await?;

        if let Some(existing) = self
            .certificates
            .find_by_user_course(user_id, course_id)
            .await?
        {
            return Ok(IssueOutcome::already_issued(existing.id, existing.number));
        }

        let expires_at = compute_expiry(&outline.expiry_policy, completed_at);

        for _ in 0..NUMBER_ALLOCATION_ATTEMPTS {
            let issued_at = Utc::now();
            let year = issued_at.year();
            let seq = self.certificates.count_issued_in_year(year).await? + 1;
            let number = format_certificate_number(&self.config.course_prefix, year, seq);

            // The artifact must exist before the row does; a render failure
            // aborts the whole operation.
            let artifact = self
                .renderer
                .render_course(&CourseCertificateData {
                    user_id,
                    number: number.clone(),
                    course_title: outline.title.clone(),
                    course_description: outline.description.clone(),
                    instructor_name: outline.instructor_name.clone(),
                    site_title: self.config.site_title.clone(),
                    completed_at,
                    expires_at,
                })
                .await?;

            let draft = CertificateDraft {
                user_id,
                course_id,
                number: number.clone(),
                course_title: outline.title.clone(),
                course_description: outline.description.clone(),
                instructor_name: outline.instructor_name.clone(),
                completed_at,
                issued_at,
                expires_at,
                artifact,
            };

            match self.certificates.create(draft).await {
                Ok(cert) => {
                    log::info!(
                        "issued certificate {} to user {} for course {}",
                        cert.number,
                        user_id,
                        course_id
                    );
                    self.spawn_eligibility_refresh(user_id);
                    return Ok(IssueOutcome::issued(cert.id, cert.number));
                }
                Err(StoreError::UniqueViolation) => {
                    // Either a concurrent issuance for the same pair won, or
                    // another course's issuance took this year-sequence slot.
                    if let Some(existing) = self
                        .certificates
                        .find_by_user_course(user_id, course_id)
                        .await?
                    {
                        return Ok(IssueOutcome::already_issued(
                            existing.id,
                            existing.number,
                        ));
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Backend(
            "certificate number allocation kept colliding".to_string(),
        )
        .into())
    }

    async fn all_lessons_complete(
        &self,
        user_id: Uuid,
        outline: &CourseOutline,
    ) -> Result<bool, CertificationError> {
        // A course with no lessons at all is never considered complete.
        if outline.lesson_count() == 0 {
            return Ok(false);
        }
        for module in &outline.modules {
            for lesson_id in &module.lesson_ids {
                if !self.progress.lesson_completed(user_id, *lesson_id).await? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn required_quizzes_passed(
        &self,
        user_id: Uuid,
        outline: &CourseOutline,
    ) -> Result<bool, CertificationError> {
        for module in &outline.modules {
            let Some(quiz) = &module.quiz else { continue };
            if !quiz.is_required {
                continue;
            }
            let attempt = self
                .progress
                .quiz_best_attempt(user_id, quiz.quiz_id)
                .await?;
            let passed = attempt
                .map(|a| a.passed && a.completed_at.is_some())
                .unwrap_or(false);
            if !passed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fire-and-forget: a failed eligibility scan must never fail the
    /// issuance that triggered it.
    fn spawn_eligibility_refresh(&self, user_id: Uuid) {
        let Some(evaluator) = &self.evaluator else {
            return;
        };
        let evaluator = Arc::clone(evaluator);
        tokio::spawn(async move {
            if let Err(e) = evaluator.refresh_eligibility(user_id).await {
                log::warn!(
                    "post-issuance eligibility refresh failed for user {}: {}",
                    user_id,
                    e
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certification::expiry::ExpiryPolicy;
    use crate::certification::render::RenderError;
    use crate::certification::testing::{
        course_with_quiz, FailingRenderer, MemoryCatalog, MemoryCertificateStore,
        MemoryEnrollmentStore, MemoryProgressStore, StaticRenderer,
    };
    use chrono::{DateTime, Duration, Utc};

    fn issuer(
        catalog: Arc<MemoryCatalog>,
        progress: Arc<MemoryProgressStore>,
        enrollments: Arc<MemoryEnrollmentStore>,
        certificates: Arc<MemoryCertificateStore>,
    ) -> CertificateIssuer {
        CertificateIssuer::new(
            catalog,
            progress,
            enrollments,
            certificates,
            Arc::new(StaticRenderer),
            CertificateConfig::default(),
        )
    }

    #[tokio::test]
    async fn incomplete_lessons_block_issuance() {
        let user = Uuid::new_v4();
        let (outline, lessons, _quiz) = course_with_quiz(2, true);
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        progress.complete_lesson(user, lessons[0]).await;

        let issuer = issuer(catalog, progress, enrollments, certificates.clone());
        let outcome = issuer.evaluate_and_issue(user, course_id).await.unwrap();
        assert!(!outcome.completed);
        assert!(!outcome.issued);
        assert_eq!(
            outcome.incomplete_reason,
            Some(IncompleteReason::LessonsIncomplete)
        );
        assert_eq!(certificates.count().await, 0);
    }

    #[tokio::test]
    async fn unpassed_required_quiz_blocks_issuance() {
        let user = Uuid::new_v4();
        let (outline, lessons, quiz) = course_with_quiz(1, true);
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        progress.complete_lesson(user, lessons[0]).await;
        progress.record_attempt(user, quiz.unwrap(), false, Some(Utc::now())).await;

        let issuer = issuer(catalog, progress, enrollments, certificates.clone());
        let outcome = issuer.evaluate_and_issue(user, course_id).await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(
            outcome.incomplete_reason,
            Some(IncompleteReason::RequiredQuizUnpassed)
        );
        assert_eq!(certificates.count().await, 0);
    }

    #[tokio::test]
    async fn failed_optional_quiz_does_not_block_completion() {
        let user = Uuid::new_v4();
        let (outline, lessons, quiz) = course_with_quiz(1, false);
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        progress.complete_lesson(user, lessons[0]).await;
        progress.record_attempt(user, quiz.unwrap(), false, Some(Utc::now())).await;

        let issuer = issuer(catalog, progress, enrollments, certificates.clone());
        let outcome = issuer.evaluate_and_issue(user, course_id).await.unwrap();
        assert!(outcome.completed);
        assert!(outcome.issued);
        assert_eq!(certificates.count().await, 1);
    }

    #[tokio::test]
    async fn passed_quiz_without_completion_timestamp_does_not_count() {
        let user = Uuid::new_v4();
        let (outline, lessons, quiz) = course_with_quiz(1, true);
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        progress.complete_lesson(user, lessons[0]).await;
        progress.record_attempt(user, quiz.unwrap(), true, None).await;

        let issuer = issuer(catalog, progress, enrollments, certificates);
        let outcome = issuer.evaluate_and_issue(user, course_id).await.unwrap();
        assert_eq!(
            outcome.incomplete_reason,
            Some(IncompleteReason::RequiredQuizUnpassed)
        );
    }

    #[tokio::test]
    async fn not_enrolled_is_a_structured_no_op() {
        let user = Uuid::new_v4();
        let (outline, _lessons, _quiz) = course_with_quiz(1, true);
        let course_id = outline.course_id;

        let issuer = issuer(
            Arc::new(MemoryCatalog::with(outline)),
            Arc::new(MemoryProgressStore::default()),
            Arc::new(MemoryEnrollmentStore::default()),
            Arc::new(MemoryCertificateStore::default()),
        );
        let outcome = issuer.evaluate_and_issue(user, course_id).await.unwrap();
        assert_eq!(outcome.incomplete_reason, Some(IncompleteReason::NotEnrolled));
    }

    #[tokio::test]
    async fn issuance_is_idempotent() {
        let user = Uuid::new_v4();
        let (outline, lessons, quiz) = course_with_quiz(1, true);
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        progress.complete_lesson(user, lessons[0]).await;
        progress.record_attempt(user, quiz.unwrap(), true, Some(Utc::now())).await;

        let issuer = issuer(catalog, progress, enrollments, certificates.clone());
        let first = issuer.evaluate_and_issue(user, course_id).await.unwrap();
        assert!(first.completed && first.issued);

        let second = issuer.evaluate_and_issue(user, course_id).await.unwrap();
        assert!(second.completed);
        assert!(!second.issued);
        assert_eq!(second.certificate_id, first.certificate_id);
        assert_eq!(certificates.count().await, 1);
    }

    #[tokio::test]
    async fn first_completion_instant_is_never_overwritten() {
        let user = Uuid::new_v4();
        let (outline, lessons, quiz) = course_with_quiz(1, true);
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        let first_completion = Utc::now() - Duration::days(10);
        enrollments.stamp_completion(user, course_id, first_completion).await;
        progress.complete_lesson(user, lessons[0]).await;
        progress.record_attempt(user, quiz.unwrap(), true, Some(Utc::now())).await;

        let issuer = issuer(catalog, progress, enrollments.clone(), certificates.clone());
        issuer.evaluate_and_issue(user, course_id).await.unwrap();

        let stored: DateTime<Utc> = enrollments
            .completed_at(user, course_id)
            .await
            .expect("enrollment completed");
        assert_eq!(stored, first_completion);
        let cert = certificates
            .find_by_user_course_direct(user, course_id)
            .await
            .unwrap();
        assert_eq!(cert.completed_at, first_completion);
    }

    #[tokio::test]
    async fn render_failure_leaves_no_certificate_behind() {
        let user = Uuid::new_v4();
        let (outline, lessons, quiz) = course_with_quiz(1, true);
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        progress.complete_lesson(user, lessons[0]).await;
        progress.record_attempt(user, quiz.unwrap(), true, Some(Utc::now())).await;

        let issuer = CertificateIssuer::new(
            catalog,
            progress,
            enrollments,
            certificates.clone(),
            Arc::new(FailingRenderer),
            CertificateConfig::default(),
        );
        let err = issuer.evaluate_and_issue(user, course_id).await.unwrap_err();
        assert!(matches!(err, CertificationError::Render(RenderError(_))));
        assert_eq!(certificates.count().await, 0);
    }

    #[tokio::test]
    async fn expiry_follows_course_policy_from_completion_instant() {
        let user = Uuid::new_v4();
        let (mut outline, lessons, quiz) = course_with_quiz(1, true);
        outline.expiry_policy = ExpiryPolicy::PeriodDays { days: 30 };
        let course_id = outline.course_id;

        let catalog = Arc::new(MemoryCatalog::with(outline));
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        enrollments.enroll(user, course_id).await;
        progress.complete_lesson(user, lessons[0]).await;
        progress.record_attempt(user, quiz.unwrap(), true, Some(Utc::now())).await;

        let issuer = issuer(catalog, progress, enrollments.clone(), certificates.clone());
        issuer.evaluate_and_issue(user, course_id).await.unwrap();

        let cert = certificates
            .find_by_user_course_direct(user, course_id)
            .await
            .unwrap();
        let completed = enrollments.completed_at(user, course_id).await.unwrap();
        assert_eq!(cert.expires_at, Some(completed + Duration::days(30)));
    }

    #[tokio::test]
    async fn sequential_numbers_within_a_year() {
        let user = Uuid::new_v4();
        let certificates = Arc::new(MemoryCertificateStore::default());
        let catalog = Arc::new(MemoryCatalog::default());
        let progress = Arc::new(MemoryProgressStore::default());
        let enrollments = Arc::new(MemoryEnrollmentStore::default());

        for _ in 0..3 {
            let (outline, lessons, _) = course_with_quiz(1, false);
            let course_id = outline.course_id;
            catalog.insert(outline).await;
            enrollments.enroll(user, course_id).await;
            progress.complete_lesson(user, lessons[0]).await;
        }

        let issuer = issuer(catalog.clone(), progress, enrollments, certificates.clone());
        let mut numbers = Vec::new();
        for course_id in catalog.course_ids().await {
            let outcome = issuer.evaluate_and_issue(user, course_id).await.unwrap();
            numbers.push(outcome.certificate_number.unwrap());
        }

        let year = Utc::now().year();
        let expected: Vec<String> = (1..=3)
            .map(|seq| format_certificate_number("CERT", year, seq))
            .collect();
        numbers.sort();
        assert_eq!(numbers, expected);
    }
}
