//! In-memory store and renderer implementations used by unit and
//! integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::certification::access::AccessRule;
use crate::certification::expiry::ExpiryPolicy;
use crate::certification::render::{
    CertificateRenderer, CourseCertificateData, LevelCertificateData, RenderError,
};
use crate::certification::store::{
    CertificateStore, CourseCatalog, EnrollmentStore, GroupMembershipLookup, LevelStore,
    ProgressStore, StoreError,
};
use crate::certification::types::{
    AchievementDraft, Certificate, CertificateDraft, CertificationLevel, CourseOutline,
    EnrollmentState, LevelDefinition, ModuleOutline, NewLevelDefinition, QuizAttemptSummary,
    QuizRequirement, UserCertificationLevel,
};

// ----- Builders -----

/// One-module course with `lessons` lessons and a quiz with the given
/// required flag. Returns the outline, the lesson ids and the quiz id.
pub fn course_with_quiz(
    lessons: usize,
    quiz_required: bool,
) -> (CourseOutline, Vec<Uuid>, Option<Uuid>) {
    let lesson_ids: Vec<Uuid> = (0..lessons).map(|_| Uuid::new_v4()).collect();
    let quiz_id = Uuid::new_v4();
    let outline = CourseOutline {
        course_id: Uuid::new_v4(),
        title: "Test Course".to_string(),
        description: Some("A course used in tests".to_string()),
        instructor_name: "Test Instructor".to_string(),
        expiry_policy: ExpiryPolicy::Never,
        modules: vec![ModuleOutline {
            module_id: Uuid::new_v4(),
            lesson_ids: lesson_ids.clone(),
            quiz: Some(QuizRequirement {
                quiz_id,
                is_required: quiz_required,
            }),
        }],
    };
    (outline, lesson_ids, Some(quiz_id))
}

/// Active, never-expiring level definition.
pub fn level_definition(
    name: &str,
    rules: Vec<AccessRule>,
    required_courses: Vec<Uuid>,
) -> LevelDefinition {
    let now = Utc::now();
    LevelDefinition {
        level: CertificationLevel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            is_active: true,
            visible_from: None,
            visible_until: None,
            expiry_mode: "never".to_string(),
            expiry_value: None,
            expiry_fixed_at: None,
            created_at: now,
            updated_at: now,
        },
        rules,
        required_courses,
    }
}

/// Certificate draft with a unique number, suitable for seeding stores.
pub fn certificate_for(
    user_id: Uuid,
    course_id: Uuid,
    expires_at: Option<DateTime<Utc>>,
) -> CertificateDraft {
    let now = Utc::now();
    CertificateDraft {
        user_id,
        course_id,
        number: format!("SEED-{}", Uuid::new_v4()),
        course_title: "Seeded Course".to_string(),
        course_description: None,
        instructor_name: "Seeded Instructor".to_string(),
        completed_at: now,
        issued_at: now,
        expires_at,
        artifact: b"seeded artifact".to_vec(),
    }
}

/// Valid, never-expiring achievement row.
pub fn achievement_for(user_id: Uuid, level_id: Uuid) -> UserCertificationLevel {
    UserCertificationLevel {
        id: Uuid::new_v4(),
        user_id,
        level_id,
        achieved_at: Utc::now(),
        expires_at: None,
        is_valid: true,
        certificate_number: None,
        custom_text: None,
        artifact: None,
    }
}

// ----- Renderers -----

pub struct StaticRenderer;

#[async_trait]
impl CertificateRenderer for StaticRenderer {
    async fn render_course(&self, _data: &CourseCertificateData) -> Result<Vec<u8>, RenderError> {
        Ok(b"course certificate artifact".to_vec())
    }

    async fn render_level(&self, _data: &LevelCertificateData) -> Result<Vec<u8>, RenderError> {
        Ok(b"level certificate artifact".to_vec())
    }
}

pub struct FailingRenderer;

#[async_trait]
impl CertificateRenderer for FailingRenderer {
    async fn render_course(&self, _data: &CourseCertificateData) -> Result<Vec<u8>, RenderError> {
        Err(RenderError("renderer unavailable".to_string()))
    }

    async fn render_level(&self, _data: &LevelCertificateData) -> Result<Vec<u8>, RenderError> {
        Err(RenderError("renderer unavailable".to_string()))
    }
}

// ----- Catalog -----

#[derive(Default)]
pub struct MemoryCatalog {
    courses: RwLock<HashMap<Uuid, CourseOutline>>,
}

impl MemoryCatalog {
    pub fn with(outline: CourseOutline) -> Self {
        let catalog = Self::default();
        catalog
            .courses
            .try_write()
            .expect("fresh lock")
            .insert(outline.course_id, outline);
        catalog
    }

    pub async fn insert(&self, outline: CourseOutline) {
        self.courses.write().await.insert(outline.course_id, outline);
    }

    pub async fn course_ids(&self) -> Vec<Uuid> {
        self.courses.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl CourseCatalog for MemoryCatalog {
    async fn course_outline(&self, course_id: Uuid) -> Result<Option<CourseOutline>, StoreError> {
        Ok(self.courses.read().await.get(&course_id).cloned())
    }
}

// ----- Progress -----

#[derive(Default)]
pub struct MemoryProgressStore {
    completed_lessons: RwLock<HashSet<(Uuid, Uuid)>>,
    attempts: RwLock<HashMap<(Uuid, Uuid), QuizAttemptSummary>>,
}

impl MemoryProgressStore {
    pub async fn complete_lesson(&self, user_id: Uuid, lesson_id: Uuid) {
        self.completed_lessons
            .write()
            .await
            .insert((user_id, lesson_id));
    }

    /// Record an attempt, keeping a completed pass as the best attempt.
    pub async fn record_attempt(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        passed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) {
        let mut attempts = self.attempts.write().await;
        let key = (user_id, quiz_id);
        let keep_existing = attempts
            .get(&key)
            .map(|a| a.passed && a.completed_at.is_some())
            .unwrap_or(false);
        if !keep_existing {
            attempts.insert(
                key,
                QuizAttemptSummary {
                    passed,
                    completed_at,
                },
            );
        }
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn lesson_completed(&self, user_id: Uuid, lesson_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .completed_lessons
            .read()
            .await
            .contains(&(user_id, lesson_id)))
    }

    async fn quiz_best_attempt(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<QuizAttemptSummary>, StoreError> {
        Ok(self.attempts.read().await.get(&(user_id, quiz_id)).copied())
    }
}

// ----- Enrollments -----

#[derive(Default)]
pub struct MemoryEnrollmentStore {
    rows: RwLock<HashMap<(Uuid, Uuid), EnrollmentState>>,
}

impl MemoryEnrollmentStore {
    pub async fn enroll(&self, user_id: Uuid, course_id: Uuid) {
        self.rows.write().await.insert(
            (user_id, course_id),
            EnrollmentState {
                enrolled_at: Utc::now(),
                completed_at: None,
            },
        );
    }

    pub async fn stamp_completion(&self, user_id: Uuid, course_id: Uuid, at: DateTime<Utc>) {
        if let Some(row) = self.rows.write().await.get_mut(&(user_id, course_id)) {
            row.completed_at = Some(at);
        }
    }

    pub async fn completed_at(&self, user_id: Uuid, course_id: Uuid) -> Option<DateTime<Utc>> {
        self.rows
            .read()
            .await
            .get(&(user_id, course_id))
            .and_then(|row| row.completed_at)
    }
}

#[async_trait]
impl EnrollmentStore for MemoryEnrollmentStore {
    async fn find(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<EnrollmentState>, StoreError> {
        Ok(self.rows.read().await.get(&(user_id, course_id)).copied())
    }

    async fn complete_if_unset(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&(user_id, course_id))
            .ok_or_else(|| StoreError::Backend("enrollment not found".to_string()))?;
        if row.completed_at.is_none() {
            row.completed_at = Some(at);
        }
        Ok(row.completed_at.unwrap_or(at))
    }
}

// ----- Certificates -----

#[derive(Default)]
pub struct MemoryCertificateStore {
    rows: RwLock<Vec<Certificate>>,
}

impl MemoryCertificateStore {
    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn find_by_user_course_direct(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Option<Certificate> {
        self.rows
            .read()
            .await
            .iter()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
            .cloned()
    }

    /// Simulate certificate renewal by moving its expiry.
    pub async fn set_expiry(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let mut rows = self.rows.write().await;
        if let Some(cert) = rows
            .iter_mut()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
        {
            cert.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn find_by_user_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Certificate>, StoreError> {
        Ok(self.find_by_user_course_direct(user_id, course_id).await)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Certificate>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_issued_in_year(&self, year: i32) -> Result<i64, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|c| c.issued_at.year() == year)
            .count() as i64)
    }

    async fn create(&self, draft: CertificateDraft) -> Result<Certificate, StoreError> {
        let mut rows = self.rows.write().await;
        // Mirrors the two unique indexes on the certificates table.
        if rows
            .iter()
            .any(|c| c.user_id == draft.user_id && c.course_id == draft.course_id)
        {
            return Err(StoreError::UniqueViolation);
        }
        if rows.iter().any(|c| c.number == draft.number) {
            return Err(StoreError::UniqueViolation);
        }
        let cert = Certificate {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            course_id: draft.course_id,
            number: draft.number,
            course_title: draft.course_title,
            course_description: draft.course_description,
            instructor_name: draft.instructor_name,
            completed_at: draft.completed_at,
            issued_at: draft.issued_at,
            expires_at: draft.expires_at,
            artifact: draft.artifact,
        };
        rows.push(cert.clone());
        Ok(cert)
    }
}

// ----- Levels -----

#[derive(Default)]
pub struct MemoryLevelStore {
    definitions: RwLock<Vec<LevelDefinition>>,
    achievements: RwLock<Vec<UserCertificationLevel>>,
    validity_writes: RwLock<usize>,
}

impl MemoryLevelStore {
    pub async fn add_definition(&self, definition: LevelDefinition) {
        self.definitions.write().await.push(definition);
    }

    pub async fn add_achievement(&self, achievement: UserCertificationLevel) {
        self.achievements.write().await.push(achievement);
    }

    pub async fn achievement_count(&self) -> usize {
        self.achievements.read().await.len()
    }

    pub async fn validity_write_count(&self) -> usize {
        *self.validity_writes.read().await
    }
}

#[async_trait]
impl LevelStore for MemoryLevelStore {
    async fn load_definitions(&self) -> Result<Vec<LevelDefinition>, StoreError> {
        Ok(self.definitions.read().await.clone())
    }

    async fn find_definition(
        &self,
        level_id: Uuid,
    ) -> Result<Option<LevelDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .await
            .iter()
            .find(|d| d.level.id == level_id)
            .cloned())
    }

    async fn create_level(&self, new: NewLevelDefinition) -> Result<LevelDefinition, StoreError> {
        let now = Utc::now();
        let (expiry_mode, expiry_value, expiry_fixed_at) = new.expiry_policy.as_columns();
        let definition = LevelDefinition {
            level: CertificationLevel {
                id: Uuid::new_v4(),
                name: new.name,
                description: new.description,
                is_active: new.is_active,
                visible_from: new.visible_from,
                visible_until: new.visible_until,
                expiry_mode: expiry_mode.to_string(),
                expiry_value,
                expiry_fixed_at,
                created_at: now,
                updated_at: now,
            },
            rules: new.rules,
            required_courses: new.required_courses,
        };
        self.definitions.write().await.push(definition.clone());
        Ok(definition)
    }

    async fn delete_level(&self, level_id: Uuid) -> Result<(), StoreError> {
        self.definitions
            .write()
            .await
            .retain(|d| d.level.id != level_id);
        Ok(())
    }

    async fn find_achievement(
        &self,
        user_id: Uuid,
        level_id: Uuid,
    ) -> Result<Option<UserCertificationLevel>, StoreError> {
        Ok(self
            .achievements
            .read()
            .await
            .iter()
            .find(|a| a.user_id == user_id && a.level_id == level_id)
            .cloned())
    }

    async fn list_achievements(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserCertificationLevel>, StoreError> {
        Ok(self
            .achievements
            .read()
            .await
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_achieved_in_year(&self, year: i32) -> Result<i64, StoreError> {
        Ok(self
            .achievements
            .read()
            .await
            .iter()
            .filter(|a| a.achieved_at.year() == year)
            .count() as i64)
    }

    async fn create_achievement(
        &self,
        draft: AchievementDraft,
    ) -> Result<UserCertificationLevel, StoreError> {
        let mut achievements = self.achievements.write().await;
        if achievements
            .iter()
            .any(|a| a.user_id == draft.user_id && a.level_id == draft.level_id)
        {
            return Err(StoreError::UniqueViolation);
        }
        if let Some(number) = &draft.certificate_number {
            if achievements
                .iter()
                .any(|a| a.certificate_number.as_ref() == Some(number))
            {
                return Err(StoreError::UniqueViolation);
            }
        }
        let achievement = UserCertificationLevel {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            level_id: draft.level_id,
            achieved_at: draft.achieved_at,
            expires_at: draft.expires_at,
            is_valid: true,
            certificate_number: draft.certificate_number,
            custom_text: draft.custom_text,
            artifact: draft.artifact,
        };
        achievements.push(achievement.clone());
        Ok(achievement)
    }

    async fn set_validity(&self, achievement_id: Uuid, is_valid: bool) -> Result<(), StoreError> {
        let mut achievements = self.achievements.write().await;
        if let Some(achievement) = achievements.iter_mut().find(|a| a.id == achievement_id) {
            achievement.is_valid = is_valid;
            *self.validity_writes.write().await += 1;
        }
        Ok(())
    }
}

// ----- Groups -----

#[derive(Default)]
pub struct MemoryGroupLookup {
    groups: RwLock<HashMap<Uuid, Vec<Uuid>>>,
}

impl MemoryGroupLookup {
    pub async fn set_groups(&self, user_id: Uuid, group_ids: Vec<Uuid>) {
        self.groups.write().await.insert(user_id, group_ids);
    }
}

#[async_trait]
impl GroupMembershipLookup for MemoryGroupLookup {
    async fn group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .groups
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}
