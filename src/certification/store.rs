//! Store contracts consumed by the certification core, and their diesel
//! implementations.
//!
//! The traits are the seam the engines are tested through; the diesel types
//! below are the production wiring. Uniqueness of (user, course) on
//! certificates and (user, level) on achievements is enforced by database
//! constraints, surfaced here as [`StoreError::UniqueViolation`] so the
//! engines can resolve check-then-act races.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::certification::access::AccessRule;
use crate::certification::types::{
    AchievementDraft, Certificate, CertificateDraft, CertificationLevel, CourseOutline,
    EnrollmentState, LevelDefinition, ModuleOutline, NewLevelDefinition, QuizAttemptSummary,
    QuizRequirement, UserCertificationLevel,
};
use crate::learn::types::{Course, CourseModule, Enrollment, LessonProgress, QuizAttempt};
use crate::shared::schema::{
    certificates, certification_level_courses, certification_level_rules, certification_levels,
    learn_courses, learn_enrollments, learn_lesson_progress, learn_lessons, learn_modules,
    learn_quiz_attempts, learn_quizzes, user_certification_levels, user_group_members,
};
use crate::shared::utils::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                StoreError::UniqueViolation
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

fn pool_err(e: diesel::r2d2::PoolError) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// `[Jan 1 of year, Jan 1 of year+1)` — the window certificate numbering is
/// scoped to.
pub fn year_bounds(year: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .expect("jan 1 exists in every year");
    let end = Utc
        .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
        .single()
        .expect("jan 1 exists in every year");
    (start, end)
}

// ============================================================================
// CONTRACTS
// ============================================================================

/// Read access to the course content graph and its snapshot fields.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn course_outline(&self, course_id: Uuid) -> Result<Option<CourseOutline>, StoreError>;
}

/// Per-user lesson completion and quiz pass state.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn lesson_completed(&self, user_id: Uuid, lesson_id: Uuid) -> Result<bool, StoreError>;
    async fn quiz_best_attempt(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<QuizAttemptSummary>, StoreError>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn find(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<EnrollmentState>, StoreError>;

    /// Stamp the enrollment's completion instant if it has none yet and
    /// return the effective (first) completion instant. First completion
    /// wins; a later call never overwrites.
    async fn complete_if_unset(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError>;
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_by_user_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Certificate>, StoreError>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Certificate>, StoreError>;
    async fn count_issued_in_year(&self, year: i32) -> Result<i64, StoreError>;
    async fn create(&self, draft: CertificateDraft) -> Result<Certificate, StoreError>;
}

#[async_trait]
pub trait LevelStore: Send + Sync {
    async fn load_definitions(&self) -> Result<Vec<LevelDefinition>, StoreError>;
    async fn find_definition(
        &self,
        level_id: Uuid,
    ) -> Result<Option<LevelDefinition>, StoreError>;
    async fn create_level(&self, new: NewLevelDefinition) -> Result<LevelDefinition, StoreError>;
    async fn delete_level(&self, level_id: Uuid) -> Result<(), StoreError>;

    async fn find_achievement(
        &self,
        user_id: Uuid,
        level_id: Uuid,
    ) -> Result<Option<UserCertificationLevel>, StoreError>;
    async fn list_achievements(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserCertificationLevel>, StoreError>;
    async fn count_achieved_in_year(&self, year: i32) -> Result<i64, StoreError>;
    async fn create_achievement(
        &self,
        draft: AchievementDraft,
    ) -> Result<UserCertificationLevel, StoreError>;
    async fn set_validity(&self, achievement_id: Uuid, is_valid: bool) -> Result<(), StoreError>;
}

#[async_trait]
pub trait GroupMembershipLookup: Send + Sync {
    async fn group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}

// ============================================================================
// DIESEL IMPLEMENTATIONS
// ============================================================================

pub struct DieselCourseCatalog {
    db: DbPool,
}

impl DieselCourseCatalog {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CourseCatalog for DieselCourseCatalog {
    async fn course_outline(&self, course_id: Uuid) -> Result<Option<CourseOutline>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;

        let course: Option<Course> = learn_courses::table
            .filter(learn_courses::id.eq(course_id))
            .first(&mut conn)
            .optional()?;
        let Some(course) = course else {
            return Ok(None);
        };

        let modules: Vec<CourseModule> = learn_modules::table
            .filter(learn_modules::course_id.eq(course_id))
            .order(learn_modules::position.asc())
            .load(&mut conn)?;

        let mut outline_modules = Vec::with_capacity(modules.len());
        for module in modules {
            let lesson_ids: Vec<Uuid> = learn_lessons::table
                .filter(learn_lessons::module_id.eq(module.id))
                .order(learn_lessons::position.asc())
                .select(learn_lessons::id)
                .load(&mut conn)?;

            let quiz: Option<(Uuid, bool)> = learn_quizzes::table
                .filter(learn_quizzes::module_id.eq(module.id))
                .select((learn_quizzes::id, learn_quizzes::is_required))
                .first(&mut conn)
                .optional()?;

            outline_modules.push(ModuleOutline {
                module_id: module.id,
                lesson_ids,
                quiz: quiz.map(|(quiz_id, is_required)| QuizRequirement {
                    quiz_id,
                    is_required,
                }),
            });
        }

        Ok(Some(CourseOutline {
            course_id,
            title: course.title.clone(),
            description: course.description.clone(),
            instructor_name: course.instructor_name.clone(),
            expiry_policy: course.expiry_policy(),
            modules: outline_modules,
        }))
    }
}

pub struct DieselProgressStore {
    db: DbPool,
}

impl DieselProgressStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProgressStore for DieselProgressStore {
    async fn lesson_completed(&self, user_id: Uuid, lesson_id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        // A lesson with no progress record counts as incomplete.
        let progress: Option<LessonProgress> = learn_lesson_progress::table
            .filter(learn_lesson_progress::user_id.eq(user_id))
            .filter(learn_lesson_progress::lesson_id.eq(lesson_id))
            .first(&mut conn)
            .optional()?;
        Ok(progress.map(|p| p.completed).unwrap_or(false))
    }

    async fn quiz_best_attempt(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<QuizAttemptSummary>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;

        let passed: Option<QuizAttempt> = learn_quiz_attempts::table
            .filter(learn_quiz_attempts::user_id.eq(user_id))
            .filter(learn_quiz_attempts::quiz_id.eq(quiz_id))
            .filter(learn_quiz_attempts::passed.eq(true))
            .filter(learn_quiz_attempts::completed_at.is_not_null())
            .order(learn_quiz_attempts::completed_at.desc())
            .first(&mut conn)
            .optional()?;
        if let Some(attempt) = passed {
            return Ok(Some(QuizAttemptSummary {
                passed: true,
                completed_at: attempt.completed_at,
            }));
        }

        let latest: Option<QuizAttempt> = learn_quiz_attempts::table
            .filter(learn_quiz_attempts::user_id.eq(user_id))
            .filter(learn_quiz_attempts::quiz_id.eq(quiz_id))
            .order(learn_quiz_attempts::started_at.desc())
            .first(&mut conn)
            .optional()?;
        Ok(latest.map(|attempt| QuizAttemptSummary {
            passed: attempt.passed,
            completed_at: attempt.completed_at,
        }))
    }
}

pub struct DieselEnrollmentStore {
    db: DbPool,
}

impl DieselEnrollmentStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EnrollmentStore for DieselEnrollmentStore {
    async fn find(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<EnrollmentState>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        let enrollment: Option<Enrollment> = learn_enrollments::table
            .filter(learn_enrollments::user_id.eq(user_id))
            .filter(learn_enrollments::course_id.eq(course_id))
            .first(&mut conn)
            .optional()?;
        Ok(enrollment.map(|e| EnrollmentState {
            enrolled_at: e.enrolled_at,
            completed_at: e.completed_at,
        }))
    }

    async fn complete_if_unset(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        // The null filter makes the stamp first-wins even under concurrent
        // completion evaluations.
        diesel::update(
            learn_enrollments::table
                .filter(learn_enrollments::user_id.eq(user_id))
                .filter(learn_enrollments::course_id.eq(course_id))
                .filter(learn_enrollments::completed_at.is_null()),
        )
        .set(learn_enrollments::completed_at.eq(Some(at)))
        .execute(&mut conn)?;

        let enrollment: Enrollment = learn_enrollments::table
            .filter(learn_enrollments::user_id.eq(user_id))
            .filter(learn_enrollments::course_id.eq(course_id))
            .first(&mut conn)?;
        Ok(enrollment.completed_at.unwrap_or(at))
    }
}

pub struct DieselCertificateStore {
    db: DbPool,
}

impl DieselCertificateStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CertificateStore for DieselCertificateStore {
    async fn find_by_user_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Certificate>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        Ok(certificates::table
            .filter(certificates::user_id.eq(user_id))
            .filter(certificates::course_id.eq(course_id))
            .first(&mut conn)
            .optional()?)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Certificate>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        Ok(certificates::table
            .filter(certificates::user_id.eq(user_id))
            .order(certificates::issued_at.desc())
            .load(&mut conn)?)
    }

    async fn count_issued_in_year(&self, year: i32) -> Result<i64, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        let (start, end) = year_bounds(year);
        Ok(certificates::table
            .filter(certificates::issued_at.ge(start))
            .filter(certificates::issued_at.lt(end))
            .count()
            .get_result(&mut conn)?)
    }

    async fn create(&self, draft: CertificateDraft) -> Result<Certificate, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
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
        diesel::insert_into(certificates::table)
            .values(&cert)
            .execute(&mut conn)?;
        Ok(cert)
    }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = certification_level_rules)]
struct LevelRuleRow {
    id: Uuid,
    level_id: Uuid,
    rule_kind: String,
    group_id: Option<Uuid>,
    user_id: Option<Uuid>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = certification_level_courses)]
struct LevelCourseRow {
    id: Uuid,
    level_id: Uuid,
    course_id: Uuid,
    position: i32,
}

pub struct DieselLevelStore {
    db: DbPool,
}

impl DieselLevelStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn definition_for(
        conn: &mut PgConnection,
        level: CertificationLevel,
    ) -> Result<LevelDefinition, diesel::result::Error> {
        let rule_rows: Vec<LevelRuleRow> = certification_level_rules::table
            .filter(certification_level_rules::level_id.eq(level.id))
            .load(conn)?;
        let rules = rule_rows
            .iter()
            .filter_map(|row| {
                let decoded = AccessRule::from_row(&row.rule_kind, row.group_id, row.user_id);
                if decoded.is_none() {
                    log::warn!(
                        "skipping malformed access rule {} on level {}",
                        row.id,
                        level.id
                    );
                }
                decoded
            })
            .collect();

        let required_courses: Vec<Uuid> = certification_level_courses::table
            .filter(certification_level_courses::level_id.eq(level.id))
            .order(certification_level_courses::position.asc())
            .select(certification_level_courses::course_id)
            .load(conn)?;

        Ok(LevelDefinition {
            level,
            rules,
            required_courses,
        })
    }
}

#[async_trait]
impl LevelStore for DieselLevelStore {
    async fn load_definitions(&self) -> Result<Vec<LevelDefinition>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        let levels: Vec<CertificationLevel> = certification_levels::table
            .order(certification_levels::created_at.asc())
            .load(&mut conn)?;
        let mut definitions = Vec::with_capacity(levels.len());
        for level in levels {
            definitions.push(Self::definition_for(&mut conn, level)?);
        }
        Ok(definitions)
    }

    async fn find_definition(
        &self,
        level_id: Uuid,
    ) -> Result<Option<LevelDefinition>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        let level: Option<CertificationLevel> = certification_levels::table
            .filter(certification_levels::id.eq(level_id))
            .first(&mut conn)
            .optional()?;
        match level {
            Some(level) => Ok(Some(Self::definition_for(&mut conn, level)?)),
            None => Ok(None),
        }
    }

    async fn create_level(&self, new: NewLevelDefinition) -> Result<LevelDefinition, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        let now = Utc::now();
        let (expiry_mode, expiry_value, expiry_fixed_at) = new.expiry_policy.as_columns();
        let level = CertificationLevel {
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
        };

        let rules = new.rules;
        let required_courses = new.required_courses;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(certification_levels::table)
                .values(&level)
                .execute(conn)?;
            for rule in &rules {
                let (rule_kind, group_id, user_id) = rule.as_row();
                diesel::insert_into(certification_level_rules::table)
                    .values(&LevelRuleRow {
                        id: Uuid::new_v4(),
                        level_id: level.id,
                        rule_kind: rule_kind.to_string(),
                        group_id,
                        user_id,
                    })
                    .execute(conn)?;
            }
            for (position, course_id) in required_courses.iter().enumerate() {
                diesel::insert_into(certification_level_courses::table)
                    .values(&LevelCourseRow {
                        id: Uuid::new_v4(),
                        level_id: level.id,
                        course_id: *course_id,
                        position: position as i32,
                    })
                    .execute(conn)?;
            }
            Ok(())
        })?;

        Ok(LevelDefinition {
            level,
            rules,
            required_courses,
        })
    }

    async fn delete_level(&self, level_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        // Achievements are historical user records and stay untouched.
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(
                certification_level_rules::table
                    .filter(certification_level_rules::level_id.eq(level_id)),
            )
            .execute(conn)?;
            diesel::delete(
                certification_level_courses::table
                    .filter(certification_level_courses::level_id.eq(level_id)),
            )
            .execute(conn)?;
            diesel::delete(
                certification_levels::table.filter(certification_levels::id.eq(level_id)),
            )
            .execute(conn)?;
            Ok(())
        })?;
        Ok(())
    }

    async fn find_achievement(
        &self,
        user_id: Uuid,
        level_id: Uuid,
    ) -> Result<Option<UserCertificationLevel>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        Ok(user_certification_levels::table
            .filter(user_certification_levels::user_id.eq(user_id))
            .filter(user_certification_levels::level_id.eq(level_id))
            .first(&mut conn)
            .optional()?)
    }

    async fn list_achievements(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserCertificationLevel>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        Ok(user_certification_levels::table
            .filter(user_certification_levels::user_id.eq(user_id))
            .order(user_certification_levels::achieved_at.desc())
            .load(&mut conn)?)
    }

    async fn count_achieved_in_year(&self, year: i32) -> Result<i64, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        let (start, end) = year_bounds(year);
        Ok(user_certification_levels::table
            .filter(user_certification_levels::achieved_at.ge(start))
            .filter(user_certification_levels::achieved_at.lt(end))
            .count()
            .get_result(&mut conn)?)
    }

    async fn create_achievement(
        &self,
        draft: AchievementDraft,
    ) -> Result<UserCertificationLevel, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
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
        diesel::insert_into(user_certification_levels::table)
            .values(&achievement)
            .execute(&mut conn)?;
        Ok(achievement)
    }

    async fn set_validity(&self, achievement_id: Uuid, is_valid: bool) -> Result<(), StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        diesel::update(
            user_certification_levels::table
                .filter(user_certification_levels::id.eq(achievement_id)),
        )
        .set(user_certification_levels::is_valid.eq(is_valid))
        .execute(&mut conn)?;
        Ok(())
    }
}

pub struct DieselGroupLookup {
    db: DbPool,
}

impl DieselGroupLookup {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GroupMembershipLookup for DieselGroupLookup {
    async fn group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let mut conn = self.db.get().map_err(pool_err)?;
        Ok(user_group_members::table
            .filter(user_group_members::user_id.eq(user_id))
            .select(user_group_members::group_id)
            .load(&mut conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_bounds_cover_a_full_calendar_year() {
        let (start, end) = year_bounds(2026);
        assert_eq!(start.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2027-01-01T00:00:00+00:00");
    }
}
