//! Types for the certification module.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::certification::access::AccessRule;
use crate::certification::expiry::ExpiryPolicy;
use crate::shared::schema::{certificates, certification_levels, user_certification_levels};

// ----- Certificate Models -----

/// Immutable proof of completion for one (user, course) pair.
///
/// Course title, description and instructor name are copied at issuance so
/// later course edits never change what a historical certificate says.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = certificates)]
pub struct Certificate {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub number: String,
    pub course_title: String,
    pub course_description: Option<String>,
    pub instructor_name: String,
    pub completed_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub artifact: Vec<u8>,
}

impl Certificate {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// Everything the store needs to persist a new certificate. The id is
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct CertificateDraft {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub number: String,
    pub course_title: String,
    pub course_description: Option<String>,
    pub instructor_name: String,
    pub completed_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub artifact: Vec<u8>,
}

// ----- Certification Level Models -----

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = certification_levels)]
pub struct CertificationLevel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub visible_from: Option<DateTime<Utc>>,
    pub visible_until: Option<DateTime<Utc>>,
    pub expiry_mode: String,
    pub expiry_value: Option<i32>,
    pub expiry_fixed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CertificationLevel {
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::from_columns(&self.expiry_mode, self.expiry_value, self.expiry_fixed_at)
    }
}

/// A level together with its decoded access rules and the ordered set of
/// course ids a user must hold valid certificates for.
#[derive(Debug, Clone, Serialize)]
pub struct LevelDefinition {
    pub level: CertificationLevel,
    pub rules: Vec<AccessRule>,
    pub required_courses: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLevelDefinition {
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub visible_from: Option<DateTime<Utc>>,
    pub visible_until: Option<DateTime<Utc>>,
    pub expiry_policy: ExpiryPolicy,
    pub rules: Vec<AccessRule>,
    pub required_courses: Vec<Uuid>,
}

// ----- Achievement Models -----

/// A user's achieved certification level, created only by the explicit
/// unlock operation.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = user_certification_levels)]
pub struct UserCertificationLevel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub level_id: Uuid,
    pub achieved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_valid: bool,
    pub certificate_number: Option<String>,
    pub custom_text: Option<String>,
    #[serde(skip_serializing, default)]
    pub artifact: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct AchievementDraft {
    pub user_id: Uuid,
    pub level_id: Uuid,
    pub achieved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub certificate_number: Option<String>,
    pub custom_text: Option<String>,
    pub artifact: Option<Vec<u8>>,
}

// ----- Course Outline (read contract) -----

/// The course content graph the issuer evaluates completion against.
#[derive(Debug, Clone)]
pub struct CourseOutline {
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub instructor_name: String,
    pub expiry_policy: ExpiryPolicy,
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone)]
pub struct ModuleOutline {
    pub module_id: Uuid,
    pub lesson_ids: Vec<Uuid>,
    pub quiz: Option<QuizRequirement>,
}

#[derive(Debug, Clone)]
pub struct QuizRequirement {
    pub quiz_id: Uuid,
    pub is_required: bool,
}

impl CourseOutline {
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lesson_ids.len()).sum()
    }
}

/// Pass state of a user's best attempt at a quiz.
#[derive(Debug, Clone, Copy)]
pub struct QuizAttemptSummary {
    pub passed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Enrollment state as seen by the certification core.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentState {
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ----- Numbering -----

/// Human-readable certificate number: `PREFIX-YYYY-NNNNN`, sequence scoped
/// to the calendar year of issuance. This format is an external contract.
pub fn format_certificate_number(prefix: &str, year: i32, seq: i64) -> String {
    format!("{}-{}-{:05}", prefix, year, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_format_is_zero_padded() {
        assert_eq!(format_certificate_number("CERT", 2026, 1), "CERT-2026-00001");
        assert_eq!(format_certificate_number("CERT", 2026, 42), "CERT-2026-00042");
        assert_eq!(
            format_certificate_number("LVL", 2027, 12345),
            "LVL-2027-12345"
        );
    }

    #[test]
    fn certificate_validity_follows_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let mut cert = Certificate {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            number: "CERT-2026-00001".to_string(),
            course_title: "Welding".to_string(),
            course_description: None,
            instructor_name: "Ada".to_string(),
            completed_at: now,
            issued_at: now,
            expires_at: None,
            artifact: Vec::new(),
        };
        assert!(cert.is_valid_at(now));
        cert.expires_at = Some(now - chrono::Duration::days(1));
        assert!(!cert.is_valid_at(now));
        cert.expires_at = Some(now + chrono::Duration::days(1));
        assert!(cert.is_valid_at(now));
    }
}
