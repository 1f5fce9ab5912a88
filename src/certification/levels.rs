//! Certification level accessibility, eligibility and the explicit unlock.
//!
//! Unlocking is a user-initiated action. Eligibility is detected and surfaced
//! so the UI can offer the unlock, but a level is never awarded
//! automatically.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::certification::access::any_rule_matches;
use crate::certification::error::CertificationError;
use crate::certification::expiry::compute_expiry;
use crate::certification::render::{CertificateRenderer, LevelCertificateData};
use crate::certification::store::{
    CertificateStore, GroupMembershipLookup, LevelStore, StoreError,
};
use crate::certification::types::{
    format_certificate_number, AchievementDraft, LevelDefinition, UserCertificationLevel,
};
use crate::config::CertificateConfig;

const NUMBER_ALLOCATION_ATTEMPTS: u32 = 3;

/// What a user sees for one accessible level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelView {
    pub level_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub required_courses: Vec<Uuid>,
    pub achieved: bool,
    /// True only while the level is achievable right now: accessible, not yet
    /// achieved, and every required course certificate currently valid.
    pub eligible: bool,
    pub missing_courses: Vec<Uuid>,
    pub achieved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_valid: Option<bool>,
    pub certificate_number: Option<String>,
}

pub struct LevelEvaluator {
    levels: Arc<dyn LevelStore>,
    certificates: Arc<dyn CertificateStore>,
    groups: Arc<dyn GroupMembershipLookup>,
    renderer: Arc<dyn CertificateRenderer>,
    config: CertificateConfig,
}

impl LevelEvaluator {
    pub fn new(
        levels: Arc<dyn LevelStore>,
        certificates: Arc<dyn CertificateStore>,
        groups: Arc<dyn GroupMembershipLookup>,
        renderer: Arc<dyn CertificateRenderer>,
        config: CertificateConfig,
    ) -> Self {
        Self {
            levels,
            certificates,
            groups,
            renderer,
            config,
        }
    }

    /// Levels the user can see: active and matched by at least one access
    /// rule. Eligibility is recomputed live on every call.
    pub async fn list_accessible(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<LevelView>, CertificationError> {
        let group_ids = self.groups.group_ids(user_id).await?;
        let mut views = Vec::new();
        for definition in self.levels.load_definitions().await? {
            if !definition.level.is_active
                || !any_rule_matches(&definition.rules, user_id, &group_ids)
            {
                continue;
            }
            let achievement = self
                .levels
                .find_achievement(user_id, definition.level.id)
                .await?;
            let (eligible, missing_courses) = if achievement.is_some() {
                (false, Vec::new())
            } else {
                self.eligibility(user_id, &definition).await?
            };
            views.push(LevelView {
                level_id: definition.level.id,
                name: definition.level.name.clone(),
                description: definition.level.description.clone(),
                required_courses: definition.required_courses.clone(),
                achieved: achievement.is_some(),
                eligible,
                missing_courses,
                achieved_at: achievement.as_ref().map(|a| a.achieved_at),
                expires_at: achievement.as_ref().and_then(|a| a.expires_at),
                is_valid: achievement.as_ref().map(|a| a.is_valid),
                certificate_number: achievement.and_then(|a| a.certificate_number),
            });
        }
        Ok(views)
    }

    /// Explicitly convert eligibility into an achievement. Never called
    /// automatically on certificate issuance.
    pub async fn unlock(
        &self,
        user_id: Uuid,
        level_id: Uuid,
        custom_text: Option<String>,
    ) -> Result<UserCertificationLevel, CertificationError> {
        let definition = self
            .levels
            .find_definition(level_id)
            .await?
            .ok_or(CertificationError::UnknownLevel)?;

        if self.levels.find_achievement(user_id, level_id).await?.is_some() {
            return Err(CertificationError::AlreadyAchieved);
        }

        // Re-checked at unlock time: access may have been revoked between
        // page load and click.
        let group_ids = self.groups.group_ids(user_id).await?;
        if !definition.level.is_active
            || !any_rule_matches(&definition.rules, user_id, &group_ids)
        {
            return Err(CertificationError::NotAccessible);
        }

        let (eligible, _) = self.eligibility(user_id, &definition).await?;
        if !eligible {
            return Err(CertificationError::NotEligible);
        }

        let achieved_at = Utc::now();
        let expires_at = compute_expiry(&definition.level.expiry_policy(), achieved_at);

        for _ in 0..NUMBER_ALLOCATION_ATTEMPTS {
            let year = achieved_at.year();
            let seq = self.levels.count_achieved_in_year(year).await? + 1;
            let number = format_certificate_number(&self.config.level_prefix, year, seq);

            let artifact = self
                .renderer
                .render_level(&LevelCertificateData {
                    user_id,
                    number: number.clone(),
                    level_name: definition.level.name.clone(),
                    site_title: self.config.site_title.clone(),
                    achieved_at,
                    expires_at,
                    custom_text: custom_text.clone(),
                })
                .await?;

            let draft = AchievementDraft {
                user_id,
                level_id,
                achieved_at,
                expires_at,
                certificate_number: Some(number),
                custom_text: custom_text.clone(),
                artifact: Some(artifact),
            };

            match self.levels.create_achievement(draft).await {
                Ok(achievement) => {
                    log::info!(
                        "user {} unlocked certification level {} ({})",
                        user_id,
                        definition.level.name,
                        level_id
                    );
                    return Ok(achievement);
                }
                Err(StoreError::UniqueViolation) => {
                    if self
                        .levels
                        .find_achievement(user_id, level_id)
                        .await?
                        .is_some()
                    {
                        return Err(CertificationError::AlreadyAchieved);
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Backend(
            "level certificate number allocation kept colliding".to_string(),
        )
        .into())
    }

    /// Log-only scan used as the post-issuance notification target.
    pub async fn refresh_eligibility(&self, user_id: Uuid) -> Result<(), CertificationError> {
        for view in self.list_accessible(user_id).await? {
            if view.eligible {
                log::info!(
                    "user {} is eligible to unlock certification level {} ({})",
                    user_id,
                    view.name,
                    view.level_id
                );
            }
        }
        Ok(())
    }

    /// Every required course must hold a currently valid certificate. A level
    /// without required courses is never eligible.
    async fn eligibility(
        &self,
        user_id: Uuid,
        definition: &LevelDefinition,
    ) -> Result<(bool, Vec<Uuid>), CertificationError> {
        if definition.required_courses.is_empty() {
            return Ok((false, Vec::new()));
        }
        let now = Utc::now();
        let mut missing = Vec::new();
        for course_id in &definition.required_courses {
            let valid = match self
                .certificates
                .find_by_user_course(user_id, *course_id)
                .await?
            {
                Some(cert) => cert.is_valid_at(now),
                None => false,
            };
            if !valid {
                missing.push(*course_id);
            }
        }
        Ok((missing.is_empty(), missing))
    }
}
