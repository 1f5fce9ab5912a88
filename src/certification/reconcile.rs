//! Revalidation of achieved certification levels.
//!
//! An achieved level can stop being valid for two reasons: its own expiry
//! date passes, or one of its required course certificates lapses. Validity
//! is recomputed from scratch on every run, so a renewed certificate brings
//! the level back without any manual intervention; there is no one-way
//! revocation flag.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::certification::error::CertificationError;
use crate::certification::store::{CertificateStore, LevelStore};

pub struct ValidityReconciler {
    levels: Arc<dyn LevelStore>,
    certificates: Arc<dyn CertificateStore>,
}

impl ValidityReconciler {
    pub fn new(levels: Arc<dyn LevelStore>, certificates: Arc<dyn CertificateStore>) -> Self {
        Self {
            levels,
            certificates,
        }
    }

    /// Recompute the validity flag of every level the user has achieved.
    /// Idempotent and cheap enough to run on every dashboard load; rows are
    /// only written when the flag actually flips.
    pub async fn reconcile(&self, user_id: Uuid) -> Result<(), CertificationError> {
        let now = Utc::now();
        for achievement in self.levels.list_achievements(user_id).await? {
            let expired = achievement.expires_at.map(|at| at < now).unwrap_or(false);

            let courses_still_valid = match self
                .levels
                .find_definition(achievement.level_id)
                .await?
            {
                Some(definition) => {
                    let mut all_valid = true;
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
                            all_valid = false;
                            break;
                        }
                    }
                    all_valid
                }
                // The level definition is gone; only the achievement's own
                // expiry can invalidate it now.
                None => true,
            };

            let new_valid = !expired && courses_still_valid;
            if new_valid != achievement.is_valid {
                self.levels.set_validity(achievement.id, new_valid).await?;
                log::info!(
                    "certification level {} for user {} is now {}",
                    achievement.level_id,
                    user_id,
                    if new_valid { "valid" } else { "invalid" }
                );
            }
        }
        Ok(())
    }
}
