//! # Certification Module
//!
//! Course-completion evaluation and certification-level progression:
//! - Certificate issuance with year-scoped sequential numbers and policy
//!   driven expiry dates
//! - Certification levels composed of multiple course certificates, gated
//!   by access rules and unlocked explicitly by the user
//! - Periodic revalidation of achieved levels as certificates expire
//!
//! ## Architecture
//!
//! Follows the same patterns as the learn module:
//! - Diesel ORM behind store traits
//! - Axum handlers for HTTP routes
//! - Serde for JSON serialization
//! - UUID for unique identifiers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub mod access;
pub mod error;
pub mod expiry;
pub mod issuer;
pub mod levels;
pub mod reconcile;
pub mod render;
pub mod store;
pub mod testing;
pub mod types;

use crate::config::CertificateConfig;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;
use error::CertificationError;
use issuer::CertificateIssuer;
use levels::LevelEvaluator;
use reconcile::ValidityReconciler;
use render::CertificateRenderer;
use store::{
    CertificateStore, CourseCatalog, DieselCertificateStore, DieselCourseCatalog,
    DieselEnrollmentStore, DieselGroupLookup, DieselLevelStore, DieselProgressStore,
    EnrollmentStore, GroupMembershipLookup, LevelStore, ProgressStore,
};
use types::NewLevelDefinition;

// ============================================================================
// SERVICE WIRING
// ============================================================================

/// The certification engines wired to a concrete set of stores.
pub struct CertificationService {
    pub issuer: Arc<CertificateIssuer>,
    pub evaluator: Arc<LevelEvaluator>,
    pub reconciler: Arc<ValidityReconciler>,
    pub certificates: Arc<dyn CertificateStore>,
    pub levels: Arc<dyn LevelStore>,
}

impl CertificationService {
    pub fn new(
        db: DbPool,
        config: CertificateConfig,
        renderer: Arc<dyn CertificateRenderer>,
    ) -> Self {
        Self::with_stores(
            Arc::new(DieselCourseCatalog::new(db.clone())),
            Arc::new(DieselProgressStore::new(db.clone())),
            Arc::new(DieselEnrollmentStore::new(db.clone())),
            Arc::new(DieselCertificateStore::new(db.clone())),
            Arc::new(DieselLevelStore::new(db.clone())),
            Arc::new(DieselGroupLookup::new(db)),
            renderer,
            config,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_stores(
        catalog: Arc<dyn CourseCatalog>,
        progress: Arc<dyn ProgressStore>,
        enrollments: Arc<dyn EnrollmentStore>,
        certificates: Arc<dyn CertificateStore>,
        levels: Arc<dyn LevelStore>,
        groups: Arc<dyn GroupMembershipLookup>,
        renderer: Arc<dyn CertificateRenderer>,
        config: CertificateConfig,
    ) -> Self {
        let evaluator = Arc::new(LevelEvaluator::new(
            Arc::clone(&levels),
            Arc::clone(&certificates),
            groups,
            Arc::clone(&renderer),
            config.clone(),
        ));
        let issuer = Arc::new(
            CertificateIssuer::new(
                catalog,
                progress,
                enrollments,
                Arc::clone(&certificates),
                renderer,
                config,
            )
            .with_eligibility_refresh(Arc::clone(&evaluator)),
        );
        let reconciler = Arc::new(ValidityReconciler::new(
            Arc::clone(&levels),
            Arc::clone(&certificates),
        ));
        Self {
            issuer,
            evaluator,
            reconciler,
            certificates,
            levels,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.conn.clone(),
            state.config.certificates.clone(),
            Arc::clone(&state.renderer),
        )
    }
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UserScope {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnlockRequest {
    pub custom_text: Option<String>,
}

/// Evaluate course completion for a user, issuing a certificate when all
/// conditions are met.
pub async fn evaluate_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
) -> Result<Json<serde_json::Value>, CertificationError> {
    let service = CertificationService::from_state(&state);
    let outcome = service
        .issuer
        .evaluate_and_issue(scope.user_id, course_id)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": outcome
    })))
}

/// List a user's course certificates.
pub async fn list_certificates(
    State(state): State<Arc<AppState>>,
    Query(scope): Query<UserScope>,
) -> Result<Json<serde_json::Value>, CertificationError> {
    let service = CertificationService::from_state(&state);
    let certificates = service.certificates.list_for_user(scope.user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": certificates
    })))
}

/// List accessible certification levels. Validity of already-achieved levels
/// is reconciled opportunistically before the listing is computed.
pub async fn list_levels(
    State(state): State<Arc<AppState>>,
    Query(scope): Query<UserScope>,
) -> Result<Json<serde_json::Value>, CertificationError> {
    let service = CertificationService::from_state(&state);
    if let Err(e) = service.reconciler.reconcile(scope.user_id).await {
        log::warn!(
            "validity reconciliation on dashboard load failed for user {}: {}",
            scope.user_id,
            e
        );
    }
    let views = service.evaluator.list_accessible(scope.user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": views
    })))
}

/// Explicitly unlock an eligible certification level.
pub async fn unlock_level(
    State(state): State<Arc<AppState>>,
    Path(level_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
    Json(req): Json<UnlockRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), CertificationError> {
    let service = CertificationService::from_state(&state);
    let achievement = service
        .evaluator
        .unlock(scope.user_id, level_id, req.custom_text)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": achievement
        })),
    ))
}

/// Recompute validity flags for a user's achieved levels.
pub async fn reconcile_validity(
    State(state): State<Arc<AppState>>,
    Query(scope): Query<UserScope>,
) -> Result<Json<serde_json::Value>, CertificationError> {
    let service = CertificationService::from_state(&state);
    service.reconciler.reconcile(scope.user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Validity reconciled"
    })))
}

/// Create a certification level with its rules and required courses.
pub async fn create_level(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewLevelDefinition>,
) -> Result<(StatusCode, Json<serde_json::Value>), CertificationError> {
    let service = CertificationService::from_state(&state);
    let definition = service.levels.create_level(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": definition
        })),
    ))
}

/// List all level definitions, including inactive ones.
pub async fn list_level_definitions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, CertificationError> {
    let service = CertificationService::from_state(&state);
    let definitions = service.levels.load_definitions().await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": definitions
    })))
}

/// Delete a level definition. Achieved levels stay as historical records.
pub async fn delete_level(
    State(state): State<Arc<AppState>>,
    Path(level_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CertificationError> {
    let service = CertificationService::from_state(&state);
    service.levels.delete_level(level_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Level deleted"
    })))
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure all certification module routes.
pub fn configure_certification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cert/courses/:id/evaluate", post(evaluate_course))
        .route("/api/cert/certificates", get(list_certificates))
        .route("/api/cert/levels", get(list_levels))
        .route("/api/cert/levels/:id/unlock", post(unlock_level))
        .route("/api/cert/reconcile", post(reconcile_validity))
        .route(
            "/api/cert/admin/levels",
            get(list_level_definitions).post(create_level),
        )
        .route("/api/cert/admin/levels/:id", delete(delete_level))
}

/// Simplified configure function for module registration.
pub fn configure(router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    router.merge(configure_certification_routes())
}
