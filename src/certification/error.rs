use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::certification::render::RenderError;
use crate::certification::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CertificationError {
    #[error("certification level not found")]
    UnknownLevel,
    #[error("certification level is not accessible to this user")]
    NotAccessible,
    #[error("certification level requirements are not met")]
    NotEligible,
    #[error("certification level already achieved")]
    AlreadyAchieved,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for CertificationError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::UnknownLevel => StatusCode::NOT_FOUND,
            Self::NotAccessible => StatusCode::FORBIDDEN,
            Self::NotEligible | Self::AlreadyAchieved => StatusCode::CONFLICT,
            Self::Render(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string()
        }));
        (status, body).into_response()
    }
}
