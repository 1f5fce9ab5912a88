//! Rendering seam for certificate artifacts.
//!
//! The core only requires `render(data) -> bytes`; what the bytes are is the
//! renderer's business. A render failure is fatal to the operation that
//! requested it: no certificate or achievement row is ever persisted without
//! its artifact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("certificate rendering failed: {0}")]
pub struct RenderError(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct CourseCertificateData {
    pub user_id: Uuid,
    pub number: String,
    pub course_title: String,
    pub course_description: Option<String>,
    pub instructor_name: String,
    pub site_title: String,
    pub completed_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelCertificateData {
    pub user_id: Uuid,
    pub number: String,
    pub level_name: String,
    pub site_title: String,
    pub achieved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub custom_text: Option<String>,
}

#[async_trait]
pub trait CertificateRenderer: Send + Sync {
    async fn render_course(&self, data: &CourseCertificateData) -> Result<Vec<u8>, RenderError>;
    async fn render_level(&self, data: &LevelCertificateData) -> Result<Vec<u8>, RenderError>;
}

/// Default renderer producing a self-contained HTML document.
pub struct HtmlCertificateRenderer;

impl HtmlCertificateRenderer {
    fn document(title: &str, lines: &[String]) -> Vec<u8> {
        let body: String = lines
            .iter()
            .map(|line| format!("    <p>{}</p>\n", line))
            .collect();
        format!(
            "<!DOCTYPE html>\n<html>\n  <head><meta charset=\"utf-8\"><title>{}</title></head>\n  <body>\n    <h1>{}</h1>\n{}  </body>\n</html>\n",
            title, title, body
        )
        .into_bytes()
    }
}

#[async_trait]
impl CertificateRenderer for HtmlCertificateRenderer {
    async fn render_course(&self, data: &CourseCertificateData) -> Result<Vec<u8>, RenderError> {
        if data.course_title.trim().is_empty() {
            return Err(RenderError("course title is empty".to_string()));
        }
        let mut lines = vec![
            format!("{} certifies that user {}", data.site_title, data.user_id),
            format!("has completed the course \"{}\"", data.course_title),
            format!("Instructor: {}", data.instructor_name),
            format!("Certificate number: {}", data.number),
            format!("Completed on {}", data.completed_at.format("%Y-%m-%d")),
        ];
        if let Some(description) = &data.course_description {
            lines.push(description.clone());
        }
        if let Some(expires_at) = data.expires_at {
            lines.push(format!("Valid until {}", expires_at.format("%Y-%m-%d")));
        }
        Ok(Self::document("Certificate of Completion", &lines))
    }

    async fn render_level(&self, data: &LevelCertificateData) -> Result<Vec<u8>, RenderError> {
        if data.level_name.trim().is_empty() {
            return Err(RenderError("level name is empty".to_string()));
        }
        let mut lines = vec![
            format!("{} certifies that user {}", data.site_title, data.user_id),
            format!("has achieved the certification level \"{}\"", data.level_name),
            format!("Certificate number: {}", data.number),
            format!("Achieved on {}", data.achieved_at.format("%Y-%m-%d")),
        ];
        if let Some(custom_text) = &data.custom_text {
            lines.push(custom_text.clone());
        }
        if let Some(expires_at) = data.expires_at {
            lines.push(format!("Valid until {}", expires_at.format("%Y-%m-%d")));
        }
        Ok(Self::document("Certification Level", &lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn course_render_contains_snapshot_fields() {
        let data = CourseCertificateData {
            user_id: Uuid::new_v4(),
            number: "CERT-2026-00007".to_string(),
            course_title: "Forklift Safety".to_string(),
            course_description: Some("Warehouse operations".to_string()),
            instructor_name: "Grace Hopper".to_string(),
            site_title: "Acme Academy".to_string(),
            completed_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            expires_at: None,
        };
        let bytes = HtmlCertificateRenderer.render_course(&data).await.unwrap();
        let html = String::from_utf8(bytes).unwrap();
        assert!(html.contains("Forklift Safety"));
        assert!(html.contains("Grace Hopper"));
        assert!(html.contains("CERT-2026-00007"));
        assert!(html.contains("Acme Academy"));
    }

    #[tokio::test]
    async fn empty_title_fails_rendering() {
        let data = CourseCertificateData {
            user_id: Uuid::new_v4(),
            number: "CERT-2026-00001".to_string(),
            course_title: "  ".to_string(),
            course_description: None,
            instructor_name: "x".to_string(),
            site_title: "x".to_string(),
            completed_at: Utc::now(),
            expires_at: None,
        };
        assert!(HtmlCertificateRenderer.render_course(&data).await.is_err());
    }
}
