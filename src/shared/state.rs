use crate::certification::render::CertificateRenderer;
use crate::config::AppConfig;
use crate::shared::utils::DbPool;
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub renderer: Arc<dyn CertificateRenderer>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            renderer: Arc::clone(&self.renderer),
        }
    }
}
