use axum::Router;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use learnserver::certification;
use learnserver::certification::render::{CertificateRenderer, HtmlCertificateRenderer};
use learnserver::config::AppConfig;
use learnserver::learn;
use learnserver::shared::state::AppState;
use learnserver::shared::utils::create_conn;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database_url());
    let pool = create_conn(&database_url)?;

    {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("running migrations failed: {}", e))?;
    }

    let renderer: Arc<dyn CertificateRenderer> = Arc::new(HtmlCertificateRenderer);
    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        renderer,
    });

    let router = Router::new();
    let router = learn::configure(router);
    let router = certification::configure(router);
    let app = router.layer(CorsLayer::permissive()).with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("learnserver listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
