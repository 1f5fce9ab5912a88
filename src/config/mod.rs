use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub certificates: CertificateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
}

/// Settings consumed by the certification core. Injected explicitly so the
/// issuer never reaches for ambient global state.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateConfig {
    /// Printed on rendered certificates as the issuing organization.
    pub site_title: String,
    /// Prefix for course certificate numbers (`PREFIX-YYYY-NNNNN`).
    pub course_prefix: String,
    /// Prefix for certification-level numbers, allocated in their own space.
    pub level_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8452,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            username: "lsuser".to_string(),
            password: String::new(),
            server: "localhost".to_string(),
            port: 5432,
            database: "learnserver".to_string(),
        }
    }
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            site_title: "Learn Server".to_string(),
            course_prefix: "CERT".to_string(),
            level_prefix: "LVL".to_string(),
        }
    }
}

impl AppConfig {
    /// Layered load: `learnserver.toml`, then `LEARNSERVER_*` env vars.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("learnserver.toml"))
            .merge(Env::prefixed("LEARNSERVER_").split("__"))
            .extract()
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            certificates: CertificateConfig::default(),
        };
        assert_eq!(config.certificates.course_prefix, "CERT");
        assert!(config.database_url().starts_with("postgres://"));
    }
}
