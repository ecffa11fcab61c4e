//! Process configuration, read once at startup and shared through `AppState`.

use std::path::PathBuf;

use crate::db::DbConfig;

/// Fallback signing secret. Accepted in development only.
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub bcrypt_cost: u32,
    pub upload_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    pub production: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_token_ttl_minutes: 60,
            refresh_token_ttl_days: 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            upload_dir: PathBuf::from("public/uploads"),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            host: "127.0.0.1".to_string(),
            port: 3001,
            production: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let production = std::env::var("ENVIRONMENT")
            .map(|e| e == "production")
            .unwrap_or(false);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .or_else(|_| std::env::var("FRONTEND_ORIGIN"))
            .map(|raw| parse_origins(&raw))
            .unwrap_or(defaults.allowed_origins);

        Self {
            db: DbConfig::default(),
            jwt_secret: std::env::var("JWT_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.jwt_secret),
            access_token_ttl_minutes: env_parse("ACCESS_TOKEN_TTL_MINUTES")
                .unwrap_or(defaults.access_token_ttl_minutes),
            refresh_token_ttl_days: env_parse("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or(defaults.refresh_token_ttl_days),
            bcrypt_cost: env_parse("BCRYPT_COST").unwrap_or(defaults.bcrypt_cost),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            allowed_origins,
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            production,
        }
    }

    /// A production process must not sign tokens with the built-in secret.
    pub fn validate(&self) -> Result<(), String> {
        if self.production && self.jwt_secret == DEFAULT_JWT_SECRET {
            return Err("JWT_SECRET must be set in production".to_string());
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(format!("BCRYPT_COST out of range: {}", self.bcrypt_cost));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
