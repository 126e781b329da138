// ============================================================================
// CONFIGURATION
// ============================================================================
//
// Description:
//   Configuration de l'application chargée une seule fois au démarrage
//   depuis les variables d'environnement (.env supporté via dotenv).
//   Partagée ensuite avec les handlers via web::Data<Config>.
//
// Points d'attention:
//   - JWT_SECRET est obligatoire en production
//   - OTP_DEV_CODE est ignoré en production
//
// ============================================================================

use std::env;
use std::str::FromStr;

use chrono::Duration;

use crate::services::otp_service::OtpPolicy;

const DEV_JWT_SECRET: &str = "dev-insecure-key-change-this";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn is_production(self) -> bool {
        self == AppEnv::Production
    }
}

impl FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "production" | "prod" => Ok(AppEnv::Production),
            other => Err(ConfigError::Invalid("APP_ENV", other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnv,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub otp_max_attempts: i32,
    /// Code fixe pour le développement local (jamais utilisé en production)
    pub otp_dev_code: Option<String>,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let app_env: AppEnv = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .parse()?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if app_env.is_production() => return Err(ConfigError::Missing("JWT_SECRET")),
            _ => {
                tracing::warn!("JWT_SECRET not set, using development default (INSECURE)");
                DEV_JWT_SECRET.to_string()
            }
        };

        let otp_dev_code = env::var("OTP_DEV_CODE").ok().filter(|c| !c.is_empty());
        if otp_dev_code.is_some() && app_env.is_production() {
            tracing::warn!("OTP_DEV_CODE is ignored in production");
        }

        Ok(Self {
            app_env,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://coaching.db?mode=rwc".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080)?,
            jwt_secret,
            jwt_ttl_hours: parse_var("JWT_TTL_HOURS", 24)?,
            otp_ttl_seconds: parse_var("OTP_TTL_SECONDS", 300)?,
            otp_resend_cooldown_seconds: parse_var("OTP_RESEND_COOLDOWN_SECONDS", 60)?,
            otp_max_attempts: parse_var("OTP_MAX_ATTEMPTS", 3)?,
            otp_dev_code,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }

    /// Politique OTP dérivée de la configuration
    pub fn otp_policy(&self) -> OtpPolicy {
        OtpPolicy {
            ttl: Duration::seconds(self.otp_ttl_seconds),
            resend_cooldown: Duration::seconds(self.otp_resend_cooldown_seconds),
            max_attempts: self.otp_max_attempts,
            dev_code: if self.app_env.is_production() {
                None
            } else {
                self.otp_dev_code.clone()
            },
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration pour les tests uniquement
    pub fn for_tests() -> Self {
        Self {
            app_env: AppEnv::Development,
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            jwt_secret: "test-secret-for-unit-tests".to_string(),
            jwt_ttl_hours: 1,
            otp_ttl_seconds: 300,
            otp_resend_cooldown_seconds: 60,
            otp_max_attempts: 3,
            otp_dev_code: None,
            upload_dir: std::env::temp_dir()
                .join(format!("coaching-uploads-{}", uuid::Uuid::new_v4()))
                .to_string_lossy()
                .into_owned(),
            max_upload_bytes: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_env_parsing() {
        assert_eq!("production".parse::<AppEnv>().unwrap(), AppEnv::Production);
        assert_eq!(" Dev ".parse::<AppEnv>().unwrap(), AppEnv::Development);
        assert!("staging".parse::<AppEnv>().is_err());
    }

    #[test]
    fn test_dev_code_ignored_in_production() {
        let mut config = Config::for_tests();
        config.otp_dev_code = Some("123456".to_string());
        assert_eq!(config.otp_policy().dev_code.as_deref(), Some("123456"));

        config.app_env = AppEnv::Production;
        assert!(config.otp_policy().dev_code.is_none());
    }
}
