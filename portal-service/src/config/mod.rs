use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

use crate::federation::{FederationConfig, StoreName, StoreSettings};
use crate::models::{LockoutPolicy, Role};

/// HS256 keys shorter than this are rejected at startup.
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub jwt: JwtConfig,
    pub sessions: SessionConfig,
    pub lockout: LockoutConfig,
    pub self_service_role: Role,
    pub stores: StoresConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("access_token_expiry_minutes", &self.access_token_expiry_minutes)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

impl JwtConfig {
    /// Both secrets present, long enough, and different from each other.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, secret) in [
            ("JWT_ACCESS_SECRET", &self.access_secret),
            ("JWT_REFRESH_SECRET", &self.refresh_secret),
        ] {
            if secret.len() < MIN_SECRET_BYTES {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be at least {} bytes",
                    name,
                    MIN_SECRET_BYTES
                )));
            }
        }

        if self.access_secret == self.refresh_secret {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ"
            )));
        }

        if self.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_refresh_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct LockoutConfig {
    pub threshold: i32,
    pub duration_minutes: i64,
}

impl LockoutConfig {
    pub fn policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            threshold: self.threshold,
            duration: chrono::Duration::minutes(self.duration_minutes),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub uri: Option<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct StoresConfig {
    pub primary: StoreConfig,
    pub billing: StoreConfig,
    pub staff: StoreConfig,
    pub timeout_ms: u64,
}

impl StoresConfig {
    pub fn federation(&self) -> FederationConfig {
        let settings = |s: &StoreConfig| StoreSettings {
            uri: s.uri.clone(),
            database: s.database.clone(),
        };
        FederationConfig {
            primary: settings(&self.primary),
            billing: settings(&self.billing),
            staff: settings(&self.staff),
            timeout: self.timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
}

impl PortalConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = PortalConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("portal-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            jwt: JwtConfig {
                // Secrets never fall back to a default, not even in dev.
                access_secret: get_env("JWT_ACCESS_SECRET", None, true)?,
                refresh_secret: get_env("JWT_REFRESH_SECRET", None, true)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
            },
            sessions: SessionConfig {
                max_refresh_tokens: parse_env("MAX_REFRESH_TOKENS", "5", is_prod)?,
            },
            lockout: LockoutConfig {
                threshold: parse_env("LOCKOUT_THRESHOLD", "5", is_prod)?,
                duration_minutes: parse_env("LOCKOUT_DURATION_MINUTES", "120", is_prod)?,
            },
            self_service_role: get_env("SELF_SERVICE_ROLE", Some("patient"), is_prod)?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            stores: StoresConfig {
                primary: StoreConfig {
                    uri: get_optional_env(StoreName::Primary.uri_env_key()),
                    database: get_env("PRIMARY_MONGODB_DATABASE", Some("portal"), is_prod)?,
                },
                billing: StoreConfig {
                    uri: get_optional_env(StoreName::Billing.uri_env_key()),
                    database: get_env("BILLING_MONGODB_DATABASE", Some("billing"), is_prod)?,
                },
                staff: StoreConfig {
                    uri: get_optional_env(StoreName::Staff.uri_env_key()),
                    database: get_env("STAFF_MONGODB_DATABASE", Some("staff"), is_prod)?,
                },
                timeout_ms: parse_env("STORE_TIMEOUT_MS", "3000", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "10", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                register_attempts: parse_env("RATE_LIMIT_REGISTER_ATTEMPTS", "5", is_prod)?,
                register_window_seconds: parse_env(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                password_reset_attempts: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    "3",
                    is_prod,
                )?,
                password_reset_window_seconds: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        self.jwt.validate()?;

        if self.sessions.max_refresh_tokens == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAX_REFRESH_TOKENS must be at least 1"
            )));
        }

        if self.lockout.threshold <= 0 || self.lockout.duration_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LOCKOUT_THRESHOLD and LOCKOUT_DURATION_MINUTES must be positive"
            )));
        }

        if self.stores.timeout_ms == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_TIMEOUT_MS must be positive"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
