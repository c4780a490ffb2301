use serde::Deserialize;
use std::env;

use crate::error::AppError;

/// Cookie carrying the signed user token. HttpOnly, never script-readable.
pub const AUTH_COOKIE_NAME: &str = "auth_token";
/// Cookie carrying the CSRF token. Must stay script-readable.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";
/// Header the client echoes the CSRF cookie value into.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Minimum signing secret length in bytes. A shorter secret is a total
/// authentication bypass, so construction fails fatally below this.
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Signing secret for the user trust domain.
    pub user_secret: String,
    /// Signing secret for the device trust domain. Independently keyed so a
    /// device token can never verify against the user domain.
    pub device_secret: String,
    /// Token lifetime in seconds. Also the auth cookie Max-Age.
    pub token_expiry_seconds: i64,
    /// Profile cache TTL in seconds, independent of token lifetime.
    pub profile_cache_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Paths exempt from the CSRF guard, matched by exact suffix.
    pub csrf_exempt_suffixes: Vec<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = GatewayConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("gateway-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("3000"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            jwt: JwtConfig {
                user_secret: get_env("JWT_SECRET", None, is_prod)?,
                device_secret: get_env("JWT_DEVICE_SECRET", None, is_prod)?,
                token_expiry_seconds: parse_env("JWT_TOKEN_EXPIRY_SECONDS", Some("604800"), is_prod)?,
                profile_cache_ttl_seconds: parse_env(
                    "AUTH_PROFILE_CACHE_TTL_SECONDS",
                    Some("30"),
                    is_prod,
                )?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: get_env("SMTP_PASSWORD", None, is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3001"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
                csrf_exempt_suffixes: get_env(
                    "CSRF_EXEMPT_SUFFIXES",
                    Some("/auth/login,/auth/register,/displays/pair,/webhooks/billing"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.user_secret.len() < MIN_SECRET_LENGTH {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        if self.jwt.device_secret.len() < MIN_SECRET_LENGTH {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_DEVICE_SECRET must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        if self.jwt.token_expiry_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_TOKEN_EXPIRY_SECONDS must be positive"
            )));
        }

        if self.jwt.profile_cache_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "AUTH_PROFILE_CACHE_TTL_SECONDS must be positive"
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

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
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

fn parse_env<T: std::str::FromStr>(
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?.parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} is not valid: {}", key, e))
    })
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
