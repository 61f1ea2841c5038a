use crate::models::Role;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub lockout: LockoutConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_hours: i64,
    pub reset_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Static shared secret that lets a registration claim the admin role.
    pub admin_invite_code: String,
    /// Static shared secret for the security_analyst role.
    pub security_invite_code: String,
    /// Role written over empty/null roles left behind by legacy data.
    pub default_repair_role: Role,
}

impl SecurityConfig {
    /// The static shared secret that authorizes direct registration into a
    /// privileged role, if the role has one.
    pub fn static_invite_code(&self, role: Role) -> Option<&str> {
        match role {
            Role::Admin => Some(self.admin_invite_code.as_str()),
            Role::SecurityAnalyst => Some(self.security_invite_code.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub max_attempts: usize,
    pub window_minutes: i64,
    pub sweep_interval_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                access_token_expiry_hours: parse_env("JWT_ACCESS_TOKEN_EXPIRY_HOURS", "24", is_prod)?,
                reset_token_expiry_minutes: parse_env(
                    "JWT_RESET_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                admin_invite_code: get_env("ADMIN_INVITE_CODE", None, is_prod)?,
                security_invite_code: get_env("SECURITY_INVITE_CODE", None, is_prod)?,
                default_repair_role: get_env(
                    "DEFAULT_REPAIR_ROLE",
                    Some("security_analyst"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            lockout: LockoutConfig {
                max_attempts: parse_env("LOCKOUT_MAX_ATTEMPTS", "5", is_prod)?,
                window_minutes: parse_env("LOCKOUT_WINDOW_MINUTES", "30", is_prod)?,
                sweep_interval_seconds: parse_env("LOCKOUT_SWEEP_INTERVAL_SECONDS", "300", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_HOURS must be positive"
            )));
        }

        if self.jwt.reset_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_RESET_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.security.admin_invite_code.is_empty() || self.security.security_invite_code.is_empty()
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Invite secrets must not be empty"
            )));
        }

        if self.lockout.max_attempts == 0 || self.lockout.window_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Lockout threshold and window must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.jwt.secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least 32 bytes in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }

    /// 5xx responses carry the underlying error text only in dev builds.
    pub fn expose_error_details(&self) -> bool {
        self.environment == Environment::Dev
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

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e))
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
