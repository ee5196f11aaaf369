use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::token::TokenConfig;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub tokens: TokenConfig,
    pub verification_code_expiry_minutes: i64,
    pub smtp: SmtpConfig,
    pub sms: SmsConfig,
    /// Base URL the password-reset link points at.
    pub frontend_url: String,
    pub roles: RoleConfig,
    /// Route-permission table on disk. The embedded table is used when unset.
    pub route_permissions_path: Option<String>,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    pub api_url: String,
    pub auth_key: SecretString,
    pub sender_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    /// Role given to every new sign-up.
    pub default_role: String,
    /// Role that receives every permission in the route table.
    pub admin_role: String,
    /// Existing account promoted to the admin role at start-up.
    pub bootstrap_admin_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub signin_attempts: u32,
    pub signin_window_seconds: u64,
    pub signup_attempts: u32,
    pub signup_window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            signin_attempts: 5,
            signin_window_seconds: 900,
            signup_attempts: 3,
            signup_window_seconds: 3600,
            password_reset_attempts: 3,
            password_reset_window_seconds: 3600,
            global_ip_limit: 100,
            global_ip_window_seconds: 60,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let defaults = RateLimitConfig::default();

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env(
                "SERVICE_VERSION",
                Some(env!("CARGO_PKG_VERSION")),
                is_prod,
            )?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("identity"), is_prod)?,
            },
            tokens: TokenConfig {
                secret: SecretString::new(get_env("TOKEN_SECRET", None, is_prod)?),
                session_ttl_minutes: parse_env(
                    "SESSION_TOKEN_EXPIRY_MINUTES",
                    Some("120"),
                    is_prod,
                )?,
                reset_ttl_minutes: parse_env("RESET_TOKEN_EXPIRY_MINUTES", Some("60"), is_prod)?,
            },
            verification_code_expiry_minutes: parse_env(
                "VERIFICATION_CODE_EXPIRY_MINUTES",
                Some("15"),
                is_prod,
            )?,
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", Some("587"), is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: SecretString::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from: get_env("SMTP_FROM", Some("no-reply@localhost"), is_prod)?,
            },
            sms: SmsConfig {
                api_url: get_env("SMS_API_URL", Some("http://localhost:9090/sms"), is_prod)?,
                auth_key: SecretString::new(get_env("SMS_AUTH_KEY", Some(""), is_prod)?),
                sender_id: get_env("SMS_SENDER_ID", Some("IDENT"), is_prod)?,
                enabled: get_env("SMS_ENABLED", Some("false"), false)?
                    .parse()
                    .unwrap_or(false),
            },
            frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
            roles: RoleConfig {
                default_role: get_env("DEFAULT_ROLE", Some("CUSTOMER"), false)?
                    .trim()
                    .to_uppercase(),
                admin_role: get_env("ADMIN_ROLE", Some("ADMIN"), false)?
                    .trim()
                    .to_uppercase(),
                bootstrap_admin_email: get_optional_env("BOOTSTRAP_ADMIN_EMAIL"),
            },
            route_permissions_path: get_optional_env("ROUTE_PERMISSIONS_PATH"),
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
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), false)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                signin_attempts: env_or("RATE_LIMIT_SIGNIN_ATTEMPTS", defaults.signin_attempts),
                signin_window_seconds: env_or(
                    "RATE_LIMIT_SIGNIN_WINDOW_SECONDS",
                    defaults.signin_window_seconds,
                ),
                signup_attempts: env_or("RATE_LIMIT_SIGNUP_ATTEMPTS", defaults.signup_attempts),
                signup_window_seconds: env_or(
                    "RATE_LIMIT_SIGNUP_WINDOW_SECONDS",
                    defaults.signup_window_seconds,
                ),
                password_reset_attempts: env_or(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    defaults.password_reset_attempts,
                ),
                password_reset_window_seconds: env_or(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    defaults.password_reset_window_seconds,
                ),
                global_ip_limit: env_or("RATE_LIMIT_GLOBAL_IP_LIMIT", defaults.global_ip_limit),
                global_ip_window_seconds: env_or(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    defaults.global_ip_window_seconds,
                ),
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

        if self.tokens.secret.expose_secret().len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_SECRET must be at least 32 bytes"
            )));
        }

        if self.tokens.session_ttl_minutes <= 0 || self.tokens.reset_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Token expiry minutes must be positive"
            )));
        }

        if self.verification_code_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "VERIFICATION_CODE_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.roles.default_role.is_empty() || self.roles.admin_role.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_ROLE and ADMIN_ROLE must not be empty"
            )));
        }

        if self.roles.default_role == self.roles.admin_role {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_ROLE must differ from ADMIN_ROLE"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::warn!("Swagger is publicly accessible in production");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

/// Rate limit quotas fall back to their defaults on a bad value.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
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

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_and_swagger_mode() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!("disabled".parse::<SwaggerMode>(), Ok(SwaggerMode::Disabled));
    }

    #[test]
    fn missing_key_without_default_is_an_error() {
        let result = get_env("IDENTITY_SERVICE_TEST_SURELY_UNSET", None, false);
        assert!(result.is_err());

        let fallback = get_env("IDENTITY_SERVICE_TEST_SURELY_UNSET", Some("x"), false).unwrap();
        assert_eq!(fallback, "x");

        let prod = get_env("IDENTITY_SERVICE_TEST_SURELY_UNSET", Some("x"), true);
        assert!(prod.is_err());
    }
}
