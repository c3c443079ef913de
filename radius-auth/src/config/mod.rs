use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub jwt: JwtConfig,
    pub blacklist: BlacklistConfig,
    pub redis: Option<RedisConfig>,
    pub totp: TotpConfig,
    pub audit: AuditConfig,
    /// Optional file replacing the baseline role table.
    pub role_permissions_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub enum JwtSigning {
    /// HS256 with a shared secret.
    Secret(SecretString),
    /// RS256 with PEM key files.
    RsaKeyFiles {
        private_key_path: String,
        public_key_path: String,
    },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub signing: JwtSigning,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub access_token_expiry_minutes: i64,
    pub leeway_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlacklistBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct BlacklistConfig {
    pub backend: BlacklistBackend,
    pub check_timeout: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct TotpConfig {
    pub issuer: String,
    pub window: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuditSinkKind {
    Tracing,
    Redis,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub sink: AuditSinkKind,
    pub sink_timeout: Duration,
    pub slow_operation_threshold: Duration,
    pub redis_max_events: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Tracing,
            sink_timeout: Duration::from_millis(250),
            slow_operation_threshold: Duration::from_millis(1000),
            redis_max_events: 10_000,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let signing = match env::var("JWT_SECRET") {
            Ok(secret) => JwtSigning::Secret(SecretString::new(secret)),
            Err(_) => JwtSigning::RsaKeyFiles {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
            },
        };

        let blacklist_backend: BlacklistBackend =
            get_env("BLACKLIST_BACKEND", Some("memory"), is_prod)?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let audit_sink: AuditSinkKind = get_env("AUDIT_SINK", Some("tracing"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let redis = if blacklist_backend == BlacklistBackend::Redis
            || audit_sink == AuditSinkKind::Redis
        {
            Some(RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            })
        } else {
            None
        };

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("radius-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            jwt: JwtConfig {
                signing,
                issuer: get_optional_env("JWT_ISSUER"),
                audience: get_optional_env("JWT_AUDIENCE"),
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "60",
                    is_prod,
                )?,
                leeway_seconds: parse_env("JWT_LEEWAY_SECONDS", "0", is_prod)?,
            },
            blacklist: BlacklistConfig {
                backend: blacklist_backend,
                check_timeout: Duration::from_millis(parse_env(
                    "BLACKLIST_TIMEOUT_MS",
                    "500",
                    is_prod,
                )?),
                sweep_interval: Duration::from_secs(parse_env(
                    "BLACKLIST_SWEEP_SECONDS",
                    "60",
                    is_prod,
                )?),
            },
            redis,
            totp: TotpConfig {
                issuer: get_env("TOTP_ISSUER", Some("RADIUS Admin"), is_prod)?,
                window: parse_env("TOTP_WINDOW", "1", is_prod)?,
            },
            audit: AuditConfig {
                sink: audit_sink,
                sink_timeout: Duration::from_millis(parse_env(
                    "AUDIT_SINK_TIMEOUT_MS",
                    "250",
                    is_prod,
                )?),
                slow_operation_threshold: Duration::from_millis(parse_env(
                    "AUDIT_SLOW_OPERATION_MS",
                    "1000",
                    is_prod,
                )?),
                redis_max_events: parse_env("AUDIT_REDIS_MAX_EVENTS", "10000", is_prod)?,
            },
            role_permissions_path: get_optional_env("ROLE_PERMISSIONS_PATH"),
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

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.blacklist.check_timeout.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BLACKLIST_TIMEOUT_MS must be positive"
            )));
        }

        if self.blacklist.sweep_interval.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BLACKLIST_SWEEP_SECONDS must be positive"
            )));
        }

        if self.totp.window > 10 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOTP_WINDOW above 10 steps defeats the second factor"
            )));
        }

        if self.environment == Environment::Prod {
            if let JwtSigning::Secret(secret) = &self.jwt.signing {
                if secret.expose_secret().len() < 32 {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "JWT_SECRET must be at least 32 bytes in production"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
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

impl std::str::FromStr for BlacklistBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(BlacklistBackend::Redis),
            "memory" => Ok(BlacklistBackend::Memory),
            _ => Err(format!("Invalid blacklist backend: {}", s)),
        }
    }
}

impl std::str::FromStr for AuditSinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tracing" => Ok(AuditSinkKind::Tracing),
            "redis" => Ok(AuditSinkKind::Redis),
            _ => Err(format!("Invalid audit sink: {}", s)),
        }
    }
}
