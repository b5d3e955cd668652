use std::{env, fmt, net::SocketAddr, path::PathBuf};

use super::{server_bind_address, DEFAULT_DATABASE_URL, DEFAULT_MEDIA_ROOT};

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// How employee deletion behaves: remove the row or flip the soft-delete flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    Hard,
    Soft,
}

impl DeletePolicy {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "hard" => Ok(Self::Hard),
            "soft" => Ok(Self::Soft),
            other => Err(ConfigError::InvalidDeletePolicy(other.to_string())),
        }
    }

    pub fn is_soft(self) -> bool {
        matches!(self, Self::Soft)
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub media_root: PathBuf,
    pub employee_delete: DeletePolicy,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let database_url =
            env::var("APP_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let media_root = PathBuf::from(
            env::var("APP_MEDIA_ROOT").unwrap_or_else(|_| DEFAULT_MEDIA_ROOT.to_string()),
        );
        let delete_value = env::var("APP_EMPLOYEE_DELETE").unwrap_or_else(|_| "hard".to_string());
        let employee_delete = DeletePolicy::from_str(&delete_value)?;

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            media_root,
            employee_delete,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    InvalidDeletePolicy(String),
    BindAddress(std::net::AddrParseError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::InvalidDeletePolicy(value) => write!(
                f,
                "APP_EMPLOYEE_DELETE must be 'hard' or 'soft' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}
