use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::workflows::assessment::{AssessmentSettings, LockPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scoring: ScoringConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_targets = env::var("APP_LOG_TARGETS")
            .map(|value| parse_flag(&value))
            .unwrap_or(false);

        let default_baseline = match env::var("APP_SCORE_BASELINE") {
            Ok(raw) => Decimal::from_str(raw.trim())
                .map_err(|_| ConfigError::InvalidBaseline { value: raw })?,
            Err(_) => Decimal::ONE_HUNDRED,
        };
        let lock_wait_ms = env::var("APP_LOCK_WAIT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidLockWait)?;
        let standards_csv = env::var("APP_STANDARDS_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_targets,
            },
            scoring: ScoringConfig {
                default_baseline,
                lock_wait: Duration::from_millis(lock_wait_ms),
                lock_retries: 1,
                standards_csv,
            },
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Print the module path of each event.
    pub log_targets: bool,
}

/// Scoring defaults and lock behavior.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub default_baseline: Decimal,
    pub lock_wait: Duration,
    pub lock_retries: u8,
    /// Catalog export replacing the built-in standards table.
    pub standards_csv: Option<PathBuf>,
}

impl ScoringConfig {
    pub fn settings(&self) -> AssessmentSettings {
        AssessmentSettings {
            default_baseline: self.default_baseline,
            lock: LockPolicy {
                wait: self.lock_wait,
                retries: self.lock_retries,
            },
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidBaseline { value: String },
    InvalidLockWait,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidBaseline { value } => {
                write!(f, "APP_SCORE_BASELINE must be a decimal number, got '{value}'")
            }
            ConfigError::InvalidLockWait => {
                write!(f, "APP_LOCK_WAIT_MS must be a whole number of milliseconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidBaseline { .. }
            | ConfigError::InvalidLockWait => None,
        }
    }
}
