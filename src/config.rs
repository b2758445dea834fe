/// Configuration management for the moderation server
use crate::error::{ModResult, ModerationError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
}

/// Request rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
}

/// Background job intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub sweep_interval_secs: u64,
    pub security_scan_interval_secs: u64,
    pub notification_interval_secs: u64,
    /// Trailing window the security scan grades
    pub security_window_minutes: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ModResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("MOD_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("MOD_PORT")
            .unwrap_or_else(|_| "3080".to_string())
            .parse()
            .map_err(|_| ModerationError::Validation("Invalid port number".to_string()))?;
        let version = env::var("MOD_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let database_path = env::var("MOD_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/moderation.sqlite"));
        let max_connections = env_or("MOD_DB_MAX_CONNECTIONS", 10);

        let jwt_secret = env::var("MOD_JWT_SECRET")
            .map_err(|_| ModerationError::Validation("JWT secret required".to_string()))?;

        let rate_limit_enabled = env_or("MOD_RATE_LIMITS_ENABLED", true);
        let requests_per_second = env_or("MOD_RATE_LIMIT_RPS", 50);

        let sweep_interval_secs = env_or("MOD_SWEEP_INTERVAL_SECS", 300);
        let security_scan_interval_secs = env_or("MOD_SECURITY_SCAN_INTERVAL_SECS", 900);
        let notification_interval_secs = env_or("MOD_NOTIFICATION_INTERVAL_SECS", 30);
        let security_window_minutes = env_or("MOD_SECURITY_WINDOW_MINUTES", 60);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = env_or("MOD_LOG_JSON", false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
            },
            authentication: AuthConfig { jwt_secret },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                requests_per_second,
            },
            jobs: JobsConfig {
                sweep_interval_secs,
                security_scan_interval_secs,
                notification_interval_secs,
                security_window_minutes,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ModResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ModerationError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ModerationError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(ModerationError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.rate_limit.enabled && self.rate_limit.requests_per_second == 0 {
            return Err(ModerationError::Validation(
                "Rate limit must allow at least one request per second".to_string(),
            ));
        }

        let jobs = &self.jobs;
        if jobs.sweep_interval_secs == 0
            || jobs.security_scan_interval_secs == 0
            || jobs.notification_interval_secs == 0
        {
            return Err(ModerationError::Validation(
                "Job intervals must be greater than zero".to_string(),
            ));
        }
        if jobs.security_window_minutes <= 0 {
            return Err(ModerationError::Validation(
                "Security scan window must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration for tests and local tooling
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                database_path: PathBuf::from(":memory:"),
                max_connections: 1,
            },
            authentication: AuthConfig {
                jwt_secret: jwt_secret.into(),
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 50,
            },
            jobs: JobsConfig {
                sweep_interval_secs: 300,
                security_scan_interval_secs: 900,
                notification_interval_secs: 30,
                security_window_minutes: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_secret() {
        let config = ServerConfig::for_tests("too-short");
        assert!(matches!(config.validate(), Err(ModerationError::Validation(_))));

        let config = ServerConfig::for_tests("0123456789abcdef0123456789abcdef");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = ServerConfig::for_tests("0123456789abcdef0123456789abcdef");
        config.jobs.sweep_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::for_tests("0123456789abcdef0123456789abcdef");
        config.jobs.security_window_minutes = 0;
        assert!(config.validate().is_err());
    }
}
