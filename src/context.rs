/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    db,
    error::ModResult,
    moderation::ModerationService,
    rate_limit::{RateLimitConfig, RateLimiter},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub moderation: Arc<ModerationService>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ModResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize database and apply migrations
        let db = db::create_pool(
            &config.storage.database_path,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;
        db::run_migrations(&db).await?;

        // Test connection
        db::test_connection(&db).await?;

        Ok(Self::with_pool(config, db))
    }

    /// Build a context over an existing pool with migrations already applied
    pub fn with_pool(config: ServerConfig, db: SqlitePool) -> Self {
        let moderation = Arc::new(ModerationService::new(db.clone()));

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            enabled: config.rate_limit.enabled,
            requests_per_second: config.rate_limit.requests_per_second,
            burst_size: config.rate_limit.requests_per_second.saturating_mul(2),
        }));

        Self {
            config: Arc::new(config),
            db,
            moderation,
            rate_limiter,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
