/// Request rate limiting
///
/// Global throttle in front of the HTTP surface. Per-reporter report limits
/// live in the intake gate and are not affected by this layer.
use crate::error::{ModResult, ModerationError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 50,
            burst_size: 100,
        }
    }
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    limit: u32,
    limiter: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(rps);
        let quota = Quota::per_second(rps).allow_burst(burst);

        Self {
            enabled: config.enabled,
            limit: rps.get(),
            limiter: Arc::new(GovernorLimiter::direct(quota)),
        }
    }

    /// Check the global request budget
    pub fn check(&self) -> ModResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.limiter
            .check()
            .map_err(|_| ModerationError::TooManyRequests)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Response {
    // Probes and scrapes are never throttled
    let path = request.uri().path();
    if path == "/health" || path == "/metrics" {
        return next.run(request).await;
    }

    match ctx.rate_limiter.check() {
        Ok(()) => {
            let mut response = next.run(request).await;

            if let Ok(value) = ctx.rate_limiter.limit.to_string().parse() {
                response.headers_mut().insert("X-RateLimit-Limit", value);
            }

            response
        }
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), "Request rate limit exceeded");
            e.into_response()
        }
    }
}
