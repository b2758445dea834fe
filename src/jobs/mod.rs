use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expiration_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::notification_dispatch_job(Arc::clone(&self)));
        tokio::spawn(Self::security_scan_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Deactivate lapsed restrictions and suspensions
    async fn expiration_sweep_job(scheduler: Arc<Self>) {
        let secs = scheduler.context.config.jobs.sweep_interval_secs;
        let mut interval = interval(Duration::from_secs(secs));

        loop {
            interval.tick().await;
            let started = Instant::now();

            match tasks::sweep_expired(&scheduler.context).await {
                Ok(outcome) => {
                    if outcome.restrictions_expired > 0 || outcome.suspensions_cleared > 0 {
                        info!(
                            "Expired {} restrictions and cleared {} suspensions",
                            outcome.restrictions_expired, outcome.suspensions_cleared
                        );
                    }
                    crate::metrics::record_background_job("expiration_sweep", "success", started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    error!("Failed to sweep expired restrictions: {}", e);
                    crate::metrics::record_background_job("expiration_sweep", "failure", started.elapsed().as_secs_f64());
                }
            }
        }
    }

    /// Deliver queued action notifications
    async fn notification_dispatch_job(scheduler: Arc<Self>) {
        let secs = scheduler.context.config.jobs.notification_interval_secs;
        let mut interval = interval(Duration::from_secs(secs));

        loop {
            interval.tick().await;
            let started = Instant::now();

            match tasks::dispatch_notifications(&scheduler.context).await {
                Ok(outcome) => {
                    if outcome.failed > 0 {
                        tracing::warn!(
                            "Delivered {} notifications, {} failed and stay queued",
                            outcome.delivered, outcome.failed
                        );
                    }
                    crate::metrics::record_background_job("notification_dispatch", "success", started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    error!("Failed to dispatch notifications: {}", e);
                    crate::metrics::record_background_job("notification_dispatch", "failure", started.elapsed().as_secs_f64());
                }
            }
        }
    }

    /// Verify reversals and grade recent security events
    async fn security_scan_job(scheduler: Arc<Self>) {
        let secs = scheduler.context.config.jobs.security_scan_interval_secs;
        let mut interval = interval(Duration::from_secs(secs));

        loop {
            interval.tick().await;
            info!("Running moderation security scan");
            let started = Instant::now();

            match tasks::security_scan(&scheduler.context).await {
                Ok(_) => {
                    crate::metrics::record_background_job("security_scan", "success", started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    error!("Security scan failed: {}", e);
                    crate::metrics::record_background_job("security_scan", "failure", started.elapsed().as_secs_f64());
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - health is good
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
