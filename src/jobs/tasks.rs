/// Background task implementations
use crate::{
    context::AppContext,
    error::ModResult,
    moderation::{
        notifications::DispatchOutcome, restrictions::SweepOutcome, SecurityScan, Severity,
    },
};
use chrono::Duration;

/// Outbox entries drained per run
pub const NOTIFICATION_BATCH_SIZE: i64 = 100;

/// Deactivate lapsed restrictions and clear lapsed suspensions
pub async fn sweep_expired(ctx: &AppContext) -> ModResult<SweepOutcome> {
    ctx.moderation.sweep_expired().await
}

/// Deliver one batch of queued notifications
pub async fn dispatch_notifications(ctx: &AppContext) -> ModResult<DispatchOutcome> {
    ctx.moderation.dispatch_notifications(NOTIFICATION_BATCH_SIZE).await
}

/// Reversal verification plus suspicious activity grading
pub async fn security_scan(ctx: &AppContext) -> ModResult<SecurityScan> {
    let window = Duration::minutes(ctx.config.jobs.security_window_minutes);
    let scan = ctx.moderation.scan_security(window).await?;

    if scan.verification.new_problems > 0 {
        tracing::error!(
            "Reversal verification found {} new problems across {} reversed actions",
            scan.verification.new_problems,
            scan.verification.checked
        );
    }

    for finding in &scan.findings {
        match finding.severity {
            Severity::Critical | Severity::High => tracing::warn!(
                kind = ?finding.kind,
                severity = ?finding.severity,
                user_id = finding.user_id.as_deref().unwrap_or("-"),
                events = finding.event_count,
                "Suspicious moderation activity"
            ),
            Severity::Medium | Severity::Low => tracing::info!(
                kind = ?finding.kind,
                severity = ?finding.severity,
                user_id = finding.user_id.as_deref().unwrap_or("-"),
                events = finding.event_count,
                "Moderation activity flagged for review"
            ),
        }
    }

    Ok(scan)
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> ModResult<()> {
    // Check database connectivity
    crate::db::test_connection(&ctx.db).await?;

    crate::metrics::set_open_reports(ctx.moderation.pending_count().await?);

    Ok(())
}
