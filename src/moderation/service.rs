/// Moderation service
///
/// Wires the moderation components over one pool and exposes the operations
/// the HTTP layer and background jobs call.
use super::directory::AccountStatus;
use super::notifications::DispatchOutcome;
use super::restrictions::SweepOutcome;
use super::{
    ActionExecutor, Actor, AdminAlert, Capability, IdentityDirectory, LogAlert, LogNotifier,
    ModerationAction, NotificationDispatcher, Notifier, QualityScore, QueueFilters, Report,
    ReportDraft, ReportIntake, ReportQueue, ReporterAccuracy, ReporterScoring,
    RestrictionEvaluator, ReversalManager, ReversalVerifier, Role, SecurityLog, SqliteDirectory,
    SuspiciousActivity, SuspiciousActivityDetector, TakeActionParams, UserRestriction,
    VerificationReport,
};
use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Combined result of a verifier pass and a detector scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScan {
    pub verification: VerificationReport,
    pub findings: Vec<SuspiciousActivity>,
    pub scanned_at: DateTime<Utc>,
}

/// Account flags plus the restrictions currently in force
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStanding {
    pub account: AccountStatus,
    pub restrictions: Vec<UserRestriction>,
}

/// Moderation service facade
#[derive(Clone)]
pub struct ModerationService {
    db: SqlitePool,
    directory: SqliteDirectory,
    identities: Arc<dyn IdentityDirectory>,
    intake: ReportIntake,
    queue: ReportQueue,
    executor: ActionExecutor,
    reversal: ReversalManager,
    evaluator: RestrictionEvaluator,
    scoring: ReporterScoring,
    verifier: ReversalVerifier,
    detector: SuspiciousActivityDetector,
    dispatcher: NotificationDispatcher,
}

impl ModerationService {
    /// Service backed by the local directory tables, logging notifier and alerts
    pub fn new(db: SqlitePool) -> Self {
        Self::with_collaborators(db, Arc::new(LogNotifier), Arc::new(LogAlert))
    }

    pub fn with_collaborators(
        db: SqlitePool,
        notifier: Arc<dyn Notifier>,
        alerts: Arc<dyn AdminAlert>,
    ) -> Self {
        let directory = SqliteDirectory::new(db.clone());
        let shared = Arc::new(directory.clone());
        let security = SecurityLog::new(db.clone());

        Self {
            intake: ReportIntake::new(db.clone(), shared.clone(), shared.clone(), security.clone()),
            queue: ReportQueue::new(db.clone()),
            executor: ActionExecutor::new(db.clone()),
            reversal: ReversalManager::new(db.clone(), security.clone()),
            evaluator: RestrictionEvaluator::new(db.clone()),
            scoring: ReporterScoring::new(db.clone()),
            verifier: ReversalVerifier::new(db.clone(), security.clone(), alerts),
            detector: SuspiciousActivityDetector::new(security),
            dispatcher: NotificationDispatcher::new(db.clone(), notifier),
            identities: shared,
            directory,
            db,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub fn directory(&self) -> &SqliteDirectory {
        &self.directory
    }

    /// Resolve a user's role once for the rest of the call
    pub async fn resolve_actor(&self, user_id: &str) -> ModResult<Actor> {
        let role = self
            .identities
            .role_of(user_id)
            .await?
            .ok_or_else(|| ModerationError::Authentication(format!("Unknown user {}", user_id)))?;

        Ok(Actor::new(user_id, role))
    }

    // ========== Reports ==========

    pub async fn submit_report(&self, actor: &Actor, draft: ReportDraft) -> ModResult<Report> {
        self.intake.submit(actor, draft).await
    }

    pub async fn moderator_flag(&self, actor: &Actor, draft: ReportDraft) -> ModResult<Report> {
        self.intake.moderator_flag(actor, draft).await
    }

    pub async fn list_queue(&self, actor: &Actor, filters: &QueueFilters) -> ModResult<Vec<Report>> {
        self.queue.list(actor, filters).await
    }

    pub async fn get_report(&self, actor: &Actor, report_id: i64) -> ModResult<Report> {
        self.queue.get(actor, report_id).await
    }

    pub async fn pending_count(&self) -> ModResult<i64> {
        self.queue.pending_count().await
    }

    // ========== Actions ==========

    pub async fn take_action(&self, actor: &Actor, params: TakeActionParams) -> ModResult<ModerationAction> {
        self.executor.take_action(actor, params).await
    }

    pub async fn reapply_action(
        &self,
        actor: &Actor,
        action_id: i64,
        reason: &str,
    ) -> ModResult<ModerationAction> {
        self.executor.reapply_action(actor, action_id, reason).await
    }

    pub async fn reverse_action(
        &self,
        actor: &Actor,
        action_id: i64,
        reason: &str,
    ) -> ModResult<ModerationAction> {
        self.reversal.reverse(actor, action_id, reason).await
    }

    pub async fn get_action(&self, actor: &Actor, action_id: i64) -> ModResult<ModerationAction> {
        actor.require(Role::Moderator)?;
        self.executor.get_action(action_id).await
    }

    /// Actions that targeted a user, newest first
    pub async fn action_history(&self, actor: &Actor, user_id: &str) -> ModResult<Vec<ModerationAction>> {
        if actor.user_id != user_id {
            actor.require(Role::Moderator)?;
        }
        self.executor.history_for_user(user_id).await
    }

    // ========== Restrictions ==========

    pub async fn can_perform(&self, user_id: &str, capability: Capability) -> ModResult<bool> {
        self.evaluator.can_perform(user_id, capability).await
    }

    pub async fn user_standing(&self, user_id: &str) -> ModResult<UserStanding> {
        let account = self
            .directory
            .account_status(user_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("User {} not found", user_id)))?;
        let restrictions = self.evaluator.active_for_user(user_id, Utc::now()).await?;

        Ok(UserStanding { account, restrictions })
    }

    pub async fn sweep_expired(&self) -> ModResult<SweepOutcome> {
        let outcome = self.evaluator.sweep_expired().await?;
        crate::metrics::record_sweep(outcome.restrictions_expired, outcome.suspensions_cleared);
        Ok(outcome)
    }

    // ========== Reporter statistics ==========

    pub async fn reporter_accuracy(&self, reporter_id: &str) -> ModResult<Option<ReporterAccuracy>> {
        self.scoring.accuracy(reporter_id).await
    }

    pub async fn reporter_quality(&self, reporter_id: &str) -> ModResult<Option<QualityScore>> {
        self.scoring.quality(reporter_id).await
    }

    // ========== Integrity ==========

    pub async fn verify_reversals(&self) -> ModResult<VerificationReport> {
        self.verifier.verify().await
    }

    /// Verify stored reversals, then grade the trailing window of security events
    pub async fn scan_security(&self, window: Duration) -> ModResult<SecurityScan> {
        self.scan_security_at(window, Utc::now()).await
    }

    pub async fn scan_security_at(&self, window: Duration, now: DateTime<Utc>) -> ModResult<SecurityScan> {
        let verification = self.verifier.verify_at(now).await?;
        let findings = self.detector.scan_at(window, now).await?;

        Ok(SecurityScan {
            verification,
            findings,
            scanned_at: now,
        })
    }

    // ========== Notifications ==========

    pub async fn dispatch_notifications(&self, limit: i64) -> ModResult<DispatchOutcome> {
        self.dispatcher.dispatch_pending(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::fixtures;
    use crate::moderation::{ActionType, ReportReason, ReportType};

    fn draft(report_type: ReportType, target: &str, reason: ReportReason) -> ReportDraft {
        ReportDraft {
            report_type,
            target_id: target.to_string(),
            reason,
            description: "This content breaks the community rules badly".to_string(),
            evidence: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_actor() {
        let (db, _) = fixtures::seeded().await;
        let service = ModerationService::new(db);

        let actor = service.resolve_actor("mod-1").await.unwrap();
        assert_eq!(actor.role, Role::Moderator);

        let err = service.resolve_actor("ghost").await.unwrap_err();
        assert!(matches!(err, ModerationError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_suspension_flow_through_service() {
        let (db, _) = fixtures::seeded().await;
        let service = ModerationService::new(db);
        let alice = service.resolve_actor("alice").await.unwrap();
        let moderator = service.resolve_actor("mod-1").await.unwrap();

        let report = service
            .submit_report(&alice, draft(ReportType::Post, "p1", ReportReason::Harassment))
            .await
            .unwrap();
        assert_eq!(service.pending_count().await.unwrap(), 1);

        let mut params = TakeActionParams::new(report.id, ActionType::UserSuspended, "Repeated harassment");
        params.duration_days = Some(7);
        let action = service.take_action(&moderator, params).await.unwrap();

        assert!(!service.can_perform("bob", Capability::Post).await.unwrap());
        let standing = service.user_standing("bob").await.unwrap();
        assert!(standing.account.suspended_until.is_some());
        assert_eq!(standing.restrictions.len(), 1);

        service
            .reverse_action(&moderator, action.id, "Appeal upheld")
            .await
            .unwrap();
        assert!(service.can_perform("bob", Capability::Post).await.unwrap());
        assert!(service.user_standing("bob").await.unwrap().restrictions.is_empty());

        let history = service.action_history(&moderator, "bob").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_reversed());

        let err = service.action_history(&alice, "bob").await.unwrap_err();
        assert!(matches!(err, ModerationError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_scan_reports_clean_store() {
        let (db, _) = fixtures::seeded().await;
        let service = ModerationService::new(db);

        let scan = service
            .scan_security_at(Duration::minutes(60), fixtures::base())
            .await
            .unwrap();
        assert!(scan.verification.is_clean());
        assert!(scan.findings.is_empty());
    }
}
