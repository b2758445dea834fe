/// Report Intake
///
/// The gate every new report passes through. Checks run in a fixed order
/// and the first failure wins: input validation, self-report, duplicate
/// window, protected profiles, then the rolling per-reporter limit.
use super::evidence::Evidence;
use super::reports::{fetch_report, Report, ReportDraft, ReportStatus, ReportType};
use super::security::{SecurityEventType, SecurityLog};
use super::{Actor, ContentDirectory, IdentityDirectory, Role};
use crate::db::{parse_ts, ts};
use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

pub const MIN_DESCRIPTION_LENGTH: usize = 20;
pub const MIN_FLAG_DESCRIPTION_LENGTH: usize = 10;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const DUPLICATE_WINDOW_HOURS: i64 = 24;
pub const RATE_LIMIT_WINDOW_HOURS: i64 = 24;
pub const RATE_LIMIT_MAX_REPORTS: i64 = 10;

/// Which door the report came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntakePath {
    Member,
    ModeratorFlag,
}

impl IntakePath {
    fn min_description(&self) -> usize {
        match self {
            IntakePath::Member => MIN_DESCRIPTION_LENGTH,
            IntakePath::ModeratorFlag => MIN_FLAG_DESCRIPTION_LENGTH,
        }
    }

    fn initial_status(&self) -> ReportStatus {
        match self {
            IntakePath::Member => ReportStatus::Pending,
            IntakePath::ModeratorFlag => ReportStatus::UnderReview,
        }
    }
}

/// Report intake gate
#[derive(Clone)]
pub struct ReportIntake {
    db: SqlitePool,
    identities: Arc<dyn IdentityDirectory>,
    content: Arc<dyn ContentDirectory>,
    security: SecurityLog,
}

impl ReportIntake {
    pub fn new(
        db: SqlitePool,
        identities: Arc<dyn IdentityDirectory>,
        content: Arc<dyn ContentDirectory>,
        security: SecurityLog,
    ) -> Self {
        Self {
            db,
            identities,
            content,
            security,
        }
    }

    /// Submit a member report
    pub async fn submit(&self, actor: &Actor, draft: ReportDraft) -> ModResult<Report> {
        self.submit_at(actor, draft, Utc::now()).await
    }

    pub async fn submit_at(&self, actor: &Actor, draft: ReportDraft, now: DateTime<Utc>) -> ModResult<Report> {
        self.admit(actor, draft, IntakePath::Member, now).await
    }

    /// Moderator-originated flag, enters the queue already under review
    pub async fn moderator_flag(&self, actor: &Actor, draft: ReportDraft) -> ModResult<Report> {
        self.moderator_flag_at(actor, draft, Utc::now()).await
    }

    pub async fn moderator_flag_at(
        &self,
        actor: &Actor,
        draft: ReportDraft,
        now: DateTime<Utc>,
    ) -> ModResult<Report> {
        actor.require(Role::Moderator)?;
        self.admit(actor, draft, IntakePath::ModeratorFlag, now).await
    }

    async fn admit(
        &self,
        actor: &Actor,
        draft: ReportDraft,
        path: IntakePath,
        now: DateTime<Utc>,
    ) -> ModResult<Report> {
        let result = self.run_checks(actor, draft, path, now).await;

        match &result {
            Ok(report) => {
                crate::metrics::record_report_outcome("accepted");
                tracing::info!(
                    report_id = report.id,
                    report_type = report.report_type.as_str(),
                    reason = report.reason.as_str(),
                    priority = report.priority,
                    moderator_flagged = report.moderator_flagged,
                    "Report accepted"
                );
            }
            Err(e) => {
                crate::metrics::record_report_outcome(e.code());
                tracing::debug!(reporter = %actor.user_id, "Report rejected: {}", e);
            }
        }

        result
    }

    async fn run_checks(
        &self,
        actor: &Actor,
        draft: ReportDraft,
        path: IntakePath,
        now: DateTime<Utc>,
    ) -> ModResult<Report> {
        // 1. Input
        let evidence = validate_draft(&draft, path)?;
        let target_id = draft.target_id.trim().to_string();
        let description = draft.description.trim().to_string();
        let report_type = draft.report_type;

        let context = json!({
            "report_type": report_type.as_str(),
            "target_id": target_id,
            "timestamp": ts(now),
        });

        // 2. Self-report
        let (owner_id, target_role) = self.resolve_target(report_type, &target_id).await?;
        if owner_id == actor.user_id {
            self.security
                .record(SecurityEventType::SelfReport, Some(&actor.user_id), context, now)
                .await?;
            return Err(ModerationError::SelfReport { report_type });
        }

        // 3. Duplicate window
        if let Some(original_at) = self
            .recent_duplicate(&actor.user_id, report_type, &target_id, now)
            .await?
        {
            let mut details = context;
            details["original_at"] = json!(ts(original_at));
            self.security
                .record(SecurityEventType::DuplicateReport, Some(&actor.user_id), details, now)
                .await?;
            return Err(ModerationError::DuplicateReport {
                report_type,
                original_at,
            });
        }

        // 4. Protected profiles
        if target_role.map_or(false, |role| role.is_elevated()) {
            self.security
                .record(SecurityEventType::AdminProtection, Some(&actor.user_id), context, now)
                .await?;
            return Err(ModerationError::AdminProtected { report_type });
        }

        // 5. Rolling limit
        if let Some(retry_after) = self.rate_limit_retry_after(&actor.user_id, now).await? {
            let mut details = context;
            details["retry_after_secs"] = json!(retry_after.num_seconds());
            self.security
                .record(SecurityEventType::RateLimitExceeded, Some(&actor.user_id), details, now)
                .await?;
            return Err(ModerationError::RateLimitExceeded { retry_after });
        }

        let reason = draft.reason;
        let has_evidence = evidence.is_some();
        let evidence_json = evidence
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ModerationError::Internal(format!("Failed to encode evidence: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO report
                (reporter_id, reported_user_id, report_type, target_id, reason, description,
                 evidence, has_evidence, status, priority, moderator_flagged, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&actor.user_id)
        .bind(&owner_id)
        .bind(report_type.as_str())
        .bind(&target_id)
        .bind(reason.as_str())
        .bind(&description)
        .bind(evidence_json)
        .bind(has_evidence)
        .bind(path.initial_status().as_str())
        .bind(reason.priority() as i64)
        .bind(path == IntakePath::ModeratorFlag)
        .bind(ts(now))
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        fetch_report(&self.db, id)
            .await?
            .ok_or_else(|| ModerationError::Internal(format!("Report {} vanished after insert", id)))
    }

    /// Owner of the target and, for profiles, its role
    async fn resolve_target(
        &self,
        report_type: ReportType,
        target_id: &str,
    ) -> ModResult<(String, Option<Role>)> {
        if report_type.is_content() {
            let owner = self
                .content
                .owner_of(report_type, target_id)
                .await?
                .ok_or_else(|| ModerationError::NotFound(format!("{} {} not found", report_type.noun(), target_id)))?;
            Ok((owner, None))
        } else {
            let role = self
                .identities
                .role_of(target_id)
                .await?
                .ok_or_else(|| ModerationError::NotFound(format!("User {} not found", target_id)))?;
            Ok((target_id.to_string(), Some(role)))
        }
    }

    /// Most recent report by the same reporter on the same target inside the window
    async fn recent_duplicate(
        &self,
        reporter_id: &str,
        report_type: ReportType,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> ModResult<Option<DateTime<Utc>>> {
        let cutoff = now - Duration::hours(DUPLICATE_WINDOW_HOURS);

        let created_at: Option<String> = sqlx::query_scalar(
            r#"
            SELECT created_at FROM report
            WHERE reporter_id = ? AND report_type = ? AND target_id = ? AND created_at > ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(reporter_id)
        .bind(report_type.as_str())
        .bind(target_id)
        .bind(ts(cutoff))
        .fetch_optional(&self.db)
        .await?;

        created_at.as_deref().map(parse_ts).transpose()
    }

    /// Time until the oldest report leaves the window, when the limit is reached
    async fn rate_limit_retry_after(
        &self,
        reporter_id: &str,
        now: DateTime<Utc>,
    ) -> ModResult<Option<Duration>> {
        let window = Duration::hours(RATE_LIMIT_WINDOW_HOURS);

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS recent, MIN(created_at) AS oldest
            FROM report
            WHERE reporter_id = ? AND created_at > ?
            "#,
        )
        .bind(reporter_id)
        .bind(ts(now - window))
        .fetch_one(&self.db)
        .await?;

        let recent: i64 = row.try_get("recent")?;
        if recent < RATE_LIMIT_MAX_REPORTS {
            return Ok(None);
        }

        let oldest = match row.try_get::<Option<String>, _>("oldest")? {
            Some(value) => parse_ts(&value)?,
            None => return Ok(None),
        };

        let retry_after = (oldest + window) - now;
        Ok(Some(retry_after.max(Duration::seconds(1))))
    }
}

/// Field-level validation; returns the evidence that survives eligibility filtering
fn validate_draft(draft: &ReportDraft, path: IntakePath) -> ModResult<Option<Evidence>> {
    if draft.target_id.trim().is_empty() {
        return Err(ModerationError::Validation("Target id is required".to_string()));
    }

    let description_len = draft.description.trim().chars().count();
    if description_len < path.min_description() {
        return Err(ModerationError::Validation(format!(
            "Description must be at least {} characters",
            path.min_description()
        )));
    }
    if description_len > MAX_DESCRIPTION_LENGTH {
        return Err(ModerationError::Validation(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }

    let Some(evidence) = draft.evidence.clone() else {
        return Ok(None);
    };

    // Fields the context does not accept are dropped before format checks
    let Some(evidence) = evidence.retain_eligible(draft.report_type, draft.reason) else {
        return Ok(None);
    };
    evidence.validate().map_err(ModerationError::Validation)?;

    Ok(Some(evidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::evidence::CopyrightEvidence;
    use crate::moderation::fixtures::{self, base};
    use crate::moderation::{ReportReason, SecurityEventType, SqliteDirectory};

    fn intake(db: &SqlitePool, directory: &SqliteDirectory) -> ReportIntake {
        let directory = Arc::new(directory.clone());
        ReportIntake::new(db.clone(), directory.clone(), directory, SecurityLog::new(db.clone()))
    }

    fn draft(report_type: ReportType, target: &str, reason: ReportReason) -> ReportDraft {
        ReportDraft {
            report_type,
            target_id: target.to_string(),
            reason,
            description: "This content breaks the community rules".to_string(),
            evidence: None,
        }
    }

    fn member(id: &str) -> Actor {
        Actor::new(id, Role::Regular)
    }

    async fn events_of(db: &SqlitePool, event_type: SecurityEventType) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM security_event WHERE event_type = ?")
            .bind(event_type.as_str())
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_sets_priority_and_owner() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);

        let report = intake
            .submit_at(&member("alice"), draft(ReportType::Post, "p1", ReportReason::SelfHarm), base())
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.priority, 1);
        assert_eq!(report.reported_user_id.as_deref(), Some("bob"));
        assert!(!report.has_evidence);
        assert!(!report.moderator_flagged);
        assert_eq!(report.created_at, base());
    }

    #[tokio::test]
    async fn test_self_report_rejected_and_logged() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);

        let err = intake
            .submit_at(&member("bob"), draft(ReportType::Track, "t1", ReportReason::Spam), base())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::SelfReport { report_type: ReportType::Track }));
        assert_eq!(err.to_string(), "You cannot report your own track");
        assert_eq!(events_of(&db, SecurityEventType::SelfReport).await, 1);

        let err = intake
            .submit_at(&member("bob"), draft(ReportType::User, "bob", ReportReason::Spam), base())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "You cannot report your own profile");
    }

    #[tokio::test]
    async fn test_duplicate_window() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);
        let alice = member("alice");

        intake
            .submit_at(&alice, draft(ReportType::Comment, "c1", ReportReason::Harassment), base())
            .await
            .unwrap();

        let err = intake
            .submit_at(
                &alice,
                draft(ReportType::Comment, "c1", ReportReason::Spam),
                base() + Duration::hours(23),
            )
            .await
            .unwrap_err();
        match err {
            ModerationError::DuplicateReport { original_at, .. } => assert_eq!(original_at, base()),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert!(ModerationError::DuplicateReport {
            report_type: ReportType::Comment,
            original_at: base()
        }
        .retryable());
        assert_eq!(events_of(&db, SecurityEventType::DuplicateReport).await, 1);

        // Another reporter is unaffected
        intake
            .submit_at(
                &member("carol"),
                draft(ReportType::Comment, "c1", ReportReason::Harassment),
                base() + Duration::hours(1),
            )
            .await
            .unwrap();

        // Outside the window the same reporter may report again
        intake
            .submit_at(
                &alice,
                draft(ReportType::Comment, "c1", ReportReason::Harassment),
                base() + Duration::hours(24) + Duration::seconds(1),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_elevated_profiles_protected() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);

        for target in ["mod-1", "admin-1"] {
            let err = intake
                .submit_at(&member("alice"), draft(ReportType::User, target, ReportReason::Harassment), base())
                .await
                .unwrap_err();
            assert!(matches!(err, ModerationError::AdminProtected { .. }));
            assert!(!err.retryable());
        }
        assert_eq!(events_of(&db, SecurityEventType::AdminProtection).await, 2);

        // Content owned by a moderator is still reportable
        directory.register_content(ReportType::Post, "m-post", "mod-1").await.unwrap();
        intake
            .submit_at(&member("alice"), draft(ReportType::Post, "m-post", ReportReason::Spam), base())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_after_ten_reports() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);
        let carol = member("carol");

        for i in 0..10 {
            let id = format!("bulk-{}", i);
            directory.register_content(ReportType::Post, &id, "bob").await.unwrap();
            intake
                .submit_at(
                    &carol,
                    draft(ReportType::Post, &id, ReportReason::Spam),
                    base() + Duration::minutes(i),
                )
                .await
                .unwrap();
        }

        let now = base() + Duration::hours(2);
        let err = intake
            .submit_at(&carol, draft(ReportType::Post, "p1", ReportReason::Spam), now)
            .await
            .unwrap_err();
        match err {
            ModerationError::RateLimitExceeded { retry_after } => {
                assert_eq!(retry_after, Duration::hours(22));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert_eq!(events_of(&db, SecurityEventType::RateLimitExceeded).await, 1);

        // Once the oldest report ages out there is room again
        intake
            .submit_at(
                &carol,
                draft(ReportType::Post, "p1", ReportReason::Spam),
                base() + Duration::hours(24) + Duration::seconds(1),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_counts_every_report_type() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);
        let carol = member("carol");

        let mut targets = Vec::new();
        for i in 0..5 {
            let id = format!("mixed-post-{}", i);
            directory.register_content(ReportType::Post, &id, "bob").await.unwrap();
            targets.push((ReportType::Post, id));
        }
        for i in 0..3 {
            let id = format!("mixed-comment-{}", i);
            directory.register_content(ReportType::Comment, &id, "bob").await.unwrap();
            targets.push((ReportType::Comment, id));
        }
        targets.push((ReportType::Track, "t1".to_string()));
        targets.push((ReportType::User, "bob".to_string()));

        for (i, (report_type, target)) in targets.iter().enumerate() {
            intake
                .submit_at(
                    &carol,
                    draft(*report_type, target, ReportReason::Spam),
                    base() + Duration::minutes(i as i64),
                )
                .await
                .unwrap();
        }

        let err = intake
            .submit_at(
                &carol,
                draft(ReportType::User, "alice", ReportReason::Harassment),
                base() + Duration::hours(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_check_order_first_failure_wins() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);

        // Short description beats self-report
        let mut short = draft(ReportType::Post, "p1", ReportReason::Spam);
        short.description = "too short".to_string();
        let err = intake.submit_at(&member("bob"), short, base()).await.unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
        assert_eq!(events_of(&db, SecurityEventType::SelfReport).await, 0);

        // Unknown target
        let err = intake
            .submit_at(&member("alice"), draft(ReportType::Album, "missing", ReportReason::Spam), base())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_evidence_filtered_by_context() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);

        let mut copyright = draft(ReportType::Track, "t1", ReportReason::CopyrightViolation);
        copyright.evidence = Some(Evidence {
            links: vec!["https://example.com/compare".into()],
            copyright: Some(CopyrightEvidence {
                original_work_url: "https://label.example/song".into(),
                rights_holder: Some("Example Records".into()),
            }),
            audio_timestamps: Some("01:10".into()),
        });

        let report = intake.submit_at(&member("alice"), copyright, base()).await.unwrap();
        assert!(report.has_evidence);
        let evidence = report.evidence.unwrap();
        assert!(evidence.copyright.is_some());
        assert!(evidence.audio_timestamps.is_none());

        // Spam accepts no evidence at all, even malformed input is dropped
        let mut spam = draft(ReportType::Post, "p1", ReportReason::Spam);
        spam.evidence = Some(Evidence {
            links: vec!["ftp://bad".into()],
            ..Default::default()
        });
        let report = intake.submit_at(&member("alice"), spam, base()).await.unwrap();
        assert!(!report.has_evidence);
        assert!(report.evidence.is_none());

        // Eligible but malformed evidence is rejected
        let mut bad = draft(ReportType::Track, "t1", ReportReason::HateSpeech);
        bad.evidence = Some(Evidence {
            audio_timestamps: Some("01:10, 1:99".into()),
            ..Default::default()
        });
        let err = intake.submit_at(&member("carol"), bad, base()).await.unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_moderator_flag() {
        let (db, directory) = fixtures::seeded().await;
        let intake = intake(&db, &directory);
        let moderator = Actor::new("mod-1", Role::Moderator);

        let mut flag = draft(ReportType::Post, "p2", ReportReason::Misinformation);
        flag.description = "Needs review".to_string();

        let report = intake.moderator_flag_at(&moderator, flag.clone(), base()).await.unwrap();
        assert_eq!(report.status, ReportStatus::UnderReview);
        assert!(report.moderator_flagged);

        // Same gate applies to flags
        let err = intake
            .moderator_flag_at(&moderator, flag.clone(), base() + Duration::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::DuplicateReport { .. }));

        let err = intake.moderator_flag_at(&member("alice"), flag, base()).await.unwrap_err();
        assert!(matches!(err, ModerationError::Authorization(_)));
    }
}
