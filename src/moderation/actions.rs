/// Moderation Actions
///
/// An action finalizes its report, records the decision, and applies its
/// side effects in one transaction. Action rows are never edited afterwards;
/// the only later write is a reversal.
use super::notifications::{self, NotificationPayload};
use super::reports::fetch_report;
use super::restrictions::{upsert_restriction, NewRestriction, RestrictionType};
use super::{Actor, ReportStatus, ReportType, Role};
use crate::db::{parse_opt_ts, parse_ts, ts};
use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqliteExecutor, SqlitePool};

pub const MAX_DURATION_DAYS: i64 = 365;
pub const MAX_REASON_LENGTH: usize = 1000;
pub const MAX_VERIFICATION_NOTES_LENGTH: usize = 500;

/// Moderation action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Hide the reported content
    ContentRemoved,
    /// Report dismissed, content stays up
    ContentApproved,
    UserWarned,
    /// Temporary suspension, 1 to 365 days
    UserSuspended,
    /// Permanent suspension
    UserBanned,
    /// Remove a single capability
    RestrictionApplied,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ContentRemoved => "content_removed",
            ActionType::ContentApproved => "content_approved",
            ActionType::UserWarned => "user_warned",
            ActionType::UserSuspended => "user_suspended",
            ActionType::UserBanned => "user_banned",
            ActionType::RestrictionApplied => "restriction_applied",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "content_removed" => Ok(ActionType::ContentRemoved),
            "content_approved" => Ok(ActionType::ContentApproved),
            "user_warned" => Ok(ActionType::UserWarned),
            "user_suspended" => Ok(ActionType::UserSuspended),
            "user_banned" => Ok(ActionType::UserBanned),
            "restriction_applied" => Ok(ActionType::RestrictionApplied),
            _ => Err(ModerationError::Validation(format!("Invalid action type: {}", s))),
        }
    }

    /// Status the related report moves to
    pub fn resulting_status(&self) -> ReportStatus {
        match self {
            ActionType::ContentApproved => ReportStatus::Dismissed,
            _ => ReportStatus::Resolved,
        }
    }

    /// Whether the affected user is told about this action
    pub fn notifies(&self) -> bool {
        !matches!(self, ActionType::ContentApproved)
    }
}

/// Derived lifecycle state of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Active,
    Reversed,
    Expired,
}

/// Evidence review recorded with an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceVerification {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Structured action metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_verification: Option<EvidenceVerification>,
    /// Mirrors the reversal column when read back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_reason: Option<String>,
}

/// Moderation action record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationAction {
    pub id: i64,
    pub moderator_id: String,
    pub target_user_id: Option<String>,
    pub action_type: ActionType,
    pub target_type: ReportType,
    pub target_id: String,
    pub reason: String,
    pub duration_days: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub related_report_id: Option<i64>,
    pub supersedes_action_id: Option<i64>,
    pub restriction_type: Option<RestrictionType>,
    pub internal_notes: Option<String>,
    pub notification_sent: bool,
    pub metadata: ActionMetadata,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub reversal_reason: Option<String>,
}

impl ModerationAction {
    pub fn is_reversed(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> ActionState {
        if self.is_reversed() {
            ActionState::Reversed
        } else if self.expires_at.map_or(false, |exp| exp <= now) {
            ActionState::Expired
        } else {
            ActionState::Active
        }
    }
}

/// Moderator decision on a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeActionParams {
    pub report_id: i64,
    pub action_type: ActionType,
    pub reason: String,
    #[serde(default)]
    pub duration_days: Option<i64>,
    #[serde(default)]
    pub restriction_type: Option<RestrictionType>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub resolution_notes: Option<String>,
    #[serde(default)]
    pub evidence_verified: Option<bool>,
    #[serde(default)]
    pub verification_notes: Option<String>,
}

impl TakeActionParams {
    pub fn new(report_id: i64, action_type: ActionType, reason: impl Into<String>) -> Self {
        Self {
            report_id,
            action_type,
            reason: reason.into(),
            duration_days: None,
            restriction_type: None,
            internal_notes: None,
            resolution_notes: None,
            evidence_verified: None,
            verification_notes: None,
        }
    }
}

/// Effective duration and restriction once the action rules are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActionShape {
    duration_days: Option<i64>,
    restriction_type: Option<RestrictionType>,
}

fn check_duration(days: i64) -> ModResult<i64> {
    if (1..=MAX_DURATION_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ModerationError::Validation(format!(
            "Duration must be between 1 and {} days",
            MAX_DURATION_DAYS
        )))
    }
}

pub(crate) fn check_reason(reason: &str) -> ModResult<()> {
    if reason.trim().is_empty() {
        return Err(ModerationError::Validation("Reason is required".to_string()));
    }
    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ModerationError::Validation(format!(
            "Reason must be at most {} characters",
            MAX_REASON_LENGTH
        )));
    }
    Ok(())
}

fn shape_for(
    action_type: ActionType,
    duration_days: Option<i64>,
    restriction_type: Option<RestrictionType>,
) -> ModResult<ActionShape> {
    let no_suspension = |rt: Option<RestrictionType>| match rt {
        Some(RestrictionType::Suspended) => Err(ModerationError::Validation(
            "Use user_suspended or user_banned to suspend an account".to_string(),
        )),
        other => Ok(other),
    };

    match action_type {
        ActionType::UserSuspended => {
            let days = duration_days.ok_or_else(|| {
                ModerationError::Validation("Suspensions require a duration".to_string())
            })?;
            Ok(ActionShape {
                duration_days: Some(check_duration(days)?),
                restriction_type: Some(RestrictionType::Suspended),
            })
        }
        ActionType::UserBanned => {
            if duration_days.is_some() {
                return Err(ModerationError::Validation(
                    "Bans are permanent and take no duration".to_string(),
                ));
            }
            Ok(ActionShape {
                duration_days: None,
                restriction_type: Some(RestrictionType::Suspended),
            })
        }
        ActionType::RestrictionApplied => {
            let restriction = no_suspension(restriction_type)?.ok_or_else(|| {
                ModerationError::Validation("restriction_applied requires a restriction type".to_string())
            })?;
            Ok(ActionShape {
                duration_days: duration_days.map(check_duration).transpose()?,
                restriction_type: Some(restriction),
            })
        }
        ActionType::ContentRemoved => {
            let restriction = no_suspension(restriction_type)?;
            if restriction.is_none() && duration_days.is_some() {
                return Err(ModerationError::Validation(
                    "A duration applies only together with a restriction".to_string(),
                ));
            }
            Ok(ActionShape {
                duration_days: duration_days.map(check_duration).transpose()?,
                restriction_type: restriction,
            })
        }
        ActionType::UserWarned | ActionType::ContentApproved => {
            if duration_days.is_some() || restriction_type.is_some() {
                return Err(ModerationError::Validation(format!(
                    "{} takes no duration or restriction",
                    action_type.as_str()
                )));
            }
            Ok(ActionShape {
                duration_days: None,
                restriction_type: None,
            })
        }
    }
}

struct NewAction<'a> {
    moderator_id: &'a str,
    target_user_id: Option<&'a str>,
    action_type: ActionType,
    target_type: ReportType,
    target_id: &'a str,
    reason: &'a str,
    shape: ActionShape,
    related_report_id: Option<i64>,
    supersedes_action_id: Option<i64>,
    internal_notes: Option<&'a str>,
    metadata: ActionMetadata,
}

pub(crate) const ACTION_COLUMNS: &str = "id, moderator_id, target_user_id, action_type, target_type, \
     target_id, reason, duration_days, expires_at, related_report_id, supersedes_action_id, \
     restriction_type, internal_notes, notification_sent, metadata, created_at, revoked_at, \
     revoked_by, reversal_reason";

/// Load an action by id
pub(crate) async fn fetch_action<'e, E: SqliteExecutor<'e>>(
    executor: E,
    action_id: i64,
) -> ModResult<Option<ModerationAction>> {
    let row = sqlx::query(&format!("SELECT {} FROM moderation_action WHERE id = ?", ACTION_COLUMNS))
        .bind(action_id)
        .fetch_optional(executor)
        .await?;

    row.map(parse_action).transpose()
}

pub(crate) fn parse_action(row: SqliteRow) -> ModResult<ModerationAction> {
    let metadata: String = row.try_get("metadata")?;
    let reversal_reason: Option<String> = row.try_get("reversal_reason")?;

    let mut metadata: ActionMetadata = serde_json::from_str(&metadata)
        .map_err(|e| ModerationError::Internal(format!("Invalid action metadata: {}", e)))?;
    metadata.reversal_reason = reversal_reason.clone();

    Ok(ModerationAction {
        id: row.try_get("id")?,
        moderator_id: row.try_get("moderator_id")?,
        target_user_id: row.try_get("target_user_id")?,
        action_type: ActionType::from_str(&row.try_get::<String, _>("action_type")?)?,
        target_type: ReportType::from_str(&row.try_get::<String, _>("target_type")?)?,
        target_id: row.try_get("target_id")?,
        reason: row.try_get("reason")?,
        duration_days: row.try_get("duration_days")?,
        expires_at: parse_opt_ts(row.try_get("expires_at")?)?,
        related_report_id: row.try_get("related_report_id")?,
        supersedes_action_id: row.try_get("supersedes_action_id")?,
        restriction_type: row
            .try_get::<Option<String>, _>("restriction_type")?
            .map(|s| RestrictionType::from_str(&s))
            .transpose()?,
        internal_notes: row.try_get("internal_notes")?,
        notification_sent: row.try_get("notification_sent")?,
        metadata,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        revoked_at: parse_opt_ts(row.try_get("revoked_at")?)?,
        revoked_by: row.try_get("revoked_by")?,
        reversal_reason,
    })
}

/// Insert the action row and apply its side effects on one connection
async fn record_action(
    conn: &mut SqliteConnection,
    action: NewAction<'_>,
    now: DateTime<Utc>,
) -> ModResult<ModerationAction> {
    let expires_at = action.shape.duration_days.map(|days| now + Duration::days(days));
    let notify = action.action_type.notifies() && action.target_user_id.is_some();

    let metadata = serde_json::to_string(&action.metadata)
        .map_err(|e| ModerationError::Internal(format!("Failed to encode metadata: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO moderation_action
            (moderator_id, target_user_id, action_type, target_type, target_id, reason,
             duration_days, expires_at, related_report_id, supersedes_action_id,
             restriction_type, internal_notes, notification_sent, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(action.moderator_id)
    .bind(action.target_user_id)
    .bind(action.action_type.as_str())
    .bind(action.target_type.as_str())
    .bind(action.target_id)
    .bind(action.reason)
    .bind(action.shape.duration_days)
    .bind(expires_at.map(ts))
    .bind(action.related_report_id)
    .bind(action.supersedes_action_id)
    .bind(action.shape.restriction_type.map(|rt| rt.as_str()))
    .bind(action.internal_notes)
    .bind(notify)
    .bind(metadata)
    .bind(ts(now))
    .execute(&mut *conn)
    .await?;

    let action_id = result.last_insert_rowid();

    match action.action_type {
        ActionType::ContentRemoved => {
            sqlx::query(
                r#"
                UPDATE content_item
                SET is_removed = 1, removed_at = ?, removed_by_action_id = ?
                WHERE content_type = ? AND content_id = ?
                "#,
            )
            .bind(ts(now))
            .bind(action_id)
            .bind(action.target_type.as_str())
            .bind(action.target_id)
            .execute(&mut *conn)
            .await?;
        }
        ActionType::UserSuspended => {
            sqlx::query("UPDATE user_account SET suspended_until = ?, updated_at = ? WHERE user_id = ?")
                .bind(expires_at.map(ts))
                .bind(ts(now))
                .bind(action.target_user_id)
                .execute(&mut *conn)
                .await?;
        }
        ActionType::UserBanned => {
            sqlx::query("UPDATE user_account SET banned_at = ?, updated_at = ? WHERE user_id = ?")
                .bind(ts(now))
                .bind(ts(now))
                .bind(action.target_user_id)
                .execute(&mut *conn)
                .await?;
        }
        _ => {}
    }

    if let (Some(restriction_type), Some(user_id)) = (action.shape.restriction_type, action.target_user_id) {
        upsert_restriction(
            &mut *conn,
            NewRestriction {
                user_id,
                restriction_type,
                expires_at,
                reason: action.reason,
                applied_by: action.moderator_id,
                related_action_id: Some(action_id),
            },
            now,
        )
        .await?;
    }

    if let (true, Some(user_id)) = (notify, action.target_user_id) {
        notifications::enqueue(
            &mut *conn,
            &NotificationPayload {
                recipient_id: user_id.to_string(),
                action_id,
                action_type: action.action_type,
                reason: action.reason.to_string(),
                expires_at,
            },
            now,
        )
        .await?;
    }

    fetch_action(&mut *conn, action_id)
        .await?
        .ok_or_else(|| ModerationError::Internal(format!("Action {} vanished after insert", action_id)))
}

/// Executes moderator decisions
#[derive(Clone)]
pub struct ActionExecutor {
    db: SqlitePool,
}

impl ActionExecutor {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Take an action on a pending or under-review report
    pub async fn take_action(&self, actor: &Actor, params: TakeActionParams) -> ModResult<ModerationAction> {
        self.take_action_at(actor, params, Utc::now()).await
    }

    pub async fn take_action_at(
        &self,
        actor: &Actor,
        params: TakeActionParams,
        now: DateTime<Utc>,
    ) -> ModResult<ModerationAction> {
        actor.require(Role::Moderator)?;
        check_reason(&params.reason)?;
        if let Some(notes) = &params.verification_notes {
            if notes.chars().count() > MAX_VERIFICATION_NOTES_LENGTH {
                return Err(ModerationError::Validation(format!(
                    "Verification notes must be at most {} characters",
                    MAX_VERIFICATION_NOTES_LENGTH
                )));
            }
        }
        let shape = shape_for(params.action_type, params.duration_days, params.restriction_type)?;

        let mut tx = self.db.begin().await?;

        let report = fetch_report(&mut *tx, params.report_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Report {} not found", params.report_id)))?;

        if report.status.is_finalized() {
            return Err(ModerationError::ReportFinalized(report.id));
        }
        if params.action_type == ActionType::ContentRemoved && !report.report_type.is_content() {
            return Err(ModerationError::Validation(
                "content_removed applies to content reports only".to_string(),
            ));
        }
        if params.action_type != ActionType::ContentApproved && report.reported_user_id.is_none() {
            return Err(ModerationError::Validation(format!(
                "Report {} has no affected user",
                report.id
            )));
        }

        let updated = sqlx::query(
            r#"
            UPDATE report
            SET status = ?, reviewed_by = ?, reviewed_at = ?, resolution_notes = ?, action_taken = ?
            WHERE id = ? AND status IN ('pending', 'under_review')
            "#,
        )
        .bind(params.action_type.resulting_status().as_str())
        .bind(&actor.user_id)
        .bind(ts(now))
        .bind(&params.resolution_notes)
        .bind(params.action_type.as_str())
        .bind(report.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ModerationError::ReportFinalized(report.id));
        }

        let metadata = ActionMetadata {
            evidence_verification: params.evidence_verified.map(|verified| EvidenceVerification {
                verified,
                notes: params.verification_notes.clone(),
                recorded_at: now,
            }),
            reversal_reason: None,
        };

        let action = record_action(
            &mut tx,
            NewAction {
                moderator_id: &actor.user_id,
                target_user_id: report.reported_user_id.as_deref(),
                action_type: params.action_type,
                target_type: report.report_type,
                target_id: &report.target_id,
                reason: params.reason.trim(),
                shape,
                related_report_id: Some(report.id),
                supersedes_action_id: None,
                internal_notes: params.internal_notes.as_deref(),
                metadata,
            },
            now,
        )
        .await?;

        tx.commit().await?;

        crate::metrics::record_action_taken(action.action_type.as_str());
        tracing::info!(
            action_id = action.id,
            report_id = report.id,
            action_type = action.action_type.as_str(),
            moderator = %actor.user_id,
            "Moderation action taken"
        );

        Ok(action)
    }

    /// Re-apply a reversed action as a new action that supersedes it
    pub async fn reapply_action(
        &self,
        actor: &Actor,
        action_id: i64,
        reason: &str,
    ) -> ModResult<ModerationAction> {
        self.reapply_action_at(actor, action_id, reason, Utc::now()).await
    }

    pub async fn reapply_action_at(
        &self,
        actor: &Actor,
        action_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ModResult<ModerationAction> {
        actor.require(Role::Moderator)?;
        check_reason(reason)?;

        let mut tx = self.db.begin().await?;

        let original = fetch_action(&mut *tx, action_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Moderation action {} not found", action_id)))?;

        if !original.is_reversed() {
            return Err(ModerationError::Conflict(format!(
                "Moderation action {} is still in force, only reversed actions can be re-applied",
                action_id
            )));
        }

        let superseded_by: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM moderation_action WHERE supersedes_action_id = ? AND revoked_at IS NULL LIMIT 1",
        )
        .bind(action_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(existing) = superseded_by {
            return Err(ModerationError::Conflict(format!(
                "Moderation action {} was already re-applied as action {}",
                action_id, existing
            )));
        }

        let action = record_action(
            &mut tx,
            NewAction {
                moderator_id: &actor.user_id,
                target_user_id: original.target_user_id.as_deref(),
                action_type: original.action_type,
                target_type: original.target_type,
                target_id: &original.target_id,
                reason: reason.trim(),
                shape: ActionShape {
                    duration_days: original.duration_days,
                    restriction_type: original.restriction_type,
                },
                related_report_id: original.related_report_id,
                supersedes_action_id: Some(original.id),
                internal_notes: original.internal_notes.as_deref(),
                metadata: ActionMetadata::default(),
            },
            now,
        )
        .await?;

        tx.commit().await?;

        crate::metrics::record_action_taken(action.action_type.as_str());
        tracing::info!(
            action_id = action.id,
            supersedes = original.id,
            moderator = %actor.user_id,
            "Moderation action re-applied"
        );

        Ok(action)
    }

    /// Get an action by id
    pub async fn get_action(&self, action_id: i64) -> ModResult<ModerationAction> {
        fetch_action(&self.db, action_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Moderation action {} not found", action_id)))
    }

    /// Actions recorded against a report, oldest first
    pub async fn actions_for_report(&self, report_id: i64) -> ModResult<Vec<ModerationAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM moderation_action WHERE related_report_id = ? ORDER BY id ASC",
            ACTION_COLUMNS
        ))
        .bind(report_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_action).collect()
    }

    /// Action history for a user, newest first
    pub async fn history_for_user(&self, user_id: &str) -> ModResult<Vec<ModerationAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM moderation_action WHERE target_user_id = ? ORDER BY created_at DESC, id DESC",
            ACTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_action).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::fixtures::{self, base};
    use crate::moderation::{Capability, ReportReason, RestrictionEvaluator};

    fn moderator() -> Actor {
        Actor::new("mod-1", Role::Moderator)
    }

    async fn open_report(db: &SqlitePool, report_type: ReportType, target: &str) -> i64 {
        fixtures::raw_report(
            db,
            "alice",
            "bob",
            report_type,
            target,
            ReportReason::Harassment,
            ReportStatus::Pending,
            false,
            base(),
        )
        .await
    }

    #[test]
    fn test_action_type_from_str() {
        assert_eq!(ActionType::from_str("user_banned").unwrap(), ActionType::UserBanned);
        assert!(ActionType::from_str("takedown").is_err());
        assert_eq!(ActionType::ContentApproved.resulting_status(), ReportStatus::Dismissed);
        assert_eq!(ActionType::UserWarned.resulting_status(), ReportStatus::Resolved);
    }

    #[test]
    fn test_action_shape_rules() {
        assert!(shape_for(ActionType::UserSuspended, None, None).is_err());
        assert!(shape_for(ActionType::UserSuspended, Some(0), None).is_err());
        assert!(shape_for(ActionType::UserSuspended, Some(366), None).is_err());
        let shape = shape_for(ActionType::UserSuspended, Some(365), None).unwrap();
        assert_eq!(shape.restriction_type, Some(RestrictionType::Suspended));

        assert!(shape_for(ActionType::UserBanned, Some(3), None).is_err());
        assert!(shape_for(ActionType::RestrictionApplied, Some(3), None).is_err());
        assert!(shape_for(ActionType::RestrictionApplied, None, Some(RestrictionType::Suspended)).is_err());
        assert!(shape_for(ActionType::ContentRemoved, Some(3), None).is_err());
        assert!(shape_for(ActionType::UserWarned, Some(3), None).is_err());
        assert!(shape_for(ActionType::ContentRemoved, None, Some(RestrictionType::PostingDisabled)).is_ok());
    }

    #[tokio::test]
    async fn test_suspension_finalizes_report_and_restricts() {
        let (db, directory) = fixtures::seeded().await;
        let executor = ActionExecutor::new(db.clone());
        let report_id = open_report(&db, ReportType::Post, "p1").await;

        let mut params = TakeActionParams::new(report_id, ActionType::UserSuspended, "Repeated harassment");
        params.duration_days = Some(7);
        params.evidence_verified = Some(true);

        let action = executor.take_action_at(&moderator(), params, base()).await.unwrap();
        assert_eq!(action.target_user_id.as_deref(), Some("bob"));
        assert_eq!(action.expires_at, Some(base() + Duration::days(7)));
        assert!(action.notification_sent);
        assert!(action.metadata.evidence_verification.as_ref().unwrap().verified);
        assert_eq!(action.state_at(base()), ActionState::Active);
        assert_eq!(action.state_at(base() + Duration::days(8)), ActionState::Expired);

        let report = fetch_report(&db, report_id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Resolved);
        assert_eq!(report.reviewed_by.as_deref(), Some("mod-1"));
        assert_eq!(report.action_taken, Some(ActionType::UserSuspended));

        let evaluator = RestrictionEvaluator::new(db.clone());
        assert!(!evaluator.can_perform_at("bob", Capability::Post, base()).await.unwrap());

        let status = directory.account_status("bob").await.unwrap().unwrap();
        assert_eq!(status.suspended_until, action.expires_at);
    }

    #[tokio::test]
    async fn test_finalized_report_rejects_second_action() {
        let (db, _) = fixtures::seeded().await;
        let executor = ActionExecutor::new(db.clone());
        let report_id = open_report(&db, ReportType::Post, "p1").await;

        executor
            .take_action_at(
                &moderator(),
                TakeActionParams::new(report_id, ActionType::ContentApproved, "Not a violation"),
                base(),
            )
            .await
            .unwrap();

        let report = fetch_report(&db, report_id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Dismissed);

        let err = executor
            .take_action_at(
                &moderator(),
                TakeActionParams::new(report_id, ActionType::UserWarned, "Changed my mind"),
                base(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::ReportFinalized(id) if id == report_id));

        // Storage refuses to move a finalized report too
        let raw = sqlx::query("UPDATE report SET status = 'pending' WHERE id = ?")
            .bind(report_id)
            .execute(&db)
            .await
            .unwrap_err();
        assert!(crate::db::is_immutability_violation(&raw));
    }

    #[tokio::test]
    async fn test_content_removal_hides_content() {
        let (db, directory) = fixtures::seeded().await;
        let executor = ActionExecutor::new(db.clone());
        let report_id = open_report(&db, ReportType::Track, "t1").await;

        let mut params = TakeActionParams::new(report_id, ActionType::ContentRemoved, "Hate speech in lyrics");
        params.restriction_type = Some(RestrictionType::UploadDisabled);
        params.duration_days = Some(30);

        let action = executor.take_action_at(&moderator(), params, base()).await.unwrap();
        assert!(directory.is_content_removed(ReportType::Track, "t1").await.unwrap());

        let evaluator = RestrictionEvaluator::new(db.clone());
        assert!(!evaluator.can_perform_at("bob", Capability::Upload, base()).await.unwrap());
        assert!(evaluator.can_perform_at("bob", Capability::Post, base()).await.unwrap());

        let restrictions = evaluator.active_for_user("bob", base()).await.unwrap();
        assert_eq!(restrictions[0].related_action_id, Some(action.id));
    }

    #[tokio::test]
    async fn test_profile_report_cannot_remove_content() {
        let (db, _) = fixtures::seeded().await;
        let executor = ActionExecutor::new(db.clone());
        let report_id = open_report(&db, ReportType::User, "bob").await;

        let err = executor
            .take_action_at(
                &moderator(),
                TakeActionParams::new(report_id, ActionType::ContentRemoved, "Remove"),
                base(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));

        // Failed action left the report untouched
        let report = fetch_report(&db, report_id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
    }

    #[tokio::test]
    async fn test_regular_member_cannot_act() {
        let (db, _) = fixtures::seeded().await;
        let executor = ActionExecutor::new(db.clone());
        let report_id = open_report(&db, ReportType::Post, "p1").await;

        let err = executor
            .take_action_at(
                &Actor::new("carol", Role::Regular),
                TakeActionParams::new(report_id, ActionType::UserWarned, "Warn"),
                base(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_action_rows_are_immutable() {
        let (db, _) = fixtures::seeded().await;
        let executor = ActionExecutor::new(db.clone());
        let report_id = open_report(&db, ReportType::Post, "p1").await;

        let action = executor
            .take_action_at(
                &moderator(),
                TakeActionParams::new(report_id, ActionType::UserWarned, "First warning"),
                base(),
            )
            .await
            .unwrap();

        let err = sqlx::query("UPDATE moderation_action SET reason = 'edited' WHERE id = ?")
            .bind(action.id)
            .execute(&db)
            .await
            .unwrap_err();
        assert!(crate::db::is_immutability_violation(&err));

        let err = sqlx::query("DELETE FROM moderation_action WHERE id = ?")
            .bind(action.id)
            .execute(&db)
            .await
            .unwrap_err();
        assert!(crate::db::is_immutability_violation(&err));

        let history = executor.history_for_user("bob").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(executor.actions_for_report(report_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reapply_requires_reversed_action() {
        let (db, _) = fixtures::seeded().await;
        let executor = ActionExecutor::new(db.clone());
        let report_id = open_report(&db, ReportType::Post, "p1").await;

        let action = executor
            .take_action_at(
                &moderator(),
                TakeActionParams::new(report_id, ActionType::UserWarned, "Warning"),
                base(),
            )
            .await
            .unwrap();

        let err = executor
            .reapply_action_at(&moderator(), action.id, "Again", base())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Conflict(_)));

        let err = executor
            .reapply_action_at(&moderator(), 9_999, "Again", base())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));
    }
}
