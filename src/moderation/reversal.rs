/// Action Reversal and Verification
///
/// A reversal is written once: the action's revoke columns plus a
/// write-once fact row, in the same transaction that undoes the action's
/// side effects. The verifier later cross-checks the two.
use super::actions::{check_reason, fetch_action, ActionState, ActionType, ModerationAction};
use super::security::{
    record_event, AdminAlert, FindingKind, SecurityEventType, SecurityLog, Severity, SuspiciousActivity,
};
use super::{Actor, Role};
use crate::db::{is_immutability_violation, is_unique_violation, parse_opt_ts, parse_ts, ts};
use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Clock skew tolerated before a revoke time counts as "in the future"
const FUTURE_TOLERANCE_SECS: i64 = 60;

/// Reverses actions
#[derive(Clone)]
pub struct ReversalManager {
    db: SqlitePool,
    security: SecurityLog,
}

impl ReversalManager {
    pub fn new(db: SqlitePool, security: SecurityLog) -> Self {
        Self { db, security }
    }

    /// Reverse an action and undo its side effects
    pub async fn reverse(&self, actor: &Actor, action_id: i64, reason: &str) -> ModResult<ModerationAction> {
        self.reverse_at(actor, action_id, reason, Utc::now()).await
    }

    pub async fn reverse_at(
        &self,
        actor: &Actor,
        action_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ModResult<ModerationAction> {
        actor.require(Role::Moderator)?;
        check_reason(reason)?;
        let reason = reason.trim();

        let mut tx = self.db.begin().await?;

        let action = fetch_action(&mut *tx, action_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Moderation action {} not found", action_id)))?;

        if action.is_reversed() {
            record_event(
                &mut *tx,
                SecurityEventType::ReversalModificationAttempt,
                Some(&actor.user_id),
                &json!({
                    "action_id": action_id,
                    "original_revoked_by": action.revoked_by,
                    "attempted_reason": reason,
                }),
                now,
            )
            .await?;
            tx.commit().await?;

            tracing::warn!(action_id, actor = %actor.user_id, "Attempt to modify an existing reversal");
            return Err(ModerationError::AlreadyReversed(action_id));
        }

        if action.state_at(now) == ActionState::Expired {
            tx.rollback().await?;
            return Err(ModerationError::Conflict(format!(
                "Moderation action {} has already expired",
                action_id
            )));
        }

        let updated = sqlx::query(
            r#"
            UPDATE moderation_action
            SET revoked_at = ?, revoked_by = ?, reversal_reason = ?
            WHERE id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(ts(now))
        .bind(&actor.user_id)
        .bind(reason)
        .bind(action_id)
        .execute(&mut *tx)
        .await;

        let updated = match updated {
            Ok(result) => result.rows_affected(),
            Err(e) if is_immutability_violation(&e) => 0,
            Err(e) => return Err(e.into()),
        };
        if updated == 0 {
            tx.rollback().await?;
            return self.blocked(actor, action_id, now).await;
        }

        let fact = sqlx::query(
            r#"
            INSERT INTO action_reversal (action_id, revoked_at, revoked_by, reversal_reason, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(action_id)
        .bind(ts(now))
        .bind(&actor.user_id)
        .bind(reason)
        .bind(ts(now))
        .execute(&mut *tx)
        .await;

        match fact {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return self.blocked(actor, action_id, now).await;
            }
            Err(e) => return Err(e.into()),
        }

        // Undo side effects
        sqlx::query(
            "UPDATE user_restriction SET is_active = 0, updated_at = ? WHERE related_action_id = ? AND is_active = 1",
        )
        .bind(ts(now))
        .bind(action_id)
        .execute(&mut *tx)
        .await?;

        match action.action_type {
            ActionType::ContentRemoved => {
                sqlx::query(
                    r#"
                    UPDATE content_item
                    SET is_removed = 0, removed_at = NULL, removed_by_action_id = NULL
                    WHERE removed_by_action_id = ?
                    "#,
                )
                .bind(action_id)
                .execute(&mut *tx)
                .await?;
            }
            ActionType::UserSuspended => {
                sqlx::query(
                    "UPDATE user_account SET suspended_until = NULL, updated_at = ? WHERE user_id = ? AND suspended_until = ?",
                )
                .bind(ts(now))
                .bind(&action.target_user_id)
                .bind(action.expires_at.map(ts))
                .execute(&mut *tx)
                .await?;
            }
            ActionType::UserBanned => {
                sqlx::query(
                    "UPDATE user_account SET banned_at = NULL, updated_at = ? WHERE user_id = ? AND banned_at = ?",
                )
                .bind(ts(now))
                .bind(&action.target_user_id)
                .bind(ts(action.created_at))
                .execute(&mut *tx)
                .await?;
            }
            _ => {}
        }

        if action.moderator_id == actor.user_id {
            record_event(
                &mut *tx,
                SecurityEventType::SelfReversal,
                Some(&actor.user_id),
                &json!({ "action_id": action_id, "action_type": action.action_type.as_str() }),
                now,
            )
            .await?;
        }

        tx.commit().await?;

        crate::metrics::record_action_reversed(action.action_type.as_str());
        tracing::info!(
            action_id,
            action_type = action.action_type.as_str(),
            revoked_by = %actor.user_id,
            "Moderation action reversed"
        );

        fetch_action(&self.db, action_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Moderation action {} not found", action_id)))
    }

    /// Storage refused the reversal write; log it and report the action as reversed
    async fn blocked(&self, actor: &Actor, action_id: i64, now: DateTime<Utc>) -> ModResult<ModerationAction> {
        self.security
            .record(
                SecurityEventType::ImmutabilityViolationBlocked,
                Some(&actor.user_id),
                json!({ "action_id": action_id }),
                now,
            )
            .await?;
        Err(ModerationError::AlreadyReversed(action_id))
    }
}

/// Structural problem found on a reversed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalIssue {
    /// Some but not all revoke columns are set
    PartialReversal,
    RevokedBeforeCreated,
    RevokedInFuture,
    /// Revoke columns set without a write-once fact
    MissingReversalFact,
    /// Revoke columns disagree with the write-once fact
    DivergesFromFact,
}

impl ReversalIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReversalIssue::PartialReversal => "partial_reversal",
            ReversalIssue::RevokedBeforeCreated => "revoked_before_created",
            ReversalIssue::RevokedInFuture => "revoked_in_future",
            ReversalIssue::MissingReversalFact => "missing_reversal_fact",
            ReversalIssue::DivergesFromFact => "diverges_from_fact",
        }
    }

    /// Divergence from the fact row means a completed reversal was rewritten
    pub fn is_tampering(&self) -> bool {
        matches!(self, ReversalIssue::DivergesFromFact)
    }
}

/// One verification finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalProblem {
    pub action_id: i64,
    pub issue: ReversalIssue,
}

/// Result of a verification pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub checked: usize,
    pub problems: Vec<ReversalProblem>,
    /// Problems first seen on this pass
    pub new_problems: usize,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Cross-checks reversal columns against the write-once fact table
#[derive(Clone)]
pub struct ReversalVerifier {
    db: SqlitePool,
    security: SecurityLog,
    alerts: Arc<dyn AdminAlert>,
}

impl ReversalVerifier {
    pub fn new(db: SqlitePool, security: SecurityLog, alerts: Arc<dyn AdminAlert>) -> Self {
        Self { db, security, alerts }
    }

    pub async fn verify(&self) -> ModResult<VerificationReport> {
        self.verify_at(Utc::now()).await
    }

    /// Check every reversed action.
    ///
    /// Each problem is logged once; tampering also raises an admin alert.
    pub async fn verify_at(&self, now: DateTime<Utc>) -> ModResult<VerificationReport> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.created_at, a.revoked_at, a.revoked_by, a.reversal_reason,
                   f.action_id AS fact_action_id, f.revoked_at AS fact_revoked_at,
                   f.revoked_by AS fact_revoked_by, f.reversal_reason AS fact_reason
            FROM moderation_action a
            LEFT JOIN action_reversal f ON f.action_id = a.id
            WHERE a.revoked_at IS NOT NULL
               OR a.revoked_by IS NOT NULL
               OR a.reversal_reason IS NOT NULL
               OR f.action_id IS NOT NULL
            ORDER BY a.id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut report = VerificationReport {
            checked: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let snapshot = ReversalSnapshot {
                created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
                revoked_at: parse_opt_ts(row.try_get("revoked_at")?)?,
                revoked_by: row.try_get("revoked_by")?,
                reversal_reason: row.try_get("reversal_reason")?,
                fact: match row.try_get::<Option<i64>, _>("fact_action_id")? {
                    Some(_) => Some(ReversalFact {
                        revoked_at: parse_ts(&row.try_get::<String, _>("fact_revoked_at")?)?,
                        revoked_by: row.try_get("fact_revoked_by")?,
                        reversal_reason: row.try_get("fact_reason")?,
                    }),
                    None => None,
                },
            };
            let action_id: i64 = row.try_get("id")?;

            for issue in snapshot.issues(now) {
                report.problems.push(ReversalProblem { action_id, issue });
                if self.flag(action_id, issue, &snapshot, now).await? {
                    report.new_problems += 1;
                }
            }
        }

        if !report.is_clean() {
            tracing::warn!(
                checked = report.checked,
                problems = report.problems.len(),
                new_problems = report.new_problems,
                "Reversal verification found problems"
            );
        }

        Ok(report)
    }

    /// Log a problem unless it is already on record; returns true when newly logged
    async fn flag(
        &self,
        action_id: i64,
        issue: ReversalIssue,
        snapshot: &ReversalSnapshot,
        now: DateTime<Utc>,
    ) -> ModResult<bool> {
        let event_type = if issue.is_tampering() {
            SecurityEventType::ReversalTampered
        } else {
            SecurityEventType::StructuralInconsistency
        };

        if self.security.has_action_event(event_type, action_id, issue.as_str()).await? {
            return Ok(false);
        }

        let details = json!({
            "action_id": action_id,
            "issue": issue.as_str(),
            "revoked_by": snapshot.revoked_by,
            "recorded_revoked_by": snapshot.fact.as_ref().map(|f| f.revoked_by.clone()),
        });
        self.security
            .record(event_type, snapshot.revoked_by.as_deref(), details, now)
            .await?;

        if issue.is_tampering() {
            let finding = SuspiciousActivity {
                kind: FindingKind::SuccessfulTampering,
                severity: Severity::Critical,
                user_id: snapshot.revoked_by.clone(),
                event_count: 1,
                action_ids: vec![action_id],
                first_seen: now,
                last_seen: now,
            };
            self.alerts.critical(&finding).await?;
        }

        Ok(true)
    }
}

struct ReversalFact {
    revoked_at: DateTime<Utc>,
    revoked_by: String,
    reversal_reason: String,
}

struct ReversalSnapshot {
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
    reversal_reason: Option<String>,
    fact: Option<ReversalFact>,
}

impl ReversalSnapshot {
    fn issues(&self, now: DateTime<Utc>) -> Vec<ReversalIssue> {
        let mut issues = Vec::new();

        let set = [
            self.revoked_at.is_some(),
            self.revoked_by.is_some(),
            self.reversal_reason.is_some(),
        ];
        let complete = set.iter().all(|s| *s);
        if set.iter().any(|s| *s) && !complete {
            issues.push(ReversalIssue::PartialReversal);
        }

        if let Some(revoked_at) = self.revoked_at {
            if revoked_at < self.created_at {
                issues.push(ReversalIssue::RevokedBeforeCreated);
            }
            if revoked_at > now + Duration::seconds(FUTURE_TOLERANCE_SECS) {
                issues.push(ReversalIssue::RevokedInFuture);
            }
        }

        match &self.fact {
            None if complete => issues.push(ReversalIssue::MissingReversalFact),
            Some(fact) => {
                let matches = self.revoked_at == Some(fact.revoked_at)
                    && self.revoked_by.as_deref() == Some(fact.revoked_by.as_str())
                    && self.reversal_reason.as_deref() == Some(fact.reversal_reason.as_str());
                if !matches {
                    issues.push(ReversalIssue::DivergesFromFact);
                }
            }
            None => {}
        }

        issues
    }
}
