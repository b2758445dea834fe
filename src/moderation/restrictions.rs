/// User restrictions and capability checks
use crate::db::{parse_opt_ts, parse_ts, ts};
use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

/// Restriction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionType {
    PostingDisabled,
    CommentingDisabled,
    UploadDisabled,
    /// Blocks every capability
    Suspended,
}

impl RestrictionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionType::PostingDisabled => "posting_disabled",
            RestrictionType::CommentingDisabled => "commenting_disabled",
            RestrictionType::UploadDisabled => "upload_disabled",
            RestrictionType::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "posting_disabled" => Ok(RestrictionType::PostingDisabled),
            "commenting_disabled" => Ok(RestrictionType::CommentingDisabled),
            "upload_disabled" => Ok(RestrictionType::UploadDisabled),
            "suspended" => Ok(RestrictionType::Suspended),
            _ => Err(ModerationError::Validation(format!("Invalid restriction type: {}", s))),
        }
    }
}

/// Things a user may be prevented from doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Post,
    Comment,
    Upload,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Post => "post",
            Capability::Comment => "comment",
            Capability::Upload => "upload",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "post" => Ok(Capability::Post),
            "comment" => Ok(Capability::Comment),
            "upload" => Ok(Capability::Upload),
            _ => Err(ModerationError::Validation(format!("Invalid capability: {}", s))),
        }
    }

    /// The restriction that removes this capability specifically
    pub fn restriction(&self) -> RestrictionType {
        match self {
            Capability::Post => RestrictionType::PostingDisabled,
            Capability::Comment => RestrictionType::CommentingDisabled,
            Capability::Upload => RestrictionType::UploadDisabled,
        }
    }
}

/// Restriction record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRestriction {
    pub id: i64,
    pub user_id: String,
    pub restriction_type: RestrictionType,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub reason: String,
    pub applied_by: String,
    pub related_action_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New restriction written by an action
#[derive(Debug, Clone)]
pub(crate) struct NewRestriction<'a> {
    pub user_id: &'a str,
    pub restriction_type: RestrictionType,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: &'a str,
    pub applied_by: &'a str,
    pub related_action_id: Option<i64>,
}

/// Replace any active restriction of the same type with a new one.
///
/// Runs on the caller's connection so it joins the action transaction.
pub(crate) async fn upsert_restriction(
    conn: &mut SqliteConnection,
    restriction: NewRestriction<'_>,
    now: DateTime<Utc>,
) -> ModResult<i64> {
    let now = ts(now);

    sqlx::query(
        r#"
        UPDATE user_restriction
        SET is_active = 0, updated_at = ?
        WHERE user_id = ? AND restriction_type = ? AND is_active = 1
        "#,
    )
    .bind(&now)
    .bind(restriction.user_id)
    .bind(restriction.restriction_type.as_str())
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO user_restriction
            (user_id, restriction_type, expires_at, is_active, reason, applied_by,
             related_action_id, created_at, updated_at)
        VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(restriction.user_id)
    .bind(restriction.restriction_type.as_str())
    .bind(restriction.expires_at.map(ts))
    .bind(restriction.reason)
    .bind(restriction.applied_by)
    .bind(restriction.related_action_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub restrictions_expired: u64,
    pub suspensions_cleared: u64,
}

/// Restriction evaluator
#[derive(Clone)]
pub struct RestrictionEvaluator {
    db: SqlitePool,
}

impl RestrictionEvaluator {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Whether the user may currently use a capability
    pub async fn can_perform(&self, user_id: &str, capability: Capability) -> ModResult<bool> {
        self.can_perform_at(user_id, capability, Utc::now()).await
    }

    /// Capability check at a given instant.
    ///
    /// Expiry is checked inline, so the answer never depends on whether the
    /// sweep has run yet.
    pub async fn can_perform_at(
        &self,
        user_id: &str,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> ModResult<bool> {
        let blocking: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM user_restriction
            WHERE user_id = ?
              AND is_active = 1
              AND restriction_type IN (?, 'suspended')
              AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(user_id)
        .bind(capability.restriction().as_str())
        .bind(ts(now))
        .fetch_one(&self.db)
        .await?;

        Ok(blocking == 0)
    }

    /// Restrictions in force for a user
    pub async fn active_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ModResult<Vec<UserRestriction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, restriction_type, expires_at, is_active, reason, applied_by,
                   related_action_id, created_at, updated_at
            FROM user_restriction
            WHERE user_id = ?
              AND is_active = 1
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(ts(now))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_restriction).collect()
    }

    /// Full restriction history for a user, newest first
    pub async fn history(&self, user_id: &str) -> ModResult<Vec<UserRestriction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, restriction_type, expires_at, is_active, reason, applied_by,
                   related_action_id, created_at, updated_at
            FROM user_restriction
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_restriction).collect()
    }

    /// Deactivate expired restrictions and clear lapsed suspensions
    pub async fn sweep_expired(&self) -> ModResult<SweepOutcome> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> ModResult<SweepOutcome> {
        let now = ts(now);
        let mut tx = self.db.begin().await?;

        let restrictions = sqlx::query(
            r#"
            UPDATE user_restriction
            SET is_active = 0, updated_at = ?
            WHERE is_active = 1
              AND expires_at IS NOT NULL
              AND expires_at <= ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let suspensions = sqlx::query(
            r#"
            UPDATE user_account
            SET suspended_until = NULL, updated_at = ?
            WHERE suspended_until IS NOT NULL
              AND suspended_until <= ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SweepOutcome {
            restrictions_expired: restrictions.rows_affected(),
            suspensions_cleared: suspensions.rows_affected(),
        })
    }
}

fn parse_restriction(row: SqliteRow) -> ModResult<UserRestriction> {
    Ok(UserRestriction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        restriction_type: RestrictionType::from_str(&row.try_get::<String, _>("restriction_type")?)?,
        expires_at: parse_opt_ts(row.try_get("expires_at")?)?,
        is_active: row.try_get("is_active")?,
        reason: row.try_get("reason")?,
        applied_by: row.try_get("applied_by")?,
        related_action_id: row.try_get("related_action_id")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}
