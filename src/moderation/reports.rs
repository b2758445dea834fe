/// Report records and the fixed reason taxonomy
use super::evidence::Evidence;
use super::ActionType;
use crate::db::{parse_opt_ts, parse_ts};
use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};

/// What a report points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Post,
    Comment,
    Track,
    Album,
    User,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Post => "post",
            ReportType::Comment => "comment",
            ReportType::Track => "track",
            ReportType::Album => "album",
            ReportType::User => "user",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "post" => Ok(ReportType::Post),
            "comment" => Ok(ReportType::Comment),
            "track" => Ok(ReportType::Track),
            "album" => Ok(ReportType::Album),
            "user" => Ok(ReportType::User),
            _ => Err(ModerationError::Validation(format!("Invalid report type: {}", s))),
        }
    }

    /// Noun used in user-facing messages
    pub fn noun(&self) -> &'static str {
        match self {
            ReportType::User => "profile",
            other => other.as_str(),
        }
    }

    /// Content reports point at an owned item rather than an account
    pub fn is_content(&self) -> bool {
        !matches!(self, ReportType::User)
    }
}

/// Report reason taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    SelfHarm,
    Violence,
    HateSpeech,
    Harassment,
    CopyrightViolation,
    Impersonation,
    InappropriateContent,
    Misinformation,
    Spam,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::SelfHarm => "self_harm",
            ReportReason::Violence => "violence",
            ReportReason::HateSpeech => "hate_speech",
            ReportReason::Harassment => "harassment",
            ReportReason::CopyrightViolation => "copyright_violation",
            ReportReason::Impersonation => "impersonation",
            ReportReason::InappropriateContent => "inappropriate_content",
            ReportReason::Misinformation => "misinformation",
            ReportReason::Spam => "spam",
            ReportReason::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "self_harm" => Ok(ReportReason::SelfHarm),
            "violence" => Ok(ReportReason::Violence),
            "hate_speech" => Ok(ReportReason::HateSpeech),
            "harassment" => Ok(ReportReason::Harassment),
            "copyright_violation" => Ok(ReportReason::CopyrightViolation),
            "impersonation" => Ok(ReportReason::Impersonation),
            "inappropriate_content" => Ok(ReportReason::InappropriateContent),
            "misinformation" => Ok(ReportReason::Misinformation),
            "spam" => Ok(ReportReason::Spam),
            "other" => Ok(ReportReason::Other),
            _ => Err(ModerationError::Validation(format!("Invalid report reason: {}", s))),
        }
    }

    /// Static reason → priority map (1 = most urgent)
    pub fn priority(&self) -> u8 {
        match self {
            ReportReason::SelfHarm | ReportReason::Violence => 1,
            ReportReason::HateSpeech | ReportReason::Harassment => 2,
            ReportReason::CopyrightViolation
            | ReportReason::Impersonation
            | ReportReason::InappropriateContent => 3,
            ReportReason::Misinformation | ReportReason::Spam => 4,
            ReportReason::Other => 5,
        }
    }
}

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::UnderReview => "under_review",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReportStatus::Pending),
            "under_review" => Ok(ReportStatus::UnderReview),
            "resolved" => Ok(ReportStatus::Resolved),
            "dismissed" => Ok(ReportStatus::Dismissed),
            _ => Err(ModerationError::Validation(format!("Invalid report status: {}", s))),
        }
    }

    /// A moderator decision has been recorded
    pub fn is_finalized(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Dismissed)
    }

    /// Queue rank, lower sorts first
    pub fn queue_rank(&self) -> u8 {
        match self {
            ReportStatus::UnderReview => 0,
            ReportStatus::Pending => 1,
            ReportStatus::Resolved => 2,
            ReportStatus::Dismissed => 3,
        }
    }
}

/// Report record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub reporter_id: String,
    pub reported_user_id: Option<String>,
    pub report_type: ReportType,
    pub target_id: String,
    pub reason: ReportReason,
    pub description: String,
    pub evidence: Option<Evidence>,
    pub has_evidence: bool,
    pub status: ReportStatus,
    pub priority: u8,
    pub moderator_flagged: bool,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub action_taken: Option<ActionType>,
}

/// Client-supplied report before it passes the intake gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDraft {
    pub report_type: ReportType,
    pub target_id: String,
    pub reason: ReportReason,
    pub description: String,
    #[serde(default)]
    pub evidence: Option<Evidence>,
}

pub(crate) const REPORT_COLUMNS: &str = "id, reporter_id, reported_user_id, report_type, target_id, reason, \
     description, evidence, has_evidence, status, priority, moderator_flagged, created_at, \
     reviewed_by, reviewed_at, resolution_notes, action_taken";

/// Load a report by id
pub(crate) async fn fetch_report<'e, E: SqliteExecutor<'e>>(
    executor: E,
    report_id: i64,
) -> ModResult<Option<Report>> {
    let row = sqlx::query(&format!("SELECT {} FROM report WHERE id = ?", REPORT_COLUMNS))
        .bind(report_id)
        .fetch_optional(executor)
        .await?;

    row.map(parse_report).transpose()
}

pub(crate) fn parse_report(row: SqliteRow) -> ModResult<Report> {
    let report_type = ReportType::from_str(&row.try_get::<String, _>("report_type")?)?;
    let reason = ReportReason::from_str(&row.try_get::<String, _>("reason")?)?;
    let status = ReportStatus::from_str(&row.try_get::<String, _>("status")?)?;

    let evidence = row
        .try_get::<Option<String>, _>("evidence")?
        .map(|json| serde_json::from_str::<Evidence>(&json))
        .transpose()
        .map_err(|e| ModerationError::Internal(format!("Invalid evidence payload: {}", e)))?;

    let action_taken = row
        .try_get::<Option<String>, _>("action_taken")?
        .map(|s| ActionType::from_str(&s))
        .transpose()?;

    let priority: i64 = row.try_get("priority")?;

    Ok(Report {
        id: row.try_get("id")?,
        reporter_id: row.try_get("reporter_id")?,
        reported_user_id: row.try_get("reported_user_id")?,
        report_type,
        target_id: row.try_get("target_id")?,
        reason,
        description: row.try_get("description")?,
        evidence,
        has_evidence: row.try_get("has_evidence")?,
        status,
        priority: priority.clamp(1, 5) as u8,
        moderator_flagged: row.try_get("moderator_flagged")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: parse_opt_ts(row.try_get("reviewed_at")?)?,
        resolution_notes: row.try_get("resolution_notes")?,
        action_taken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_priority_map() {
        assert_eq!(ReportReason::SelfHarm.priority(), 1);
        assert_eq!(ReportReason::Violence.priority(), 1);
        assert_eq!(ReportReason::Harassment.priority(), 2);
        assert_eq!(ReportReason::CopyrightViolation.priority(), 3);
        assert_eq!(ReportReason::Spam.priority(), 4);
        assert_eq!(ReportReason::Other.priority(), 5);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(ReportStatus::from_str("under_review").unwrap(), ReportStatus::UnderReview);
        assert_eq!(ReportStatus::from_str("RESOLVED").unwrap(), ReportStatus::Resolved);
        assert!(ReportStatus::from_str("open").is_err());

        assert!(ReportStatus::Dismissed.is_finalized());
        assert!(!ReportStatus::UnderReview.is_finalized());
    }

    #[test]
    fn test_type_nouns() {
        assert_eq!(ReportType::User.noun(), "profile");
        assert_eq!(ReportType::Album.noun(), "album");
        assert!(!ReportType::User.is_content());
        assert!(ReportType::Track.is_content());
    }

    #[test]
    fn test_draft_deserializes_snake_case() {
        let draft: ReportDraft = serde_json::from_str(
            r#"{"report_type":"track","target_id":"t1","reason":"hate_speech","description":"a description long enough"}"#,
        )
        .unwrap();
        assert_eq!(draft.report_type, ReportType::Track);
        assert_eq!(draft.reason, ReportReason::HateSpeech);
        assert!(draft.evidence.is_none());
    }
}
