/// Security Event Log and Suspicious Activity Detection
///
/// Every rejected abuse attempt and every reversal anomaly is appended to
/// `security_event`. The detector scans a recent window of that log and
/// grades what it finds.
use crate::db::{parse_ts, ts};
use crate::error::{ModResult, ModerationError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use std::collections::BTreeMap;

/// Repeated blocked reversal attempts that raise a medium finding
pub const ATTEMPTS_MEDIUM_THRESHOLD: usize = 5;
/// Repeated blocked reversal attempts that raise a high finding
pub const ATTEMPTS_HIGH_THRESHOLD: usize = 10;
/// Attempts closer together than this look scripted
pub const RAPID_FIRE_GAP_MS: i64 = 1_000;

/// Security event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    SelfReport,
    DuplicateReport,
    AdminProtection,
    RateLimitExceeded,
    ReversalModificationAttempt,
    ImmutabilityViolationBlocked,
    SelfReversal,
    ReversalTampered,
    StructuralInconsistency,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::SelfReport => "self_report",
            SecurityEventType::DuplicateReport => "duplicate_report",
            SecurityEventType::AdminProtection => "admin_protection",
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::ReversalModificationAttempt => "reversal_modification_attempt",
            SecurityEventType::ImmutabilityViolationBlocked => "immutability_violation_blocked",
            SecurityEventType::SelfReversal => "self_reversal",
            SecurityEventType::ReversalTampered => "reversal_tampered",
            SecurityEventType::StructuralInconsistency => "structural_inconsistency",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s {
            "self_report" => Ok(SecurityEventType::SelfReport),
            "duplicate_report" => Ok(SecurityEventType::DuplicateReport),
            "admin_protection" => Ok(SecurityEventType::AdminProtection),
            "rate_limit_exceeded" => Ok(SecurityEventType::RateLimitExceeded),
            "reversal_modification_attempt" => Ok(SecurityEventType::ReversalModificationAttempt),
            "immutability_violation_blocked" => Ok(SecurityEventType::ImmutabilityViolationBlocked),
            "self_reversal" => Ok(SecurityEventType::SelfReversal),
            "reversal_tampered" => Ok(SecurityEventType::ReversalTampered),
            "structural_inconsistency" => Ok(SecurityEventType::StructuralInconsistency),
            _ => Err(ModerationError::Validation(format!("Invalid security event type: {}", s))),
        }
    }
}

/// Security log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: i64,
    pub event_type: SecurityEventType,
    pub user_id: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

/// Append a security event using any executor, including an open transaction
pub(crate) async fn record_event<'e, E: SqliteExecutor<'e>>(
    executor: E,
    event_type: SecurityEventType,
    user_id: Option<&str>,
    details: &Value,
    now: DateTime<Utc>,
) -> ModResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO security_event (event_type, user_id, details, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(event_type.as_str())
    .bind(user_id)
    .bind(details.to_string())
    .bind(ts(now))
    .execute(executor)
    .await?;

    crate::metrics::record_security_event(event_type.as_str());

    Ok(result.last_insert_rowid())
}

/// Append-only security log
#[derive(Clone)]
pub struct SecurityLog {
    db: SqlitePool,
}

impl SecurityLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record a security event
    pub async fn record(
        &self,
        event_type: SecurityEventType,
        user_id: Option<&str>,
        details: Value,
        now: DateTime<Utc>,
    ) -> ModResult<SecurityEvent> {
        let id = record_event(&self.db, event_type, user_id, &details, now).await?;

        tracing::warn!(
            event_type = event_type.as_str(),
            user_id = user_id.unwrap_or("-"),
            "Security event recorded"
        );

        Ok(SecurityEvent {
            id,
            event_type,
            user_id: user_id.map(str::to_string),
            details,
            created_at: now,
        })
    }

    /// Events recorded at or after `since`, oldest first
    pub async fn list_since(&self, since: DateTime<Utc>) -> ModResult<Vec<SecurityEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, user_id, details, created_at
            FROM security_event
            WHERE created_at >= ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(ts(since))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let details: String = row.try_get("details")?;
                Ok(SecurityEvent {
                    id: row.try_get("id")?,
                    event_type: SecurityEventType::from_str(&row.try_get::<String, _>("event_type")?)?,
                    user_id: row.try_get("user_id")?,
                    details: serde_json::from_str(&details).map_err(|e| {
                        ModerationError::Internal(format!("Invalid security event details: {}", e))
                    })?,
                    created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
                })
            })
            .collect()
    }

    /// Whether an event of this type already references the given action and issue
    pub async fn has_action_event(
        &self,
        event_type: SecurityEventType,
        action_id: i64,
        issue: &str,
    ) -> ModResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM security_event
            WHERE event_type = ?
              AND json_extract(details, '$.action_id') = ?
              AND json_extract(details, '$.issue') = ?
            LIMIT 1
            "#,
        )
        .bind(event_type.as_str())
        .bind(action_id)
        .bind(issue)
        .fetch_optional(&self.db)
        .await?;

        Ok(found.is_some())
    }
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    RepeatedModificationAttempts,
    RapidFireAttempts,
    SuccessfulTampering,
    StructuralInconsistency,
    SelfReversal,
}

/// Graded result of a security scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousActivity {
    pub kind: FindingKind,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub event_count: usize,
    pub action_ids: Vec<i64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Out-of-band channel for findings that need a human immediately
#[async_trait]
pub trait AdminAlert: Send + Sync {
    async fn critical(&self, finding: &SuspiciousActivity) -> ModResult<()>;
}

/// Alert sink that writes to the error log
#[derive(Debug, Default, Clone)]
pub struct LogAlert;

#[async_trait]
impl AdminAlert for LogAlert {
    async fn critical(&self, finding: &SuspiciousActivity) -> ModResult<()> {
        tracing::error!(
            kind = ?finding.kind,
            severity = ?finding.severity,
            user_id = finding.user_id.as_deref().unwrap_or("-"),
            action_ids = ?finding.action_ids,
            "ADMIN ALERT: critical moderation security finding"
        );
        Ok(())
    }
}

/// Periodic scan over the security log
#[derive(Clone)]
pub struct SuspiciousActivityDetector {
    log: SecurityLog,
}

impl SuspiciousActivityDetector {
    pub fn new(log: SecurityLog) -> Self {
        Self { log }
    }

    /// Scan the trailing window ending at `now`, most severe findings first
    pub async fn scan_at(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> ModResult<Vec<SuspiciousActivity>> {
        let events = self.log.list_since(now - window).await?;
        let mut findings = classify(&events);
        findings.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.last_seen.cmp(&a.last_seen)));

        for finding in &findings {
            crate::metrics::record_security_finding(severity_label(finding.severity));
        }

        Ok(findings)
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

fn action_id_of(event: &SecurityEvent) -> Option<i64> {
    event.details.get("action_id").and_then(Value::as_i64)
}

fn single(kind: FindingKind, severity: Severity, event: &SecurityEvent) -> SuspiciousActivity {
    SuspiciousActivity {
        kind,
        severity,
        user_id: event.user_id.clone(),
        event_count: 1,
        action_ids: action_id_of(event).into_iter().collect(),
        first_seen: event.created_at,
        last_seen: event.created_at,
    }
}

/// Grade a slice of events (expected oldest first)
fn classify(events: &[SecurityEvent]) -> Vec<SuspiciousActivity> {
    let mut findings = Vec::new();
    let mut attempts: BTreeMap<String, Vec<&SecurityEvent>> = BTreeMap::new();

    for event in events {
        match event.event_type {
            SecurityEventType::ReversalModificationAttempt
            | SecurityEventType::ImmutabilityViolationBlocked => {
                let actor = event.user_id.clone().unwrap_or_else(|| "unknown".to_string());
                attempts.entry(actor).or_default().push(event);
            }
            SecurityEventType::ReversalTampered => {
                findings.push(single(FindingKind::SuccessfulTampering, Severity::Critical, event));
            }
            SecurityEventType::StructuralInconsistency => {
                findings.push(single(FindingKind::StructuralInconsistency, Severity::High, event));
            }
            SecurityEventType::SelfReversal => {
                findings.push(single(FindingKind::SelfReversal, Severity::Low, event));
            }
            _ => {}
        }
    }

    for (actor, events) in attempts {
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            continue;
        };
        let mut action_ids: Vec<i64> = events.iter().filter_map(|e| action_id_of(e)).collect();
        action_ids.sort_unstable();
        action_ids.dedup();

        let severity = if events.len() >= ATTEMPTS_HIGH_THRESHOLD {
            Some(Severity::High)
        } else if events.len() >= ATTEMPTS_MEDIUM_THRESHOLD {
            Some(Severity::Medium)
        } else {
            None
        };

        if let Some(severity) = severity {
            findings.push(SuspiciousActivity {
                kind: FindingKind::RepeatedModificationAttempts,
                severity,
                user_id: Some(actor.clone()),
                event_count: events.len(),
                action_ids: action_ids.clone(),
                first_seen: first.created_at,
                last_seen: last.created_at,
            });
        }

        let rapid = events
            .windows(2)
            .filter(|pair| {
                (pair[1].created_at - pair[0].created_at) < Duration::milliseconds(RAPID_FIRE_GAP_MS)
            })
            .count();
        if rapid > 0 {
            findings.push(SuspiciousActivity {
                kind: FindingKind::RapidFireAttempts,
                severity: Severity::High,
                user_id: Some(actor),
                event_count: rapid + 1,
                action_ids,
                first_seen: first.created_at,
                last_seen: last.created_at,
            });
        }
    }

    findings
}
