/// Notification outbox
///
/// Actions enqueue a notice for the affected user inside their own
/// transaction. A background job drains the outbox through a `Notifier`.
use super::ActionType;
use crate::db::{parse_opt_ts, parse_ts, ts};
use crate::error::{ModResult, ModerationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// What the affected user is told
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub recipient_id: String,
    pub action_id: i64,
    pub action_type: ActionType,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outbox row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Queue a notification on the caller's connection
pub(crate) async fn enqueue(
    conn: &mut SqliteConnection,
    payload: &NotificationPayload,
    now: DateTime<Utc>,
) -> ModResult<i64> {
    let body = serde_json::to_string(payload)
        .map_err(|e| ModerationError::Internal(format!("Failed to encode notification: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO notification_outbox (recipient_id, action_id, kind, payload, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&payload.recipient_id)
    .bind(payload.action_id)
    .bind(payload.action_type.as_str())
    .bind(body)
    .bind(ts(now))
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Delivery channel for user notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, entry: &OutboxEntry) -> ModResult<()>;
}

/// Notifier that only logs; stands in until a real channel is configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, entry: &OutboxEntry) -> ModResult<()> {
        tracing::info!(
            recipient = %entry.payload.recipient_id,
            action_id = entry.payload.action_id,
            action_type = entry.payload.action_type.as_str(),
            "Moderation notice delivered"
        );
        Ok(())
    }
}

/// Result of one outbox drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Drains the outbox
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Undelivered entries, oldest first
    pub async fn pending(&self, limit: i64) -> ModResult<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, created_at, delivered_at
            FROM notification_outbox
            WHERE delivered_at IS NULL
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload: String = row.try_get("payload")?;
                Ok(OutboxEntry {
                    id: row.try_get("id")?,
                    payload: serde_json::from_str(&payload).map_err(|e| {
                        ModerationError::Internal(format!("Invalid notification payload: {}", e))
                    })?,
                    created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
                    delivered_at: parse_opt_ts(row.try_get("delivered_at")?)?,
                })
            })
            .collect()
    }

    /// Deliver up to `limit` pending notifications.
    ///
    /// Failed deliveries stay queued for the next run.
    pub async fn dispatch_pending(&self, limit: i64) -> ModResult<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();

        for entry in self.pending(limit).await? {
            match self.notifier.deliver(&entry).await {
                Ok(()) => {
                    sqlx::query(
                        "UPDATE notification_outbox SET delivered_at = ? WHERE id = ? AND delivered_at IS NULL",
                    )
                    .bind(ts(Utc::now()))
                    .bind(entry.id)
                    .execute(&self.db)
                    .await?;
                    outcome.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(outbox_id = entry.id, "Notification delivery failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        crate::metrics::record_notifications(outcome.delivered, outcome.failed);
        Ok(outcome)
    }
}
