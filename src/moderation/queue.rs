/// Moderation Queue
///
/// Ordering: under-review first, then pending; within a status, priority
/// ascending. At equal priority, reports past the age boundary come first,
/// oldest first; younger reports put evidence first, then age.
use super::reports::{fetch_report, parse_report, Report, ReportStatus, ReportType, REPORT_COLUMNS};
use super::{Actor, Role};
use crate::db::ts;
use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::cmp::Ordering;

/// Past this age a report sorts purely by age
pub const AGE_PROTECTION_HOURS: i64 = 24;
pub const DEFAULT_QUEUE_LIMIT: usize = 100;
pub const MAX_QUEUE_LIMIT: usize = 500;

/// Queue filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueFilters {
    pub status: Option<ReportStatus>,
    pub priority: Option<u8>,
    pub report_type: Option<ReportType>,
    pub has_evidence: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Queue ordering at a given instant
pub fn compare_for_queue(a: &Report, b: &Report, now: DateTime<Utc>) -> Ordering {
    let cutoff = now - Duration::hours(AGE_PROTECTION_HOURS);
    let aged = |r: &Report| r.created_at < cutoff;

    let hybrid = match (aged(a), aged(b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b.has_evidence.cmp(&a.has_evidence),
    };

    a.status
        .queue_rank()
        .cmp(&b.status.queue_rank())
        .then_with(|| a.priority.cmp(&b.priority))
        .then(hybrid)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Read side of the moderation queue
#[derive(Clone)]
pub struct ReportQueue {
    db: SqlitePool,
}

impl ReportQueue {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Ordered snapshot of the queue
    pub async fn list(&self, actor: &Actor, filters: &QueueFilters) -> ModResult<Vec<Report>> {
        self.list_at(actor, filters, Utc::now()).await
    }

    pub async fn list_at(
        &self,
        actor: &Actor,
        filters: &QueueFilters,
        now: DateTime<Utc>,
    ) -> ModResult<Vec<Report>> {
        actor.require(Role::Moderator)?;

        if let Some(priority) = filters.priority {
            if !(1..=5).contains(&priority) {
                return Err(ModerationError::Validation(
                    "Priority filter must be between 1 and 5".to_string(),
                ));
            }
        }
        let limit = filters.limit.unwrap_or(DEFAULT_QUEUE_LIMIT).clamp(1, MAX_QUEUE_LIMIT);

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM report WHERE ", REPORT_COLUMNS));

        match filters.status {
            Some(status) => {
                query.push("status = ").push_bind(status.as_str());
            }
            None => {
                query.push("status IN ('pending', 'under_review')");
            }
        }
        if let Some(priority) = filters.priority {
            query.push(" AND priority = ").push_bind(priority as i64);
        }
        if let Some(report_type) = filters.report_type {
            query.push(" AND report_type = ").push_bind(report_type.as_str());
        }
        if let Some(has_evidence) = filters.has_evidence {
            query.push(" AND has_evidence = ").push_bind(has_evidence);
        }
        if let Some(after) = filters.created_after {
            query.push(" AND created_at >= ").push_bind(ts(after));
        }
        if let Some(before) = filters.created_before {
            query.push(" AND created_at < ").push_bind(ts(before));
        }

        // Same ordering as compare_for_queue
        let cutoff = ts(now - Duration::hours(AGE_PROTECTION_HOURS));
        query.push(
            " ORDER BY CASE status WHEN 'under_review' THEN 0 WHEN 'pending' THEN 1 \
             WHEN 'resolved' THEN 2 ELSE 3 END, priority, CASE WHEN created_at < ",
        );
        query.push_bind(cutoff.clone());
        query.push(" THEN 0 ELSE 1 END, CASE WHEN created_at < ");
        query.push_bind(cutoff);
        query.push(" THEN 0 ELSE -has_evidence END, created_at, id LIMIT ");
        query.push_bind(limit as i64);

        let rows = query.build().fetch_all(&self.db).await?;
        rows.into_iter().map(parse_report).collect()
    }

    /// Single report for moderator review
    pub async fn get(&self, actor: &Actor, report_id: i64) -> ModResult<Report> {
        actor.require(Role::Moderator)?;

        fetch_report(&self.db, report_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Report {} not found", report_id)))
    }

    /// Reports still waiting on a decision (pending or under review)
    pub async fn pending_count(&self) -> ModResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM report WHERE status IN ('pending', 'under_review')",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }
}
