//! Shared test setup for the moderation modules
use super::{ReportReason, ReportStatus, ReportType, Role, SqliteDirectory};
use crate::db::{create_memory_pool, ts};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;

pub fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
}

pub async fn pool() -> SqlitePool {
    create_memory_pool().await.unwrap()
}

/// Pool with a small community:
/// alice, bob and carol are members, mod-1 and mod-2 moderate, admin-1 administers.
/// bob owns post p1, comment c1, track t1 and album a1; alice owns post p2.
pub async fn seeded() -> (SqlitePool, SqliteDirectory) {
    let db = pool().await;
    let directory = SqliteDirectory::new(db.clone());

    for (user, role) in [
        ("alice", Role::Regular),
        ("bob", Role::Regular),
        ("carol", Role::Regular),
        ("mod-1", Role::Moderator),
        ("mod-2", Role::Moderator),
        ("admin-1", Role::Admin),
    ] {
        directory.upsert_user(user, role).await.unwrap();
    }

    for (content_type, id, owner) in [
        (ReportType::Post, "p1", "bob"),
        (ReportType::Comment, "c1", "bob"),
        (ReportType::Track, "t1", "bob"),
        (ReportType::Album, "a1", "bob"),
        (ReportType::Post, "p2", "alice"),
    ] {
        directory.register_content(content_type, id, owner).await.unwrap();
    }

    (db, directory)
}

/// Insert a report row directly, bypassing the intake gate
#[allow(clippy::too_many_arguments)]
pub async fn raw_report(
    db: &SqlitePool,
    reporter: &str,
    reported_user: &str,
    report_type: ReportType,
    target: &str,
    reason: ReportReason,
    status: ReportStatus,
    has_evidence: bool,
    created_at: DateTime<Utc>,
) -> i64 {
    sqlx::query(
        r#"
        INSERT INTO report
            (reporter_id, reported_user_id, report_type, target_id, reason, description,
             has_evidence, status, priority, created_at)
        VALUES (?, ?, ?, ?, ?, 'seeded report', ?, ?, ?, ?)
        "#,
    )
    .bind(reporter)
    .bind(reported_user)
    .bind(report_type.as_str())
    .bind(target)
    .bind(reason.as_str())
    .bind(has_evidence)
    .bind(status.as_str())
    .bind(reason.priority() as i64)
    .bind(ts(created_at))
    .execute(db)
    .await
    .unwrap()
    .last_insert_rowid()
}

/// Insert a minimal warning action with its report, returning the action id
pub async fn insert_bare_action(db: &SqlitePool) -> i64 {
    let report_id = raw_report(
        db,
        "alice",
        "bob",
        ReportType::User,
        "bob",
        ReportReason::Harassment,
        ReportStatus::Resolved,
        false,
        base(),
    )
    .await;

    sqlx::query(
        r#"
        INSERT INTO moderation_action
            (moderator_id, target_user_id, action_type, target_type, target_id, reason,
             related_report_id, created_at)
        VALUES ('mod-1', 'bob', 'user_warned', 'user', 'bob', 'seeded', ?, ?)
        "#,
    )
    .bind(report_id)
    .bind(ts(base()))
    .execute(db)
    .await
    .unwrap()
    .last_insert_rowid()
}
