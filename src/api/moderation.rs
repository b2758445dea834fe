/// Moderator endpoints: queue, actions, reversals and security scans
use super::ValidatedJson;
use crate::{
    auth::{AdminAuthContext, ModeratorAuthContext},
    context::AppContext,
    error::ModResult,
    moderation::{
        ActionType, ModerationAction, QueueFilters, Report, ReportStatus, ReportType,
        RestrictionType, SecurityScan, TakeActionParams,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build moderation routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/moderation/queue", get(list_queue))
        .route("/api/moderation/reports/:id", get(get_report))
        .route("/api/moderation/actions", post(take_action))
        .route("/api/moderation/actions/:id", get(get_action))
        .route("/api/moderation/actions/:id/reverse", post(reverse_action))
        .route("/api/moderation/actions/:id/reapply", post(reapply_action))
        .route("/api/moderation/security/scan", get(security_scan))
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct QueueQuery {
    pub status: Option<ReportStatus>,
    #[validate(range(min = 1, max = 5, message = "Priority must be between 1 and 5"))]
    pub priority: Option<u8>,
    pub report_type: Option<ReportType>,
    pub has_evidence: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 500, message = "Limit must be between 1 and 500"))]
    pub limit: Option<usize>,
}

impl From<QueueQuery> for QueueFilters {
    fn from(q: QueueQuery) -> Self {
        QueueFilters {
            status: q.status,
            priority: q.priority,
            report_type: q.report_type,
            has_evidence: q.has_evidence,
            created_after: q.created_after,
            created_before: q.created_before,
            limit: q.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub reports: Vec<Report>,
    /// All pending and under-review reports, before filters and limit
    pub open_total: i64,
}

/// Ordered queue snapshot
async fn list_queue(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Query(query): Query<QueueQuery>,
) -> ModResult<Json<QueueResponse>> {
    query.validate()?;

    let reports = ctx.moderation.list_queue(&auth.actor, &query.into()).await?;
    let open_total = ctx.moderation.pending_count().await?;

    Ok(Json(QueueResponse { reports, open_total }))
}

/// Single report
async fn get_report(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
) -> ModResult<Json<Report>> {
    Ok(Json(ctx.moderation.get_report(&auth.actor, id).await?))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TakeActionRequest {
    pub report_id: i64,
    pub action_type: ActionType,

    #[validate(length(min = 1, max = 1000, message = "Reason must be 1-1000 characters"))]
    pub reason: String,

    #[validate(range(min = 1, max = 365, message = "Duration must be between 1 and 365 days"))]
    pub duration_days: Option<i64>,

    pub restriction_type: Option<RestrictionType>,

    #[validate(length(max = 2000, message = "Internal notes must be at most 2000 characters"))]
    pub internal_notes: Option<String>,

    #[validate(length(max = 1000, message = "Resolution notes must be at most 1000 characters"))]
    pub resolution_notes: Option<String>,

    pub evidence_verified: Option<bool>,

    #[validate(length(max = 500, message = "Verification notes must be at most 500 characters"))]
    pub verification_notes: Option<String>,
}

impl From<TakeActionRequest> for TakeActionParams {
    fn from(req: TakeActionRequest) -> Self {
        TakeActionParams {
            report_id: req.report_id,
            action_type: req.action_type,
            reason: req.reason,
            duration_days: req.duration_days,
            restriction_type: req.restriction_type,
            internal_notes: req.internal_notes,
            resolution_notes: req.resolution_notes,
            evidence_verified: req.evidence_verified,
            verification_notes: req.verification_notes,
        }
    }
}

/// Decide a report
async fn take_action(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    ValidatedJson(req): ValidatedJson<TakeActionRequest>,
) -> ModResult<(StatusCode, Json<ModerationAction>)> {
    let action = ctx.moderation.take_action(&auth.actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// Single action
async fn get_action(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
) -> ModResult<Json<ModerationAction>> {
    Ok(Json(ctx.moderation.get_action(&auth.actor, id).await?))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 1000, message = "Reason must be 1-1000 characters"))]
    pub reason: String,
}

/// Reverse an action; a second reversal is rejected
async fn reverse_action(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<ReasonRequest>,
) -> ModResult<Json<ModerationAction>> {
    Ok(Json(ctx.moderation.reverse_action(&auth.actor, id, &req.reason).await?))
}

/// Re-apply a reversed action as a new action
async fn reapply_action(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<ReasonRequest>,
) -> ModResult<(StatusCode, Json<ModerationAction>)> {
    let action = ctx.moderation.reapply_action(&auth.actor, id, &req.reason).await?;
    Ok((StatusCode::CREATED, Json(action)))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScanQuery {
    #[validate(range(min = 1, max = 10080, message = "Window must be between 1 minute and 7 days"))]
    pub window_minutes: Option<i64>,
}

/// Reversal verification plus suspicious activity grading
async fn security_scan(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<ScanQuery>,
) -> ModResult<Json<SecurityScan>> {
    query.validate()?;

    let minutes = query
        .window_minutes
        .unwrap_or(ctx.config.jobs.security_window_minutes);
    Ok(Json(ctx.moderation.scan_security(Duration::minutes(minutes)).await?))
}
