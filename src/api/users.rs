/// User-facing state: capabilities, standing, reporter statistics, and the
/// admin directory sync endpoints
use super::ValidatedJson;
use crate::{
    auth::{AdminAuthContext, AuthContext},
    context::AppContext,
    error::ModResult,
    moderation::{
        Actor, Capability, ModerationAction, QualityScore, ReportType, ReporterAccuracy, Role,
        UserStanding,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users/:id/capabilities/:capability", get(can_perform))
        .route("/api/users/:id/standing", get(user_standing))
        .route("/api/users/:id/actions", get(action_history))
        .route("/api/users/:id/role", put(set_role))
        .route("/api/reporters/:id/accuracy", get(reporter_accuracy))
        .route("/api/directory/users", post(upsert_user))
        .route("/api/directory/content", post(register_content))
}

/// Members see their own state, moderators see everyone's
fn require_self_or_moderator(actor: &Actor, user_id: &str) -> ModResult<()> {
    if actor.user_id == user_id {
        Ok(())
    } else {
        actor.require(Role::Moderator)
    }
}

#[derive(Debug, Serialize)]
pub struct CapabilityResponse {
    pub user_id: String,
    pub capability: Capability,
    pub allowed: bool,
}

/// Whether a user may currently post, comment or upload
async fn can_perform(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((user_id, capability)): Path<(String, String)>,
) -> ModResult<Json<CapabilityResponse>> {
    require_self_or_moderator(&auth.actor, &user_id)?;
    let capability = Capability::from_str(&capability)?;

    let allowed = ctx.moderation.can_perform(&user_id, capability).await?;
    Ok(Json(CapabilityResponse {
        user_id,
        capability,
        allowed,
    }))
}

/// Account flags and active restrictions
async fn user_standing(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> ModResult<Json<UserStanding>> {
    require_self_or_moderator(&auth.actor, &user_id)?;
    Ok(Json(ctx.moderation.user_standing(&user_id).await?))
}

/// Actions that targeted a user
async fn action_history(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> ModResult<Json<Vec<ModerationAction>>> {
    Ok(Json(ctx.moderation.action_history(&auth.actor, &user_id).await?))
}

#[derive(Debug, Serialize)]
pub struct ReporterStatsResponse {
    pub reporter_id: String,
    pub accuracy: Option<ReporterAccuracy>,
    pub quality: Option<QualityScore>,
}

/// Accuracy over finalized reports plus the composite quality score
async fn reporter_accuracy(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(reporter_id): Path<String>,
) -> ModResult<Json<ReporterStatsResponse>> {
    require_self_or_moderator(&auth.actor, &reporter_id)?;

    let accuracy = ctx.moderation.reporter_accuracy(&reporter_id).await?;
    let quality = ctx.moderation.reporter_quality(&reporter_id).await?;

    Ok(Json(ReporterStatsResponse {
        reporter_id,
        accuracy,
        quality,
    }))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertUserRequest {
    #[validate(length(min = 1, max = 128, message = "User id must be 1-128 characters"))]
    pub user_id: String,
    pub role: Role,
}

/// Create or update a directory account
async fn upsert_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    ValidatedJson(req): ValidatedJson<UpsertUserRequest>,
) -> ModResult<StatusCode> {
    ctx.moderation.directory().upsert_user(&req.user_id, req.role).await?;
    tracing::info!(admin = %auth.actor.user_id, user_id = %req.user_id, "Directory account synced");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// Change an existing account's role
async fn set_role(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(user_id): Path<String>,
    Json(req): Json<SetRoleRequest>,
) -> ModResult<StatusCode> {
    ctx.moderation.directory().set_role(&user_id, req.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterContentRequest {
    pub content_type: ReportType,
    #[validate(length(min = 1, max = 256, message = "Content id must be 1-256 characters"))]
    pub content_id: String,
    #[validate(length(min = 1, max = 128, message = "Owner id must be 1-128 characters"))]
    pub owner_id: String,
}

/// Register a content item and its owner
async fn register_content(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    ValidatedJson(req): ValidatedJson<RegisterContentRequest>,
) -> ModResult<StatusCode> {
    ctx.moderation
        .directory()
        .register_content(req.content_type, &req.content_id, &req.owner_id)
        .await?;
    Ok(StatusCode::CREATED)
}
