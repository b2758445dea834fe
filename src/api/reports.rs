/// Report submission endpoints
use super::ValidatedJson;
use crate::{
    auth::{AuthContext, ModeratorAuthContext},
    context::AppContext,
    error::ModResult,
    moderation::{Evidence, Report, ReportDraft, ReportReason, ReportType},
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

/// Build report routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/reports", post(submit_report))
        .route("/api/reports/flag", post(flag_content))
}

/// New report body; description minimums depend on who submits it
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitReportRequest {
    pub report_type: ReportType,

    #[validate(length(min = 1, max = 256, message = "Target id must be 1-256 characters"))]
    pub target_id: String,

    pub reason: ReportReason,

    /// Length is counted after trimming, during intake
    pub description: String,

    #[serde(default)]
    pub evidence: Option<Evidence>,
}

impl From<SubmitReportRequest> for ReportDraft {
    fn from(req: SubmitReportRequest) -> Self {
        ReportDraft {
            report_type: req.report_type,
            target_id: req.target_id,
            reason: req.reason,
            description: req.description,
            evidence: req.evidence,
        }
    }
}

/// Submit a member report
async fn submit_report(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<SubmitReportRequest>,
) -> ModResult<(StatusCode, Json<Report>)> {
    let report = ctx.moderation.submit_report(&auth.actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// Moderator flag, enters the queue under review
async fn flag_content(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    ValidatedJson(req): ValidatedJson<SubmitReportRequest>,
) -> ModResult<(StatusCode, Json<Report>)> {
    let report = ctx.moderation.moderator_flag(&auth.actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target_id: &str, description: &str) -> SubmitReportRequest {
        SubmitReportRequest {
            report_type: ReportType::Post,
            target_id: target_id.to_string(),
            reason: ReportReason::Spam,
            description: description.to_string(),
            evidence: None,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request("p1", "Selling fake followers in every thread").validate().is_ok());
        assert!(request("", "Selling fake followers in every thread").validate().is_err());
    }

    #[test]
    fn test_description_length_left_to_intake() {
        // Surrounding whitespace does not count towards the limit
        let padded = format!("  {}  \n", "x".repeat(1000));
        assert!(request("p1", &padded).validate().is_ok());
    }

    #[test]
    fn test_request_deserializes_snake_case() {
        let req: SubmitReportRequest = serde_json::from_value(serde_json::json!({
            "report_type": "track",
            "target_id": "t1",
            "reason": "hate_speech",
            "description": "Slurs in the second verse of this track",
            "evidence": { "audio_timestamps": "01:20" }
        }))
        .unwrap();

        let draft: ReportDraft = req.into();
        assert_eq!(draft.report_type, ReportType::Track);
        assert_eq!(draft.reason, ReportReason::HateSpeech);
        assert!(draft.evidence.is_some());
    }
}
