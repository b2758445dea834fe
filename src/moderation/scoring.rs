/// Reporter accuracy and report quality scoring
use super::evidence::accepts_evidence;
use super::reports::{ReportReason, ReportType};
use crate::error::ModResult;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Description length that earns full marks
pub const FULL_DESCRIPTION_LENGTH: usize = 100;

const EVIDENCE_WEIGHT: f64 = 0.4;
const DESCRIPTION_WEIGHT: f64 = 0.3;
const ACCURACY_WEIGHT: f64 = 0.3;

/// Share of a reporter's finalized reports that led to enforcement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReporterAccuracy {
    /// Finalized reports (resolved or dismissed)
    pub total: i64,
    /// Finalized reports that were resolved
    pub validated: i64,
    /// Percentage, 0 to 100
    pub rate: f64,
}

/// Composite 0 to 100 score of how useful a reporter's reports are
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Reports whose context accepts evidence
    pub reports_considered: usize,
    /// Percentage of those reports that carry evidence
    pub evidence_rate: f64,
    /// Mean description completeness, 0 to 100
    pub description_score: f64,
    pub accuracy_rate: Option<f64>,
    pub score: f64,
}

/// Reporter statistics
#[derive(Clone)]
pub struct ReporterScoring {
    db: SqlitePool,
}

impl ReporterScoring {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Accuracy over finalized reports; `None` until one exists
    pub async fn accuracy(&self, reporter_id: &str) -> ModResult<Option<ReporterAccuracy>> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved,
                COALESCE(SUM(CASE WHEN status = 'dismissed' THEN 1 ELSE 0 END), 0) AS dismissed
            FROM report
            WHERE reporter_id = ?
            "#,
        )
        .bind(reporter_id)
        .fetch_one(&self.db)
        .await?;

        let resolved: i64 = row.try_get("resolved")?;
        let dismissed: i64 = row.try_get("dismissed")?;

        Ok(accuracy_from_counts(resolved, dismissed))
    }

    /// Quality score over reports whose context accepts evidence; `None` when there are none
    pub async fn quality(&self, reporter_id: &str) -> ModResult<Option<QualityScore>> {
        let rows = sqlx::query(
            "SELECT report_type, reason, has_evidence, description FROM report WHERE reporter_id = ?",
        )
        .bind(reporter_id)
        .fetch_all(&self.db)
        .await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            samples.push(QualitySample {
                report_type: ReportType::from_str(&row.try_get::<String, _>("report_type")?)?,
                reason: ReportReason::from_str(&row.try_get::<String, _>("reason")?)?,
                has_evidence: row.try_get("has_evidence")?,
                description_len: row.try_get::<String, _>("description")?.chars().count(),
            });
        }

        let accuracy = self.accuracy(reporter_id).await?.map(|a| a.rate);
        Ok(quality_from_samples(&samples, accuracy))
    }
}

fn accuracy_from_counts(resolved: i64, dismissed: i64) -> Option<ReporterAccuracy> {
    let total = resolved + dismissed;
    if total == 0 {
        return None;
    }

    Some(ReporterAccuracy {
        total,
        validated: resolved,
        rate: resolved as f64 * 100.0 / total as f64,
    })
}

struct QualitySample {
    report_type: ReportType,
    reason: ReportReason,
    has_evidence: bool,
    description_len: usize,
}

/// Description length normalized to 0..=100, capped at `FULL_DESCRIPTION_LENGTH`
fn description_completeness(len: usize) -> f64 {
    len.min(FULL_DESCRIPTION_LENGTH) as f64 * 100.0 / FULL_DESCRIPTION_LENGTH as f64
}

fn quality_from_samples(samples: &[QualitySample], accuracy: Option<f64>) -> Option<QualityScore> {
    let eligible: Vec<&QualitySample> = samples
        .iter()
        .filter(|s| accepts_evidence(s.report_type, s.reason))
        .collect();
    if eligible.is_empty() {
        return None;
    }

    let count = eligible.len() as f64;
    let evidence_rate = eligible.iter().filter(|s| s.has_evidence).count() as f64 * 100.0 / count;
    let description_score = eligible
        .iter()
        .map(|s| description_completeness(s.description_len))
        .sum::<f64>()
        / count;

    let score = match accuracy {
        Some(rate) => {
            evidence_rate * EVIDENCE_WEIGHT + description_score * DESCRIPTION_WEIGHT + rate * ACCURACY_WEIGHT
        }
        // Re-weight the remaining components to sum to one
        None => {
            let total = EVIDENCE_WEIGHT + DESCRIPTION_WEIGHT;
            (evidence_rate * EVIDENCE_WEIGHT + description_score * DESCRIPTION_WEIGHT) / total
        }
    };

    Some(QualityScore {
        reports_considered: eligible.len(),
        evidence_rate,
        description_score,
        accuracy_rate: accuracy,
        score: score.clamp(0.0, 100.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::fixtures::{self, base};
    use crate::moderation::ReportStatus;

    #[tokio::test]
    async fn test_accuracy_ignores_open_reports() {
        let db = fixtures::pool().await;
        let scoring = ReporterScoring::new(db.clone());

        assert!(scoring.accuracy("alice").await.unwrap().is_none());

        let statuses = [
            ReportStatus::Resolved,
            ReportStatus::Resolved,
            ReportStatus::Resolved,
            ReportStatus::Dismissed,
            ReportStatus::Dismissed,
            ReportStatus::Pending,
            ReportStatus::Pending,
            ReportStatus::UnderReview,
            ReportStatus::UnderReview,
        ];
        for (i, status) in statuses.into_iter().enumerate() {
            fixtures::raw_report(
                &db, "alice", "bob", ReportType::Post, &format!("p{}", i), ReportReason::Spam,
                status, false, base(),
            )
            .await;
        }

        let accuracy = scoring.accuracy("alice").await.unwrap().unwrap();
        assert_eq!(accuracy.total, 5);
        assert_eq!(accuracy.validated, 3);
        assert!((accuracy.rate - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_description_completeness_curve() {
        assert_eq!(description_completeness(0), 0.0);
        assert!((description_completeness(25) - 25.0).abs() < 1e-9);
        assert_eq!(description_completeness(FULL_DESCRIPTION_LENGTH), 100.0);
        assert_eq!(description_completeness(5_000), 100.0);
    }

    #[test]
    fn test_quality_only_counts_evidence_eligible_reports() {
        let sample = |reason, has_evidence, description_len| QualitySample {
            report_type: ReportType::Post,
            reason,
            has_evidence,
            description_len,
        };

        // Spam accepts no evidence and is left out entirely
        let samples = vec![
            sample(ReportReason::Harassment, true, FULL_DESCRIPTION_LENGTH),
            sample(ReportReason::Harassment, false, 0),
            sample(ReportReason::Spam, false, 0),
        ];

        let score = quality_from_samples(&samples, Some(60.0)).unwrap();
        assert_eq!(score.reports_considered, 2);
        assert!((score.evidence_rate - 50.0).abs() < 1e-9);
        assert!((score.description_score - 50.0).abs() < 1e-9);
        // 50*0.4 + 50*0.3 + 60*0.3
        assert!((score.score - 53.0).abs() < 1e-9);

        // Without accuracy the remaining weights are scaled up
        let score = quality_from_samples(&samples, None).unwrap();
        assert!((score.score - 50.0).abs() < 1e-9);

        assert!(quality_from_samples(&[sample(ReportReason::Spam, false, 50)], None).is_none());
    }

    #[tokio::test]
    async fn test_quality_from_storage() {
        let db = fixtures::pool().await;
        let scoring = ReporterScoring::new(db.clone());

        fixtures::raw_report(
            &db, "carol", "bob", ReportType::Track, "t1", ReportReason::HateSpeech,
            ReportStatus::Resolved, true, base(),
        )
        .await;

        let score = scoring.quality("carol").await.unwrap().unwrap();
        assert_eq!(score.reports_considered, 1);
        assert_eq!(score.accuracy_rate, Some(100.0));
        assert!(score.score > 0.0);
        assert!(scoring.quality("nobody").await.unwrap().is_none());
    }
}
