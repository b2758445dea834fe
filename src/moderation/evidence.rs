/// Report evidence: format rules and contextual eligibility
use super::{ReportReason, ReportType};
use serde::{Deserialize, Serialize};
use validator::ValidateUrl;

const MAX_EVIDENCE_LINKS: usize = 10;
const MAX_URL_LENGTH: usize = 2048;
const MAX_RIGHTS_HOLDER_LENGTH: usize = 200;

/// Optional supporting material attached to a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// General evidence links (screenshots, archived copies)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    /// Copyright claim details, copyright_violation only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<CopyrightEvidence>,
    /// Comma-separated `MM:SS` / `HH:MM:SS` offsets into a track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_timestamps: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyrightEvidence {
    pub original_work_url: String,
    #[serde(default)]
    pub rights_holder: Option<String>,
}

/// Evidence fields, each gated by report type and reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    Links,
    Copyright,
    AudioTimestamps,
}

impl EvidenceKind {
    pub const ALL: [EvidenceKind; 3] = [
        EvidenceKind::Links,
        EvidenceKind::Copyright,
        EvidenceKind::AudioTimestamps,
    ];

    /// Whether this field may be populated for a report of this type and reason
    pub fn is_eligible(&self, report_type: ReportType, reason: ReportReason) -> bool {
        match self {
            EvidenceKind::Links => matches!(
                reason,
                ReportReason::Harassment
                    | ReportReason::HateSpeech
                    | ReportReason::Impersonation
                    | ReportReason::Misinformation
                    | ReportReason::InappropriateContent
                    | ReportReason::Violence
                    | ReportReason::CopyrightViolation
            ),
            EvidenceKind::Copyright => reason == ReportReason::CopyrightViolation,
            EvidenceKind::AudioTimestamps => {
                report_type == ReportType::Track
                    && matches!(
                        reason,
                        ReportReason::HateSpeech
                            | ReportReason::Harassment
                            | ReportReason::InappropriateContent
                    )
            }
        }
    }
}

/// Whether any evidence field can be carried by this report context
pub fn accepts_evidence(report_type: ReportType, reason: ReportReason) -> bool {
    EvidenceKind::ALL
        .iter()
        .any(|kind| kind.is_eligible(report_type, reason))
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.copyright.is_none() && self.audio_timestamps.is_none()
    }

    /// Check the format of every populated field
    pub fn validate(&self) -> Result<(), String> {
        if self.links.len() > MAX_EVIDENCE_LINKS {
            return Err(format!("At most {} evidence links are allowed", MAX_EVIDENCE_LINKS));
        }
        for link in &self.links {
            validate_http_url(link)?;
        }

        if let Some(copyright) = &self.copyright {
            validate_http_url(&copyright.original_work_url)?;
            if let Some(holder) = &copyright.rights_holder {
                if holder.chars().count() > MAX_RIGHTS_HOLDER_LENGTH {
                    return Err(format!(
                        "Rights holder must be at most {} characters",
                        MAX_RIGHTS_HOLDER_LENGTH
                    ));
                }
            }
        }

        if let Some(timestamps) = &self.audio_timestamps {
            parse_timestamps(timestamps)?;
        }

        Ok(())
    }

    /// Drop fields that are not eligible for this context.
    ///
    /// Returns `None` when nothing eligible remains.
    pub fn retain_eligible(mut self, report_type: ReportType, reason: ReportReason) -> Option<Self> {
        if !EvidenceKind::Links.is_eligible(report_type, reason) {
            self.links.clear();
        }
        if !EvidenceKind::Copyright.is_eligible(report_type, reason) {
            self.copyright = None;
        }
        if !EvidenceKind::AudioTimestamps.is_eligible(report_type, reason) {
            self.audio_timestamps = None;
        }

        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// True when at least one eligible field is populated
    pub fn has_eligible(&self, report_type: ReportType, reason: ReportReason) -> bool {
        (!self.links.is_empty() && EvidenceKind::Links.is_eligible(report_type, reason))
            || (self.copyright.is_some() && EvidenceKind::Copyright.is_eligible(report_type, reason))
            || (self.audio_timestamps.is_some()
                && EvidenceKind::AudioTimestamps.is_eligible(report_type, reason))
    }
}

/// Accept absolute http/https URLs only
pub fn validate_http_url(url: &str) -> Result<(), String> {
    let trimmed = url.trim();
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(format!("Evidence URL exceeds {} characters", MAX_URL_LENGTH));
    }

    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err(format!("Evidence URL must use http or https: {}", trimmed));
    }
    if !trimmed.to_string().validate_url() {
        return Err(format!("Invalid evidence URL: {}", trimmed));
    }

    Ok(())
}

/// Parse comma-separated `MM:SS` / `HH:MM:SS` timestamps into seconds
pub fn parse_timestamps(value: &str) -> Result<Vec<u32>, String> {
    value.split(',').map(|part| parse_timestamp(part.trim())).collect()
}

fn parse_timestamp(value: &str) -> Result<u32, String> {
    let invalid = || format!("Invalid timestamp {:?}, expected MM:SS or HH:MM:SS", value);

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(invalid());
    }

    let mut numbers = Vec::with_capacity(parts.len());
    for (index, part) in parts.iter().enumerate() {
        let width_ok = if index == 0 {
            (1..=2).contains(&part.len())
        } else {
            part.len() == 2
        };
        if !width_ok || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        numbers.push(part.parse::<u32>().map_err(|_| invalid())?);
    }

    let (hours, minutes, seconds) = match numbers.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(invalid()),
    };

    if seconds > 59 {
        return Err(format!("Invalid timestamp {:?}: seconds must be at most 59", value));
    }
    if minutes > 59 {
        return Err(format!(
            "Invalid timestamp {:?}: minutes must be at most 59, use HH:MM:SS for longer offsets",
            value
        ));
    }

    Ok(hours * 3600 + minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamps("01:30").unwrap(), vec![90]);
        assert_eq!(parse_timestamps("1:05:09").unwrap(), vec![3909]);
        assert_eq!(parse_timestamps("00:10, 02:00,1:00:00").unwrap(), vec![10, 120, 3600]);

        assert!(parse_timestamps("01:60").is_err());
        assert!(parse_timestamps("75:00").is_err());
        assert!(parse_timestamps("1:75:00").is_err());
        assert!(parse_timestamps("1:5").is_err());
        assert!(parse_timestamps("abc").is_err());
        assert!(parse_timestamps("01:30,").is_err());
        assert!(parse_timestamps("1:2:3:4").is_err());
    }

    #[test]
    fn test_each_timestamp_validated_independently() {
        let err = parse_timestamps("00:10, 00:99").unwrap_err();
        assert!(err.contains("00:99"));
    }

    #[test]
    fn test_url_scheme() {
        assert!(validate_http_url("https://example.com/proof.png").is_ok());
        assert!(validate_http_url("http://example.com").is_ok());
        assert!(validate_http_url("ftp://example.com/file").is_err());
        assert!(validate_http_url("javascript:alert(1)").is_err());
        assert!(validate_http_url("not a url").is_err());
    }

    #[test]
    fn test_eligibility_rules() {
        use ReportReason::*;

        assert!(EvidenceKind::Copyright.is_eligible(ReportType::Track, CopyrightViolation));
        assert!(!EvidenceKind::Copyright.is_eligible(ReportType::Track, Harassment));

        assert!(EvidenceKind::AudioTimestamps.is_eligible(ReportType::Track, HateSpeech));
        assert!(!EvidenceKind::AudioTimestamps.is_eligible(ReportType::Album, HateSpeech));
        assert!(!EvidenceKind::AudioTimestamps.is_eligible(ReportType::Track, Spam));

        assert!(!accepts_evidence(ReportType::Post, Spam));
        assert!(accepts_evidence(ReportType::Post, Harassment));
    }

    #[test]
    fn test_retain_eligible_strips_out_of_context_fields() {
        let evidence = Evidence {
            links: vec!["https://example.com/a".into()],
            copyright: Some(CopyrightEvidence {
                original_work_url: "https://label.example/original".into(),
                rights_holder: None,
            }),
            audio_timestamps: Some("01:00".into()),
        };

        let kept = evidence
            .clone()
            .retain_eligible(ReportType::Comment, ReportReason::Harassment)
            .unwrap();
        assert_eq!(kept.links.len(), 1);
        assert!(kept.copyright.is_none());
        assert!(kept.audio_timestamps.is_none());

        assert!(evidence.retain_eligible(ReportType::Post, ReportReason::Spam).is_none());
    }
}
