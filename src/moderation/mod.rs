/// Moderation report-and-action lifecycle
///
/// Reports enter through the intake gate, wait in a priority queue, and are
/// finalized by moderator actions. Actions carry side effects (content
/// removal, restrictions, suspensions) and can be reversed exactly once.
pub mod actions;
pub mod directory;
pub mod evidence;
pub mod intake;
pub mod notifications;
pub mod queue;
pub mod reports;
pub mod restrictions;
pub mod reversal;
pub mod scoring;
pub mod security;
pub mod service;

#[cfg(test)]
pub(crate) mod fixtures;

pub use actions::{ActionExecutor, ActionState, ActionType, ModerationAction, TakeActionParams};
pub use directory::{Actor, ContentDirectory, IdentityDirectory, Role, SqliteDirectory};
pub use evidence::{CopyrightEvidence, Evidence, EvidenceKind};
pub use intake::ReportIntake;
pub use notifications::{LogNotifier, NotificationDispatcher, NotificationPayload, Notifier};
pub use queue::{QueueFilters, ReportQueue};
pub use reports::{Report, ReportDraft, ReportReason, ReportStatus, ReportType};
pub use restrictions::{Capability, RestrictionEvaluator, RestrictionType, UserRestriction};
pub use reversal::{ReversalManager, ReversalVerifier, VerificationReport};
pub use scoring::{QualityScore, ReporterAccuracy, ReporterScoring};
pub use security::{
    AdminAlert, LogAlert, SecurityEvent, SecurityEventType, SecurityLog, Severity,
    SuspiciousActivity, SuspiciousActivityDetector,
};
pub use service::{ModerationService, SecurityScan, UserStanding};
