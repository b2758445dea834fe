/// Aurora Moderation - report intake, moderation queue and reversible actions
///
/// Library half of the service; the binary in `main.rs` wires configuration,
/// background jobs and the HTTP server around it.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod moderation;
pub mod rate_limit;
pub mod server;

pub use context::AppContext;
pub use error::{ModResult, ModerationError};
