/// Identity and content lookups the moderation engine depends on
use super::ReportType;
use crate::db::ts;
use crate::error::{ModResult, ModerationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Account role levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary member
    Regular,
    /// Reviews reports and takes actions
    Moderator,
    /// Full access
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "regular" => Ok(Role::Regular),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(ModerationError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }

    /// Moderators and admins cannot be reported
    pub fn is_elevated(&self) -> bool {
        self.can_act_as(Role::Moderator)
    }
}

/// Caller identity, with the role resolved once per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Fail unless the actor holds at least `required`
    pub fn require(&self, required: Role) -> ModResult<()> {
        if self.role.can_act_as(required) {
            Ok(())
        } else {
            Err(ModerationError::Authorization(format!(
                "{} role required",
                required.as_str()
            )))
        }
    }
}

/// Resolves account roles
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Role of a known account, `None` when the account does not exist
    async fn role_of(&self, user_id: &str) -> ModResult<Option<Role>>;
}

/// Resolves content ownership
#[async_trait]
pub trait ContentDirectory: Send + Sync {
    /// Owner of a content item, `None` when it does not exist
    async fn owner_of(&self, content_type: ReportType, content_id: &str) -> ModResult<Option<String>>;
}

/// Account and content registry stored alongside the moderation tables
#[derive(Clone)]
pub struct SqliteDirectory {
    db: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create an account or update its role
    pub async fn upsert_user(&self, user_id: &str, role: Role) -> ModResult<()> {
        let now = ts(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO user_account (user_id, role, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Change the role of an existing account
    pub async fn set_role(&self, user_id: &str, role: Role) -> ModResult<()> {
        let result = sqlx::query("UPDATE user_account SET role = ?, updated_at = ? WHERE user_id = ?")
            .bind(role.as_str())
            .bind(ts(Utc::now()))
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ModerationError::NotFound(format!("User {} not found", user_id)));
        }

        tracing::info!(user_id, role = role.as_str(), "Account role changed");
        Ok(())
    }

    /// Register a content item and its owner
    pub async fn register_content(
        &self,
        content_type: ReportType,
        content_id: &str,
        owner_id: &str,
    ) -> ModResult<()> {
        if !content_type.is_content() {
            return Err(ModerationError::Validation(
                "Profiles are registered as users, not content".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO content_item (content_type, content_id, owner_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(content_type.as_str())
        .bind(content_id)
        .bind(owner_id)
        .bind(ts(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Moderation state of an account
    pub async fn account_status(&self, user_id: &str) -> ModResult<Option<AccountStatus>> {
        let row = sqlx::query(
            "SELECT user_id, role, suspended_until, banned_at FROM user_account WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| {
            Ok(AccountStatus {
                user_id: row.try_get("user_id")?,
                role: Role::from_str(&row.try_get::<String, _>("role")?)?,
                suspended_until: crate::db::parse_opt_ts(row.try_get("suspended_until")?)?,
                banned_at: crate::db::parse_opt_ts(row.try_get("banned_at")?)?,
            })
        })
        .transpose()
    }

    /// Whether a content item is currently hidden by a removal
    pub async fn is_content_removed(&self, content_type: ReportType, content_id: &str) -> ModResult<bool> {
        let removed: Option<bool> = sqlx::query_scalar(
            "SELECT is_removed FROM content_item WHERE content_type = ? AND content_id = ?",
        )
        .bind(content_type.as_str())
        .bind(content_id)
        .fetch_optional(&self.db)
        .await?;

        removed.ok_or_else(|| {
            ModerationError::NotFound(format!("{} {} not found", content_type.noun(), content_id))
        })
    }
}

/// Account moderation flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatus {
    pub user_id: String,
    pub role: Role,
    pub suspended_until: Option<DateTime<Utc>>,
    pub banned_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl IdentityDirectory for SqliteDirectory {
    async fn role_of(&self, user_id: &str) -> ModResult<Option<Role>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM user_account WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;

        role.as_deref().map(Role::from_str).transpose()
    }
}

#[async_trait]
impl ContentDirectory for SqliteDirectory {
    async fn owner_of(&self, content_type: ReportType, content_id: &str) -> ModResult<Option<String>> {
        let owner: Option<String> = sqlx::query_scalar(
            "SELECT owner_id FROM content_item WHERE content_type = ? AND content_id = ?",
        )
        .bind(content_type.as_str())
        .bind(content_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::Admin.can_act_as(Role::Moderator));
        assert!(Role::Moderator.can_act_as(Role::Moderator));
        assert!(!Role::Regular.can_act_as(Role::Moderator));
        assert!(!Role::Moderator.can_act_as(Role::Admin));

        assert!(Role::Admin.is_elevated());
        assert!(!Role::Regular.is_elevated());
        assert!(Role::from_str("superadmin").is_err());
    }

    #[test]
    fn test_actor_require() {
        let member = Actor::new("u1", Role::Regular);
        assert!(matches!(
            member.require(Role::Moderator),
            Err(ModerationError::Authorization(_))
        ));
        assert!(Actor::new("m1", Role::Moderator).require(Role::Moderator).is_ok());
    }

    #[tokio::test]
    async fn test_directory_lookups() {
        let db = create_memory_pool().await.unwrap();
        let directory = SqliteDirectory::new(db);

        directory.upsert_user("alice", Role::Regular).await.unwrap();
        directory.register_content(ReportType::Post, "p1", "alice").await.unwrap();

        assert_eq!(directory.role_of("alice").await.unwrap(), Some(Role::Regular));
        assert_eq!(directory.role_of("nobody").await.unwrap(), None);
        assert_eq!(
            directory.owner_of(ReportType::Post, "p1").await.unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(directory.owner_of(ReportType::Comment, "p1").await.unwrap(), None);

        directory.set_role("alice", Role::Moderator).await.unwrap();
        assert_eq!(directory.role_of("alice").await.unwrap(), Some(Role::Moderator));
        assert!(directory.set_role("nobody", Role::Admin).await.is_err());

        assert!(!directory.is_content_removed(ReportType::Post, "p1").await.unwrap());
        assert!(directory
            .register_content(ReportType::User, "alice", "alice")
            .await
            .is_err());
    }
}
