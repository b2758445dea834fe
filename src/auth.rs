/// Authentication extractors and utilities
///
/// Bearer tokens are HS256 JWTs whose `sub` is the user id. The role is
/// looked up once per request and carried on the resolved `Actor`.
use crate::{
    context::AppContext,
    error::ModerationError,
    moderation::{Actor, Role},
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Sign a token for a user
pub fn issue_token(user_id: &str, jwt_secret: &str, ttl: Duration) -> Result<String, ModerationError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| ModerationError::Internal(format!("Failed to sign token: {}", e)))
}

/// Verify a JWT token with full validation
pub fn verify_jwt_token(token: &str, jwt_secret: &str) -> Result<Claims, ModerationError> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (1 minute)
    validation.leeway = 60;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("JWT verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ModerationError::Authentication("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ModerationError::Authentication("Invalid token signature".to_string())
                }
                _ => ModerationError::Authentication(format!("Invalid token: {}", e)),
            }
        })
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: Actor,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ModerationError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ModerationError::Authentication("Missing authorization header".to_string()))?;

        let claims = verify_jwt_token(&token, &state.config.authentication.jwt_secret)?;
        let actor = state.moderation.resolve_actor(&claims.sub).await?;

        tracing::debug!(user_id = %actor.user_id, role = actor.role.as_str(), "Request authenticated");

        Ok(AuthContext { actor })
    }
}

/// Authenticated caller holding at least the moderator role
#[derive(Debug, Clone)]
pub struct ModeratorAuthContext {
    pub actor: Actor,
}

#[async_trait]
impl FromRequestParts<AppContext> for ModeratorAuthContext {
    type Rejection = ModerationError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { actor } = AuthContext::from_request_parts(parts, state).await?;
        actor.require(Role::Moderator)?;

        Ok(ModeratorAuthContext { actor })
    }
}

/// Authenticated caller holding the admin role
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub actor: Actor,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = ModerationError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { actor } = AuthContext::from_request_parts(parts, state).await?;
        if let Err(e) = actor.require(Role::Admin) {
            tracing::warn!(user_id = %actor.user_id, "Admin role required");
            return Err(e);
        }

        Ok(AdminAuthContext { actor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_token_roundtrip() {
        let token = issue_token("mod-1", SECRET, Duration::hours(1)).unwrap();
        let claims = verify_jwt_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "mod-1");
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let token = issue_token("mod-1", SECRET, Duration::hours(1)).unwrap();
        assert!(matches!(
            verify_jwt_token(&token, "another-secret-another-secret-xx"),
            Err(ModerationError::Authentication(_))
        ));

        let expired = issue_token("mod-1", SECRET, Duration::hours(-2)).unwrap();
        assert!(matches!(
            verify_jwt_token(&expired, SECRET),
            Err(ModerationError::Authentication(_))
        ));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));
    }
}
