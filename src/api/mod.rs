/// API routes and handlers
pub mod moderation;
pub mod reports;
pub mod users;

use crate::{context::AppContext, error::ModerationError};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json, Router,
};
use serde::de::DeserializeOwned;
use validator::Validate;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(reports::routes())
        .merge(moderation::routes())
        .merge(users::routes())
}

/// JSON body that has passed `validator` checks
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ModerationError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ModerationError::Validation(e.body_text()))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}
