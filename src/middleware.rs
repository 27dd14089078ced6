use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use sqlx::SqlitePool;

use crate::{auth, config::Config, error::AppError, models::User, store::users};

/// The user behind the request's bearer token.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    SqlitePool: FromRef<S>,
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::AuthError("Missing Authorization header".to_string()))?
            .to_str()
            .map_err(|_| AppError::AuthError("Invalid Authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::AuthError("Invalid token format".to_string()))?;

        let config = Arc::<Config>::from_ref(state);
        let user_id = auth::decode_token(token, &config.secret_key)?;

        let pool = SqlitePool::from_ref(state);
        match users::find(&pool, user_id).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(AppError::NotFound(_)) => Err(AppError::AuthError("User not found".to_string())),
            Err(e) => Err(e),
        }
    }
}
