use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth, error::AppError, models::PasswordResetToken, store::users};

pub const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// What the notifier needs to deliver a freshly issued reset token.
#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub email: String,
    pub username: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 64 hex characters from two random v4 UUIDs.
fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Issues a reset token when `email` belongs to a user.
///
/// `None` for unknown addresses; callers answer both cases identically.
pub async fn request_reset(
    pool: &SqlitePool,
    email: &str,
    now: DateTime<Utc>,
) -> Result<Option<ResetTicket>, AppError> {
    let Some(user) = users::find_by_email(pool, email).await? else {
        tracing::debug!("password reset requested for unknown email");
        return Ok(None);
    };

    let token = generate_token();
    let expires_at = now + Duration::hours(RESET_TOKEN_TTL_HOURS);

    sqlx::query(
        "INSERT INTO password_reset_tokens (user_id, token, expires_at, is_used, created_at)
         VALUES (?, ?, ?, 0, ?)",
    )
    .bind(user.id)
    .bind(&token)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!(user_id = user.id, %expires_at, "password reset token issued");

    Ok(Some(ResetTicket {
        email: user.email,
        username: user.username,
        token,
        expires_at,
    }))
}

/// Spends `token` and sets the new password in one transaction.
///
/// The token row is kept, flagged as used, so it can never validate again.
pub async fn consume_reset(
    pool: &SqlitePool,
    token: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let password_hash = auth::hash_password(new_password)?;
    let mut tx = super::begin_write(pool).await?;

    let record = sqlx::query_as::<_, PasswordResetToken>(
        "SELECT * FROM password_reset_tokens WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?
    .filter(|record| record.is_valid_at(now))
    .ok_or(AppError::InvalidOrExpiredToken)?;

    let claimed = sqlx::query(
        "UPDATE password_reset_tokens SET is_used = 1 WHERE id = ? AND is_used = 0",
    )
    .bind(record.id)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(AppError::InvalidOrExpiredToken);
    }

    users::set_password_hash(&mut *tx, record.user_id, &password_hash).await?;
    tx.commit().await?;

    tracing::info!(user_id = record.user_id, "password reset completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::store::fixtures::{day, user};

    #[tokio::test]
    async fn unknown_email_issues_nothing() {
        let pool = test_pool().await;
        user(&pool, "ana").await;

        let ticket = request_reset(&pool, "nobody@example.com", day(2024, 3, 1))
            .await
            .unwrap();
        assert!(ticket.is_none());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM password_reset_tokens")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn token_is_long_random_and_expires_in_an_hour() {
        let pool = test_pool().await;
        user(&pool, "ana").await;
        let now = day(2024, 3, 1);

        let a = request_reset(&pool, "ana@example.com", now).await.unwrap().unwrap();
        let b = request_reset(&pool, "ana@example.com", now).await.unwrap().unwrap();

        assert_eq!(a.token.len(), 64);
        assert!(a.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.token, b.token);
        assert_eq!(a.expires_at, now + Duration::hours(1));
        assert_eq!(a.username, "ana");
    }

    #[tokio::test]
    async fn token_works_once_and_changes_password() {
        let pool = test_pool().await;
        user(&pool, "ana").await;
        let now = day(2024, 3, 1);
        let ticket = request_reset(&pool, "ana@example.com", now).await.unwrap().unwrap();

        consume_reset(&pool, &ticket.token, "brand-new-pass", now + Duration::minutes(5))
            .await
            .unwrap();

        users::authenticate(&pool, "ana", "brand-new-pass").await.unwrap();
        assert!(users::authenticate(&pool, "ana", "password123").await.is_err());

        let again = consume_reset(&pool, &ticket.token, "another-pass", now + Duration::minutes(6))
            .await
            .unwrap_err();
        assert!(matches!(again, AppError::InvalidOrExpiredToken));
        users::authenticate(&pool, "ana", "brand-new-pass").await.unwrap();

        let (used,): (bool,) =
            sqlx::query_as("SELECT is_used FROM password_reset_tokens WHERE token = ?")
                .bind(&ticket.token)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(used);
    }

    #[tokio::test]
    async fn expired_or_unknown_tokens_are_rejected() {
        let pool = test_pool().await;
        user(&pool, "ana").await;
        let now = day(2024, 3, 1);
        let ticket = request_reset(&pool, "ana@example.com", now).await.unwrap().unwrap();

        let at_expiry = consume_reset(&pool, &ticket.token, "brand-new-pass", ticket.expires_at)
            .await
            .unwrap_err();
        assert!(matches!(at_expiry, AppError::InvalidOrExpiredToken));

        let unknown = consume_reset(&pool, "deadbeef", "brand-new-pass", now)
            .await
            .unwrap_err();
        assert!(matches!(unknown, AppError::InvalidOrExpiredToken));

        users::authenticate(&pool, "ana", "password123").await.unwrap();
    }
}
