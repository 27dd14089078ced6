use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth,
    error::AppError,
    models::{CreateUser, User},
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

fn duplicate_user(err: sqlx::Error) -> AppError {
    let message = match &err {
        sqlx::Error::Database(db) if db.message().contains("users.email") => "Email already exists",
        _ => "Username already exists",
    };
    crate::error::conflict_on_unique(err, message)
}

/// Creates a user. Username and email are unique (exact match).
pub async fn register(
    pool: &SqlitePool,
    payload: &CreateUser,
    now: DateTime<Utc>,
) -> Result<User, AppError> {
    let password_hash = auth::hash_password(&payload.password)?;
    let mut tx = super::begin_write(pool).await?;

    let username_taken = sqlx::query("SELECT 1 FROM users WHERE username = ?")
        .bind(&payload.username)
        .fetch_optional(&mut *tx)
        .await?;
    if username_taken.is_some() {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }

    let email_taken = sqlx::query("SELECT 1 FROM users WHERE email = ?")
        .bind(&payload.email)
        .fetch_optional(&mut *tx)
        .await?;
    if email_taken.is_some() {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    // UNIQUE constraints catch whatever slips past the checks above.
    let id = sqlx::query(
        "INSERT INTO users (username, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(duplicate_user)?
    .last_insert_rowid();

    tx.commit().await?;
    tracing::info!(user_id = id, username = %payload.username, "user registered");

    Ok(User {
        id,
        username: payload.username.clone(),
        email: payload.email.clone(),
        password_hash,
        created_at: now,
    })
}

/// Exact username match plus hash verification. Every failure reads the same.
pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    let user = find_by_username(pool, username).await?;

    match user {
        Some(user) if auth::verify_password(password, &user.password_hash) => Ok(user),
        _ => {
            tracing::debug!(username, "authentication failed");
            Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()))
        }
    }
}

pub async fn find(pool: &SqlitePool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn find_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

/// Changes the email, refusing one already held by another user.
pub async fn update_email(
    pool: &SqlitePool,
    user_id: i64,
    new_email: &str,
) -> Result<User, AppError> {
    let mut tx = super::begin_write(pool).await?;

    let taken = sqlx::query("SELECT 1 FROM users WHERE email = ? AND id <> ?")
        .bind(new_email)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict("Email already taken".to_string()));
    }

    let result = sqlx::query("UPDATE users SET email = ? WHERE id = ?")
        .bind(new_email)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| crate::error::conflict_on_unique(e, "Email already taken"))?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id, "email updated");
    Ok(user)
}

pub(crate) async fn set_password_hash(
    conn: &mut SqliteConnection,
    user_id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Administrative removal. Owned lists, shares, notifications and reset
/// tokens go with the user; tasks assigned to them lose the assignee.
pub async fn delete(pool: &SqlitePool, user_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id, "user deleted");
    Ok(())
}
