use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::{Notification, NotificationKind},
};

pub const RECENT_LIMIT: i64 = 50;

pub struct NewNotification {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub task_id: Option<i64>,
}

impl NewNotification {
    pub fn list_shared(user_id: i64, list_name: &str) -> Self {
        Self {
            user_id,
            kind: NotificationKind::ListShared,
            title: "Chore List Shared".to_string(),
            message: format!("A chore list '{}' has been shared with you", list_name),
            task_id: None,
        }
    }

    pub fn assigned(user_id: i64, task_id: i64, task_title: &str) -> Self {
        Self {
            user_id,
            kind: NotificationKind::Assigned,
            title: "Chore Assigned".to_string(),
            message: format!("You have been assigned to '{}'", task_title),
            task_id: Some(task_id),
        }
    }
}

/// Appends a notification on the caller's connection (usually a transaction).
pub(crate) async fn push(
    conn: &mut SqliteConnection,
    new: NewNotification,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO notifications (user_id, kind, title, message, is_read, task_id, created_at)
         VALUES (?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(new.user_id)
    .bind(new.kind)
    .bind(&new.title)
    .bind(&new.message)
    .bind(new.task_id)
    .bind(now)
    .execute(conn)
    .await?
    .last_insert_rowid();

    tracing::debug!(notification_id = id, user_id = new.user_id, kind = ?new.kind, "notification queued");
    Ok(id)
}

/// Newest first, at most [`RECENT_LIMIT`].
pub async fn list_recent(pool: &SqlitePool, user_id: i64) -> Result<Vec<Notification>, AppError> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = ?
         ORDER BY created_at DESC, id DESC
         LIMIT ?",
    )
    .bind(user_id)
    .bind(RECENT_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(notifications)
}

pub async fn mark_read(pool: &SqlitePool, user_id: i64, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }
    Ok(())
}

/// Returns how many notifications flipped to read.
pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete(pool: &SqlitePool, user_id: i64, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }
    Ok(())
}
