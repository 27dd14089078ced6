use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::{CreateTask, RecurrencePattern, Task, UpdateTask},
    recurrence,
    store::notifications::{self, NewNotification},
};

const TASK_SELECT: &str = "SELECT t.*, u.username AS assignee_username
    FROM tasks t
    LEFT JOIN users u ON u.id = t.assignee_id";

fn task_not_found() -> AppError {
    AppError::NotFound("Task not found".to_string())
}

async fn fetch(
    conn: &mut SqliteConnection,
    list_id: i64,
    task_id: i64,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!("{} WHERE t.id = ? AND t.list_id = ?", TASK_SELECT))
        .bind(task_id)
        .bind(list_id)
        .fetch_optional(conn)
        .await
}

async fn ensure_assignee(conn: &mut SqliteConnection, user_id: i64) -> Result<(), AppError> {
    let found = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(AppError::ValidationError("Assignee not found".to_string())),
    }
}

pub async fn list(pool: &SqlitePool, list_id: i64) -> Result<Vec<Task>, AppError> {
    let tasks = sqlx::query_as::<_, Task>(&format!("{} WHERE t.list_id = ? ORDER BY t.id", TASK_SELECT))
        .bind(list_id)
        .fetch_all(pool)
        .await?;
    Ok(tasks)
}

pub async fn get(pool: &SqlitePool, list_id: i64, task_id: i64) -> Result<Task, AppError> {
    let mut conn = pool.acquire().await?;
    fetch(&mut conn, list_id, task_id)
        .await?
        .ok_or_else(task_not_found)
}

/// Adds a task to a list, notifying the assignee in the same transaction.
///
/// An unrecognised recurrence pattern leaves the task without one.
pub async fn create(
    pool: &SqlitePool,
    list_id: i64,
    payload: &CreateTask,
    now: DateTime<Utc>,
) -> Result<Task, AppError> {
    let mut tx = super::begin_write(pool).await?;

    let list = sqlx::query("SELECT 1 FROM task_lists WHERE id = ?")
        .bind(list_id)
        .fetch_optional(&mut *tx)
        .await?;
    if list.is_none() {
        return Err(AppError::NotFound("Task list not found".to_string()));
    }

    if let Some(assignee_id) = payload.assignee_id {
        ensure_assignee(&mut *tx, assignee_id).await?;
    }

    let pattern = if payload.is_recurring {
        payload
            .recurrence_pattern
            .as_deref()
            .and_then(RecurrencePattern::parse_lenient)
    } else {
        None
    };

    let task_id = sqlx::query(
        "INSERT INTO tasks (list_id, title, description, assignee_id, due_date, is_completed,
            is_recurring, recurrence_pattern, recurrence_interval, recurrence_end_date,
            created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)",
    )
    .bind(list_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.assignee_id)
    .bind(payload.due_date)
    .bind(payload.is_recurring)
    .bind(pattern)
    .bind(payload.recurrence_interval)
    .bind(payload.recurrence_end_date)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    if let Some(assignee_id) = payload.assignee_id {
        notifications::push(
            &mut *tx,
            NewNotification::assigned(assignee_id, task_id, &payload.title),
            now,
        )
        .await?;
    }

    let task = fetch(&mut *tx, list_id, task_id)
        .await?
        .ok_or_else(task_not_found)?;
    tx.commit().await?;

    tracing::info!(task_id, list_id, "task created");
    Ok(task)
}

/// Applies a partial update.
///
/// Completion is evaluated against the recurrence settings the task had
/// before this patch; recurrence fields in the patch apply afterwards. The
/// assignee is notified only when the assignee actually changes.
pub async fn update(
    pool: &SqlitePool,
    list_id: i64,
    task_id: i64,
    patch: &UpdateTask,
    now: DateTime<Utc>,
) -> Result<Task, AppError> {
    let mut tx = super::begin_write(pool).await?;

    let mut task = fetch(&mut *tx, list_id, task_id)
        .await?
        .ok_or_else(task_not_found)?;
    let previous_assignee = task.assignee_id;

    if let Some(title) = &patch.title {
        task.title = title.clone();
    }
    if let Some(description) = &patch.description {
        task.description = description.clone();
    }
    if let Some(assignee_id) = patch.assignee_id {
        ensure_assignee(&mut *tx, assignee_id).await?;
        task.assignee_id = Some(assignee_id);
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = Some(due_date);
    }
    if let Some(completed) = patch.is_completed {
        recurrence::set_completed(&mut task, completed, now);
    }

    if let Some(is_recurring) = patch.is_recurring {
        task.is_recurring = is_recurring;
    }
    if let Some(pattern) = patch
        .recurrence_pattern
        .as_deref()
        .and_then(RecurrencePattern::parse_lenient)
    {
        task.recurrence_pattern = Some(pattern);
    }
    if let Some(interval) = patch.recurrence_interval {
        task.recurrence_interval = Some(interval);
    }
    if let Some(end_date) = patch.recurrence_end_date {
        task.recurrence_end_date = Some(end_date);
    }
    task.updated_at = now;

    sqlx::query(
        "UPDATE tasks SET
            title = ?, description = ?, assignee_id = ?, due_date = ?,
            is_completed = ?, completed_at = ?,
            is_recurring = ?, recurrence_pattern = ?, recurrence_interval = ?,
            recurrence_end_date = ?, updated_at = ?
        WHERE id = ? AND list_id = ?",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.assignee_id)
    .bind(task.due_date)
    .bind(task.is_completed)
    .bind(task.completed_at)
    .bind(task.is_recurring)
    .bind(task.recurrence_pattern)
    .bind(task.recurrence_interval)
    .bind(task.recurrence_end_date)
    .bind(task.updated_at)
    .bind(task_id)
    .bind(list_id)
    .execute(&mut *tx)
    .await?;

    if let Some(assignee_id) = patch.assignee_id.filter(|id| previous_assignee != Some(*id)) {
        notifications::push(
            &mut *tx,
            NewNotification::assigned(assignee_id, task_id, &task.title),
            now,
        )
        .await?;
    }

    let task = fetch(&mut *tx, list_id, task_id)
        .await?
        .ok_or_else(task_not_found)?;
    tx.commit().await?;

    tracing::info!(task_id, list_id, completed = task.is_completed, "task updated");
    Ok(task)
}

pub async fn delete(pool: &SqlitePool, list_id: i64, task_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND list_id = ?")
        .bind(task_id)
        .bind(list_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(task_not_found());
    }

    tracing::info!(task_id, list_id, "task deleted");
    Ok(())
}
