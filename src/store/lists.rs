use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::{conflict_on_unique, AppError},
    models::{CreateTaskList, Share, SharePermission, TaskList, TaskListDetails, UpdateTaskList},
    store::notifications::{self, NewNotification},
};

const DETAILS_SELECT: &str = "SELECT l.id, l.name, l.description, l.owner_id,
        u.username AS owner_username, l.created_at, l.updated_at,
        (SELECT COUNT(*) FROM tasks t WHERE t.list_id = l.id) AS task_count,
        (SELECT COUNT(*) FROM tasks t WHERE t.list_id = l.id AND t.is_completed = 1) AS completed_task_count
    FROM task_lists l
    JOIN users u ON u.id = l.owner_id";

const SHARE_SELECT: &str = "SELECT s.id, s.list_id, s.user_id, u.username, s.permission, s.shared_at
    FROM list_shares s
    JOIN users u ON u.id = s.user_id";

fn list_not_found() -> AppError {
    AppError::NotFound("Task list not found".to_string())
}

/// How a user reaches a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    Shared(SharePermission),
}

impl Access {
    pub fn require_owner(self) -> Result<(), AppError> {
        match self {
            Access::Owner => Ok(()),
            Access::Shared(_) => Err(AppError::Forbidden(
                "Only the owner can change or delete this list".to_string(),
            )),
        }
    }

    pub fn require_edit(self) -> Result<(), AppError> {
        match self {
            Access::Owner | Access::Shared(SharePermission::Edit | SharePermission::Admin) => {
                Ok(())
            }
            Access::Shared(SharePermission::View) => Err(AppError::Forbidden(
                "View access does not allow changing tasks".to_string(),
            )),
        }
    }

    pub fn require_admin(self) -> Result<(), AppError> {
        match self {
            Access::Owner | Access::Shared(SharePermission::Admin) => Ok(()),
            Access::Shared(_) => Err(AppError::Forbidden(
                "Admin access is required to manage sharing".to_string(),
            )),
        }
    }
}

/// Resolves `user_id`'s access to a list. Lists the user can't see are NotFound.
pub async fn access_for(pool: &SqlitePool, list_id: i64, user_id: i64) -> Result<Access, AppError> {
    let (owner_id,): (i64,) = sqlx::query_as("SELECT owner_id FROM task_lists WHERE id = ?")
        .bind(list_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(list_not_found)?;

    if owner_id == user_id {
        return Ok(Access::Owner);
    }

    let permission: Option<(SharePermission,)> =
        sqlx::query_as("SELECT permission FROM list_shares WHERE list_id = ? AND user_id = ?")
            .bind(list_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    permission
        .map(|(p,)| Access::Shared(p))
        .ok_or_else(list_not_found)
}

pub async fn create(
    pool: &SqlitePool,
    owner_id: i64,
    payload: &CreateTaskList,
    now: DateTime<Utc>,
) -> Result<TaskList, AppError> {
    let owner = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
    if owner.is_none() {
        return Err(AppError::NotFound("Owner not found".to_string()));
    }

    let list = sqlx::query_as::<_, TaskList>(
        "INSERT INTO task_lists (name, description, owner_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(list_id = list.id, owner_id, "task list created");
    Ok(list)
}

/// Overwrites only the fields present in `patch`; always bumps `updated_at`.
pub async fn update(
    pool: &SqlitePool,
    list_id: i64,
    patch: &UpdateTaskList,
    now: DateTime<Utc>,
) -> Result<TaskList, AppError> {
    let list = sqlx::query_as::<_, TaskList>(
        "UPDATE task_lists SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            updated_at = ?
        WHERE id = ?
        RETURNING *",
    )
    .bind(&patch.name)
    .bind(&patch.description)
    .bind(now)
    .bind(list_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(list_not_found)?;

    tracing::info!(list_id, "task list updated");
    Ok(list)
}

/// Tasks and shares go with the list.
pub async fn delete(pool: &SqlitePool, list_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM task_lists WHERE id = ?")
        .bind(list_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(list_not_found());
    }

    tracing::info!(list_id, "task list deleted");
    Ok(())
}

pub async fn details(pool: &SqlitePool, list_id: i64) -> Result<TaskListDetails, AppError> {
    let mut list = sqlx::query_as::<_, TaskListDetails>(&format!("{} WHERE l.id = ?", DETAILS_SELECT))
        .bind(list_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(list_not_found)?;

    list.shares = shares(pool, list_id).await?;
    Ok(list)
}

pub async fn shares(pool: &SqlitePool, list_id: i64) -> Result<Vec<Share>, AppError> {
    let shares = sqlx::query_as::<_, Share>(&format!("{} WHERE s.list_id = ? ORDER BY s.id", SHARE_SELECT))
        .bind(list_id)
        .fetch_all(pool)
        .await?;
    Ok(shares)
}

/// Lists owned by `user_id` together with lists shared with them.
///
/// Owned and shared lists are read separately and merged; the merge keeps
/// the first occurrence of every id.
pub async fn visible_to(pool: &SqlitePool, user_id: i64) -> Result<Vec<TaskListDetails>, AppError> {
    let owned = sqlx::query_as::<_, TaskListDetails>(&format!(
        "{} WHERE l.owner_id = ? ORDER BY l.id",
        DETAILS_SELECT
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let shared = sqlx::query_as::<_, TaskListDetails>(&format!(
        "{} JOIN list_shares s ON s.list_id = l.id WHERE s.user_id = ? ORDER BY l.id",
        DETAILS_SELECT
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut seen = HashSet::new();
    let mut lists: Vec<TaskListDetails> = owned
        .into_iter()
        .chain(shared)
        .filter(|list| seen.insert(list.id))
        .collect();

    for list in &mut lists {
        list.shares = shares(pool, list.id).await?;
    }

    tracing::debug!(user_id, count = lists.len(), "visible task lists loaded");
    Ok(lists)
}

/// Grants `user_id` access to a list and notifies them, atomically.
///
/// `permission` is parsed leniently: unknown values grant View. A second
/// grant for the same user fails instead of updating the first.
pub async fn share(
    pool: &SqlitePool,
    list_id: i64,
    user_id: i64,
    permission: &str,
    now: DateTime<Utc>,
) -> Result<Share, AppError> {
    let permission = SharePermission::parse_lenient(permission);
    let mut tx = super::begin_write(pool).await?;

    let list = sqlx::query_as::<_, TaskList>("SELECT * FROM task_lists WHERE id = ?")
        .bind(list_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(list_not_found)?;

    let user = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if user.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    if list.owner_id == user_id {
        return Err(AppError::ValidationError(
            "A list cannot be shared with its owner".to_string(),
        ));
    }

    let existing = sqlx::query("SELECT 1 FROM list_shares WHERE list_id = ? AND user_id = ?")
        .bind(list_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "List already shared with this user".to_string(),
        ));
    }

    let share_id = sqlx::query(
        "INSERT INTO list_shares (list_id, user_id, permission, shared_at) VALUES (?, ?, ?, ?)",
    )
    .bind(list_id)
    .bind(user_id)
    .bind(permission)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "List already shared with this user"))?
    .last_insert_rowid();

    notifications::push(&mut *tx, NewNotification::list_shared(user_id, &list.name), now).await?;

    let share = sqlx::query_as::<_, Share>(&format!("{} WHERE s.id = ?", SHARE_SELECT))
        .bind(share_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(list_id, user_id, %permission, "task list shared");
    Ok(share)
}

pub async fn unshare(pool: &SqlitePool, list_id: i64, share_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM list_shares WHERE id = ? AND list_id = ?")
        .bind(share_id)
        .bind(list_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Share not found".to_string()));
    }

    tracing::info!(list_id, share_id, "share removed");
    Ok(())
}
