use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::CurrentUser,
    models::{CreateTask, Task, UpdateTask},
    state::AppState,
    store::{lists, tasks},
};

#[utoipa::path(
    get,
    path = "/api/lists/{id}/tasks",
    params(
        ("id" = i64, Path, description = "Task list ID")
    ),
    responses(
        (status = 200, description = "Tasks of the list", body = Vec<Task>),
        (status = 404, description = "List not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn get_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Task>>, AppError> {
    lists::access_for(&state.pool, id, user.id).await?;
    Ok(Json(tasks::list(&state.pool, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/lists/{id}/tasks/{task_id}",
    params(
        ("id" = i64, Path, description = "Task list ID"),
        ("task_id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Get task details", body = Task),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, task_id)): Path<(i64, i64)>,
) -> Result<Json<Task>, AppError> {
    lists::access_for(&state.pool, id, user.id).await?;
    Ok(Json(tasks::get(&state.pool, id, task_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/lists/{id}/tasks",
    params(
        ("id" = i64, Path, description = "Task list ID")
    ),
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created successfully", body = Task),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Edit access required"),
        (status = 404, description = "List not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<CreateTask>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    lists::access_for(&state.pool, id, user.id).await?.require_edit()?;
    payload.validate()?;

    let task = tasks::create(&state.pool, id, &payload, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// Partial update. Completing a recurring task rolls it to its next due date.
#[utoipa::path(
    put,
    path = "/api/lists/{id}/tasks/{task_id}",
    params(
        ("id" = i64, Path, description = "Task list ID"),
        ("task_id" = i64, Path, description = "Task ID")
    ),
    request_body = UpdateTask,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Edit access required"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, task_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateTask>,
) -> Result<Json<Task>, AppError> {
    lists::access_for(&state.pool, id, user.id).await?.require_edit()?;
    payload.validate()?;

    let task = tasks::update(&state.pool, id, task_id, &payload, state.clock.now()).await?;
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/api/lists/{id}/tasks/{task_id}",
    params(
        ("id" = i64, Path, description = "Task list ID"),
        ("task_id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Edit access required"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, task_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    lists::access_for(&state.pool, id, user.id).await?.require_edit()?;
    tasks::delete(&state.pool, id, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
