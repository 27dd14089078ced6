use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::CurrentUser,
    models::{CreateTaskList, Share, ShareRequest, TaskListDetails, UpdateTaskList},
    state::AppState,
    store::lists,
};

#[utoipa::path(
    get,
    path = "/api/lists",
    responses(
        (status = 200, description = "Lists owned by or shared with the caller", body = Vec<TaskListDetails>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "lists"
)]
pub async fn get_lists(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<TaskListDetails>>, AppError> {
    Ok(Json(lists::visible_to(&state.pool, user.id).await?))
}

#[utoipa::path(
    post,
    path = "/api/lists",
    request_body = CreateTaskList,
    responses(
        (status = 201, description = "List created", body = TaskListDetails),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "lists"
)]
pub async fn create_list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateTaskList>,
) -> Result<(StatusCode, Json<TaskListDetails>), AppError> {
    payload.validate()?;
    let list = lists::create(&state.pool, user.id, &payload, state.clock.now()).await?;
    let details = lists::details(&state.pool, list.id).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

#[utoipa::path(
    get,
    path = "/api/lists/{id}",
    params(
        ("id" = i64, Path, description = "Task list ID")
    ),
    responses(
        (status = 200, description = "List details", body = TaskListDetails),
        (status = 404, description = "List not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "lists"
)]
pub async fn get_list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<TaskListDetails>, AppError> {
    lists::access_for(&state.pool, id, user.id).await?;
    Ok(Json(lists::details(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/lists/{id}",
    params(
        ("id" = i64, Path, description = "Task list ID")
    ),
    request_body = UpdateTaskList,
    responses(
        (status = 200, description = "List updated", body = TaskListDetails),
        (status = 403, description = "Only the owner may update the list"),
        (status = 404, description = "List not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "lists"
)]
pub async fn update_list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTaskList>,
) -> Result<Json<TaskListDetails>, AppError> {
    lists::access_for(&state.pool, id, user.id).await?.require_owner()?;
    payload.validate()?;

    lists::update(&state.pool, id, &payload, state.clock.now()).await?;
    Ok(Json(lists::details(&state.pool, id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/lists/{id}",
    params(
        ("id" = i64, Path, description = "Task list ID")
    ),
    responses(
        (status = 204, description = "List and its tasks deleted"),
        (status = 403, description = "Only the owner may delete the list"),
        (status = 404, description = "List not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "lists"
)]
pub async fn delete_list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    lists::access_for(&state.pool, id, user.id).await?.require_owner()?;
    lists::delete(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/lists/{id}/share",
    params(
        ("id" = i64, Path, description = "Task list ID")
    ),
    request_body = ShareRequest,
    responses(
        (status = 200, description = "List shared", body = Share),
        (status = 400, description = "Already shared with this user, or the user is the owner"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "List or user not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "lists"
)]
pub async fn share_list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<ShareRequest>,
) -> Result<Json<Share>, AppError> {
    lists::access_for(&state.pool, id, user.id).await?.require_admin()?;

    let share = lists::share(
        &state.pool,
        id,
        payload.user_id,
        &payload.permission,
        state.clock.now(),
    )
    .await?;
    Ok(Json(share))
}

#[utoipa::path(
    delete,
    path = "/api/lists/{id}/share/{share_id}",
    params(
        ("id" = i64, Path, description = "Task list ID"),
        ("share_id" = i64, Path, description = "Share ID")
    ),
    responses(
        (status = 204, description = "Share removed"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "List or share not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "lists"
)]
pub async fn remove_share(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, share_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    lists::access_for(&state.pool, id, user.id).await?.require_admin()?;
    lists::unshare(&state.pool, id, share_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
