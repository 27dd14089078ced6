use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::{
    auth,
    error::AppError,
    models::{
        CreateUser, ForgotPasswordRequest, LoginRequest, MessageResponse, ResetPasswordRequest,
        Token, User,
    },
    state::AppState,
    store::{resets, users},
};

const RESET_REQUESTED: &str = "If the email exists, a reset link has been sent.";

#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created successfully", body = User),
        (status = 400, description = "Invalid input, username or email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    payload.validate()?;
    let user = users::register(&state.pool, &payload, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = Token),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Token>, AppError> {
    let user = users::authenticate(&state.pool, &payload.username, &payload.password).await?;
    let access_token = auth::issue_token(&user, &state.config.secret_key, state.config.token_ttl_secs)?;

    Ok(Json(Token {
        access_token,
        token_type: "bearer".to_string(),
        username: user.username,
        email: user.email,
    }))
}

/// Answers the same way whether or not the address is registered.
#[utoipa::path(
    post,
    path = "/api/users/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset requested", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate()?;

    if let Some(ticket) = resets::request_reset(&state.pool, &payload.email, state.clock.now()).await? {
        tracing::debug!(expires_at = %ticket.expires_at, "dispatching password reset");
        // Delivery happens off the request path.
        let notifier = state.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_password_reset(&ticket.email, &ticket.username, &ticket.token)
                .await
            {
                tracing::warn!("password reset delivery failed: {:#}", e);
            }
        });
    }

    Ok(Json(MessageResponse {
        message: RESET_REQUESTED.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate()?;
    resets::consume_reset(&state.pool, &payload.token, &payload.new_password, state.clock.now())
        .await?;

    Ok(Json(MessageResponse {
        message: "Password has been reset successfully.".to_string(),
    }))
}
