use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod clock;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod notifier;
mod recurrence;
mod state;
mod store;

#[cfg(test)]
mod tests;

use crate::{clock::SystemClock, config::Config, notifier::LoggingNotifier, state::AppState};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::users::me,
        handlers::users::update_me,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::lists::get_lists,
        handlers::lists::create_list,
        handlers::lists::get_list,
        handlers::lists::update_list,
        handlers::lists::delete_list,
        handlers::lists::share_list,
        handlers::lists::remove_share,
        handlers::tasks::get_tasks,
        handlers::tasks::get_task,
        handlers::tasks::create_task,
        handlers::tasks::update_task,
        handlers::tasks::delete_task,
        handlers::notifications::get_notifications,
        handlers::notifications::mark_read,
        handlers::notifications::mark_all_read,
        handlers::notifications::delete_notification
    ),
    components(
        schemas(
            models::User,
            models::CreateUser,
            models::LoginRequest,
            models::Token,
            models::UpdateProfile,
            models::ForgotPasswordRequest,
            models::ResetPasswordRequest,
            models::MessageResponse,
            models::TaskListDetails,
            models::CreateTaskList,
            models::UpdateTaskList,
            models::Share,
            models::ShareRequest,
            models::SharePermission,
            models::Task,
            models::CreateTask,
            models::UpdateTask,
            models::RecurrencePattern,
            models::Notification,
            models::NotificationKind
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and password reset"),
        (name = "users", description = "User profiles"),
        (name = "lists", description = "Chore lists and sharing"),
        (name = "tasks", description = "Chores within a list"),
        (name = "notifications", description = "Per-user notifications")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

#[derive(Parser)]
#[command(name = "chorequest", version, about = "Shared household chore lists")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Delete a user with everything they own
    DeleteUser {
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,chorequest=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = db::establish_connection(&config.database_url)
        .await
        .context("failed to open database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::Migrate => Ok(()),
        Command::DeleteUser { username } => {
            let user = store::users::find_by_username(&pool, &username)
                .await?
                .with_context(|| format!("no user named {}", username))?;
            store::users::delete(&pool, user.id).await?;
            tracing::info!("deleted user {} (id {})", user.username, user.id);
            Ok(())
        }
    }
}

async fn serve(pool: sqlx::SqlitePool, config: Config) -> anyhow::Result<()> {
    let addr = config.bind_addr;
    let state = AppState {
        pool,
        notifier: Arc::new(LoggingNotifier::new(config.reset_url_base.clone())),
        config: Arc::new(config),
        clock: Arc::new(SystemClock),
    };

    let app = create_app(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let cors = match state
        .config
        .cors_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(|| async { "ChoreQuest API is running!" }))
        // Public
        .route("/api/users/register", post(handlers::auth::register))
        .route("/api/users/login", post(handlers::auth::login))
        .route("/api/users/forgot-password", post(handlers::auth::forgot_password))
        .route("/api/users/reset-password", post(handlers::auth::reset_password))
        // Bearer token required
        .route("/api/users", get(handlers::users::list_users))
        .route(
            "/api/users/me",
            get(handlers::users::me).put(handlers::users::update_me),
        )
        .route("/api/users/:id", get(handlers::users::get_user))
        .route(
            "/api/lists",
            get(handlers::lists::get_lists).post(handlers::lists::create_list),
        )
        .route(
            "/api/lists/:id",
            get(handlers::lists::get_list)
                .put(handlers::lists::update_list)
                .delete(handlers::lists::delete_list),
        )
        .route("/api/lists/:id/share", post(handlers::lists::share_list))
        .route(
            "/api/lists/:id/share/:share_id",
            axum::routing::delete(handlers::lists::remove_share),
        )
        .route(
            "/api/lists/:id/tasks",
            get(handlers::tasks::get_tasks).post(handlers::tasks::create_task),
        )
        .route(
            "/api/lists/:id/tasks/:task_id",
            get(handlers::tasks::get_task)
                .put(handlers::tasks::update_task)
                .delete(handlers::tasks::delete_task),
        )
        .route(
            "/api/notifications",
            get(handlers::notifications::get_notifications),
        )
        .route(
            "/api/notifications/read-all",
            put(handlers::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/:id/read",
            put(handlers::notifications::mark_read),
        )
        .route(
            "/api/notifications/:id",
            axum::routing::delete(handlers::notifications::delete_notification),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
