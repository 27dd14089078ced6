use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt; // for `oneshot`

use crate::{
    clock::FixedClock, config::Config, create_app, db::test_pool, notifier::LoggingNotifier,
    state::AppState, store::fixtures::day,
};

async fn setup_app() -> (Router, SqlitePool, Arc<FixedClock>) {
    let pool = test_pool().await;
    let clock = Arc::new(FixedClock::new(day(2024, 1, 31)));
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(Config::for_tests()),
        clock: clock.clone(),
        notifier: Arc::new(LoggingNotifier::new("http://localhost:4200/reset-password")),
    };
    (create_app(state), pool, clock)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn register(app: &Router, username: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "password123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

async fn login(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": username, "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_register_user() {
    let (app, _, _) = setup_app().await;

    let body = register(&app, "ana").await;
    assert_eq!(body["username"], "ana");
    assert_eq!(body["email"], "ana@example.com");
    assert!(body.get("password_hash").is_none());

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({
            "username": "ana",
            "email": "other@example.com",
            "password": "password123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_register_rejects_invalid_payload() {
    let (app, _, _) = setup_app().await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({ "username": "ab", "email": "nope", "password": "123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_user() {
    let (app, _, _) = setup_app().await;
    register(&app, "ana").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": "ana", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("access_token").is_some());
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["email"], "ana@example.com");

    let (wrong_status, wrong_body) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": "ana", "password": "wrong-password" })),
    )
    .await;
    let (unknown_status, unknown_body) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": "nobody", "password": "password123" })),
    )
    .await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let (app, _, _) = setup_app().await;

    let (status, _) = send(&app, "GET", "/api/lists", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/users/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    register(&app, "ana").await;
    let token = login(&app, "ana").await;
    let (status, body) = send(&app, "GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ana");
}

#[tokio::test]
async fn test_completing_monthly_chore_rolls_due_date() {
    let (app, _, _) = setup_app().await;
    register(&app, "ana").await;
    let token = login(&app, "ana").await;

    let (status, list) = send(
        &app,
        "POST",
        "/api/lists",
        Some(&token),
        Some(json!({ "name": "Home", "description": "Chores around the house" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(list["owner_username"], "ana");
    let list_id = list["id"].as_i64().unwrap();

    let (status, task) = send(
        &app,
        "POST",
        &format!("/api/lists/{}/tasks", list_id),
        Some(&token),
        Some(json!({
            "title": "Pay rent",
            "due_date": "2024-01-31T09:00:00Z",
            "is_recurring": true,
            "recurrence_pattern": "monthly"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["recurrence_pattern"], "Monthly");
    let task_id = task["id"].as_i64().unwrap();

    let (status, task) = send(
        &app,
        "PUT",
        &format!("/api/lists/{}/tasks/{}", list_id, task_id),
        Some(&token),
        Some(json!({ "is_completed": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["is_completed"], false);
    assert!(task["completed_at"].is_null());
    assert_eq!(task["due_date"], "2024-02-29T09:00:00Z");

    let (_, tasks) = send(
        &app,
        "GET",
        &format!("/api/lists/{}/tasks", list_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sharing_grants_access_by_permission() {
    let (app, _, _) = setup_app().await;
    register(&app, "ana").await;
    let bea = register(&app, "bea").await;
    register(&app, "cid").await;
    let ana_token = login(&app, "ana").await;
    let bea_token = login(&app, "bea").await;
    let cid_token = login(&app, "cid").await;

    let (_, list) = send(
        &app,
        "POST",
        "/api/lists",
        Some(&ana_token),
        Some(json!({ "name": "Garden" })),
    )
    .await;
    let list_id = list["id"].as_i64().unwrap();

    let (status, share) = send(
        &app,
        "POST",
        &format!("/api/lists/{}/share", list_id),
        Some(&ana_token),
        Some(json!({ "user_id": bea["id"], "permission": "view" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(share["permission"], "View");
    assert_eq!(share["username"], "bea");

    let (status, lists) = send(&app, "GET", "/api/lists", Some(&bea_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lists.as_array().unwrap().len(), 1);
    assert_eq!(lists[0]["name"], "Garden");

    let (_, notifications) = send(&app, "GET", "/api/notifications", Some(&bea_token), None).await;
    assert_eq!(notifications[0]["kind"], "ListShared");
    assert_eq!(
        notifications[0]["message"],
        "A chore list 'Garden' has been shared with you"
    );

    // View only
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/lists/{}/tasks", list_id),
        Some(&bea_token),
        Some(json!({ "title": "Weed the beds" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Not shared at all
    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/lists/{}", list_id),
        Some(&cid_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/lists/{}/share", list_id),
        Some(&ana_token),
        Some(json!({ "user_id": bea["id"], "permission": "edit" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/lists/{}/share/{}", list_id, share["id"]),
        Some(&ana_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, lists) = send(&app, "GET", "/api/lists", Some(&bea_token), None).await;
    assert!(lists.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_assigning_a_chore_notifies_assignee() {
    let (app, _, _) = setup_app().await;
    register(&app, "ana").await;
    let bea = register(&app, "bea").await;
    let ana_token = login(&app, "ana").await;
    let bea_token = login(&app, "bea").await;

    let (_, list) = send(
        &app,
        "POST",
        "/api/lists",
        Some(&ana_token),
        Some(json!({ "name": "Kitchen" })),
    )
    .await;
    let list_id = list["id"].as_i64().unwrap();

    let (status, task) = send(
        &app,
        "POST",
        &format!("/api/lists/{}/tasks", list_id),
        Some(&ana_token),
        Some(json!({ "title": "Dishes", "assignee_id": bea["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["assignee_username"], "bea");

    let (_, notifications) = send(&app, "GET", "/api/notifications", Some(&bea_token), None).await;
    assert_eq!(notifications.as_array().unwrap().len(), 1);
    assert_eq!(notifications[0]["kind"], "Assigned");
    assert_eq!(notifications[0]["task_id"], task["id"]);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/lists/{}/tasks", list_id),
        Some(&ana_token),
        Some(json!({ "title": "Mop", "assignee_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notifications_read_all_and_delete() {
    let (app, _, _) = setup_app().await;
    register(&app, "ana").await;
    let bea = register(&app, "bea").await;
    let ana_token = login(&app, "ana").await;
    let bea_token = login(&app, "bea").await;

    for name in ["Garage", "Attic"] {
        let (_, list) = send(
            &app,
            "POST",
            "/api/lists",
            Some(&ana_token),
            Some(json!({ "name": name })),
        )
        .await;
        send(
            &app,
            "POST",
            &format!("/api/lists/{}/share", list["id"]),
            Some(&ana_token),
            Some(json!({ "user_id": bea["id"] })),
        )
        .await;
    }

    let (status, _) = send(
        &app,
        "PUT",
        "/api/notifications/read-all",
        Some(&bea_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, notifications) = send(&app, "GET", "/api/notifications", Some(&bea_token), None).await;
    let notifications = notifications.as_array().unwrap().clone();
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n["is_read"] == true));

    let id = notifications[0]["id"].as_i64().unwrap();

    // Someone else's notification
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/notifications/{}", id),
        Some(&ana_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/notifications/{}", id),
        Some(&bea_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, notifications) = send(&app, "GET", "/api/notifications", Some(&bea_token), None).await;
    assert_eq!(notifications.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (app, pool, _) = setup_app().await;
    register(&app, "ana").await;

    let (known_status, known_body) = send(
        &app,
        "POST",
        "/api/users/forgot-password",
        None,
        Some(json!({ "email": "ana@example.com" })),
    )
    .await;
    let (unknown_status, unknown_body) = send(
        &app,
        "POST",
        "/api/users/forgot-password",
        None,
        Some(json!({ "email": "ghost@example.com" })),
    )
    .await;
    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(known_body, unknown_body);
    assert_eq!(
        known_body["message"],
        "If the email exists, a reset link has been sent."
    );

    let token: String = sqlx::query_scalar("SELECT token FROM password_reset_tokens")
        .fetch_one(&pool)
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/api/users/reset-password",
        None,
        Some(json!({ "token": token, "new_password": "brand-new-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Single use
    let (status, _) = send(
        &app,
        "POST",
        "/api/users/reset-password",
        None,
        Some(json!({ "token": token, "new_password": "another-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": "ana", "password": "brand-new-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_reset_token_expires_after_an_hour() {
    let (app, pool, clock) = setup_app().await;
    register(&app, "ana").await;

    send(
        &app,
        "POST",
        "/api/users/forgot-password",
        None,
        Some(json!({ "email": "ana@example.com" })),
    )
    .await;
    let token: String = sqlx::query_scalar("SELECT token FROM password_reset_tokens")
        .fetch_one(&pool)
        .await
        .unwrap();

    clock.advance(Duration::minutes(61));

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/reset-password",
        None,
        Some(json!({ "token": token, "new_password": "too-late-now" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired token");

    // Old password still works
    login(&app, "ana").await;
}

#[tokio::test]
async fn test_update_profile_email() {
    let (app, _, _) = setup_app().await;
    register(&app, "ana").await;
    register(&app, "bea").await;
    let token = login(&app, "ana").await;

    let (status, body) = send(&app, "PUT", "/api/users/me", Some(&token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ana@example.com");

    let (status, _) = send(
        &app,
        "PUT",
        "/api/users/me",
        Some(&token),
        Some(json!({ "email": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/users/me",
        Some(&token),
        Some(json!({ "email": "bea@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/users/me",
        Some(&token),
        Some(json!({ "email": "ana@home.example" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ana@home.example");
}

#[tokio::test]
async fn test_user_directory_requires_login() {
    let (app, _, _) = setup_app().await;
    let bea = register(&app, "bea").await;
    register(&app, "ana").await;
    let token = login(&app, "ana").await;

    let (status, _) = send(&app, "GET", "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, users) = send(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let (status, user) = send(
        &app,
        "GET",
        &format!("/api/users/{}", bea["id"]),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["username"], "bea");

    let (status, _) = send(&app, "GET", "/api/users/999", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
