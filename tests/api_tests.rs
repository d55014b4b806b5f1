use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use medivault::api::AppState;
use medivault::config::Config;
use sea_orm::ConnectionTrait;
use std::sync::Arc;
use tower::ServiceExt;

/// Admin seeded by the initial migration.
const ADMIN_EMAIL: &str = "admin@medivault.local";
const ADMIN_PASSWORD: &str = "password";

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    // In-memory sqlite is one database per connection.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.server.secure_cookies = false;
    // Nothing listens here: every AI-service call fails fast.
    config.ai_service.base_url = "http://127.0.0.1:9".to_string();
    config.ai_service.request_timeout_seconds = 2;
    config.storage.root = std::env::temp_dir()
        .join(format!("medivault-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    // Cheap hashing keeps the tests fast.
    config.security.argon2_memory_cost_kib = 64;
    config.security.argon2_time_cost = 1;

    let state = medivault::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    let app = medivault::api::router(state.clone()).await;
    (app, state)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Logs in and returns the session cookie to send on subsequent requests.
async fn login(app: &Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK, "login should succeed");

    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("login should set a session cookie")
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_string()
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Cookie", cookie)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, cookie: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Cookie", cookie)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn create_collaborator(
    app: &Router,
    admin_cookie: &str,
    email: &str,
    password: &str,
) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/accounts",
            admin_cookie,
            serde_json::json!({
                "name": "Collaborator",
                "email": email,
                "password": password,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_unauthenticated_requests_rejected() {
    let (app, _) = spawn_app().await;

    for uri in [
        "/api/documents",
        "/api/accounts",
        "/api/audit-logs",
        "/api/auth/me",
        "/api/missing-conditions",
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let (app, _) = spawn_app().await;

    let wrong_password = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": ADMIN_EMAIL, "password": "not-it" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let unknown_email = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": "nobody@example.com", "password": "whatever" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

    let body_a = json_body(wrong_password).await;
    let body_b = json_body(unknown_email).await;
    assert_eq!(body_a, body_b);
    assert_eq!(body_a["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_and_me() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app.clone().oneshot(get("/api/auth/me", &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);
    assert_eq!(body["data"]["role"], "ADMIN");
    assert!(body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header("Cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/api/auth/me", &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_collaborator_cannot_mutate() {
    let (app, state) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    create_collaborator(&app, &admin_cookie, "collab@example.com", "collabpass1").await;
    let collab_cookie = login(&app, "collab@example.com", "collabpass1").await;

    // Reads are allowed.
    let response = app
        .clone()
        .oneshot(get("/api/documents", &collab_cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Mutations are not.
    let before = state.store().list_accounts().await.unwrap().len();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/accounts",
            &collab_cookie,
            serde_json::json!({
                "name": "Sneaky",
                "email": "sneaky@example.com",
                "password": "password123",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Insufficient permissions");
    assert_eq!(state.store().list_accounts().await.unwrap().len(), before);

    // Audit log is admin-only too.
    let response = app
        .clone()
        .oneshot(get("/api/audit-logs", &collab_cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_account_crud_writes_audit_trail() {
    let (app, _) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let id = create_collaborator(&app, &admin_cookie, "audited@example.com", "password123").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/accounts/{id}"),
            &admin_cookie,
            serde_json::json!({ "name": "Renamed" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/accounts/{id}"))
                .header("Cookie", &admin_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get(
            &format!("/api/audit-logs?table_name=accounts&record_id={id}"),
            &admin_cookie,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 3);

    // Most recent first.
    assert_eq!(entries[0]["action"], "DELETE");
    assert_eq!(entries[1]["action"], "UPDATE");
    assert_eq!(entries[2]["action"], "CREATE");

    assert_eq!(entries[2]["new_values"]["email"], "audited@example.com");
    assert_eq!(entries[1]["old_values"]["name"], "Collaborator");
    assert_eq!(entries[1]["new_values"]["name"], "Renamed");
    assert_eq!(entries[0]["old_values"]["name"], "Renamed");
    assert_eq!(entries[0]["actor_email"], ADMIN_EMAIL);
    for entry in entries {
        assert!(entry["new_values"]
            .as_object()
            .is_none_or(|o| !o.contains_key("password_hash")));
    }
}

#[tokio::test]
async fn test_broken_audit_log_does_not_block_mutations() {
    let (app, state) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    state
        .store()
        .conn
        .execute_unprepared("DROP TABLE audit_log")
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/accounts",
            &admin_cookie,
            serde_json::json!({
                "name": "Unaudited",
                "email": "unaudited@example.com",
                "password": "password123",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let created = state
        .store()
        .get_account_by_email("unaudited@example.com")
        .await
        .unwrap();
    assert!(created.is_some());
}

#[tokio::test]
async fn test_disabled_account_loses_access_immediately() {
    let (app, _) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let id = create_collaborator(&app, &admin_cookie, "soon-gone@example.com", "password123").await;
    let collab_cookie = login(&app, "soon-gone@example.com", "password123").await;

    let response = app
        .clone()
        .oneshot(get("/api/documents", &collab_cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/accounts/{id}"),
            &admin_cookie,
            serde_json::json!({ "disabled": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The live session is useless on the very next request.
    let response = app
        .clone()
        .oneshot(get("/api/documents", &collab_cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // And a fresh login is refused with the generic message.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "email": "soon-gone@example.com",
                        "password": "password123"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_duplicate_email_conflict() {
    let (app, _) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    create_collaborator(&app, &admin_cookie, "dup@example.com", "password123").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/accounts",
            &admin_cookie,
            serde_json::json!({
                "name": "Duplicate",
                "email": "dup@example.com",
                "password": "password123",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_change_password_requires_current() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/change-password",
            &cookie,
            serde_json::json!({
                "current_password": "wrong-current",
                "new_password": "brand-new-password",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/change-password",
            &cookie,
            serde_json::json!({
                "current_password": ADMIN_PASSWORD,
                "new_password": "brand-new-password",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    login(&app, ADMIN_EMAIL, "brand-new-password").await;
}

#[tokio::test]
async fn test_password_reset_flow_with_single_use_token() {
    let (app, state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/forgot-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": ADMIN_EMAIL }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let identifier = format!("reset:{ADMIN_EMAIL}");
    let tokens = state
        .store()
        .tokens_for_identifier(&identifier)
        .await
        .unwrap();
    assert_eq!(tokens.len(), 1);
    let token = tokens[0].token.clone();

    // Token can be probed without consuming it.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "token": token, "action": "validate" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);

    // Reusing the current password is rejected.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "token": token, "password": ADMIN_PASSWORD }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "token": token, "password": "reset-password-1" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second use fails: the token was consumed.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "token": token, "password": "reset-password-2" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    login(&app, ADMIN_EMAIL, "reset-password-1").await;
}

#[tokio::test]
async fn test_forgot_password_never_reveals_accounts() {
    let (app, state) = spawn_app().await;

    let known = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/forgot-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": ADMIN_EMAIL }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let unknown = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/forgot-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": "ghost@example.com" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(json_body(known).await, json_body(unknown).await);

    // No token was minted for the unknown email.
    let tokens = state
        .store()
        .tokens_for_identifier("reset:ghost@example.com")
        .await
        .unwrap();
    assert!(tokens.is_empty());
}

#[tokio::test]
async fn test_reissued_reset_token_supersedes_previous() {
    let (app, state) = spawn_app().await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/forgot-password")
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "email": ADMIN_EMAIL }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let tokens = state
        .store()
        .tokens_for_identifier(&format!("reset:{ADMIN_EMAIL}"))
        .await
        .unwrap();
    assert_eq!(tokens.len(), 1);
}

#[tokio::test]
async fn test_verify_email_flow() {
    let (app, state) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let id = create_collaborator(&app, &admin_cookie, "verify-me@example.com", "password123").await;

    let tokens = state
        .store()
        .tokens_for_identifier("verify-me@example.com")
        .await
        .unwrap();
    assert_eq!(tokens.len(), 1);
    let token = tokens[0].token.clone();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/verify-email")
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::json!({ "token": token }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/accounts/{id}"), &admin_cookie))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert!(body["data"]["email_verified"].is_string());

    // Consumed: a second attempt is rejected.
    let token = tokens[0].token.clone();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/verify-email")
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::json!({ "token": token }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_token_rejected_for_email_verification() {
    let (app, state) = spawn_app().await;

    let token = state
        .store()
        .issue_token(&format!("reset:{ADMIN_EMAIL}"), 60)
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/verify-email")
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::json!({ "token": token }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_require_admin() {
    let (app, _) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    create_collaborator(&app, &admin_cookie, "scraper@example.com", "collabpass1").await;
    let collab_cookie = login(&app, "scraper@example.com", "collabpass1").await;

    let response = app
        .clone()
        .oneshot(get("/api/metrics", &collab_cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(get("/api/metrics", &admin_cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_conditions_proxy_surfaces_upstream_failure() {
    let (app, _) = spawn_app().await;
    let cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    // Nothing listens on the AI port, so the passthrough reports a gateway
    // error instead of hanging or succeeding.
    let response = app
        .clone()
        .oneshot(get("/api/missing-conditions?page=1&limit=10", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_missing_condition_update_gated_and_validated() {
    let (app, _) = spawn_app().await;
    let admin_cookie = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    create_collaborator(&app, &admin_cookie, "reviewer@example.com", "collabpass1").await;
    let collab_cookie = login(&app, "reviewer@example.com", "collabpass1").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/api/missing-conditions/cond-1",
            &collab_cookie,
            serde_json::json!({ "status": "reviewed" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Status vocabulary is checked before anything goes upstream.
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/api/missing-conditions/cond-1",
            &admin_cookie,
            serde_json::json!({ "status": "archived" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A valid request reaches the (unavailable) AI service.
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/api/missing-conditions/cond-1",
            &admin_cookie,
            serde_json::json!({ "status": "reviewed", "admin_notes": "mapped manually" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_duplicate_email_insert_hits_unique_index() {
    let (_, state) = spawn_app().await;

    let security = state.config().read().await.security.clone();
    let new_account = |name: &str| medivault::db::NewAccount {
        name: name.to_string(),
        email: "twin@example.com".to_string(),
        password: "password123".to_string(),
        role: medivault::entities::accounts::Role::Collaborator,
        created_by: None,
    };

    state
        .store()
        .create_account(new_account("First"), &security)
        .await
        .unwrap();

    // The handler-level existence check races with concurrent creates; the
    // unique index is the arbiter and its violation is recognizable as a
    // conflict rather than a generic database error.
    let err = state
        .store()
        .create_account(new_account("Second"), &security)
        .await
        .unwrap_err();
    assert!(medivault::db::is_unique_violation(&err));
}
