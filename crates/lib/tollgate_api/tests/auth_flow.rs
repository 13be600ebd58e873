//! Integration tests that drive the router over an in-memory store.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tollgate_api::{AppState, config::ApiConfig};
use tollgate_core::models::rbac::{Permission, Role};
use tollgate_core::store::{CredentialStore, MemoryStore, RolePermissionStore};
use tower::ServiceExt;

const PASSWORD: &str = "Secret123!";

fn app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.insert_role(Role {
        name: "superadmin".into(),
        permissions: vec![],
    });
    store.insert_role(Role {
        name: "editor".into(),
        permissions: vec![Permission {
            name: "update roles".into(),
            resource: "roles".into(),
            http_method: "PUT".into(),
        }],
    });
    let state = AppState::with_store(ApiConfig::with_secret("test-secret"), store.clone());
    (tollgate_api::router(state), store)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    body
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

async fn refresh(app: &Router, refresh_token: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh_token })),
    )
    .await
}

async fn logout(app: &Router, access: &str, refresh_token: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/auth/logout",
        Some(access),
        Some(json!({ "refresh_token": refresh_token })),
    )
    .await
}

async fn check(app: &Router, access: &str, resource: &str, method: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::GET,
        &format!("/auth/check-permission?resource={resource}&http_method={method}"),
        Some(access),
        None,
    )
    .await
}

fn tokens(body: &Value) -> (String, String) {
    (
        body["access_token"].as_str().expect("access_token").to_string(),
        body["refresh_token"].as_str().expect("refresh_token").to_string(),
    )
}

/// Register an admin first so `email` is an ordinary user, then give it `editor`.
async fn editor(app: &Router, store: &MemoryStore, email: &str) {
    register(app, "admin@b.com").await;
    register(app, email).await;
    let user = store.find_by_email(email).await.unwrap().unwrap();
    store.grant_role(&user.user.id, "editor").await.unwrap();
}

#[tokio::test]
async fn login_refresh_logout_scenario() {
    let (app, store) = app();
    editor(&app, &store, "a@b.com").await;

    let (status, body) = login(&app, "a@b.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    let (a1, r1) = tokens(&body);
    assert_eq!(body["token_type"], "bearer");

    let (status, body) = refresh(&app, &r1).await;
    assert_eq!(status, StatusCode::OK);
    let (a2, r2) = tokens(&body);
    assert_ne!(r1, r2);

    // R1 was consumed by the rotation.
    let (status, _) = refresh(&app, &r1).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A1 is still valid until it expires; only logout revokes access tokens.
    let (status, _) = check(&app, &a1, "roles", "PUT").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = logout(&app, &a2, &r2).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = refresh(&app, &r2).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = check(&app, &a2, "roles", "PUT").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_revoked");

    let (status, _) = send(&app, Method::GET, "/auth/me", Some(&a2), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn same_refresh_token_works_once() {
    let (app, _) = app();
    let body = register(&app, "a@b.com").await;
    let (_, r1) = tokens(&body);

    let (first, _) = refresh(&app, &r1).await;
    let (second, body) = refresh(&app, &r1).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid refresh token");
}

#[tokio::test]
async fn permission_resolution_by_role() {
    let (app, store) = app();
    editor(&app, &store, "a@b.com").await;
    let (_, body) = login(&app, "a@b.com", PASSWORD).await;
    let (access, _) = tokens(&body);

    let (status, body) = check(&app, &access, "roles", "PUT").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], "permission granted");

    let (status, body) = check(&app, &access, "roles", "DELETE").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn first_user_is_superadmin_and_bypasses_checks() {
    let (app, _) = app();
    let body = register(&app, "root@b.com").await;
    let (access, _) = tokens(&body);

    let (status, _) = check(&app, &access, "anything", "DELETE").await;
    assert_eq!(status, StatusCode::OK);

    let (status, me) = send(&app, Method::GET, "/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["is_superuser"], true);
    assert_eq!(me["roles"], json!(["superadmin"]));

    // The second user gets no roles.
    let body = register(&app, "b@b.com").await;
    let (access, _) = tokens(&body);
    let (status, _) = check(&app, &access, "anything", "DELETE").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bad_credentials_do_not_reveal_which_part_was_wrong() {
    let (app, _) = app();
    register(&app, "a@b.com").await;

    let (wrong_pw, body_pw) = login(&app, "a@b.com", "nope-nope").await;
    let (unknown, body_email) = login(&app, "ghost@b.com", PASSWORD).await;
    assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
    assert_eq!(body_pw, body_email);
}

#[tokio::test]
async fn double_logout_is_rejected() {
    let (app, _) = app();
    let body = register(&app, "a@b.com").await;
    let (access, refresh_token) = tokens(&body);

    let (first, _) = logout(&app, &access, &refresh_token).await;
    let (second, _) = logout(&app, &access, &refresh_token).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_requires_bearer_header() {
    let (app, _) = app();
    let body = register(&app, "a@b.com").await;
    let (_, refresh_token) = tokens(&body);

    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/logout",
        None,
        Some(json!({ "refresh_token": refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Nothing was revoked.
    let (status, _) = refresh(&app, &refresh_token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_validates_input() {
    let (app, _) = app();
    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": "a@b.com", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    register(&app, "a@b.com").await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": "a@b.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already registered");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_registrations_yield_one_superadmin() {
    let (app, store) = app();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let email = format!("u{i}@b.com");
                register(&app, &email).await;
                email
            })
        })
        .collect();

    let mut superadmins = 0;
    for handle in handles {
        let email = handle.await.unwrap();
        let user = store.find_by_email(&email).await.unwrap().unwrap();
        if store
            .roles_for_user(&user.user.id)
            .await
            .unwrap()
            .iter()
            .any(|r| r == "superadmin")
        {
            superadmins += 1;
        }
    }
    assert_eq!(superadmins, 1);
}

#[tokio::test]
async fn unusable_stored_hash_is_invalid_credentials() {
    let (app, store) = app();
    store
        .create_user("legacy@b.com", None, "not-a-bcrypt-hash")
        .await
        .unwrap();

    let (status, body) = login(&app, "legacy@b.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn me_lists_effective_permissions() {
    let (app, store) = app();
    editor(&app, &store, "a@b.com").await;
    let (_, body) = login(&app, "a@b.com", PASSWORD).await;
    let (access, _) = tokens(&body);

    let (status, me) = send(&app, Method::GET, "/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["is_superuser"], false);
    assert_eq!(
        me["permissions"],
        json!([{ "resource": "roles", "http_method": "PUT" }])
    );
}

#[tokio::test]
async fn logout_with_foreign_access_token_keeps_refresh_token() {
    let (app, _) = app();
    let (mine_access, mine_refresh) = tokens(&register(&app, "a@b.com").await);
    let (theirs_access, _) = tokens(&register(&app, "b@b.com").await);

    let (status, _) = logout(&app, &theirs_access, &mine_refresh).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = check(&app, &theirs_access, "anything", "GET").await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = logout(&app, &mine_access, &mine_refresh).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let (app, _) = app();
    let (status, body) = check(&app, "not-a-token", "roles", "PUT").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}
