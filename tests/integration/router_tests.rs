//! In-process router tests for the checks that run before any database access

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use library_server::{
    api,
    config::AppConfig,
    models::{Role, User, UserClaims},
    repository::Repository,
    services::Services,
    AppState,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn app() -> (Router, AppConfig) {
    let config = AppConfig::default();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("database url should parse");
    let services = Services::new(Repository::new(pool), config.auth.clone());

    let state = AppState {
        config: Arc::new(config.clone()),
        services: Arc::new(services),
    };
    (api::create_router(state), config)
}

fn token_for(config: &AppConfig, email: &str, role: Role) -> String {
    let user = User {
        id: Uuid::new_v4(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        email: email.to_string(),
        password: String::new(),
        birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        role,
        can_borrow: true,
    };
    UserClaims::for_user(&user, 1)
        .create_token(&config.auth.jwt_secret)
        .unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = app();

    let response = app
        .oneshot(request(Method::GET, "/api/v1/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_loan_without_token_is_unauthenticated() {
    let (app, _) = app();

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/loans",
            None,
            Some(json!({ "book_id": Uuid::new_v4(), "email": "a@library.test" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_garbage_token_is_unauthenticated() {
    let (app, _) = app();

    let response = app
        .oneshot(request(Method::GET, "/api/v1/loans?active=true", Some("not.a.jwt"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_borrowing_for_someone_else_is_forbidden() {
    let (app, config) = app();
    let token = token_for(&config, "a@library.test", Role::User);

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/loans",
            Some(&token),
            Some(json!({ "book_id": Uuid::new_v4(), "email": "b@library.test" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_borrower_email_is_rejected() {
    let (app, config) = app();
    let token = token_for(&config, "a@library.test", Role::User);

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/loans",
            Some(&token),
            Some(json!({ "book_id": Uuid::new_v4(), "email": "not-an-email" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_returning_for_someone_else_is_forbidden() {
    let (app, config) = app();
    let token = token_for(&config, "a@library.test", Role::User);
    let uri = format!("/api/v1/loans/return/b@library.test/{}", Uuid::new_v4());

    let response = app
        .oneshot(request(Method::POST, &uri, Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_routes_reject_readers() {
    let (app, config) = app();
    let token = token_for(&config, "a@library.test", Role::User);

    let cases = [
        request(
            Method::POST,
            "/api/v1/books",
            Some(&token),
            Some(json!({ "title": "Emma", "publication_date": "1815-12-23" })),
        ),
        request(Method::GET, "/api/v1/loans?active=true", Some(&token), None),
        request(Method::GET, "/api/v1/users", Some(&token), None),
        request(
            Method::DELETE,
            &format!("/api/v1/authors/{}", Uuid::new_v4()),
            Some(&token),
            None,
        ),
    ];

    for req in cases {
        let uri = req.uri().clone();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }
}

#[tokio::test]
async fn test_admins_do_not_act_for_other_users() {
    let (app, config) = app();
    let token = token_for(&config, "admin@library.test", Role::Admin);

    let response = app
        .oneshot(request(
            Method::DELETE,
            "/api/v1/users/someone@library.test",
            Some(&token),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _) = app();

    let response = app
        .oneshot(request(Method::GET, "/api-docs/openapi.json", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/loans"].is_object());
}
