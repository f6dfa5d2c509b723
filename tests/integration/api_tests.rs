//! API integration tests
//!
//! These run against a live server started with
//! `LIBRARY_AUTH__ADMIN_EMAIL=admin@library.local LIBRARY_AUTH__ADMIN_PASSWORD=admin`.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";
const ADMIN_EMAIL: &str = "admin@library.local";
const ADMIN_PASSWORD: &str = "admin";

/// Helper to get a token for the given account
async fn get_auth_token(client: &Client, email: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/users/authenticate", BASE_URL))
        .json(&json!({
            "email": email,
            "password": password
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Register a fresh reader and return its email
async fn register_reader(client: &Client) -> String {
    let email = format!("reader-{}@library.local", Uuid::new_v4().simple());

    let response = client
        .post(format!("{}/users", BASE_URL))
        .json(&json!({
            "first_name": "Ada",
            "last_name": "Reader",
            "email": email,
            "password": "secret",
            "birth_date": "1990-04-12"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    email
}

/// Create a book as administrator and return its id
async fn create_book(client: &Client, admin_token: &str) -> String {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin_token)
        .json(&json!({
            "title": format!("Book {}", Uuid::new_v4()),
            "publication_date": "1965-08-01"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "AVAILABLE");
    body["id"].as_str().expect("No id in response").to_string()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/users/authenticate", BASE_URL))
        .json(&json!({
            "email": ADMIN_EMAIL,
            "password": ADMIN_PASSWORD
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/users/authenticate", BASE_URL))
        .json(&json!({
            "email": ADMIN_EMAIL,
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_list_books_is_public() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books?per_page=5", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
    assert!(body["total"].is_number());
    assert_eq!(body["per_page"], 5);
}

#[tokio::test]
#[ignore]
async fn test_create_book_requires_admin() {
    let client = Client::new();
    let email = register_reader(&client).await;
    let token = get_auth_token(&client, &email, "secret").await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Not allowed",
            "publication_date": "2000-01-01"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_unauthenticated_loan_is_rejected() {
    let client = Client::new();

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .json(&json!({
            "book_id": Uuid::new_v4(),
            "email": "nobody@library.local"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_flow() {
    let client = Client::new();
    let admin_token = get_auth_token(&client, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let book_id = create_book(&client, &admin_token).await;

    let email = register_reader(&client).await;
    let token = get_auth_token(&client, &email, "secret").await;

    // Borrow
    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id, "email": email }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(loan["active"], true);
    assert_eq!(loan["book"]["status"], "UNAVAILABLE");
    let loan_id = loan["id"].as_str().expect("No loan id").to_string();

    // The same book cannot be borrowed twice
    let other = register_reader(&client).await;
    let other_token = get_auth_token(&client, &other, "secret").await;
    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&other_token)
        .json(&json!({ "book_id": book_id, "email": other }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Borrowing on someone else's behalf is forbidden
    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&other_token)
        .json(&json!({ "book_id": book_id, "email": email }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Active loans of the borrower
    let response = client
        .get(format!("{}/loans/user/{}/true", BASE_URL, email))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let loans: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(loans.as_array().map(Vec::len), Some(1));

    // Return
    let response = client
        .post(format!("{}/loans/return/{}/{}", BASE_URL, email, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Second return conflicts
    let response = client
        .post(format!("{}/loans/return/{}/{}", BASE_URL, email, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The book is available again
    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to send request");
    let book: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(book["status"], "AVAILABLE");
}

#[tokio::test]
#[ignore]
async fn test_user_with_active_loan_cannot_be_deleted() {
    let client = Client::new();
    let admin_token = get_auth_token(&client, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let book_id = create_book(&client, &admin_token).await;

    let email = register_reader(&client).await;
    let token = get_auth_token(&client, &email, "secret").await;

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id, "email": email }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .delete(format!("{}/users/{}", BASE_URL, email))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&admin_token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
