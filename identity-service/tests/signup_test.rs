mod common;

use axum::http::StatusCode;
use common::{TestApp, PASSWORD};
use identity_service::{db::CredentialStore, models::IdentityStatus};
use serde_json::json;

fn signup_body(email: &str, phone: &str, password: &str) -> serde_json::Value {
    json!({
        "fullname": "Ana Test",
        "email": email,
        "current_password": password,
        "number": phone,
        "ciudadId": "city-1",
    })
}

#[tokio::test]
async fn signup_creates_pending_identity_and_emails_a_code() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .post(
            "/auth/signup",
            signup_body("  Ana@Test.com ", "300 123-4567", PASSWORD),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "ana@test.com");
    let id = body["userId"].as_str().unwrap();
    assert_eq!(app.status_of(id).await, IdentityStatus::Pending);

    let code = app.last_email_payload("ana@test.com");
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn signup_rejects_bad_input() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .post("/auth/signup", signup_body("not-an-email", "3001234567", PASSWORD))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid email format");

    let (status, _) = app
        .post("/auth/signup", signup_body("ana@test.com", "3001234567", "short"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/auth/signup", signup_body("ana@test.com", "12", PASSWORD))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn addresses_no_mailbox_can_hold_are_a_client_error() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .post("/auth/signup", signup_body("a<b>@test.com", "3001234567", PASSWORD))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid email format");

    let (status, _) = app
        .post("/auth/password-reset/request", json!({ "email": "a<b>@test.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.email.sent().is_empty());
    assert!(app.store.find_identity_by_email("a<b>@test.com").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_email_or_phone_is_rejected() {
    let app = TestApp::spawn().await;
    app.signup("ana@test.com", "3001234567").await;

    let (status, body) = app
        .post("/auth/signup", signup_body("ANA@test.com", "3009999999", PASSWORD))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already registered");

    let (status, body) = app
        .post("/auth/signup", signup_body("other@test.com", "300 123 4567", PASSWORD))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Phone number already registered");
}

#[tokio::test]
async fn failed_code_delivery_rolls_back_the_signup() {
    let app = TestApp::spawn().await;
    app.email.set_failing(true);

    let (status, _) = app
        .post("/auth/signup", signup_body("ana@test.com", "3001234567", PASSWORD))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    app.email.set_failing(false);
    let (status, _) = app
        .post("/auth/signup", signup_body("ana@test.com", "3001234567", PASSWORD))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn verifying_the_code_activates_the_account_once() {
    let app = TestApp::spawn().await;
    let id = app.signup("ana@test.com", "3001234567").await;
    let code = app.last_email_payload("ana@test.com");

    let (status, _) = app
        .post("/auth/verify", json!({ "email": "ana@test.com", "code": "000000x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.status_of(&id).await, IdentityStatus::Pending);

    let (status, _) = app
        .post("/auth/verify", json!({ "email": "ana@test.com", "code": code }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.status_of(&id).await, IdentityStatus::Active);

    // The code is single use
    let (status, body) = app
        .post("/auth/verify", json!({ "email": "ana@test.com", "code": code }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "The code is not valid");
}

#[tokio::test]
async fn resend_replaces_the_outstanding_code() {
    let app = TestApp::spawn().await;
    let id = app.signup("ana@test.com", "3001234567").await;
    let first = app.last_email_payload("ana@test.com");

    let (status, _) = app
        .post(
            "/auth/resend-code",
            json!({ "email": "ana@test.com", "methodContact": "sms" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second = app.last_sms_payload("3001234567");

    if first != second {
        let (status, _) = app
            .post("/auth/verify", json!({ "email": "ana@test.com", "code": first }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = app
        .post("/auth/verify", json!({ "email": "ana@test.com", "code": second }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.status_of(&id).await, IdentityStatus::Active);

    let (status, _) = app
        .post("/auth/resend-code", json!({ "email": "ana@test.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_email_is_not_found() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .post("/auth/verify", json!({ "email": "ghost@test.com", "code": "123456" }))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
