mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use async_trait::async_trait;
use common::{access_token, refresh_token, TestApp, PASSWORD};
use portal_service::{
    federation::{FederationError, StoreName},
    models::Patient,
    repositories::{PatientRepository, RepoResult, RepositoryError, UserRepository},
    services::DeliveryKind,
};
use serde_json::json;
use std::sync::Arc;

/// Primary store that accepts the account but times out on the profile.
struct UnreachablePatients;

#[async_trait]
impl PatientRepository for UnreachablePatients {
    async fn insert(&self, _patient: &Patient) -> RepoResult<()> {
        Err(RepositoryError::Store(FederationError::Timeout(
            StoreName::Primary,
        )))
    }

    async fn find_by_id(&self, _id: &str) -> RepoResult<Option<Patient>> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> RepoResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_register_returns_tokens_and_linked_profile() {
    let app = TestApp::new();
    let body = app.register("jane@example.com").await;

    assert_eq!(body["user"]["email"], "jane@example.com");
    assert_eq!(body["user"]["role"], "patient");
    assert!(body["user"]["profileId"].is_string());
    assert_eq!(body["tokenType"], "Bearer");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["user"].get("refreshTokens").is_none());

    let delivered = app.delivery.last(DeliveryKind::EmailVerification);
    assert!(delivered.is_some(), "verification token should be handed off");
}

#[tokio::test]
async fn test_register_leaves_nothing_behind_when_profile_fails() {
    let app = TestApp::with_patients(Arc::new(UnreachablePatients));
    let account = json!({
        "email": "jane@example.com",
        "password": PASSWORD,
        "firstName": "Jane",
        "lastName": "Doe"
    });

    let (status, _) = app.post("/api/v1/auth/register", account.clone()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(app
        .users
        .find_by_email("jane@example.com")
        .await
        .unwrap()
        .is_none());
    assert!(app.delivery.last(DeliveryKind::EmailVerification).is_none());

    // The email is still free, so a retry hits the store again instead of a conflict.
    let (status, _) = app.post("/api/v1/auth/register", account).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = TestApp::new();
    app.register("jane@example.com").await;

    let (status, _) = app
        .post(
            "/api/v1/auth/register",
            json!({ "email": "Jane@Example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_privileged_role_is_forbidden() {
    let app = TestApp::new();
    let (status, _) = app
        .post(
            "/api/v1/auth/register",
            json!({ "email": "doc@example.com", "password": PASSWORD, "role": "doctor" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_rejects_weak_password_and_bad_email() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/v1/auth/register",
            json!({ "email": "jane@example.com", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");

    let (status, _) = app
        .post(
            "/api/v1/auth/register",
            json!({ "email": "not-an-email", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_me_accepts_bearer_and_cookie() {
    let app = TestApp::new();
    let body = app.register("jane@example.com").await;
    let token = access_token(&body);

    let (status, me) = app.get("/api/v1/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "jane@example.com");

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/auth/me")
        .header(header::COOKIE, format!("access_token={}", token))
        .body(Body::empty())
        .unwrap();
    let (status, me) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "jane@example.com");
}

#[tokio::test]
async fn test_protected_route_without_token_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app
        .request(Method::GET, "/api/v1/auth/me", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_refresh_token_is_not_accepted_as_access_token() {
    let app = TestApp::new();
    let body = app.register("jane@example.com").await;

    let (status, _) = app
        .get("/api/v1/auth/me", &refresh_token(&body))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_token_reports_principal() {
    let app = TestApp::new();
    let body = app.register("jane@example.com").await;

    let (status, status_body) = app
        .get("/api/v1/auth/verify-token", &access_token(&body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["valid"], true);
    assert_eq!(status_body["userId"], body["user"]["id"]);
    assert_eq!(status_body["role"], "patient");
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let app = TestApp::new();
    app.register("jane@example.com").await;

    let (known_status, known) = app
        .post(
            "/api/v1/auth/forgot-password",
            json!({ "email": "jane@example.com" }),
        )
        .await;
    let (unknown_status, unknown) = app
        .post(
            "/api/v1/auth/forgot-password",
            json!({ "email": "nobody@example.com" }),
        )
        .await;

    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(known, unknown);
    assert_eq!(
        app.delivery
            .sent()
            .iter()
            .filter(|d| d.kind == DeliveryKind::PasswordReset)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_reset_password_flow_is_single_use() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;

    app.post(
        "/api/v1/auth/forgot-password",
        json!({ "email": "jane@example.com" }),
    )
    .await;
    let reset = app
        .delivery
        .last(DeliveryKind::PasswordReset)
        .expect("reset token delivered");

    let (status, _) = app
        .post(
            "/api/v1/auth/reset-password",
            json!({ "token": reset.token, "newPassword": "NewPassword456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/v1/auth/reset-password",
            json!({ "token": reset.token, "newPassword": "OtherPassword789" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Old password is gone, sessions from before the reset are revoked.
    let (status, _) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("jane@example.com", "NewPassword456").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/v1/auth/refresh-token",
            json!({ "refreshToken": refresh_token(&registered) }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password_revokes_existing_sessions() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;

    let (status, pair) = app
        .request(
            Method::POST,
            "/api/v1/auth/change-password",
            Some(json!({ "currentPassword": PASSWORD, "newPassword": "NewPassword456" })),
            Some(&access_token(&registered)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(pair["accessToken"].is_string());

    let (status, _) = app
        .post(
            "/api/v1/auth/refresh-token",
            json!({ "refreshToken": refresh_token(&registered) }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/v1/auth/refresh-token",
            json!({ "refreshToken": pair["refreshToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_rejects_wrong_current_password() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/change-password",
            Some(json!({ "currentPassword": "WrongPassword1", "newPassword": "NewPassword456" })),
            Some(&access_token(&registered)),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_with_token_revokes_only_that_session() {
    let app = TestApp::new();
    let first = app.register("jane@example.com").await;
    let (_, second) = app.login("jane@example.com", PASSWORD).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/logout",
            Some(json!({ "refreshToken": refresh_token(&first) })),
            Some(&access_token(&first)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/v1/auth/refresh-token",
            json!({ "refreshToken": refresh_token(&first) }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/v1/auth/refresh-token",
            json!({ "refreshToken": refresh_token(&second) }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_without_body_revokes_every_session() {
    let app = TestApp::new();
    let first = app.register("jane@example.com").await;
    let (_, second) = app.login("jane@example.com", PASSWORD).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/logout",
            None,
            Some(&access_token(&first)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    for session in [&first, &second] {
        let (status, _) = app
            .post(
                "/api/v1/auth/refresh-token",
                json!({ "refreshToken": refresh_token(session) }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_verify_email_marks_account_verified() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;
    assert_eq!(registered["user"]["emailVerified"], false);

    let verification = app
        .delivery
        .last(DeliveryKind::EmailVerification)
        .expect("verification token delivered");

    let (status, _) = app
        .post(
            "/api/v1/auth/verify-email",
            json!({ "token": verification.token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = app
        .get("/api/v1/auth/me", &access_token(&registered))
        .await;
    assert_eq!(me["emailVerified"], true);

    let (status, _) = app
        .post(
            "/api/v1/auth/verify-email",
            json!({ "token": verification.token }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
