mod common;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
};
use common::{access_token, test_config, TestApp};
use portal_service::config::PortalConfig;
use serde_json::json;
use std::net::SocketAddr;

fn config_with_password_limit(attempts: u32) -> PortalConfig {
    let mut config = test_config();
    config.rate_limit.password_reset_attempts = attempts;
    config.rate_limit.password_reset_window_seconds = 3600;
    config
}

fn login_from(forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .extension(ConnectInfo(SocketAddr::from(([203, 0, 113, 7], 40000))))
        .body(Body::from(
            json!({ "email": "nobody@example.com", "password": "WrongPassword1" }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_change_password_is_rate_limited() {
    let app = TestApp::with_config(config_with_password_limit(2));
    let registered = app.register("jane@example.com").await;
    let token = access_token(&registered);

    for _ in 0..2 {
        let (status, _) = app
            .change_password(&token, "WrongPassword1", "NewPassword456")
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = app
        .change_password(&token, "WrongPassword1", "NewPassword456")
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_reset_password_is_rate_limited() {
    let app = TestApp::with_config(config_with_password_limit(2));
    let guess = json!({ "token": "guessed-token", "newPassword": "NewPassword456" });

    for _ in 0..2 {
        let (status, _) = app
            .post("/api/v1/auth/reset-password", guess.clone())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = app.post("/api/v1/auth/reset-password", guess).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_password_endpoints_share_one_budget() {
    let app = TestApp::with_config(config_with_password_limit(2));

    let (status, _) = app
        .post(
            "/api/v1/auth/forgot-password",
            json!({ "email": "jane@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let guess = json!({ "token": "guessed-token", "newPassword": "NewPassword456" });
    let (status, _) = app
        .post("/api/v1/auth/reset-password", guess.clone())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/api/v1/auth/reset-password", guess).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rotating_forwarded_header_does_not_reset_login_budget() {
    let mut config = test_config();
    config.rate_limit.login_attempts = 2;
    config.rate_limit.login_window_seconds = 3600;
    let app = TestApp::with_config(config);

    for client in ["198.51.100.1", "198.51.100.2"] {
        let (status, _) = app.send(login_from(client)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = app.send(login_from("198.51.100.3")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_trusted_proxy_limits_each_forwarded_client() {
    let mut config = test_config();
    config.common.trust_forwarded_for = true;
    config.rate_limit.login_attempts = 1;
    config.rate_limit.login_window_seconds = 3600;
    let app = TestApp::with_config(config);

    let (status, _) = app.send(login_from("198.51.100.1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send(login_from("198.51.100.2")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(login_from("198.51.100.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
