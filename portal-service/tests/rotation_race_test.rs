mod common;

use axum::http::StatusCode;
use common::{refresh_token, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_rotation_invalidates_the_presented_token() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;
    let original = refresh_token(&registered);

    let (status, rotated) = app
        .post("/api/v1/auth/refresh-token", json!({ "refreshToken": original }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(refresh_token(&rotated), original);

    let (status, _) = app
        .post("/api/v1/auth/refresh-token", json!({ "refreshToken": original }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/v1/auth/refresh-token",
            json!({ "refreshToken": refresh_token(&rotated) }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_refresh_has_exactly_one_winner() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;
    let token = refresh_token(&registered);

    let (first, second) = tokio::join!(
        app.post("/api/v1/auth/refresh-token", json!({ "refreshToken": token })),
        app.post("/api/v1/auth/refresh-token", json!({ "refreshToken": token })),
    );

    let mut statuses = vec![first.0, second.0];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::UNAUTHORIZED]);
}

#[tokio::test]
async fn test_access_token_cannot_be_used_to_refresh() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;

    let (status, _) = app
        .post(
            "/api/v1/auth/refresh-token",
            json!({ "refreshToken": registered["accessToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
