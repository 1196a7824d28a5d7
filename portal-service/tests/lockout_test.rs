mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{access_token, TestApp, PASSWORD};
use mongodb::bson::DateTime as BsonDateTime;
use portal_service::repositories::UserRepository;

#[tokio::test]
async fn test_five_failures_lock_even_the_correct_password() {
    let app = TestApp::new();
    app.register("jane@example.com").await;

    for _ in 0..5 {
        let (status, _) = app.login("jane@example.com", "WrongPassword1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let user = app
        .users
        .find_by_email("jane@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(user.lock_until.is_some());
}

#[tokio::test]
async fn test_elapsed_lock_allows_login_and_resets_counter() {
    let app = TestApp::new();
    app.register("jane@example.com").await;

    for _ in 0..5 {
        app.login("jane@example.com", "WrongPassword1").await;
    }

    let user = app
        .users
        .find_by_email("jane@example.com")
        .await
        .unwrap()
        .unwrap();
    let past = BsonDateTime::from_chrono(Utc::now() - Duration::minutes(1));
    assert!(app.users.update_user(&user.id, |u| u.lock_until = Some(past)));

    let (status, _) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    let user = app.users.find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.lock_until.is_none());
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_look_the_same() {
    let app = TestApp::new();
    app.register("jane@example.com").await;

    let (wrong_status, wrong) = app.login("jane@example.com", "WrongPassword1").await;
    let (unknown_status, unknown) = app.login("nobody@example.com", "WrongPassword1").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);
}

#[tokio::test]
async fn test_inactive_account_is_refused_after_password_check() {
    let app = TestApp::new();
    let body = app.register("jane@example.com").await;
    let user_id = body["user"]["id"].as_str().unwrap().to_string();
    app.users.update_user(&user_id, |u| u.active = false);

    let (status, _) = app.login("jane@example.com", "WrongPassword1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Existing access tokens stop working too.
    let (status, _) = app
        .get("/api/v1/auth/me", body["accessToken"].as_str().unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_locked_account_answers_the_same_for_any_password() {
    let app = TestApp::new();
    app.register("jane@example.com").await;

    for _ in 0..5 {
        app.login("jane@example.com", "WrongPassword1").await;
    }

    let (wrong_status, wrong) = app.login("jane@example.com", "WrongPassword1").await;
    let (right_status, right) = app.login("jane@example.com", PASSWORD).await;

    assert_eq!(wrong_status, StatusCode::FORBIDDEN);
    assert_eq!(right_status, StatusCode::FORBIDDEN);
    assert_eq!(wrong, right);
}

#[tokio::test]
async fn test_change_password_is_refused_while_locked() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;
    let token = access_token(&registered);

    for _ in 0..5 {
        app.login("jane@example.com", "WrongPassword1").await;
    }
    let before = app
        .users
        .find_by_email("jane@example.com")
        .await
        .unwrap()
        .unwrap();

    let (wrong_status, wrong) = app
        .change_password(&token, "WrongPassword1", "NewPassword456")
        .await;
    let (right_status, right) = app
        .change_password(&token, PASSWORD, "NewPassword456")
        .await;

    assert_eq!(wrong_status, StatusCode::FORBIDDEN);
    assert_eq!(right_status, StatusCode::FORBIDDEN);
    assert_eq!(wrong, right);

    let after = app.users.find_by_id(&before.id).await.unwrap().unwrap();
    assert_eq!(after.password_hash, before.password_hash);
}

#[tokio::test]
async fn test_wrong_current_passwords_lock_the_account() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;
    let token = access_token(&registered);

    for _ in 0..5 {
        let (status, _) = app
            .change_password(&token, "WrongPassword1", "NewPassword456")
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .change_password(&token, PASSWORD, "NewPassword456")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_successful_change_password_clears_failures() {
    let app = TestApp::new();
    let registered = app.register("jane@example.com").await;
    let token = access_token(&registered);

    for _ in 0..4 {
        app.change_password(&token, "WrongPassword1", "NewPassword456")
            .await;
    }
    let (status, _) = app
        .change_password(&token, PASSWORD, "NewPassword456")
        .await;
    assert_eq!(status, StatusCode::OK);

    let user = app
        .users
        .find_by_email("jane@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.failed_login_attempts, 0);
}
