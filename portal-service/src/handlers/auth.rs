use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
            LogoutRequest, RefreshRequest, RegisterRequest, ResetPasswordRequest,
            TokenStatusResponse, VerifyEmailRequest,
        },
        MessageResponse,
    },
    middleware::AuthUser,
    models::{DeviceInfo, Role, SanitizedUser},
    services::{NewAccount, TokenPair},
    utils::ValidatedJson,
    AppState,
};

const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for this email, a password reset link has been sent";

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Role not available for self-registration", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    device: DeviceInfo,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let account = NewAccount {
        email: req.email,
        password: req.password,
        role: req
            .role
            .as_deref()
            .map(|name| Role::from_name(name).unwrap_or(Role::Unknown)),
        first_name: req.first_name,
        last_name: req.last_name,
    };

    let outcome = state.auth_service.register(account, &device).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account locked or inactive", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    device: DeviceInfo,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let outcome = state
        .auth_service
        .login(&req.email, req.password, &device)
        .await?;
    Ok(Json(outcome.into()))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh-token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = AuthResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    device: DeviceInfo,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let outcome = state
        .auth_service
        .refresh(&req.refresh_token, &device)
        .await?;
    Ok(Json(outcome.into()))
}

/// Revoke one refresh token, or every session when none is given
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    state
        .auth_service
        .logout(&principal.user_id, req.refresh_token.as_deref())
        .await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Request a password reset
#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset requested", body = MessageResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth_service.forgot_password(&req.email).await?;
    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .auth_service
        .reset_password(&req.token, req.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// Change password; every other session is signed out
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed, new tokens issued", body = TokenPair),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Current password incorrect", body = ErrorResponse),
        (status = 403, description = "Account locked", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Password",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    device: DeviceInfo,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = state
        .auth_service
        .change_password(
            &principal.user_id,
            req.current_password,
            req.new_password,
            &device,
        )
        .await?;
    Ok(Json(tokens))
}

/// Confirm an email address
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth_service.verify_email(&req.token).await?;
    Ok(Json(MessageResponse::new("Email verified")))
}

/// Current principal
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current principal", body = SanitizedUser),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<SanitizedUser>, AppError> {
    Ok(Json(state.auth_service.me(&principal.user_id).await?))
}

/// Check that the presented access token is valid
#[utoipa::path(
    get,
    path = "/api/v1/auth/verify-token",
    responses(
        (status = 200, description = "Token is valid", body = TokenStatusResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn verify_token(AuthUser(principal): AuthUser) -> Json<TokenStatusResponse> {
    Json(TokenStatusResponse {
        valid: true,
        user_id: principal.user_id,
        role: principal.role.to_string(),
    })
}
