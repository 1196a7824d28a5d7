use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::models::Principal;
use crate::services::ServiceError;
use crate::AppState;

/// Cookie consulted when no `Authorization` header is present.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(ACCESS_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Verifies the access token, loads the principal and attaches it to the
/// request. Role and profile link come from the stored principal, not from
/// the token, so changes apply before the token expires.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing access token")))?;

    let claims = state
        .tokens
        .jwt()
        .verify_access(&token)
        .map_err(ServiceError::from)?;

    let user = state
        .repositories
        .users
        .find_by_id(&claims.sub)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::InvalidToken)?;

    if !user.active {
        tracing::warn!(user_id = %user.id, "Access token presented for inactive principal");
        return Err(ServiceError::InvalidToken.into());
    }

    req.extensions_mut().insert(Principal::from(&user));

    Ok(next.run(req).await)
}

/// The authenticated principal. Only available behind [`auth_middleware`].
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Authentication required")))
    }
}
