use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::error::ServiceError;
use super::jwt::{JwtService, TokenError, TokenKind, VerifiedToken};
use super::metrics;
use crate::models::{hash_token, DeviceInfo, RefreshTokenRecord, User};
use crate::repositories::UserRepository;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Token lifecycle: issuing pairs, rotation and revocation of refresh tokens.
///
/// Verification is delegated to [`JwtService`] and does no I/O. Everything
/// stateful goes through the principal's embedded refresh-token list.
pub struct TokenService {
    jwt: JwtService,
    users: Arc<dyn UserRepository>,
    max_refresh_tokens: usize,
}

impl TokenService {
    pub fn new(jwt: JwtService, users: Arc<dyn UserRepository>, max_refresh_tokens: usize) -> Self {
        Self {
            jwt,
            users,
            max_refresh_tokens: max_refresh_tokens.max(1),
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<VerifiedToken, TokenError> {
        self.jwt.verify(token, expected)
    }

    fn sign_pair(
        &self,
        user: &User,
        device: &DeviceInfo,
    ) -> Result<(TokenPair, RefreshTokenRecord), ServiceError> {
        let access = self
            .jwt
            .generate_access_token(&user.id, &user.email, user.role)?;
        let refresh = self.jwt.generate_refresh_token(&user.id)?;

        let record = RefreshTokenRecord::new(
            &refresh.token,
            refresh.jti.clone(),
            refresh.issued_at,
            self.jwt.refresh_ttl(),
            device,
        );

        let pair = TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_ttl().num_seconds(),
            refresh_expires_at: refresh.expires_at,
        };

        Ok((pair, record))
    }

    /// Sign a new pair and append its refresh record to the principal.
    pub async fn issue_pair(
        &self,
        user: &User,
        device: &DeviceInfo,
    ) -> Result<TokenPair, ServiceError> {
        let (pair, record) = self.sign_pair(user, device)?;
        let stored = self
            .users
            .push_refresh_token(&user.id, record, self.max_refresh_tokens, Utc::now())
            .await?;

        if !stored {
            tracing::warn!(user_id = %user.id, "Principal disappeared while issuing tokens");
            return Err(ServiceError::InvalidToken);
        }

        Ok(pair)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The old record is removed and the new one appended in one conditional
    /// update that requires the old record to still be present. Of two
    /// concurrent rotations of the same token only one can match.
    pub async fn rotate(
        &self,
        old_refresh_token: &str,
        device: &DeviceInfo,
    ) -> Result<(User, TokenPair), ServiceError> {
        let claims = self.jwt.verify_refresh(old_refresh_token).map_err(|e| {
            metrics::record_rotation("rejected");
            ServiceError::from(e)
        })?;

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if !user.active {
            tracing::warn!(user_id = %user.id, "Refresh attempted for inactive principal");
            metrics::record_rotation("rejected");
            return Err(ServiceError::InvalidToken);
        }

        let now = Utc::now();
        let old_hash = hash_token(old_refresh_token);
        if !user.has_refresh_token(&old_hash, now) {
            tracing::warn!(user_id = %user.id, jti = %claims.jti, "Refresh token not on record");
            metrics::record_rotation("rejected");
            return Err(ServiceError::InvalidToken);
        }

        let (pair, record) = self.sign_pair(&user, device)?;
        let swapped = self
            .users
            .swap_refresh_token(&user.id, &old_hash, record, self.max_refresh_tokens, now)
            .await?;

        if !swapped {
            tracing::warn!(user_id = %user.id, jti = %claims.jti, "Lost refresh rotation race");
            metrics::record_rotation("conflict");
            return Err(ServiceError::InvalidToken);
        }

        metrics::record_rotation("rotated");
        tracing::info!(user_id = %user.id, "Refresh token rotated");
        Ok((user, pair))
    }

    /// Drop one refresh token. Unknown tokens are ignored.
    pub async fn revoke(&self, user_id: &str, refresh_token: &str) -> Result<(), ServiceError> {
        self.users
            .remove_refresh_token(user_id, &hash_token(refresh_token))
            .await?;
        Ok(())
    }

    pub async fn revoke_all(&self, user_id: &str) -> Result<(), ServiceError> {
        self.users.clear_refresh_tokens(user_id).await?;
        tracing::info!(user_id = %user_id, "All refresh tokens revoked");
        Ok(())
    }
}
