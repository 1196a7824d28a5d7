use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Role;

/// Signed `kind` claim. Checked on every verification in addition to which
/// key validated the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Union of both claim sets, used before the kind is known.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    kind: TokenKind,
    exp: i64,
    iat: i64,
    jti: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifiedToken {
    Access(AccessTokenClaims),
    Refresh(RefreshTokenClaims),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,
    #[error("Token expired")]
    Expired,
    #[error("Wrong token type")]
    WrongKind,
}

/// A freshly signed token and its identifiers.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// HS256 signing with one key per token kind.
#[derive(Clone)]
pub struct JwtService {
    access: std::sync::Arc<KeyPair>,
    refresh: std::sync::Arc<KeyPair>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid JWT configuration: {}", e))?;

        tracing::info!("JWT service initialized with HS256 keys");

        Ok(Self {
            access: std::sync::Arc::new(KeyPair::from_secret(&config.access_secret)),
            refresh: std::sync::Arc::new(KeyPair::from_secret(&config.refresh_secret)),
            access_ttl: Duration::minutes(config.access_token_expiry_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expiry_days),
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn generate_access_token(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
    ) -> Result<SignedToken, anyhow::Error> {
        let now = Utc::now();
        let exp = now + self.access_ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            kind: TokenKind::Access,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access.encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        Ok(SignedToken {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
        })
    }

    pub fn generate_refresh_token(&self, user_id: &str) -> Result<SignedToken, anyhow::Error> {
        let now = Utc::now();
        let exp = now + self.refresh_ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            kind: TokenKind::Refresh,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh.encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))?;

        Ok(SignedToken {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
        })
    }

    fn validation(check_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = check_exp;
        validation
    }

    /// Stateless verification against the key for `expected`.
    ///
    /// A token that only verifies under the other kind's key, or whose signed
    /// `kind` claim disagrees with `expected`, fails with
    /// [`TokenError::WrongKind`].
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<VerifiedToken, TokenError> {
        let raw = match decode::<RawClaims>(
            token,
            &self.keys(expected).decoding,
            &Self::validation(true),
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                return Err(match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature if self.signed_as_other(token, expected) => {
                        TokenError::WrongKind
                    }
                    _ => TokenError::Invalid,
                })
            }
        };

        match (expected, raw.kind) {
            (TokenKind::Access, TokenKind::Access) => match (raw.email, raw.role) {
                (Some(email), Some(role)) => Ok(VerifiedToken::Access(AccessTokenClaims {
                    sub: raw.sub,
                    email,
                    role,
                    kind: TokenKind::Access,
                    exp: raw.exp,
                    iat: raw.iat,
                    jti: raw.jti,
                })),
                _ => Err(TokenError::Invalid),
            },
            (TokenKind::Refresh, TokenKind::Refresh) => {
                Ok(VerifiedToken::Refresh(RefreshTokenClaims {
                    sub: raw.sub,
                    kind: TokenKind::Refresh,
                    exp: raw.exp,
                    iat: raw.iat,
                    jti: raw.jti,
                }))
            }
            (TokenKind::Access, TokenKind::Refresh) | (TokenKind::Refresh, TokenKind::Access) => {
                Err(TokenError::WrongKind)
            }
        }
    }

    fn signed_as_other(&self, token: &str, expected: TokenKind) -> bool {
        let other = match expected {
            TokenKind::Access => TokenKind::Refresh,
            TokenKind::Refresh => TokenKind::Access,
        };
        decode::<RawClaims>(token, &self.keys(other).decoding, &Self::validation(false)).is_ok()
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        match self.verify(token, TokenKind::Access)? {
            VerifiedToken::Access(claims) => Ok(claims),
            VerifiedToken::Refresh(_) => Err(TokenError::WrongKind),
        }
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        match self.verify(token, TokenKind::Refresh)? {
            VerifiedToken::Refresh(claims) => Ok(claims),
            VerifiedToken::Access(_) => Err(TokenError::WrongKind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-access-secret-access-secret".into(),
            refresh_secret: "refresh-secret-refresh-secret-refresh-secret".into(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }

    fn service() -> JwtService {
        JwtService::new(&config()).unwrap()
    }

    #[test]
    fn test_access_token_round_trip() {
        let jwt = service();
        let signed = jwt
            .generate_access_token("user-1", "a@example.com", Role::Doctor)
            .unwrap();

        let claims = jwt.verify_access(&signed.token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.jti, signed.jti);
    }

    #[test]
    fn test_refresh_token_is_rejected_as_access() {
        let jwt = service();
        let refresh = jwt.generate_refresh_token("user-1").unwrap();

        assert_eq!(jwt.verify_access(&refresh.token), Err(TokenError::WrongKind));
        assert!(jwt.verify_refresh(&refresh.token).is_ok());
    }

    #[test]
    fn test_access_token_is_rejected_as_refresh() {
        let jwt = service();
        let access = jwt
            .generate_access_token("user-1", "a@example.com", Role::Patient)
            .unwrap();

        assert_eq!(jwt.verify_refresh(&access.token), Err(TokenError::WrongKind));
    }

    #[test]
    fn test_kind_claim_is_checked_even_with_matching_key() {
        // A refresh-kind payload signed with the access key must still fail.
        let jwt = service();
        let claims = RefreshTokenClaims {
            sub: "user-1".into(),
            kind: TokenKind::Refresh,
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            jti: "x".into(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &jwt.access.encoding).unwrap();

        assert_eq!(jwt.verify_access(&token), Err(TokenError::WrongKind));
    }

    #[test]
    fn test_expired_token() {
        let jwt = service();
        let claims = AccessTokenClaims {
            sub: "user-1".into(),
            email: "a@example.com".into(),
            role: Role::Patient,
            kind: TokenKind::Access,
            exp: (Utc::now() - Duration::seconds(5)).timestamp(),
            iat: (Utc::now() - Duration::minutes(20)).timestamp(),
            jti: "x".into(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &jwt.access.encoding).unwrap();

        assert_eq!(jwt.verify_access(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_garbage_and_foreign_tokens_are_invalid() {
        let jwt = service();
        assert_eq!(jwt.verify_access("not-a-jwt"), Err(TokenError::Invalid));

        let mut other = config();
        other.access_secret = "some-other-access-secret-some-other".into();
        other.refresh_secret = "some-other-refresh-secret-some-other".into();
        let foreign = JwtService::new(&other)
            .unwrap()
            .generate_access_token("user-1", "a@example.com", Role::Admin)
            .unwrap();
        assert_eq!(jwt.verify_access(&foreign.token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_tokens_issued_together_are_distinct() {
        let jwt = service();
        let a = jwt.generate_refresh_token("user-1").unwrap();
        let b = jwt.generate_refresh_token("user-1").unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_rejects_shared_secret() {
        let mut cfg = config();
        cfg.refresh_secret = cfg.access_secret.clone();
        assert!(JwtService::new(&cfg).is_err());
    }
}
