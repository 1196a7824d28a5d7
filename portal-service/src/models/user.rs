//! Principal records and their lockout state.

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::refresh_token::RefreshTokenRecord;
use super::role::Role;

/// Principal document in the primary store's `users` collection.
///
/// Credentials, lockout counters and the refresh-token list live in the same
/// document so each per-principal mutation is a single-document update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub profile_id: Option<String>,

    #[serde(default)]
    pub failed_login_attempts: i32,
    #[serde(default)]
    pub lock_until: Option<BsonDateTime>,
    #[serde(default)]
    pub last_login_at: Option<BsonDateTime>,

    #[serde(default)]
    pub reset_token_hash: Option<String>,
    #[serde(default)]
    pub reset_token_expires_at: Option<BsonDateTime>,
    #[serde(default)]
    pub verification_token_hash: Option<String>,
    #[serde(default)]
    pub verification_token_expires_at: Option<BsonDateTime>,

    #[serde(default)]
    pub refresh_tokens: Vec<RefreshTokenRecord>,

    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl User {
    pub fn new(email: &str, password_hash: String, role: Role) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(email),
            password_hash,
            role,
            active: true,
            email_verified: false,
            mfa_enabled: false,
            profile_id: None,
            failed_login_attempts: 0,
            lock_until: None,
            last_login_at: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            verification_token_hash: None,
            verification_token_expires_at: None,
            refresh_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn lockout(&self) -> LockoutState {
        LockoutState {
            failed_attempts: self.failed_login_attempts,
            locked_until: self.lock_until.map(|d| d.to_chrono()),
        }
    }

    pub fn has_refresh_token(&self, token_hash: &str, now: DateTime<Utc>) -> bool {
        self.refresh_tokens
            .iter()
            .any(|r| r.token_hash == token_hash && !r.is_expired_at(now))
    }

    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser::from(self)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Outward view of a principal. Credential material never appears here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedUser {
    pub id: String,
    pub email: String,
    #[schema(value_type = String, example = "patient")]
    pub role: Role,
    pub active: bool,
    pub email_verified: bool,
    pub mfa_enabled: bool,
    pub profile_id: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for SanitizedUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            role: u.role,
            active: u.active,
            email_verified: u.email_verified,
            mfa_enabled: u.mfa_enabled,
            profile_id: u.profile_id.clone(),
            last_login_at: u.last_login_at.map(|d| d.to_chrono()),
            created_at: u.created_at.to_chrono(),
        }
    }
}

/// Lockout thresholds.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub threshold: i32,
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration: Duration::hours(2),
        }
    }
}

/// Where an account sits in the Clear / Warned / Locked machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Clear,
    Warned(i32),
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutState {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until <= now)
    }

    /// State after one more failed attempt.
    ///
    /// An elapsed lock restarts counting from 1. A new lock is only set when
    /// the threshold is reached and no lock is currently active.
    pub fn after_failure(&self, policy: &LockoutPolicy, now: DateTime<Utc>) -> LockoutState {
        let (attempts, locked_until) = if self.lock_expired(now) {
            (1, None)
        } else {
            (self.failed_attempts + 1, self.locked_until)
        };

        let locked_until = if attempts >= policy.threshold && !self.is_locked(now) {
            Some(now + policy.duration)
        } else {
            locked_until
        };

        LockoutState {
            failed_attempts: attempts,
            locked_until,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> LockStatus {
        if self.is_locked(now) {
            LockStatus::Locked
        } else if self.lock_expired(now) || self.failed_attempts == 0 {
            LockStatus::Clear
        } else {
            LockStatus::Warned(self.failed_attempts)
        }
    }
}
