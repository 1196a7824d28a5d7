use chrono::{DateTime, Duration, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a session was opened from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// One outstanding refresh token, embedded in the owning user document.
///
/// Only the SHA-256 digest of the token is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub jti: String,
    pub created_at: BsonDateTime,
    pub expires_at: BsonDateTime,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl RefreshTokenRecord {
    pub fn new(
        token: &str,
        jti: String,
        now: DateTime<Utc>,
        ttl: Duration,
        device: &DeviceInfo,
    ) -> Self {
        Self {
            token_hash: hash_token(token),
            jti,
            created_at: BsonDateTime::from_chrono(now),
            expires_at: BsonDateTime::from_chrono(now + ttl),
            user_agent: device.user_agent.clone(),
            ip_address: device.ip_address.clone(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.to_chrono() <= now
    }
}

/// SHA-256 hex digest used for every stored single-use or bearer secret.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Keep live records only, append `new`, then retain the newest `cap`.
///
/// Records are kept in insertion order, so truncating from the front evicts
/// the oldest sessions.
pub fn retain_bounded(
    records: &mut Vec<RefreshTokenRecord>,
    new: RefreshTokenRecord,
    cap: usize,
    now: DateTime<Utc>,
) {
    records.retain(|r| !r.is_expired_at(now));
    records.push(new);
    if records.len() > cap {
        let excess = records.len() - cap;
        records.drain(..excess);
    }
}
