//! Hand-off point for one-time tokens that must reach the user out of band.
//!
//! Actual email/SMS transport lives outside this service.

use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    PasswordReset,
    EmailVerification,
}

impl DeliveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryKind::PasswordReset => "password_reset",
            DeliveryKind::EmailVerification => "email_verification",
        }
    }
}

#[async_trait]
pub trait TokenDelivery: Send + Sync {
    async fn deliver(
        &self,
        kind: DeliveryKind,
        user_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), anyhow::Error>;
}

/// Records that a token is ready without exposing it.
pub struct LogDelivery;

#[async_trait]
impl TokenDelivery for LogDelivery {
    async fn deliver(
        &self,
        kind: DeliveryKind,
        user_id: &str,
        _email: &str,
        _token: &str,
    ) -> Result<(), anyhow::Error> {
        tracing::info!(kind = kind.as_str(), user_id = %user_id, "One-time token queued for delivery");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredToken {
    pub kind: DeliveryKind,
    pub user_id: String,
    pub email: String,
    pub token: String,
}

/// Keeps every delivered token in memory so callers can read it back.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<DeliveredToken>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<DeliveredToken> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last(&self, kind: DeliveryKind) -> Option<DeliveredToken> {
        self.sent()
            .into_iter()
            .rev()
            .find(|d| d.kind == kind)
    }
}

#[async_trait]
impl TokenDelivery for RecordingDelivery {
    async fn deliver(
        &self,
        kind: DeliveryKind,
        user_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(DeliveredToken {
                kind,
                user_id: user_id.to_string(),
                email: email.to_string(),
                token: token.to_string(),
            });
        Ok(())
    }
}
