use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::error::ServiceError;
use super::metrics;
use crate::models::{LockStatus, LockoutPolicy, LockoutState, User};
use crate::repositories::UserRepository;

/// Failed-attempt accounting and lockout windows.
///
/// Counter updates are applied by the repository in one atomic store update;
/// this type only decides what to do with the result.
pub struct AccountGuard {
    users: Arc<dyn UserRepository>,
    policy: LockoutPolicy,
}

impl AccountGuard {
    pub fn new(users: Arc<dyn UserRepository>, policy: LockoutPolicy) -> Self {
        Self { users, policy }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn is_locked(&self, user: &User, now: DateTime<Utc>) -> bool {
        user.lockout().is_locked(now)
    }

    pub fn status(&self, user: &User, now: DateTime<Utc>) -> LockStatus {
        user.lockout().status(now)
    }

    pub async fn record_failure(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LockoutState, ServiceError> {
        let state = self
            .users
            .record_login_failure(user_id, &self.policy, now)
            .await?
            .unwrap_or_default();

        match state.status(now) {
            LockStatus::Locked if state.failed_attempts == self.policy.threshold => {
                metrics::record_lockout();
                tracing::warn!(
                    user_id = %user_id,
                    failed_attempts = state.failed_attempts,
                    "Account locked after repeated failed logins"
                );
            }
            LockStatus::Warned(n) => {
                tracing::info!(user_id = %user_id, failed_attempts = n, "Failed login recorded");
            }
            _ => {}
        }

        Ok(state)
    }

    pub async fn record_success(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), ServiceError> {
        self.users.record_login_success(user_id, now).await?;
        Ok(())
    }
}
