use chrono::{Duration, Utc};
use std::sync::Arc;

use super::account_guard::AccountGuard;
use super::authorizer::{at_least, Authorizer};
use super::delivery::{DeliveryKind, TokenDelivery};
use super::error::ServiceError;
use super::metrics;
use super::token::{TokenPair, TokenService};
use crate::models::{
    hash_token, user::normalize_email, DeviceInfo, Patient, Role, SanitizedUser, User,
};
use crate::repositories::{PatientRepository, RepositoryError, UserRepository};
use crate::utils::{
    generate_random_token, hash_password_blocking, verify_password_blocking, Password,
    PasswordHashString,
};

const RESET_TOKEN_TTL_HOURS: i64 = 1;
const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;
const PATIENT_NUMBER_ATTEMPTS: usize = 5;

/// Well-formed argon2id hash of nothing in particular. Unknown emails are
/// verified against it so both branches of a login cost the same.
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: SanitizedUser,
    pub tokens: TokenPair,
}

/// Account flows: registration, login, password management and sessions.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    patients: Arc<dyn PatientRepository>,
    tokens: Arc<TokenService>,
    guard: Arc<AccountGuard>,
    authorizer: Authorizer,
    delivery: Arc<dyn TokenDelivery>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        patients: Arc<dyn PatientRepository>,
        tokens: Arc<TokenService>,
        guard: Arc<AccountGuard>,
        authorizer: Authorizer,
        delivery: Arc<dyn TokenDelivery>,
    ) -> Self {
        Self {
            users,
            patients,
            tokens,
            guard,
            authorizer,
            delivery,
        }
    }

    pub async fn register(
        &self,
        account: NewAccount,
        device: &DeviceInfo,
    ) -> Result<AuthOutcome, ServiceError> {
        let tier = self.authorizer.self_service_tier();
        let role = account.role.unwrap_or(tier);
        if role == Role::Unknown {
            return Err(ServiceError::Validation("Unknown role".into()));
        }
        if !at_least(tier, role) {
            return Err(ServiceError::Forbidden(format!(
                "Self-registration is limited to the {} role",
                tier
            )));
        }

        let email = normalize_email(&account.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password_blocking(Password::new(account.password)).await?;
        let mut user = User::new(&email, password_hash.into_string(), role);

        match self.users.insert(&user).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate) => return Err(ServiceError::EmailAlreadyRegistered),
            Err(e) => return Err(e.into()),
        }

        let names = (role == Role::Patient).then(|| {
            let first_name = account
                .first_name
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            (first_name, account.last_name.unwrap_or_default())
        });

        // Everything after the insert is undone on failure so the email can
        // be registered again.
        let tokens = match self.finish_registration(&mut user, names, device).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Registration failed, rolling back");
                self.roll_back_registration(&user).await;
                return Err(e);
            }
        };

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");

        Ok(AuthOutcome {
            user: user.sanitized(),
            tokens,
        })
    }

    async fn finish_registration(
        &self,
        user: &mut User,
        patient_names: Option<(String, String)>,
        device: &DeviceInfo,
    ) -> Result<TokenPair, ServiceError> {
        if let Some((first_name, last_name)) = patient_names {
            let patient = self
                .create_patient_profile(first_name, last_name, &user.id)
                .await?;
            user.profile_id = Some(patient.id.clone());
            self.users.link_profile(&user.id, &patient.id).await?;
        }

        self.send_verification(user).await?;
        self.tokens.issue_pair(user, device).await
    }

    async fn roll_back_registration(&self, user: &User) {
        if let Some(profile_id) = &user.profile_id {
            if let Err(e) = self.patients.delete(profile_id).await {
                tracing::error!(user_id = %user.id, error = %e, "Failed to remove patient profile");
            }
        }
        if let Err(e) = self.users.delete(&user.id).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to remove partially registered user");
        }
    }

    /// Insert a patient profile, drawing a new patient number on collision.
    async fn create_patient_profile(
        &self,
        first_name: String,
        last_name: String,
        user_id: &str,
    ) -> Result<Patient, ServiceError> {
        for attempt in 1..=PATIENT_NUMBER_ATTEMPTS {
            let patient = Patient::new(
                first_name.clone(),
                last_name.clone(),
                Some(user_id.to_string()),
            );
            match self.patients.insert(&patient).await {
                Ok(()) => return Ok(patient),
                Err(RepositoryError::Duplicate) => {
                    tracing::warn!(attempt, "Patient number collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Database(
            "could not allocate a unique patient number".into(),
        ))
    }

    async fn send_verification(&self, user: &User) -> Result<(), ServiceError> {
        let token = generate_random_token();
        let expires_at = Utc::now() + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS);
        self.users
            .set_verification_token(&user.id, &hash_token(&token), expires_at)
            .await?;

        if let Err(e) = self
            .delivery
            .deliver(DeliveryKind::EmailVerification, &user.id, &user.email, &token)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "Verification token delivery failed");
        }
        Ok(())
    }

    /// Password login.
    ///
    /// A locked account is rejected before the password is looked at, so
    /// the response does not depend on whether the password was right.
    pub async fn login(
        &self,
        email: &str,
        password: String,
        device: &DeviceInfo,
    ) -> Result<AuthOutcome, ServiceError> {
        let email = normalize_email(email);
        let password = Password::new(password);

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                let _ = verify_password_blocking(
                    password,
                    PasswordHashString::new(DUMMY_PASSWORD_HASH.to_string()),
                )
                .await;
                metrics::record_login("unknown");
                return Err(ServiceError::InvalidCredentials);
            }
        };

        let now = Utc::now();
        if self.guard.is_locked(&user, now) {
            tracing::warn!(user_id = %user.id, "Login attempt on locked account");
            metrics::record_login("locked");
            return Err(ServiceError::AccountLocked);
        }

        let matches = verify_password_blocking(
            password,
            PasswordHashString::new(user.password_hash.clone()),
        )
        .await?;

        if !matches {
            self.guard.record_failure(&user.id, now).await?;
            metrics::record_login("failure");
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.active {
            metrics::record_login("inactive");
            return Err(ServiceError::AccountInactive);
        }

        self.guard.record_success(&user.id, now).await?;
        let tokens = self.tokens.issue_pair(&user, device).await?;

        metrics::record_login("success");
        tracing::info!(user_id = %user.id, "User logged in");

        let user = self.users.find_by_id(&user.id).await?.unwrap_or(user);
        Ok(AuthOutcome {
            user: user.sanitized(),
            tokens,
        })
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: &DeviceInfo,
    ) -> Result<AuthOutcome, ServiceError> {
        let (user, tokens) = self.tokens.rotate(refresh_token, device).await?;
        Ok(AuthOutcome {
            user: user.sanitized(),
            tokens,
        })
    }

    /// Without a token every session of the principal is revoked.
    pub async fn logout(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), ServiceError> {
        match refresh_token {
            Some(token) => self.tokens.revoke(user_id, token).await?,
            None => self.tokens.revoke_all(user_id).await?,
        }
        tracing::info!(user_id = %user_id, all_sessions = refresh_token.is_none(), "User logged out");
        Ok(())
    }

    /// Always succeeds once the lookup has run; the caller cannot tell
    /// whether the email exists.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        let user = match self.users.find_by_email(&email).await? {
            Some(user) if user.active => user,
            _ => {
                tracing::debug!("Password reset requested for unknown or inactive account");
                return Ok(());
            }
        };

        let token = generate_random_token();
        let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

        if let Err(e) = self
            .users
            .set_reset_token(&user.id, &hash_token(&token), expires_at)
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to store reset token");
            return Ok(());
        }

        if let Err(e) = self
            .delivery
            .deliver(DeliveryKind::PasswordReset, &user.id, &user.email, &token)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "Reset token delivery failed");
        }

        tracing::info!(user_id = %user.id, "Password reset issued");
        Ok(())
    }

    /// Consumes the reset token, installs the new password and drops every
    /// refresh token in one update.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: String,
    ) -> Result<(), ServiceError> {
        let token_hash = hash_token(token);
        if self
            .users
            .reset_token_owner(&token_hash, Utc::now())
            .await?
            .is_none()
        {
            return Err(ServiceError::InvalidResetToken);
        }

        let password_hash = hash_password_blocking(Password::new(new_password)).await?;
        let user_id = self
            .users
            .consume_reset_token(&token_hash, password_hash.as_str(), Utc::now())
            .await?
            .ok_or(ServiceError::InvalidResetToken)?;

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }

    /// Revokes all refresh tokens and returns a fresh pair for the caller.
    ///
    /// The current password is checked under the same lockout rules as
    /// login: a locked account is refused whatever was submitted, and a
    /// wrong password counts as a failed attempt.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: String,
        new_password: String,
        device: &DeviceInfo,
    ) -> Result<TokenPair, ServiceError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let now = Utc::now();
        if self.guard.is_locked(&user, now) {
            tracing::warn!(user_id = %user.id, "Password change attempted on locked account");
            return Err(ServiceError::AccountLocked);
        }

        let matches = verify_password_blocking(
            Password::new(current_password.clone()),
            PasswordHashString::new(user.password_hash.clone()),
        )
        .await?;
        if !matches {
            self.guard.record_failure(&user.id, now).await?;
            return Err(ServiceError::InvalidCredentials);
        }
        self.guard.record_success(&user.id, now).await?;

        if current_password == new_password {
            return Err(ServiceError::Validation(
                "New password must differ from the current password".into(),
            ));
        }

        let password_hash = hash_password_blocking(Password::new(new_password)).await?;
        self.users
            .set_password(&user.id, password_hash.as_str(), now)
            .await?;

        tracing::info!(user_id = %user.id, "Password changed, sessions revoked");
        self.tokens.issue_pair(&user, device).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), ServiceError> {
        let user_id = self
            .users
            .consume_verification_token(&hash_token(token), Utc::now())
            .await?
            .ok_or(ServiceError::InvalidVerificationToken)?;

        tracing::info!(user_id = %user_id, "Email verified");
        Ok(())
    }

    pub async fn me(&self, user_id: &str) -> Result<SanitizedUser, ServiceError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(|u| u.sanitized())
            .ok_or(ServiceError::InvalidToken)
    }
}
