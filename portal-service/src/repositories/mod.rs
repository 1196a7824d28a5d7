//! Store access behind traits.
//!
//! MongoDB implementations resolve their handles through the
//! [`ConnectionFederator`](crate::federation::ConnectionFederator) on every
//! call. In-memory implementations back the test suite.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::federation::FederationError;
use crate::models::{
    Appointment, Doctor, Invoice, LockoutPolicy, LockoutState, Patient, RefreshTokenRecord, User,
};

pub use memory::{
    MemoryAppointmentRepository, MemoryBillingRepository, MemoryPatientRepository,
    MemoryStaffRepository, MemoryUserRepository,
};
pub use mongo::{
    ensure_indexes, MongoAppointmentRepository, MongoBillingRepository, MongoPatientRepository,
    MongoStaffRepository, MongoUserRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("duplicate key")]
    Duplicate,

    #[error(transparent)]
    Store(FederationError),

    #[error("failed to encode document: {0}")]
    Encode(String),
}

impl From<FederationError> for RepositoryError {
    fn from(err: FederationError) -> Self {
        if err.is_duplicate_key() {
            RepositoryError::Duplicate
        } else {
            RepositoryError::Store(err)
        }
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with [`RepositoryError::Duplicate`] when the email is taken.
    async fn insert(&self, user: &User) -> RepoResult<()>;

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Remove a principal. Used to roll back a registration that failed
    /// part way; a missing id is not an error.
    async fn delete(&self, id: &str) -> RepoResult<()>;

    /// Apply one failed attempt atomically and return the resulting state.
    async fn record_login_failure(
        &self,
        id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<LockoutState>>;

    async fn record_login_success(&self, id: &str, now: DateTime<Utc>) -> RepoResult<()>;

    /// Append a refresh record, pruning expired ones and keeping the newest `cap`.
    async fn push_refresh_token(
        &self,
        id: &str,
        record: RefreshTokenRecord,
        cap: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<bool>;

    /// Replace `old_hash` with `record` in one conditional update.
    ///
    /// Returns `false` when `old_hash` is no longer present, which is how the
    /// loser of two concurrent rotations finds out.
    async fn swap_refresh_token(
        &self,
        id: &str,
        old_hash: &str,
        record: RefreshTokenRecord,
        cap: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<bool>;

    async fn remove_refresh_token(&self, id: &str, token_hash: &str) -> RepoResult<()>;

    async fn clear_refresh_tokens(&self, id: &str) -> RepoResult<()>;

    /// Store a new password hash and drop every refresh record.
    async fn set_password(&self, id: &str, password_hash: &str, now: DateTime<Utc>)
        -> RepoResult<()>;

    async fn set_reset_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()>;

    /// Owner of an unexpired reset token, without consuming it.
    async fn reset_token_owner(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>>;

    /// Single-use: a matching unexpired reset token is cleared in the same
    /// update that installs the new password. Returns the user id.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>>;

    async fn set_verification_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()>;

    async fn consume_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>>;

    async fn link_profile(&self, id: &str, profile_id: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait PatientRepository: Send + Sync {
    /// Fails with [`RepositoryError::Duplicate`] on a patient number collision.
    async fn insert(&self, patient: &Patient) -> RepoResult<()>;

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Patient>>;

    async fn delete(&self, id: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Appointment>>;

    /// Scheduled appointments at or after `now`, soonest first.
    async fn upcoming_for_patient(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Vec<Appointment>>;
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Newest invoices first.
    async fn recent_for_patient(&self, patient_id: &str, limit: i64) -> RepoResult<Vec<Invoice>>;
}

#[async_trait]
pub trait StaffRepository: Send + Sync {
    async fn doctors_by_ids(&self, ids: &[String]) -> RepoResult<Vec<Doctor>>;
}
