//! In-process repositories.
//!
//! Each repository guards its map with one mutex, so every trait call is
//! atomic with respect to the others, mirroring the single-document updates
//! of the MongoDB implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    AppointmentRepository, BillingRepository, PatientRepository, RepoResult, RepositoryError,
    StaffRepository, UserRepository,
};
use crate::models::{
    refresh_token::retain_bounded, Appointment, AppointmentStatus, Doctor, Invoice,
    LockoutPolicy, LockoutState, Patient, RefreshTokenRecord, User,
};

fn bson_time(t: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(t)
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(&self, id: &str, f: impl FnOnce(&mut User) -> T) -> Option<T> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get_mut(id).map(f)
    }

    fn find_where(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.values().find(|u| pred(u)).cloned()
    }

    /// Direct mutation for fixtures, e.g. deactivating an account.
    pub fn update_user(&self, id: &str, f: impl FnOnce(&mut User)) -> bool {
        self.with_user(id, f).is_some()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, user: &User) -> RepoResult<()> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(&user.id) || users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Duplicate);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<User>> {
        Ok(self.find_where(|u| u.id == id))
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.find_where(|u| u.email == email))
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        Ok(())
    }

    async fn record_login_failure(
        &self,
        id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<LockoutState>> {
        Ok(self.with_user(id, |u| {
            let next = u.lockout().after_failure(policy, now);
            u.failed_login_attempts = next.failed_attempts;
            u.lock_until = next.locked_until.map(bson_time);
            u.updated_at = bson_time(now);
            next
        }))
    }

    async fn record_login_success(&self, id: &str, now: DateTime<Utc>) -> RepoResult<()> {
        self.with_user(id, |u| {
            u.failed_login_attempts = 0;
            u.lock_until = None;
            u.last_login_at = Some(bson_time(now));
            u.updated_at = bson_time(now);
        });
        Ok(())
    }

    async fn push_refresh_token(
        &self,
        id: &str,
        record: RefreshTokenRecord,
        cap: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        Ok(self
            .with_user(id, |u| retain_bounded(&mut u.refresh_tokens, record, cap.max(1), now))
            .is_some())
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        old_hash: &str,
        record: RefreshTokenRecord,
        cap: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        Ok(self
            .with_user(id, |u| {
                if !u.has_refresh_token(old_hash, now) {
                    return false;
                }
                u.refresh_tokens.retain(|r| r.token_hash != old_hash);
                retain_bounded(&mut u.refresh_tokens, record, cap.max(1), now);
                true
            })
            .unwrap_or(false))
    }

    async fn remove_refresh_token(&self, id: &str, token_hash: &str) -> RepoResult<()> {
        self.with_user(id, |u| u.refresh_tokens.retain(|r| r.token_hash != token_hash));
        Ok(())
    }

    async fn clear_refresh_tokens(&self, id: &str) -> RepoResult<()> {
        self.with_user(id, |u| u.refresh_tokens.clear());
        Ok(())
    }

    async fn set_password(
        &self,
        id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.with_user(id, |u| {
            u.password_hash = password_hash.to_string();
            u.refresh_tokens.clear();
            u.reset_token_hash = None;
            u.reset_token_expires_at = None;
            u.updated_at = bson_time(now);
        });
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.with_user(id, |u| {
            u.reset_token_hash = Some(token_hash.to_string());
            u.reset_token_expires_at = Some(bson_time(expires_at));
        });
        Ok(())
    }

    async fn reset_token_owner(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>> {
        Ok(self
            .find_where(|u| {
                u.reset_token_hash.as_deref() == Some(token_hash)
                    && matches!(u.reset_token_expires_at, Some(exp) if exp.to_chrono() > now)
            })
            .map(|u| u.id))
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let user = users.values_mut().find(|u| {
            u.reset_token_hash.as_deref() == Some(token_hash)
                && matches!(u.reset_token_expires_at, Some(exp) if exp.to_chrono() > now)
        });

        Ok(user.map(|u| {
            u.password_hash = password_hash.to_string();
            u.refresh_tokens.clear();
            u.reset_token_hash = None;
            u.reset_token_expires_at = None;
            u.updated_at = bson_time(now);
            u.id.clone()
        }))
    }

    async fn set_verification_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.with_user(id, |u| {
            u.verification_token_hash = Some(token_hash.to_string());
            u.verification_token_expires_at = Some(bson_time(expires_at));
        });
        Ok(())
    }

    async fn consume_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let user = users.values_mut().find(|u| {
            u.verification_token_hash.as_deref() == Some(token_hash)
                && matches!(u.verification_token_expires_at, Some(exp) if exp.to_chrono() > now)
        });

        Ok(user.map(|u| {
            u.email_verified = true;
            u.verification_token_hash = None;
            u.verification_token_expires_at = None;
            u.updated_at = bson_time(now);
            u.id.clone()
        }))
    }

    async fn link_profile(&self, id: &str, profile_id: &str) -> RepoResult<()> {
        self.with_user(id, |u| u.profile_id = Some(profile_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPatientRepository {
    patients: Mutex<HashMap<String, Patient>>,
}

impl MemoryPatientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatientRepository for MemoryPatientRepository {
    async fn insert(&self, patient: &Patient) -> RepoResult<()> {
        let mut patients = self.patients.lock().unwrap_or_else(|e| e.into_inner());
        if patients.contains_key(&patient.id)
            || patients
                .values()
                .any(|p| p.patient_number == patient.patient_number)
        {
            return Err(RepositoryError::Duplicate);
        }
        patients.insert(patient.id.clone(), patient.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Patient>> {
        let patients = self.patients.lock().unwrap_or_else(|e| e.into_inner());
        Ok(patients.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        self.patients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAppointmentRepository {
    appointments: Mutex<Vec<Appointment>>,
}

impl MemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, appointment: Appointment) {
        self.appointments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(appointment);
    }
}

#[async_trait]
impl AppointmentRepository for MemoryAppointmentRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Appointment>> {
        let appointments = self.appointments.lock().unwrap_or_else(|e| e.into_inner());
        Ok(appointments.iter().find(|a| a.id == id).cloned())
    }

    async fn upcoming_for_patient(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Vec<Appointment>> {
        let appointments = self.appointments.lock().unwrap_or_else(|e| e.into_inner());
        let mut upcoming: Vec<Appointment> = appointments
            .iter()
            .filter(|a| {
                a.patient_id == patient_id
                    && a.status == AppointmentStatus::Scheduled
                    && a.scheduled_at.to_chrono() >= now
            })
            .cloned()
            .collect();
        upcoming.sort_by_key(|a| a.scheduled_at);
        upcoming.truncate(limit.max(0) as usize);
        Ok(upcoming)
    }
}

#[derive(Default)]
pub struct MemoryBillingRepository {
    invoices: Mutex<Vec<Invoice>>,
}

impl MemoryBillingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, invoice: Invoice) {
        self.invoices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invoice);
    }
}

#[async_trait]
impl BillingRepository for MemoryBillingRepository {
    async fn recent_for_patient(&self, patient_id: &str, limit: i64) -> RepoResult<Vec<Invoice>> {
        let invoices = self.invoices.lock().unwrap_or_else(|e| e.into_inner());
        let mut recent: Vec<Invoice> = invoices
            .iter()
            .filter(|i| i.patient_id == patient_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        recent.truncate(limit.max(0) as usize);
        Ok(recent)
    }
}

#[derive(Default)]
pub struct MemoryStaffRepository {
    doctors: Mutex<HashMap<String, Doctor>>,
}

impl MemoryStaffRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doctor: Doctor) {
        self.doctors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doctor.id.clone(), doctor);
    }
}

#[async_trait]
impl StaffRepository for MemoryStaffRepository {
    async fn doctors_by_ids(&self, ids: &[String]) -> RepoResult<Vec<Doctor>> {
        let doctors = self.doctors.lock().unwrap_or_else(|e| e.into_inner());
        Ok(ids.iter().filter_map(|id| doctors.get(id).cloned()).collect())
    }
}
