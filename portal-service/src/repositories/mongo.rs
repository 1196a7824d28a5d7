use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, to_document, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Collection, IndexModel,
};
use std::{sync::Arc, time::Duration};

use super::{
    AppointmentRepository, BillingRepository, PatientRepository, RepoResult, RepositoryError,
    StaffRepository, UserRepository,
};
use crate::federation::{timed, ConnectionFederator, StoreName};
use crate::models::{
    Appointment, AppointmentStatus, Doctor, Invoice, LockoutPolicy, LockoutState, Patient,
    RefreshTokenRecord, User,
};

pub const USERS: &str = "users";
pub const PATIENTS: &str = "patients";
pub const APPOINTMENTS: &str = "appointments";
pub const INVOICES: &str = "invoices";
pub const DOCTORS: &str = "doctors";

async fn primary_collection<T>(
    federator: &ConnectionFederator,
    name: &str,
) -> RepoResult<(Collection<T>, Duration)> {
    let handle = federator.primary().await?;
    Ok((handle.collection(name), handle.timeout()))
}

fn bson_time(t: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(t)
}

/// Pipeline update that keeps live records (minus `remove_hash`), appends
/// `record`, and slices to the newest `cap`.
fn refresh_list_pipeline(
    remove_hash: Option<&str>,
    record: &RefreshTokenRecord,
    cap: usize,
    now: DateTime<Utc>,
) -> RepoResult<Vec<Document>> {
    let record = to_document(record).map_err(|e| RepositoryError::Encode(e.to_string()))?;
    let now = bson_time(now);

    let mut keep = vec![doc! { "$gt": ["$$t.expires_at", now] }];
    if let Some(hash) = remove_hash {
        keep.push(doc! { "$ne": ["$$t.token_hash", hash] });
    }

    Ok(vec![doc! {
        "$set": {
            "refresh_tokens": {
                "$slice": [
                    {
                        "$concatArrays": [
                            {
                                "$filter": {
                                    "input": { "$ifNull": ["$refresh_tokens", []] },
                                    "as": "t",
                                    "cond": { "$and": keep },
                                }
                            },
                            [{ "$literal": record }],
                        ]
                    },
                    (-(cap.max(1) as i64)),
                ]
            },
            "updated_at": now,
        }
    }])
}

/// Failure accounting as a two-stage pipeline: restart the count after an
/// elapsed lock, then lock when the threshold is reached and no lock is active.
fn login_failure_pipeline(policy: &LockoutPolicy, now: DateTime<Utc>) -> Vec<Document> {
    let lock_at = bson_time(now + policy.duration);
    let now = bson_time(now);

    let lock_elapsed = doc! { "$lte": [{ "$ifNull": ["$lock_until", BsonDateTime::MAX] }, now] };
    let not_locked = doc! { "$lte": [{ "$ifNull": ["$lock_until", BsonDateTime::MIN] }, now] };

    vec![
        doc! {
            "$set": {
                "failed_login_attempts": {
                    "$cond": [
                        lock_elapsed.clone(),
                        1,
                        { "$add": [{ "$ifNull": ["$failed_login_attempts", 0] }, 1] },
                    ]
                },
                "lock_until": { "$cond": [lock_elapsed, null, "$lock_until"] },
            }
        },
        doc! {
            "$set": {
                "lock_until": {
                    "$cond": [
                        { "$and": [{ "$gte": ["$failed_login_attempts", policy.threshold] }, not_locked] },
                        lock_at,
                        "$lock_until",
                    ]
                },
                "updated_at": now,
            }
        },
    ]
}

pub struct MongoUserRepository {
    federator: Arc<ConnectionFederator>,
}

impl MongoUserRepository {
    pub fn new(federator: Arc<ConnectionFederator>) -> Self {
        Self { federator }
    }

    async fn users(&self) -> RepoResult<(Collection<User>, Duration)> {
        primary_collection(&self.federator, USERS).await
    }

    async fn update(&self, id: &str, update: Document) -> RepoResult<u64> {
        let (users, timeout) = self.users().await?;
        let result = timed(
            StoreName::Primary,
            timeout,
            users.update_one(doc! { "_id": id }, update, None),
        )
        .await?;
        Ok(result.matched_count)
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn insert(&self, user: &User) -> RepoResult<()> {
        let (users, timeout) = self.users().await?;
        timed(StoreName::Primary, timeout, users.insert_one(user, None)).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        let (users, timeout) = self.users().await?;
        timed(StoreName::Primary, timeout, users.delete_one(doc! { "_id": id }, None)).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<User>> {
        let (users, timeout) = self.users().await?;
        Ok(timed(
            StoreName::Primary,
            timeout,
            users.find_one(doc! { "_id": id }, None),
        )
        .await?)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let (users, timeout) = self.users().await?;
        Ok(timed(
            StoreName::Primary,
            timeout,
            users.find_one(doc! { "email": email }, None),
        )
        .await?)
    }

    async fn record_login_failure(
        &self,
        id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<LockoutState>> {
        let (users, timeout) = self.users().await?;
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = timed(
            StoreName::Primary,
            timeout,
            users.find_one_and_update(
                doc! { "_id": id },
                login_failure_pipeline(policy, now),
                options,
            ),
        )
        .await?;

        Ok(updated.map(|u| u.lockout()))
    }

    async fn record_login_success(&self, id: &str, now: DateTime<Utc>) -> RepoResult<()> {
        let now = bson_time(now);
        self.update(
            id,
            doc! { "$set": {
                "failed_login_attempts": 0,
                "lock_until": null,
                "last_login_at": now,
                "updated_at": now,
            }},
        )
        .await?;
        Ok(())
    }

    async fn push_refresh_token(
        &self,
        id: &str,
        record: RefreshTokenRecord,
        cap: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let (users, timeout) = self.users().await?;
        let pipeline = refresh_list_pipeline(None, &record, cap, now)?;
        let result = timed(
            StoreName::Primary,
            timeout,
            users.update_one(doc! { "_id": id }, pipeline, None),
        )
        .await?;
        Ok(result.matched_count == 1)
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        old_hash: &str,
        record: RefreshTokenRecord,
        cap: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let (users, timeout) = self.users().await?;
        let pipeline = refresh_list_pipeline(Some(old_hash), &record, cap, now)?;
        let filter = doc! {
            "_id": id,
            "refresh_tokens": { "$elemMatch": {
                "token_hash": old_hash,
                "expires_at": { "$gt": bson_time(now) },
            }},
        };
        let result = timed(
            StoreName::Primary,
            timeout,
            users.update_one(filter, pipeline, None),
        )
        .await?;
        Ok(result.modified_count == 1)
    }

    async fn remove_refresh_token(&self, id: &str, token_hash: &str) -> RepoResult<()> {
        self.update(
            id,
            doc! {
                "$pull": { "refresh_tokens": { "token_hash": token_hash } },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        )
        .await?;
        Ok(())
    }

    async fn clear_refresh_tokens(&self, id: &str) -> RepoResult<()> {
        self.update(
            id,
            doc! { "$set": { "refresh_tokens": [], "updated_at": BsonDateTime::now() } },
        )
        .await?;
        Ok(())
    }

    async fn set_password(
        &self,
        id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.update(
            id,
            doc! { "$set": {
                "password_hash": password_hash,
                "refresh_tokens": [],
                "reset_token_hash": null,
                "reset_token_expires_at": null,
                "updated_at": bson_time(now),
            }},
        )
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.update(
            id,
            doc! { "$set": {
                "reset_token_hash": token_hash,
                "reset_token_expires_at": bson_time(expires_at),
                "updated_at": BsonDateTime::now(),
            }},
        )
        .await?;
        Ok(())
    }

    async fn reset_token_owner(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>> {
        let (users, timeout) = self.users().await?;
        let user = timed(
            StoreName::Primary,
            timeout,
            users.find_one(
                doc! {
                    "reset_token_hash": token_hash,
                    "reset_token_expires_at": { "$gt": bson_time(now) },
                },
                None,
            ),
        )
        .await?;
        Ok(user.map(|u| u.id))
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>> {
        let (users, timeout) = self.users().await?;
        let now = bson_time(now);
        let updated = timed(
            StoreName::Primary,
            timeout,
            users.find_one_and_update(
                doc! {
                    "reset_token_hash": token_hash,
                    "reset_token_expires_at": { "$gt": now },
                },
                doc! { "$set": {
                    "password_hash": password_hash,
                    "refresh_tokens": [],
                    "reset_token_hash": null,
                    "reset_token_expires_at": null,
                    "updated_at": now,
                }},
                None,
            ),
        )
        .await?;
        Ok(updated.map(|u| u.id))
    }

    async fn set_verification_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.update(
            id,
            doc! { "$set": {
                "verification_token_hash": token_hash,
                "verification_token_expires_at": bson_time(expires_at),
                "updated_at": BsonDateTime::now(),
            }},
        )
        .await?;
        Ok(())
    }

    async fn consume_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<String>> {
        let (users, timeout) = self.users().await?;
        let now = bson_time(now);
        let updated = timed(
            StoreName::Primary,
            timeout,
            users.find_one_and_update(
                doc! {
                    "verification_token_hash": token_hash,
                    "verification_token_expires_at": { "$gt": now },
                },
                doc! { "$set": {
                    "email_verified": true,
                    "verification_token_hash": null,
                    "verification_token_expires_at": null,
                    "updated_at": now,
                }},
                None,
            ),
        )
        .await?;
        Ok(updated.map(|u| u.id))
    }

    async fn link_profile(&self, id: &str, profile_id: &str) -> RepoResult<()> {
        self.update(
            id,
            doc! { "$set": { "profile_id": profile_id, "updated_at": BsonDateTime::now() } },
        )
        .await?;
        Ok(())
    }
}

pub struct MongoPatientRepository {
    federator: Arc<ConnectionFederator>,
}

impl MongoPatientRepository {
    pub fn new(federator: Arc<ConnectionFederator>) -> Self {
        Self { federator }
    }
}

#[async_trait]
impl PatientRepository for MongoPatientRepository {
    async fn insert(&self, patient: &Patient) -> RepoResult<()> {
        let (patients, timeout) =
            primary_collection::<Patient>(&self.federator, PATIENTS).await?;
        timed(StoreName::Primary, timeout, patients.insert_one(patient, None)).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Patient>> {
        let (patients, timeout) =
            primary_collection::<Patient>(&self.federator, PATIENTS).await?;
        Ok(timed(
            StoreName::Primary,
            timeout,
            patients.find_one(doc! { "_id": id }, None),
        )
        .await?)
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        let (patients, timeout) =
            primary_collection::<Patient>(&self.federator, PATIENTS).await?;
        timed(
            StoreName::Primary,
            timeout,
            patients.delete_one(doc! { "_id": id }, None),
        )
        .await?;
        Ok(())
    }
}

pub struct MongoAppointmentRepository {
    federator: Arc<ConnectionFederator>,
}

impl MongoAppointmentRepository {
    pub fn new(federator: Arc<ConnectionFederator>) -> Self {
        Self { federator }
    }
}

#[async_trait]
impl AppointmentRepository for MongoAppointmentRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Appointment>> {
        let (appointments, timeout) =
            primary_collection::<Appointment>(&self.federator, APPOINTMENTS).await?;
        Ok(timed(
            StoreName::Primary,
            timeout,
            appointments.find_one(doc! { "_id": id }, None),
        )
        .await?)
    }

    async fn upcoming_for_patient(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Vec<Appointment>> {
        let (appointments, timeout) =
            primary_collection::<Appointment>(&self.federator, APPOINTMENTS).await?;
        let filter = doc! {
            "patient_id": patient_id,
            "status": AppointmentStatus::Scheduled.as_str(),
            "scheduled_at": { "$gte": bson_time(now) },
        };
        let options = FindOptions::builder()
            .sort(doc! { "scheduled_at": 1 })
            .limit(limit)
            .build();

        Ok(timed(StoreName::Primary, timeout, async {
            use futures::TryStreamExt;
            let cursor = appointments.find(filter, options).await?;
            cursor.try_collect::<Vec<Appointment>>().await
        })
        .await?)
    }
}

pub struct MongoBillingRepository {
    federator: Arc<ConnectionFederator>,
}

impl MongoBillingRepository {
    pub fn new(federator: Arc<ConnectionFederator>) -> Self {
        Self { federator }
    }
}

#[async_trait]
impl BillingRepository for MongoBillingRepository {
    async fn recent_for_patient(&self, patient_id: &str, limit: i64) -> RepoResult<Vec<Invoice>> {
        let invoices = self.federator.billing().await?.collection::<Invoice>(INVOICES);
        let options = FindOptions::builder()
            .sort(doc! { "issued_at": -1 })
            .limit(limit)
            .build();
        Ok(invoices
            .find(doc! { "patient_id": patient_id }, options)
            .await?)
    }
}

pub struct MongoStaffRepository {
    federator: Arc<ConnectionFederator>,
}

impl MongoStaffRepository {
    pub fn new(federator: Arc<ConnectionFederator>) -> Self {
        Self { federator }
    }
}

#[async_trait]
impl StaffRepository for MongoStaffRepository {
    async fn doctors_by_ids(&self, ids: &[String]) -> RepoResult<Vec<Doctor>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let doctors = self.federator.staff().await?.collection::<Doctor>(DOCTORS);
        Ok(doctors.find(doc! { "_id": { "$in": ids.to_vec() } }, None).await?)
    }
}

/// Indexes on collections this service owns. Read-only stores are left alone.
pub async fn ensure_indexes(federator: &ConnectionFederator) -> RepoResult<()> {
    let primary = federator.primary().await?;
    let timeout = primary.timeout();

    let specs: [(&str, Document, &str, bool); 5] = [
        (USERS, doc! { "email": 1 }, "email_unique", true),
        (USERS, doc! { "reset_token_hash": 1 }, "reset_token_lookup", false),
        (
            USERS,
            doc! { "verification_token_hash": 1 },
            "verification_token_lookup",
            false,
        ),
        (
            PATIENTS,
            doc! { "patient_number": 1 },
            "patient_number_unique",
            true,
        ),
        (
            APPOINTMENTS,
            doc! { "patient_id": 1, "scheduled_at": 1 },
            "patient_schedule",
            false,
        ),
    ];

    for (collection, keys, name, unique) in specs {
        let index = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(name.to_string())
                    .unique(unique)
                    .sparse(!unique)
                    .build(),
            )
            .build();

        timed(
            StoreName::Primary,
            timeout,
            primary
                .collection::<Document>(collection)
                .create_index(index, None),
        )
        .await
        .map_err(|e| {
            tracing::error!(collection = %collection, index = %name, error = %e, "Failed to create index");
            e
        })?;
        tracing::info!(collection = %collection, index = %name, "Index ensured");
    }

    Ok(())
}
