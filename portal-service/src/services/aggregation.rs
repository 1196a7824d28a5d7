use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::error::ServiceError;
use super::metrics;
use crate::federation::StoreName;
use crate::models::{
    Appointment, AppointmentView, DashboardView, Doctor, DoctorSummary, InvoiceView, PatientView,
    Section,
};
use crate::repositories::{
    AppointmentRepository, BillingRepository, PatientRepository, RepoResult, StaffRepository,
};

pub const UPCOMING_APPOINTMENTS_LIMIT: i64 = 10;
pub const RECENT_INVOICES_LIMIT: i64 = 10;

/// Builds read-only views that span the primary, billing and staff stores.
pub struct AggregationService {
    patients: Arc<dyn PatientRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    billing: Arc<dyn BillingRepository>,
    staff: Arc<dyn StaffRepository>,
    timeout: Duration,
}

impl AggregationService {
    pub fn new(
        patients: Arc<dyn PatientRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        billing: Arc<dyn BillingRepository>,
        staff: Arc<dyn StaffRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            patients,
            appointments,
            billing,
            staff,
            timeout,
        }
    }

    /// Patient dashboard.
    ///
    /// The patient lookup is required and runs first. Billing and the
    /// appointment schedule are then fetched concurrently; doctor details are
    /// looked up once the appointments (and so the doctor ids) are known. A
    /// failing or slow secondary source turns its section into an
    /// `unavailable` marker and sets `partial`.
    pub async fn build_dashboard(&self, patient_id: &str) -> Result<DashboardView, ServiceError> {
        let now = Utc::now();

        let patient = match tokio::time::timeout(self.timeout, self.patients.find_by_id(patient_id)).await {
            Ok(result) => result?.ok_or(ServiceError::NotFound("Patient"))?,
            Err(_) => return Err(ServiceError::StoreUnavailable(StoreName::Primary)),
        };

        let billing = self.section(
            StoreName::Billing,
            self.billing
                .recent_for_patient(&patient.id, RECENT_INVOICES_LIMIT),
        );

        let schedule = async {
            let appointments = self
                .section(
                    StoreName::Primary,
                    self.appointments.upcoming_for_patient(
                        &patient.id,
                        now,
                        UPCOMING_APPOINTMENTS_LIMIT,
                    ),
                )
                .await;

            let doctors = match &appointments {
                Section::Available(list) => {
                    let ids = doctor_ids(list);
                    self.section(StoreName::Staff, self.staff.doctors_by_ids(&ids))
                        .await
                }
                // Doctor ids come from the appointments; without them there
                // is nothing to look up.
                Section::Unavailable(marker) => Section::unavailable(marker.source),
            };

            (appointments, doctors)
        };

        let (billing, (appointments, doctors)) = tokio::join!(billing, schedule);

        let (appointments, care_team) = join_doctors(appointments, doctors);
        let billing = match billing {
            Section::Available(invoices) => {
                Section::Available(invoices.iter().map(InvoiceView::from).collect())
            }
            Section::Unavailable(marker) => Section::Unavailable(marker),
        };

        let mut unavailable_sources = Vec::new();
        for marker in [
            unavailable_source(&appointments),
            unavailable_source(&billing),
            unavailable_source(&care_team),
        ]
        .into_iter()
        .flatten()
        {
            if !unavailable_sources.contains(&marker) {
                unavailable_sources.push(marker);
            }
        }

        if !unavailable_sources.is_empty() {
            tracing::warn!(
                patient_id = %patient.id,
                sources = ?unavailable_sources,
                "Dashboard served with partial data"
            );
        }

        Ok(DashboardView {
            patient: PatientView::from(&patient),
            appointments,
            billing,
            care_team,
            partial: !unavailable_sources.is_empty(),
            unavailable_sources,
            generated_at: now,
        })
    }

    /// A single appointment joined with its doctor. The doctor becomes an
    /// unavailable marker when the staff store cannot answer in time.
    pub async fn appointment_detail(&self, appointment: &Appointment) -> AppointmentView {
        let ids = [appointment.doctor_id.clone()];
        let doctor = match self
            .section(StoreName::Staff, self.staff.doctors_by_ids(&ids))
            .await
        {
            Section::Available(doctors) => doctors
                .first()
                .map(|d| Section::Available(DoctorSummary::from(d))),
            Section::Unavailable(marker) => Some(Section::Unavailable(marker)),
        };
        AppointmentView::new(appointment, doctor)
    }

    async fn section<T>(
        &self,
        source: StoreName,
        fetch: impl Future<Output = RepoResult<T>>,
    ) -> Section<T> {
        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(value)) => Section::Available(value),
            Ok(Err(e)) => {
                tracing::warn!(source = %source, error = %e, "Dashboard source failed");
                metrics::record_degraded_section(source);
                Section::unavailable(source)
            }
            Err(_) => {
                tracing::warn!(source = %source, timeout_ms = self.timeout.as_millis() as u64, "Dashboard source timed out");
                metrics::record_degraded_section(source);
                Section::unavailable(source)
            }
        }
    }
}

fn unavailable_source<T>(section: &Section<T>) -> Option<StoreName> {
    match section {
        Section::Available(_) => None,
        Section::Unavailable(marker) => Some(marker.source),
    }
}

/// Distinct doctor ids in first-seen order.
fn doctor_ids(appointments: &[Appointment]) -> Vec<String> {
    let mut seen = HashSet::new();
    appointments
        .iter()
        .filter(|a| seen.insert(a.doctor_id.as_str()))
        .map(|a| a.doctor_id.clone())
        .collect()
}

/// Attach doctors to appointments through a lookup map keyed by doctor id.
fn join_doctors(
    appointments: Section<Vec<Appointment>>,
    doctors: Section<Vec<Doctor>>,
) -> (Section<Vec<AppointmentView>>, Section<Vec<DoctorSummary>>) {
    let by_id: HashMap<&str, DoctorSummary> = doctors
        .as_available()
        .map(|list| {
            list.iter()
                .map(|d| (d.id.as_str(), DoctorSummary::from(d)))
                .collect()
        })
        .unwrap_or_default();

    let doctor_for = |id: &str| match &doctors {
        Section::Available(_) => by_id.get(id).cloned().map(Section::Available),
        Section::Unavailable(marker) => Some(Section::Unavailable(marker.clone())),
    };

    let appointment_views = match &appointments {
        Section::Available(list) => Section::Available(
            list.iter()
                .map(|a| AppointmentView::new(a, doctor_for(a.doctor_id.as_str())))
                .collect(),
        ),
        Section::Unavailable(marker) => Section::Unavailable(marker.clone()),
    };

    let care_team = match (&appointments, &doctors) {
        (Section::Available(list), Section::Available(_)) => Section::Available(
            doctor_ids(list)
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).cloned())
                .collect(),
        ),
        (_, Section::Unavailable(marker)) => Section::Unavailable(marker.clone()),
        (Section::Unavailable(marker), _) => Section::Unavailable(marker.clone()),
    };

    (appointment_views, care_team)
}
