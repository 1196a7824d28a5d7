use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::dashboard::Section;
use super::doctor::DoctorSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(rename = "_id")]
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub scheduled_at: BsonDateTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Appointment as returned to clients, joined with its doctor.
///
/// `doctor` is omitted when the doctor is unknown to the staff store and
/// carries an unavailable marker when the staff store could not be read.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub doctor: Option<Section<DoctorSummary>>,
}

impl AppointmentView {
    pub fn new(a: &Appointment, doctor: Option<Section<DoctorSummary>>) -> Self {
        Self {
            id: a.id.clone(),
            patient_id: a.patient_id.clone(),
            doctor_id: a.doctor_id.clone(),
            scheduled_at: a.scheduled_at.to_chrono(),
            status: a.status,
            reason: a.reason.clone(),
            doctor,
        }
    }
}
