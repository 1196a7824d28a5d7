use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::appointment::AppointmentView;
use super::billing::InvoiceView;
use super::doctor::DoctorSummary;
use super::patient::PatientView;
use crate::federation::StoreName;

/// Placeholder for a section whose source could not be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnavailableMarker {
    pub unavailable: bool,
    pub source: StoreName,
}

/// One section of an aggregated view: either data, or an explicit marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Section<T> {
    Available(T),
    Unavailable(UnavailableMarker),
}

impl<T> Section<T> {
    pub fn unavailable(source: StoreName) -> Self {
        Section::Unavailable(UnavailableMarker {
            unavailable: true,
            source,
        })
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Section::Available(_))
    }

    pub fn as_available(&self) -> Option<&T> {
        match self {
            Section::Available(v) => Some(v),
            Section::Unavailable(_) => None,
        }
    }
}

/// Patient dashboard assembled from all three stores.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub patient: PatientView,
    #[schema(value_type = Object)]
    pub appointments: Section<Vec<AppointmentView>>,
    #[schema(value_type = Object)]
    pub billing: Section<Vec<InvoiceView>>,
    #[schema(value_type = Object)]
    pub care_team: Section<Vec<DoctorSummary>>,
    /// True when at least one section is unavailable.
    pub partial: bool,
    #[schema(value_type = Vec<String>)]
    pub unavailable_sources: Vec<StoreName>,
    pub generated_at: DateTime<Utc>,
}
