use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Clinician record owned by the staff directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    #[serde(rename = "_id")]
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSummary {
    pub id: String,
    pub display_name: String,
    pub specialty: Option<String>,
    pub department: Option<String>,
}

impl From<&Doctor> for DoctorSummary {
    fn from(d: &Doctor) -> Self {
        Self {
            id: d.id.clone(),
            display_name: d.display_name.clone(),
            specialty: d.specialty.clone(),
            department: d.department.clone(),
        }
    }
}
