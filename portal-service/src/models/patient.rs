use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Unambiguous alphabet for patient numbers (no 0/O, 1/I/L).
const PATIENT_NUMBER_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const PATIENT_NUMBER_LEN: usize = 10;
pub const PATIENT_NUMBER_PREFIX: &str = "PT-";

/// Patient profile linked to a principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "_id")]
    pub id: String,
    pub patient_number: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: BsonDateTime,
}

impl Patient {
    pub fn new(first_name: String, last_name: String, user_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            patient_number: generate_patient_number(),
            first_name,
            last_name,
            date_of_birth: None,
            user_id,
            created_at: BsonDateTime::now(),
        }
    }
}

/// Draw a fresh `PT-XXXXXXXXXX` number. Uniqueness is enforced by the store.
pub fn generate_patient_number() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..PATIENT_NUMBER_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..PATIENT_NUMBER_ALPHABET.len());
            PATIENT_NUMBER_ALPHABET[idx] as char
        })
        .collect();
    format!("{}{}", PATIENT_NUMBER_PREFIX, body)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientView {
    pub id: String,
    pub patient_number: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Patient> for PatientView {
    fn from(p: &Patient) -> Self {
        Self {
            id: p.id.clone(),
            patient_number: p.patient_number.clone(),
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            date_of_birth: p.date_of_birth.clone(),
            created_at: p.created_at.to_chrono(),
        }
    }
}
