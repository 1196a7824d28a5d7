use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Invoice as stored by the billing system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id")]
    pub id: String,
    pub patient_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub issued_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub issued_at: DateTime<Utc>,
}

impl From<&Invoice> for InvoiceView {
    fn from(i: &Invoice) -> Self {
        Self {
            id: i.id.clone(),
            amount_cents: i.amount_cents,
            currency: i.currency.clone(),
            status: i.status.clone(),
            issued_at: i.issued_at.to_chrono(),
        }
    }
}
