use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    middleware::AuthUser,
    models::AppointmentView,
    services::{AccessDecision, ResourceKind, ServiceError},
    AppState,
};

/// Single appointment with its doctor
#[utoipa::path(
    get,
    path = "/api/v1/appointments/{appointment_id}",
    params(("appointment_id" = String, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Appointment", body = AppointmentView),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Not permitted", body = ErrorResponse),
        (status = 404, description = "Appointment not found", body = ErrorResponse)
    ),
    tag = "Appointments",
    security(("bearer_auth" = []))
)]
pub async fn get_appointment(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(appointment_id): Path<String>,
) -> Result<Json<AppointmentView>, AppError> {
    let decision = state
        .authorizer
        .check_collection_access(&principal, ResourceKind::Appointment)
        .map_err(ServiceError::from)?;

    let appointment = state
        .repositories
        .appointments
        .find_by_id(&appointment_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::NotFound("Appointment"))?;

    if decision == AccessDecision::OwnershipCheckRequired {
        state
            .authorizer
            .check_ownership(&principal, &appointment.patient_id)
            .map_err(ServiceError::from)?;
    }

    Ok(Json(state.aggregation.appointment_detail(&appointment).await))
}
