use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    middleware::{AuthUser, GuardChain, RequireOwnership, RequireRole},
    models::{DashboardView, Role},
    services::ServiceError,
    AppState,
};

/// Aggregated patient dashboard
///
/// Sections whose store is unavailable are returned as
/// `{"unavailable": true, "source": "<store>"}` and `partial` is set.
#[utoipa::path(
    get,
    path = "/api/v1/patients/{patient_id}/dashboard",
    params(("patient_id" = String, Path, description = "Patient profile id")),
    responses(
        (status = 200, description = "Dashboard, possibly partial", body = DashboardView),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Not permitted", body = ErrorResponse),
        (status = 404, description = "Patient not found", body = ErrorResponse),
        (status = 503, description = "Primary store unavailable", body = ErrorResponse)
    ),
    tag = "Patients",
    security(("bearer_auth" = []))
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(patient_id): Path<String>,
) -> Result<Json<DashboardView>, AppError> {
    GuardChain::new()
        .with(RequireRole::at_least(Role::Patient))
        .with(RequireOwnership::of(patient_id.as_str()))
        .run(&state.authorizer, &principal)
        .map_err(ServiceError::from)?;

    let view = state.aggregation.build_dashboard(&patient_id).await?;
    Ok(Json(view))
}
