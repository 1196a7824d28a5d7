use axum::{extract::State, http::StatusCode, Json};
use std::collections::BTreeMap;

use crate::{
    dtos::health::{HealthResponse, HealthStatus, StoreStatus},
    federation::{Capability, FederationError, StoreName},
    AppState,
};

/// Service and store health
///
/// A read-only store that cannot be reached degrades the service; only the
/// primary store makes it unhealthy.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Healthy or degraded", body = HealthResponse),
        (status = 503, description = "Primary store unreachable", body = HealthResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut stores = BTreeMap::new();
    let mut status = HealthStatus::Healthy;

    for store in StoreName::ALL {
        let store_status = match state.federator.ping(store).await {
            Ok(()) => StoreStatus::Up,
            Err(FederationError::MissingUri(_)) => StoreStatus::Unconfigured,
            Err(e) => {
                tracing::warn!(store = %store, error = %e, "Store health check failed");
                StoreStatus::Down
            }
        };

        if store_status != StoreStatus::Up {
            status = match store.capability() {
                Capability::ReadWrite => HealthStatus::Unhealthy,
                Capability::ReadOnly if status == HealthStatus::Healthy => HealthStatus::Degraded,
                Capability::ReadOnly => status,
            };
        }
        stores.insert(store.as_str().to_string(), store_status);
    }

    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status,
            service: state.config.service_name.clone(),
            version: state.config.service_version.clone(),
            stores,
        }),
    )
}
