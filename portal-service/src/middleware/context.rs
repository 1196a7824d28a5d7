use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use service_core::middleware::rate_limit::client_ip;
use std::convert::Infallible;

use crate::models::DeviceInfo;
use crate::AppState;

const MAX_USER_AGENT_LEN: usize = 512;

/// Device metadata stored alongside each refresh token.
#[axum::async_trait]
impl FromRequestParts<AppState> for DeviceInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());
        let ip_address = client_ip(
            &parts.headers,
            &parts.extensions,
            state.config.common.trust_forwarded_for,
        );

        Ok(DeviceInfo {
            user_agent,
            ip_address: ip_address.map(|ip| ip.to_string()),
        })
    }
}
